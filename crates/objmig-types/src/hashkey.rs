use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object::ObjectId;

/// Identifier of an object in the store a migration reads from.
///
/// Kept distinct from [`NewHashkey`] so the two sides of a remapping cannot
/// be mixed up, even though both wrap an [`ObjectId`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OldHashkey(ObjectId);

/// Identifier of an object in the store a migration writes to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewHashkey(ObjectId);

macro_rules! hashkey_impls {
    ($name:ident) => {
        impl $name {
            pub const fn new(id: ObjectId) -> Self {
                Self(id)
            }

            /// The underlying store identifier.
            pub fn object_id(&self) -> ObjectId {
                self.0
            }

            pub fn short_hex(&self) -> String {
                self.0.short_hex()
            }
        }

        impl From<ObjectId> for $name {
            fn from(id: ObjectId) -> Self {
                Self(id)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0.short_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

hashkey_impls!(OldHashkey);
hashkey_impls!(NewHashkey);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_object_id() {
        let id = ObjectId::from_bytes(b"blob");
        assert_eq!(OldHashkey::new(id).object_id(), id);
        assert_eq!(NewHashkey::from(id).object_id(), id);
    }

    #[test]
    fn display_matches_object_id() {
        let id = ObjectId::from_bytes(b"blob");
        assert_eq!(OldHashkey::new(id).to_string(), id.to_hex());
    }

    #[test]
    fn debug_names_the_side() {
        let id = ObjectId::from_bytes(b"blob");
        assert!(format!("{:?}", OldHashkey::new(id)).starts_with("OldHashkey("));
        assert!(format!("{:?}", NewHashkey::new(id)).starts_with("NewHashkey("));
    }

    #[test]
    fn serde_is_transparent() {
        let id = ObjectId::from_bytes(b"blob");
        let json = serde_json::to_string(&NewHashkey::new(id)).unwrap();
        assert_eq!(json, serde_json::to_string(&id).unwrap());
        let back: NewHashkey = serde_json::from_str(&json).unwrap();
        assert_eq!(back.object_id(), id);
    }
}
