use serde::{Deserialize, Serialize};

/// Tunables of an on-disk [`Container`](crate::Container).
///
/// Persisted in the container's `config.json` when it is initialised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// A pack file stops receiving new objects once it reaches this size.
    /// Objects are never split, so a pack can exceed it by one object.
    pub pack_size_target: u64,
    /// zstd level used for objects written with compression enabled.
    pub compression_level: i32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            pack_size_target: 4 * 1024 * 1024 * 1024,
            compression_level: 3,
        }
    }
}

impl ContainerConfig {
    pub fn with_pack_size_target(pack_size_target: u64) -> Self {
        Self {
            pack_size_target,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ContainerConfig::default();
        assert_eq!(c.pack_size_target, 4 * 1024 * 1024 * 1024);
        assert_eq!(c.compression_level, 3);
    }

    #[test]
    fn with_pack_size_target_keeps_level() {
        let c = ContainerConfig::with_pack_size_target(1024);
        assert_eq!(c.pack_size_target, 1024);
        assert_eq!(c.compression_level, 3);
    }
}
