use serde::{Deserialize, Serialize};

/// Settings of a single repack driver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepackConfig {
    /// Maximum bytes of object content buffered in memory at once.
    pub memory_budget: u64,
    /// Ask the pack writer to compress what it writes.
    pub compress: bool,
}

impl Default for RepackConfig {
    fn default() -> Self {
        Self {
            memory_budget: 1000 * 1024 * 1024,
            compress: false,
        }
    }
}

impl RepackConfig {
    pub fn new(memory_budget: u64, compress: bool) -> Self {
        Self {
            memory_budget,
            compress,
        }
    }
}

/// Settings of a whole migration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    #[serde(flatten)]
    pub repack: RepackConfig,
    /// Number of groups processed concurrently. Each worker has its own
    /// cache, so peak memory is up to `parallelism * memory_budget`.
    pub parallelism: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            repack: RepackConfig::default(),
            parallelism: 1,
        }
    }
}
