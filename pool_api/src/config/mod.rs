pub mod options;
pub mod pool;

pub use options::PoolConfig;
pub use pool::{DeviceRef, Pool, PoolType};

/// The on-disk manifest envelope. Wrapping the pool list in a versioned
/// object (rather than persisting a bare JSON array) leaves room to migrate
/// the schema later without guessing at an unmarked file's shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Manifest {
    pub version: u32,
    pub pools: Vec<Pool>,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            version: CURRENT_MANIFEST_VERSION,
            pools: Vec::new(),
        }
    }
}

pub const CURRENT_MANIFEST_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_manifest_is_empty_and_current_version() {
        let manifest = Manifest::default();
        assert_eq!(manifest.version, CURRENT_MANIFEST_VERSION);
        assert!(manifest.pools.is_empty());
    }
}
