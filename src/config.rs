use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Runtime configuration for a [`crate::manager::PoolManager`]. Loaded from
/// `/etc/poolmgr/config.toml` when present, defaulted otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RuntimeConfig {
    pub manifest_path: PathBuf,
    pub mount_root: PathBuf,
    pub luks_keyfile_dir: PathBuf,
    pub snapraid_config_dir: PathBuf,
    pub owner_uid: u32,
    pub owner_gid: u32,
    pub df_timeout_secs: u64,
    pub retry_interval_secs: u64,
    pub retry_attempts: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from(pool_api::constants::MANIFEST_PATH),
            mount_root: PathBuf::from("/mnt"),
            luks_keyfile_dir: PathBuf::from("/boot/config/system/luks"),
            snapraid_config_dir: PathBuf::from("/boot/config/snapraid"),
            owner_uid: pool_api::constants::DEFAULT_OWNER_UID,
            owner_gid: pool_api::constants::DEFAULT_OWNER_GID,
            df_timeout_secs: 5,
            retry_interval_secs: 2,
            retry_attempts: 10,
        }
    }
}

impl RuntimeConfig {
    pub const DEFAULT_CONFIG_PATH: &'static str = "/etc/poolmgr/config.toml";

    /// Reads `/etc/poolmgr/config.toml` if it exists; falls back to defaults
    /// otherwise. A present-but-unparseable file is an error: a malformed
    /// config should never be silently ignored in favor of defaults.
    pub fn from_file_or_default(path: impl Into<Option<PathBuf>>) -> anyhow::Result<Self> {
        let path = path.into().unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_PATH));
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read '{}': {e}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse '{}': {e}", path.display()))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn df_timeout(&self) -> Duration {
        Duration::from_secs(self.df_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = RuntimeConfig::default();
        assert_eq!(config.owner_uid, 500);
        assert_eq!(config.mount_root, PathBuf::from("/mnt"));
    }

    #[test]
    fn missing_config_file_falls_back_to_default() {
        let config = RuntimeConfig::from_file_or_default(Some(PathBuf::from(
            "/nonexistent/poolmgr/config.toml",
        )))
        .unwrap();
        assert_eq!(config.owner_gid, 500);
    }
}
