//! `executeSnapRAIDOperation`: launches the out-of-process SnapRAID helper
//! against a MergerFS pool's own config.

use std::path::PathBuf;

use osutils::snapraid;
use pool_api::{
    config::{pool::Pool, pool::PoolType},
    error::{PoolError, PoolResultExt, ValidationError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapraidOperation {
    Sync,
    Scrub,
    Check,
    Fix,
    ForceStop,
}

impl SnapraidOperation {
    fn as_str(self) -> &'static str {
        match self {
            SnapraidOperation::Sync => "sync",
            SnapraidOperation::Scrub => "scrub",
            SnapraidOperation::Check => "check",
            SnapraidOperation::Fix => "fix",
            SnapraidOperation::ForceStop => "force_stop",
        }
    }
}

/// `fix` accepts mount-point paths rather than raw `dN` identifiers, so
/// callers never have to know a branch's position in the config; the other
/// operations run against every branch when none are named.
pub fn execute(pool: &Pool, operation: SnapraidOperation, fix_mount_points: &[PathBuf]) -> Result<(), PoolError> {
    if pool.pool_type != PoolType::Mergerfs || !pool.config.sync.enabled || pool.parity_devices.is_empty() {
        return Err(PoolError::new(ValidationError::Other(format!(
            "pool '{}' has no SnapRAID parity configured",
            pool.name
        ))));
    }
    if operation == SnapraidOperation::Fix && fix_mount_points.is_empty() {
        return Err(PoolError::new(ValidationError::Other("fix requires at least one target branch".into())));
    }
    if operation != SnapraidOperation::ForceStop && snapraid::is_running(&pool.name) {
        return Err(PoolError::new(pool_api::error::PreconditionError::AlreadyMounted { name: pool.name.clone() }))
            .message(format!("a SnapRAID operation is already running for pool '{}'", pool.name));
    }

    let branch_identifiers: Vec<String> = fix_mount_points
        .iter()
        .map(|mount_point| snapraid::branch_identifier_for_mount(&pool.name, mount_point.as_path()))
        .collect::<Result<Vec<String>, PoolError>>()?;

    snapraid::launch(&pool.name, operation.as_str(), &branch_identifiers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_api::config::{
        options::{PoolConfig, SnapraidSchedule},
        pool::{DeviceRef, PoolType},
    };
    use sysdefs::{filesystems::Filesystem, osuuid::OsUuid};

    fn mergerfs_pool_with_parity() -> Pool {
        Pool {
            id: "1".into(),
            name: "media".into(),
            index: 0,
            comment: String::new(),
            automount: true,
            pool_type: PoolType::Mergerfs,
            data_devices: vec![],
            parity_devices: vec![DeviceRef {
                slot: "1".into(),
                id: OsUuid::from("AAAA-AAAA"),
                filesystem: Filesystem::Ext4,
                spindown: None,
            }],
            config: PoolConfig {
                sync: SnapraidSchedule { enabled: true, ..Default::default() },
                ..Default::default()
            },
            devices: vec![],
        }
    }

    #[test]
    fn fix_without_branches_is_refused() {
        let pool = mergerfs_pool_with_parity();
        let err = execute(&pool, SnapraidOperation::Fix, &[]).unwrap_err();
        assert!(matches!(err.kind(), pool_api::error::ErrorKind::Validation(_)));
    }

    #[test]
    fn pool_without_parity_configured_is_refused() {
        let mut pool = mergerfs_pool_with_parity();
        pool.config.sync.enabled = false;
        let err = execute(&pool, SnapraidOperation::Sync, &[]).unwrap_err();
        assert!(matches!(err.kind(), pool_api::error::ErrorKind::Validation(_)));
    }
}
