//! One module per pool type, each implementing the same envelope: validate,
//! prepare devices through a [`crate::strategy::DeviceStrategy`], format,
//! mount and persist, and unwind the strategy's preparation on any failure
//! after it succeeded.

pub mod btrfs;
pub mod mergerfs;
pub mod nonraid;
pub mod single;

use std::path::PathBuf;

use osutils::mount;
use pool_api::error::PoolError;

use crate::config::RuntimeConfig;

/// A fresh pool id: milliseconds since the epoch, matching the manifest's
/// existing id convention. Collisions are not a practical concern since
/// pool creation is serialized behind the manifest-wide lock.
pub(crate) fn new_pool_id() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}

/// Mounts a formatted device at the pool's mount point, creating the
/// directory with the configured ownership. Shared by every engine whose
/// pool root is a direct device mount rather than a union/array mount.
pub(crate) fn mount_pool_root(
    device: &std::path::Path,
    pool_name: &str,
    runtime: &RuntimeConfig,
) -> Result<PathBuf, PoolError> {
    let mount_point = runtime.mount_root.join(pool_name);
    mount::mount_device(device, &mount_point, runtime.owner_uid, runtime.owner_gid)?;
    Ok(mount_point)
}
