use std::path::Path;

use pool_api::error::PoolError;
use sysdefs::filesystems::Filesystem;

use crate::dependencies::Dependency;

/// Formats a single device. BTRFS multi-device pools go through
/// [`crate::btrfs::make_filesystem`] instead, since `mkfs.btrfs` takes every
/// member device on one command line.
pub fn run(device_path: impl AsRef<Path>, filesystem: Filesystem) -> Result<(), PoolError> {
    dependency_for(filesystem)
        .cmd()
        .arg(device_path.as_ref())
        .run_and_check()
}

fn dependency_for(filesystem: Filesystem) -> Dependency {
    match filesystem {
        Filesystem::Ext4 => Dependency::MkfsExt4,
        Filesystem::Xfs => Dependency::MkfsXfs,
        Filesystem::Btrfs => Dependency::MkfsBtrfs,
    }
}
