use std::path::Path;

use pool_api::error::PoolError;

use crate::findmnt;

pub fn check_is_mountpoint(path: impl AsRef<Path>) -> Result<bool, PoolError> {
    findmnt::is_mounted(path)
}
