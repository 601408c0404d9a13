use pool_api::error::PoolError;

use crate::dependencies::Dependency;

pub fn settle() -> Result<(), PoolError> {
    Dependency::Udevadm.cmd().arg("settle").run_and_check()
}

pub fn trigger() -> Result<(), PoolError> {
    Dependency::Udevadm.cmd().arg("trigger").run_and_check()
}
