mod luks;
mod plain;

pub use luks::LuksStrategy;
pub use plain::PlainStrategy;

use std::path::{Path, PathBuf};

use pool_api::error::PoolError;

/// One data or parity device as prepared by a [`DeviceStrategy`]: the
/// physical partition it was created from, and the path engines should
/// actually format/mount (identical to `physical` for [`PlainStrategy`],
/// a mapper device for [`LuksStrategy`]).
#[derive(Debug, Clone)]
pub struct PreparedDevice {
    pub slot: String,
    pub physical: PathBuf,
    pub operational: PathBuf,
}

/// Polymorphism over how a pool's devices are prepared, addressed, and torn
/// down: plain partitions, or LUKS2-mapped partitions. Selected via
/// [`strategy_for`] from `pool.config.encrypted`; every engine routes device
/// preparation and teardown through this trait instead of branching on
/// encryption itself.
pub trait DeviceStrategy {
    /// Partitions (if needed) and, for encrypted pools, LUKS-formats and
    /// opens every device, returning the operational path engines format
    /// and mount.
    fn prepare_devices(
        &self,
        pool_name: &str,
        devices: &[(String, PathBuf)],
        is_parity: bool,
    ) -> Result<Vec<PreparedDevice>, PoolError>;

    fn operational_device_path(&self, physical: &Path) -> Result<PathBuf, PoolError>;
    fn physical_device_path(&self, operational: &Path) -> Result<PathBuf, PoolError>;
    fn device_uuid(&self, prepared: &PreparedDevice) -> Result<String, PoolError>;

    /// Closes whatever this strategy opened for `prepared`. Called by every
    /// engine on any error after `prepare_devices` returns, and again during
    /// a normal unmount. A no-op for [`PlainStrategy`].
    fn cleanup(&self, pool_name: &str, prepared: &[PreparedDevice]) -> Result<(), PoolError>;
}

pub fn strategy_for(encrypted: bool, passphrase: Option<String>) -> Box<dyn DeviceStrategy> {
    if encrypted {
        Box::new(LuksStrategy::new(passphrase))
    } else {
        Box::new(PlainStrategy)
    }
}
