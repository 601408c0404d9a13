use std::path::{Path, PathBuf};

use osutils::block_devices;
use pool_api::error::PoolError;

use super::{DeviceStrategy, PreparedDevice};

/// Operational path equals physical path; UUID is read straight off the
/// partition.
pub struct PlainStrategy;

impl DeviceStrategy for PlainStrategy {
    fn prepare_devices(
        &self,
        _pool_name: &str,
        devices: &[(String, PathBuf)],
        _is_parity: bool,
    ) -> Result<Vec<PreparedDevice>, PoolError> {
        devices
            .iter()
            .map(|(slot, path)| {
                let partition = block_devices::ensure_partition(path)?;
                Ok(PreparedDevice {
                    slot: slot.clone(),
                    physical: partition.clone(),
                    operational: partition,
                })
            })
            .collect()
    }

    fn operational_device_path(&self, physical: &Path) -> Result<PathBuf, PoolError> {
        Ok(physical.to_path_buf())
    }

    fn physical_device_path(&self, operational: &Path) -> Result<PathBuf, PoolError> {
        Ok(operational.to_path_buf())
    }

    fn device_uuid(&self, prepared: &PreparedDevice) -> Result<String, PoolError> {
        block_devices::device_uuid(&prepared.operational)
    }

    fn cleanup(&self, _pool_name: &str, _prepared: &[PreparedDevice]) -> Result<(), PoolError> {
        Ok(())
    }
}
