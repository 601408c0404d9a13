use std::path::{Path, PathBuf};

use osutils::{block_devices, encryption};
use pool_api::{constants, error::PoolError};

use super::{DeviceStrategy, PreparedDevice};

/// Operational path is the mapper device opened from the physical
/// partition; UUID is read off the mapper, not the underlying partition.
pub struct LuksStrategy {
    passphrase: Option<String>,
}

impl LuksStrategy {
    pub fn new(passphrase: Option<String>) -> Self {
        Self { passphrase }
    }
}

impl DeviceStrategy for LuksStrategy {
    fn prepare_devices(
        &self,
        pool_name: &str,
        devices: &[(String, PathBuf)],
        is_parity: bool,
    ) -> Result<Vec<PreparedDevice>, PoolError> {
        let passphrase = self.passphrase.as_deref().unwrap_or("");

        let mut prepared = Vec::with_capacity(devices.len());
        for (slot, path) in devices {
            let partition = block_devices::ensure_partition(path)?;
            let mapper_name = if is_parity {
                constants::parity_mapper_name(pool_name, slot)
            } else {
                constants::data_mapper_name(pool_name, slot)
            };

            if let Err(e) = encryption_luks_format_if_needed(&partition, passphrase) {
                return Err(e);
            }
            let mapper_path = encryption::luks_open(&partition, &mapper_name, passphrase)?;

            prepared.push(PreparedDevice {
                slot: slot.clone(),
                physical: partition,
                operational: mapper_path,
            });
        }
        Ok(prepared)
    }

    fn operational_device_path(&self, physical: &Path) -> Result<PathBuf, PoolError> {
        // Only meaningful once the mapper has been opened; engines should
        // use the `PreparedDevice::operational` path from `prepare_devices`
        // instead of calling this for encrypted pools.
        Ok(physical.to_path_buf())
    }

    fn physical_device_path(&self, operational: &Path) -> Result<PathBuf, PoolError> {
        Ok(operational.to_path_buf())
    }

    fn device_uuid(&self, prepared: &PreparedDevice) -> Result<String, PoolError> {
        block_devices::device_uuid(&prepared.operational)
    }

    fn cleanup(&self, pool_name: &str, prepared: &[PreparedDevice]) -> Result<(), PoolError> {
        for device in prepared {
            let mapper_name = device
                .operational
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            encryption::luks_close(mapper_name)?;
        }
        let _ = pool_name;
        Ok(())
    }
}

/// `luksFormat` is only valid against a partition that isn't already a LUKS
/// volume; preparing a pool that's being re-mounted (not created) must skip
/// straight to `luksOpen`. `cryptsetup isLuks` makes that decision cheaply.
fn encryption_luks_format_if_needed(partition: &Path, passphrase: &str) -> Result<(), PoolError> {
    use osutils::dependencies::Dependency;
    let already_luks = Dependency::Cryptsetup
        .cmd()
        .arg("isLuks")
        .arg(partition)
        .output()
        .map(|o| o.success())
        .unwrap_or(false);
    if already_luks {
        return Ok(());
    }
    encryption::luks_format(partition, passphrase)
}
