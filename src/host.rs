//! Production [`DiskInventory`] and [`ServiceDependencyProbe`] implementations,
//! wired into [`crate::manager::PoolManager`] by `main.rs`. Kept out of
//! `collaborators.rs` itself so that module stays a pure trait definition
//! plus its test fakes.

use std::path::PathBuf;

use osutils::{findmnt, lsblk, power};

use crate::collaborators::{DiskInventory, DiskSummary, EnhancedDiskType, PowerState, ServiceDependencyProbe};

pub struct HostDiskInventory;

impl DiskInventory for HostDiskInventory {
    fn all_disks(&self, skip_standby: bool) -> anyhow::Result<Vec<DiskSummary>> {
        let devices = lsblk::list()?;
        let mut summaries = Vec::new();
        for device in devices.into_iter().filter(|d| d.blkdev_type == lsblk::BlockDeviceType::Disk) {
            let device_path = format!("/dev/{}", device.name.trim_start_matches("/dev/"));
            if skip_standby && power::spin_state(&device_path).unwrap_or(power::SpinState::Unknown) == power::SpinState::Standby {
                continue;
            }
            summaries.push(DiskSummary {
                device: device_path,
                name: device.name.clone(),
                model: device.model.unwrap_or_default(),
                serial: device.serial.unwrap_or_default(),
            });
        }
        Ok(summaries)
    }

    fn enhanced_disk_type(&self, device: &str) -> anyhow::Result<EnhancedDiskType> {
        let _ = lsblk::get(device)?;
        // lsblk --output-all exposes ROTA/TRAN as raw JSON fields this crate
        // doesn't parse into BlockDevice; approximate from the device name
        // until that's worth adding.
        let name = device.trim_start_matches("/dev/");
        Ok(EnhancedDiskType {
            rotational: !name.starts_with("nvme"),
            removable: false,
            usb: name.starts_with("sd") && name.len() > 3,
        })
    }

    fn live_power_status(&self, device: &str) -> anyhow::Result<PowerState> {
        Ok(match power::spin_state(device)? {
            power::SpinState::Active => PowerState::Active,
            power::SpinState::Standby => PowerState::Standby,
            power::SpinState::Unknown => PowerState::Unknown,
        })
    }
}

/// Flags a path as dependent when it falls under one of the host's
/// well-known service mount roots. A real deployment's docker/libvirt/lxc
/// roots are configuration, not discovery — these are the conventional
/// unRAID-style defaults.
pub struct PathPrefixServiceProbe {
    pub docker_root: PathBuf,
    pub vm_root: PathBuf,
    pub lxc_root: PathBuf,
}

impl Default for PathPrefixServiceProbe {
    fn default() -> Self {
        Self {
            docker_root: PathBuf::from("/var/lib/docker"),
            vm_root: PathBuf::from("/etc/libvirt/qemu"),
            lxc_root: PathBuf::from("/var/lib/lxc"),
        }
    }
}

impl ServiceDependencyProbe for PathPrefixServiceProbe {
    fn docker_paths(&self) -> anyhow::Result<Vec<PathBuf>> {
        mounted_under(&self.docker_root)
    }

    fn vm_paths(&self) -> anyhow::Result<Vec<PathBuf>> {
        mounted_under(&self.vm_root)
    }

    fn lxc_paths(&self) -> anyhow::Result<Vec<PathBuf>> {
        mounted_under(&self.lxc_root)
    }
}

fn mounted_under(root: &std::path::Path) -> anyhow::Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    Ok(findmnt::sub_mounts(root)?.into_iter().map(PathBuf::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_probe_uses_conventional_roots() {
        let probe = PathPrefixServiceProbe::default();
        assert_eq!(probe.docker_root, PathBuf::from("/var/lib/docker"));
    }
}
