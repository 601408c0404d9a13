//! Assembles [`PoolStatus`] from live system state for a persisted [`Pool`].
//! Every field is re-derived on each call; nothing here is cached, since the
//! whole point of a status query is to reflect what the host looks like
//! right now, not what the manifest last said.

use std::path::{Path, PathBuf};

use osutils::{block_devices, df, findmnt, nonraid, snapraid};
use pool_api::{
    config::{pool::DeviceRef, Pool, PoolType},
    derived::{DeviceStatus, MountStatus, ParityOperation, PoolStatus, PowerStatus},
};

use crate::collaborators::{DiskInventory, PowerState};

/// Builds the enriched status view for `pool`. `branch_root` is the
/// per-device branch path function used by MergerFS/NonRAID pools
/// (`/var/mergerfs/<name>/disk<slot>`); single-device and BTRFS pools probe
/// the pool's own mount point instead, since there's no per-device branch.
pub fn build_status(pool: &Pool, disks: &dyn DiskInventory) -> Result<PoolStatus, PoolError> {
    let mount_point = pool_api::constants::pool_mount_point(&pool.name);
    let pool_mounted = findmnt::is_mounted(&mount_point)?;

    let devices: Vec<DeviceStatus> = pool
        .data_devices
        .iter()
        .map(|d| device_status(&pool.name, d, disks, pool.pool_type))
        .collect();
    let parity_devices: Vec<DeviceStatus> = pool
        .parity_devices
        .iter()
        .map(|d| device_status(&pool.name, d, disks, pool.pool_type))
        .collect();

    let status = mount_status(pool.pool_type, pool_mounted, &devices);
    let storage = total_storage(&devices);
    let power_status = aggregate_power(&devices);
    let (parity_operation, parity_progress_percent, parity_speed, parity_valid) = parity_state(pool);

    Ok(PoolStatus {
        name: pool.name.clone(),
        pool_type: pool.pool_type,
        mount_point: pool_mounted.then_some(mount_point),
        status,
        devices,
        parity_devices,
        storage,
        power_status,
        parity_operation,
        parity_progress_percent,
        parity_speed,
        parity_valid,
    })
}

use pool_api::error::PoolError;

fn branch_mount_point(pool_name: &str, pool_type: PoolType, slot: &str) -> Option<PathBuf> {
    match pool_type {
        PoolType::Mergerfs | PoolType::Nonraid => {
            Some(PathBuf::from(pool_api::constants::mergerfs_branch_path(pool_name, slot)))
        }
        _ => None,
    }
}

fn device_status(
    pool_name: &str,
    device: &DeviceRef,
    disks: &dyn DiskInventory,
    pool_type: PoolType,
) -> DeviceStatus {
    let device_path = resolve_device_path(device);

    let power_status = device_path
        .as_deref()
        .and_then(|p| disks.live_power_status(&p.display().to_string()).ok())
        .map(power_status_from)
        .unwrap_or(PowerStatus::Unknown);
    let standby = power_status == PowerStatus::Standby;

    let disk_type = device_path.as_deref().and_then(|p| {
        disks
            .enhanced_disk_type(&p.display().to_string())
            .ok()
            .map(|t| describe_disk_type(t.rotational, t.usb))
    });

    // Probing size/usage would spin up a standby disk just to answer a
    // status query; skip it entirely when the disk isn't already active.
    let (size, used, available, usage_percent) = if standby {
        (None, None, None, None)
    } else {
        branch_mount_point(pool_name, pool_type, &device.slot)
            .filter(|branch| findmnt::is_mounted(branch).unwrap_or(false))
            .map(|branch| usage_for(&branch))
            .unwrap_or((None, None, None, None))
    };

    DeviceStatus {
        slot: device.slot.clone(),
        device_path: device_path.map(|p| p.display().to_string()),
        disk_type,
        disk_info: None,
        size,
        used,
        available,
        usage_percent,
        standby,
        temperature_celsius: None,
    }
}

fn resolve_device_path(device: &DeviceRef) -> Option<PathBuf> {
    match &device.id {
        sysdefs::osuuid::OsUuid::Uuid(uuid) => {
            block_devices::real_path_from_uuid(&uuid.hyphenated().to_string()).ok()
        }
        sysdefs::osuuid::OsUuid::Relaxed(id) => block_devices::real_path_from_id(id).ok(),
    }
}

fn power_status_from(state: PowerState) -> PowerStatus {
    match state {
        PowerState::Active => PowerStatus::Active,
        PowerState::Standby => PowerStatus::Standby,
        PowerState::Unknown => PowerStatus::Unknown,
    }
}

fn describe_disk_type(rotational: bool, usb: bool) -> String {
    match (rotational, usb) {
        (_, true) => "usb".to_string(),
        (true, false) => "hdd".to_string(),
        (false, false) => "ssd".to_string(),
    }
}

fn usage_for(mount_point: &Path) -> (Option<pool_api::primitives::bytes::ByteCount>, Option<pool_api::primitives::bytes::ByteCount>, Option<pool_api::primitives::bytes::ByteCount>, Option<u8>) {
    let used = df::used_bytes(mount_point).ok();
    let available = df::available_bytes(mount_point).ok();
    let usage_percent = match (used, available) {
        (Some(u), Some(a)) if u + a > 0 => Some(((u as f64 / (u + a) as f64) * 100.0).round() as u8),
        _ => None,
    };
    let size = match (used, available) {
        (Some(u), Some(a)) => Some((u + a).into()),
        _ => None,
    };
    (size, used.map(Into::into), available.map(Into::into), usage_percent)
}

fn total_storage(devices: &[DeviceStatus]) -> Option<pool_api::primitives::bytes::ByteCount> {
    let total: u64 = devices.iter().filter_map(|d| d.size).map(|s| s.bytes()).sum();
    (total > 0).then_some(total.into())
}

fn aggregate_power(devices: &[DeviceStatus]) -> PowerStatus {
    if devices.is_empty() {
        return PowerStatus::Unknown;
    }
    if devices.iter().all(|d| d.standby) {
        PowerStatus::Standby
    } else if devices.iter().any(|d| !d.standby) {
        PowerStatus::Active
    } else {
        PowerStatus::Unknown
    }
}

fn mount_status(pool_type: PoolType, pool_mounted: bool, devices: &[DeviceStatus]) -> MountStatus {
    if !pool_mounted {
        return MountStatus::Unmounted;
    }
    let missing = devices.iter().filter(|d| d.device_path.is_none()).count();
    if pool_type == PoolType::Nonraid && missing > 0 {
        MountStatus::Degraded
    } else {
        MountStatus::Mounted
    }
}

fn parity_state(pool: &Pool) -> (ParityOperation, Option<u8>, Option<String>, Option<bool>) {
    match pool.pool_type {
        PoolType::Nonraid => match nonraid::NmdStatus::read() {
            Ok(status) if status.is_running() => {
                let action = status.get("mdResyncAction").unwrap_or_default();
                let op = if action.starts_with("check") {
                    ParityOperation::Check
                } else {
                    ParityOperation::Sync
                };
                (op, Some(status.percent()), None, Some(status.parity_valid()))
            }
            Ok(status) => (ParityOperation::Idle, None, None, Some(status.parity_valid())),
            Err(_) => (ParityOperation::Idle, None, None, None),
        },
        PoolType::Mergerfs if pool.config.sync.enabled && !pool.parity_devices.is_empty() => {
            if !snapraid::is_running(&pool.name) {
                return (ParityOperation::Idle, None, None, None);
            }
            match snapraid::read_progress(&pool.name) {
                Ok(snapraid::ProgressStatus::Running { percent, speed, .. }) => {
                    (ParityOperation::Sync, Some(percent.round() as u8), Some(speed), None)
                }
                Ok(snapraid::ProgressStatus::Preparing) => (ParityOperation::Sync, Some(0), None, None),
                Err(_) => (ParityOperation::Idle, None, None, None),
            }
        }
        _ => (ParityOperation::Idle, None, None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::FakeDiskInventory;
    use pool_api::config::{options::PoolConfig, pool::PoolType as PT};

    fn empty_pool(pool_type: PT) -> Pool {
        Pool {
            id: "1".into(),
            name: "media".into(),
            index: 0,
            comment: String::new(),
            automount: true,
            pool_type,
            data_devices: vec![],
            parity_devices: vec![],
            config: PoolConfig::default(),
            devices: vec![],
        }
    }

    #[test]
    fn unmounted_pool_with_no_devices_reports_unknown_power() {
        let pool = empty_pool(PT::Xfs);
        let disks = FakeDiskInventory::default();
        let status = build_status(&pool, &disks).unwrap();
        assert_eq!(status.status, MountStatus::Unmounted);
        assert_eq!(status.power_status, PowerStatus::Unknown);
        assert!(status.mount_point.is_none());
    }

    #[test]
    fn idle_parity_state_for_mergerfs_without_snapraid() {
        let pool = empty_pool(PT::Mergerfs);
        assert_eq!(parity_state(&pool), (ParityOperation::Idle, None, None, None));
    }
}
