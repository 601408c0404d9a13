//! Multi-device BTRFS pools: `mkfs.btrfs` is handed every member device at
//! once, so this engine prepares all of them up front instead of one at a
//! time like the single-device engine.

use std::path::PathBuf;

use osutils::{btrfs, df};
use pool_api::{
    config::{
        options::{PoolConfig, RaidLevel},
        pool::{DeviceRef, Pool, PoolType},
        Manifest,
    },
    error::{PoolError, PoolResultExt, PreconditionError},
};
use sysdefs::{filesystems::Filesystem, osuuid::OsUuid};

use crate::{
    config::RuntimeConfig,
    engines::{mount_pool_root, new_pool_id},
    strategy::{self, DeviceStrategy, PreparedDevice},
    validate,
};

pub struct CreateRequest {
    pub name: String,
    pub devices: Vec<PathBuf>,
    pub raid_level: RaidLevel,
    pub encrypted: bool,
    pub passphrase: Option<String>,
    pub create_keyfile: bool,
    pub automount: bool,
    pub comment: String,
}

pub fn create(req: &CreateRequest, manifest: &Manifest, runtime: &RuntimeConfig) -> Result<Pool, PoolError> {
    validate::pool_name(&req.name)?;
    validate::name_available(manifest, &req.name)?;
    validate::minimum_devices(
        PoolType::Btrfs,
        req.raid_level.btrfs_profile_name(),
        req.raid_level.minimum_devices(),
        req.devices.len(),
    )?;
    validate::passphrase_present(req.encrypted, req.passphrase.as_deref(), req.create_keyfile)?;
    if req.encrypted {
        osutils::encryption::cleanup_existing_luks_mappers(&req.name)?;
    }

    let slots: Vec<(String, PathBuf)> = req
        .devices
        .iter()
        .enumerate()
        .map(|(i, path)| ((i + 1).to_string(), path.clone()))
        .collect();

    let strategy = strategy::strategy_for(req.encrypted, req.passphrase.clone());
    let prepared = strategy.prepare_devices(&req.name, &slots, false)?;

    let operational: Vec<PathBuf> = prepared.iter().map(|d| d.operational.clone()).collect();
    if let Err(e) = btrfs::make_filesystem(&req.name, req.raid_level.btrfs_profile_name(), &operational) {
        let _ = strategy.cleanup(&req.name, &prepared);
        return Err(e);
    }

    if let Err(e) = mount_pool_root(&prepared[0].operational, &req.name, runtime) {
        let _ = strategy.cleanup(&req.name, &prepared);
        return Err(e);
    }

    let data_devices = device_refs(&*strategy, &prepared)?;

    Ok(Pool {
        id: new_pool_id(),
        name: req.name.clone(),
        index: manifest.pools.len() as u32,
        comment: req.comment.clone(),
        automount: req.automount,
        pool_type: PoolType::Btrfs,
        data_devices,
        parity_devices: vec![],
        config: PoolConfig {
            encrypted: req.encrypted,
            create_keyfile: req.create_keyfile,
            raid_level: Some(req.raid_level),
            ..Default::default()
        },
        devices: if req.encrypted {
            prepared.iter().map(|d| d.physical.display().to_string()).collect()
        } else {
            vec![]
        },
    })
}

fn device_refs(strategy: &dyn DeviceStrategy, prepared: &[PreparedDevice]) -> Result<Vec<DeviceRef>, PoolError> {
    prepared
        .iter()
        .map(|d| {
            Ok(DeviceRef {
                slot: d.slot.clone(),
                id: OsUuid::from(strategy.device_uuid(d)?),
                filesystem: Filesystem::Btrfs,
                spindown: None,
            })
        })
        .collect()
}

pub fn mount(pool: &Pool, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);
    let first = pool.data_devices.first().ok_or_else(|| {
        PoolError::new(pool_api::error::ValidationError::Other(format!("pool '{}' has no devices", pool.name)))
    })?;

    let operational = if pool.is_encrypted() {
        let physical = PathBuf::from(pool.devices.first().cloned().unwrap_or_default());
        let prepared = strategy.prepare_devices(&pool.name, std::slice::from_ref(&(first.slot.clone(), physical)), false)?;
        prepared.into_iter().next().expect("one device").operational
    } else {
        let physical = osutils::block_devices::real_path_from_uuid(&first.id.to_string())?;
        strategy.operational_device_path(&physical)?
    };

    mount_pool_root(&operational, &pool.name, runtime)?;
    Ok(())
}

pub fn unmount(pool: &Pool, force: bool, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let mount_point = runtime.mount_root.join(&pool.name);
    osutils::mount::unmount_device(&mount_point, force, true, runtime.retry_attempts)?;
    if pool.is_encrypted() {
        let strategy = strategy::strategy_for(true, None);
        let prepared: Vec<PreparedDevice> = pool
            .data_devices
            .iter()
            .map(|d| PreparedDevice {
                slot: d.slot.clone(),
                physical: PathBuf::new(),
                operational: PathBuf::from(format!(
                    "/dev/mapper/{}",
                    pool_api::constants::data_mapper_name(&pool.name, &d.slot)
                )),
            })
            .collect();
        strategy.cleanup(&pool.name, &prepared)?;
    }
    Ok(())
}

/// Adds `device` as a new BTRFS member. The pool must already be mounted;
/// `btrfs device add` operates on the live mount point, not the device.
pub fn add_device(pool: &mut Pool, device: PathBuf, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let mount_point = runtime.mount_root.join(&pool.name);
    let slot = (pool.next_free_data_slot()).to_string();

    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);
    let prepared = strategy.prepare_devices(&pool.name, std::slice::from_ref(&(slot.clone(), device)), false)?;
    let device = prepared.into_iter().next().expect("one device");

    if let Err(e) = btrfs::device_add(&mount_point, &device.operational) {
        let _ = strategy.cleanup(&pool.name, std::slice::from_ref(&device));
        return Err(e);
    }

    pool.data_devices.push(DeviceRef {
        slot,
        id: OsUuid::from(strategy.device_uuid(&device)?),
        filesystem: Filesystem::Btrfs,
        spindown: None,
    });
    if pool.is_encrypted() {
        pool.devices.push(device.physical.display().to_string());
    }
    Ok(())
}

/// Removes a device from a live BTRFS pool, rebalancing its extents onto the
/// remaining members first (that's what `btrfs device remove` itself does).
pub fn remove_device(pool: &mut Pool, slot: &str, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let mount_point = runtime.mount_root.join(&pool.name);
    let device = pool
        .data_device_slot(slot)
        .ok_or_else(|| PoolError::new(PreconditionError::NotMounted { name: pool.name.clone() }))?;
    let path = osutils::block_devices::real_path_from_uuid(&device.id.to_string())?;

    btrfs::device_remove(&mount_point, &path).message(format!("while removing slot '{slot}' from pool '{}'", pool.name))?;

    if pool.is_encrypted() {
        let strategy = strategy::strategy_for(true, None);
        let mapper_name = pool_api::constants::data_mapper_name(&pool.name, slot);
        osutils::encryption::luks_close(&mapper_name)?;
        let _ = strategy;
    }

    pool.data_devices.retain(|d| d.slot != slot);
    Ok(())
}

/// Replaces the device at `slot` via `btrfs replace`, blocking until the
/// copy finishes.
pub fn replace_device(pool: &mut Pool, slot: &str, new_device: PathBuf, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let mount_point = runtime.mount_root.join(&pool.name);
    let old = pool
        .data_device_slot(slot)
        .ok_or_else(|| PoolError::new(PreconditionError::NotMounted { name: pool.name.clone() }))?
        .clone();

    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);
    let prepared = strategy.prepare_devices(&pool.name, std::slice::from_ref(&(slot.to_string(), new_device)), false)?;
    let new_device = prepared.into_iter().next().expect("one device");

    btrfs::device_replace(&mount_point, &old.id.to_string(), &new_device.operational)
        .message(format!("while replacing slot '{slot}' in pool '{}'", pool.name))?;

    let new_uuid = strategy.device_uuid(&new_device)?;
    if let Some(d) = pool.data_devices.iter_mut().find(|d| d.slot == slot) {
        d.id = OsUuid::from(new_uuid);
    }
    if pool.is_encrypted() {
        if let Some(i) = pool.data_devices.iter().position(|d| d.slot == slot) {
            if let Some(slot_path) = pool.devices.get_mut(i) {
                *slot_path = new_device.physical.display().to_string();
            }
        }
    }
    Ok(())
}

/// `changePoolRaidLevel`: refuses when less than 50% of the pool is free,
/// since a raid0-to-raid1 convert needs room to duplicate every extent.
pub fn change_raid_level(pool: &mut Pool, new_level: RaidLevel, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let mount_point = runtime.mount_root.join(&pool.name);
    validate::minimum_devices(
        PoolType::Btrfs,
        new_level.btrfs_profile_name(),
        new_level.minimum_devices(),
        pool.data_devices.len(),
    )?;

    if pool.config.raid_level == Some(RaidLevel::Raid0) && new_level == RaidLevel::Raid1 {
        let used = df::used_bytes(&mount_point)?;
        let available = df::available_bytes(&mount_point)?;
        let total = used + available;
        let available_pct = if total == 0 { 0 } else { ((available as f64 / total as f64) * 100.0).round() as u8 };
        if available_pct < 50 {
            return Err(PoolError::new(PreconditionError::InsufficientFreeSpaceForConvert { available_pct }));
        }
    }

    btrfs::balance_convert(&mount_point, new_level.btrfs_profile_name())?;
    pool.config.raid_level = Some(new_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_raid10_with_too_few_devices() {
        let req = CreateRequest {
            name: "media".into(),
            devices: vec![PathBuf::from("/dev/sdb"), PathBuf::from("/dev/sdc")],
            raid_level: RaidLevel::Raid10,
            encrypted: false,
            passphrase: None,
            create_keyfile: false,
            automount: true,
            comment: String::new(),
        };
        let manifest = Manifest { version: 1, pools: vec![] };
        let runtime = RuntimeConfig::default();
        let err = create(&req, &manifest, &runtime).unwrap_err();
        assert!(matches!(err.kind(), pool_api::error::ErrorKind::Validation(_)));
    }
}
