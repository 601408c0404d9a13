//! MergerFS union pools: each data device is formatted and mounted on its
//! own branch, then unioned at the pool's mount point. Parity devices, when
//! present, are mounted separately and never join the union; SnapRAID reads
//! the branches and parity mounts directly from their own paths.

use std::path::PathBuf;

use osutils::{mergerfs, mkfs, snapraid};
use pool_api::{
    config::{
        options::PoolConfig,
        pool::{DeviceRef, Pool, PoolType},
        Manifest,
    },
    error::{PoolError, PoolResultExt, PreconditionError},
};
use sysdefs::{filesystems::Filesystem, osuuid::OsUuid};

use crate::{
    config::RuntimeConfig,
    engines::new_pool_id,
    strategy::{self, DeviceStrategy, PreparedDevice},
    validate,
};

pub struct CreateRequest {
    pub name: String,
    pub devices: Vec<PathBuf>,
    pub filesystem: Filesystem,
    pub parity_devices: Vec<PathBuf>,
    pub create_policy: String,
    pub search_policy: String,
    pub encrypted: bool,
    pub passphrase: Option<String>,
    pub create_keyfile: bool,
    pub automount: bool,
    pub comment: String,
}

pub fn create(req: &CreateRequest, manifest: &Manifest, runtime: &RuntimeConfig) -> Result<Pool, PoolError> {
    validate::pool_name(&req.name)?;
    validate::name_available(manifest, &req.name)?;
    validate::minimum_devices(PoolType::Mergerfs, "mergerfs", 1, req.devices.len())?;
    validate::passphrase_present(req.encrypted, req.passphrase.as_deref(), req.create_keyfile)?;
    if req.encrypted {
        osutils::encryption::cleanup_existing_luks_mappers(&req.name)?;
    }

    let strategy = strategy::strategy_for(req.encrypted, req.passphrase.clone());

    let data_slots: Vec<(String, PathBuf)> = req
        .devices
        .iter()
        .enumerate()
        .map(|(i, p)| ((i + 1).to_string(), p.clone()))
        .collect();
    let prepared = strategy.prepare_devices(&req.name, &data_slots, false)?;

    if let Err(e) = format_and_mount_branches(&req.name, &prepared, req.filesystem, runtime) {
        let _ = strategy.cleanup(&req.name, &prepared);
        return Err(e);
    }

    let branches: Vec<PathBuf> = prepared.iter().map(|d| mergerfs::branch_path(&req.name, &d.slot)).collect();
    let options = mergerfs::build_options(&req.create_policy, &req.search_policy);
    let mount_point = runtime.mount_root.join(&req.name);
    if let Err(e) = mergerfs::mount_union(&branches, &mount_point, &options) {
        let _ = strategy.cleanup(&req.name, &prepared);
        return Err(e);
    }

    let mut parity_prepared = Vec::new();
    if !req.parity_devices.is_empty() {
        let parity_slots: Vec<(String, PathBuf)> = req
            .parity_devices
            .iter()
            .enumerate()
            .map(|(i, p)| ((i + 1).to_string(), p.clone()))
            .collect();
        parity_prepared = strategy.prepare_devices(&req.name, &parity_slots, true)?;
        for device in &parity_prepared {
            mkfs::run(&device.operational, Filesystem::Ext4)?;
            let mount_point = PathBuf::from(pool_api::constants::snapraid_parity_mount_point(&req.name, &device.slot));
            osutils::mount::mount_device(&device.operational, &mount_point, runtime.owner_uid, runtime.owner_gid)?;
        }
        write_snapraid_config(&req.name, &prepared, &parity_prepared)?;
    }

    let data_devices = device_refs(&*strategy, &prepared, req.filesystem)?;
    let parity_devices = device_refs(&*strategy, &parity_prepared, Filesystem::Ext4)?;

    Ok(Pool {
        id: new_pool_id(),
        name: req.name.clone(),
        index: manifest.pools.len() as u32,
        comment: req.comment.clone(),
        automount: req.automount,
        pool_type: PoolType::Mergerfs,
        data_devices,
        parity_devices,
        config: PoolConfig {
            encrypted: req.encrypted,
            create_keyfile: req.create_keyfile,
            policies: pool_api::config::options::MergerfsPolicies {
                create: Some(req.create_policy.clone()),
                search: Some(req.search_policy.clone()),
                ..Default::default()
            },
            sync: pool_api::config::options::SnapraidSchedule {
                enabled: !req.parity_devices.is_empty(),
                ..Default::default()
            },
            ..Default::default()
        },
        devices: if req.encrypted {
            prepared.iter().chain(parity_prepared.iter()).map(|d| d.physical.display().to_string()).collect()
        } else {
            vec![]
        },
    })
}

fn format_and_mount_branches(
    pool_name: &str,
    prepared: &[PreparedDevice],
    filesystem: Filesystem,
    runtime: &RuntimeConfig,
) -> Result<(), PoolError> {
    for device in prepared {
        mkfs::run(&device.operational, filesystem).message(format!("while formatting branch for slot '{}'", device.slot))?;
        let branch = mergerfs::branch_path(pool_name, &device.slot);
        osutils::mount::mount_device(&device.operational, &branch, runtime.owner_uid, runtime.owner_gid)?;
    }
    Ok(())
}

fn device_refs(strategy: &dyn DeviceStrategy, prepared: &[PreparedDevice], filesystem: Filesystem) -> Result<Vec<DeviceRef>, PoolError> {
    prepared
        .iter()
        .map(|d| {
            Ok(DeviceRef {
                slot: d.slot.clone(),
                id: OsUuid::from(strategy.device_uuid(d)?),
                filesystem,
                spindown: None,
            })
        })
        .collect()
}

fn write_snapraid_config(pool_name: &str, data: &[PreparedDevice], parity: &[PreparedDevice]) -> Result<(), PoolError> {
    let branches: Vec<snapraid::DataBranch> = data
        .iter()
        .enumerate()
        .map(|(i, d)| snapraid::DataBranch {
            identifier: format!("d{}", i + 1),
            path: mergerfs::branch_path(pool_name, &d.slot),
        })
        .collect();
    let parity_slots: Vec<String> = parity.iter().map(|d| d.slot.clone()).collect();
    let contents = snapraid::render_config(pool_name, &branches, &parity_slots);
    snapraid::write_config(pool_name, &contents)
}

/// Remounts every branch and the union on top, and the parity mounts if
/// any. Device preparation (LUKS reopen) goes through `pool.devices`, the
/// same physical-path record the BTRFS and single-device engines use.
pub fn mount(pool: &Pool, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);

    for (i, device) in pool.data_devices.iter().enumerate() {
        let operational = resolve_operational(pool, &*strategy, device, i)?;
        let branch = mergerfs::branch_path(&pool.name, &device.slot);
        osutils::mount::mount_device(&operational, &branch, runtime.owner_uid, runtime.owner_gid)?;
    }

    let branches: Vec<PathBuf> = pool.data_devices.iter().map(|d| mergerfs::branch_path(&pool.name, &d.slot)).collect();
    let create_policy = pool.config.policies.create.as_deref().unwrap_or("mfs");
    let search_policy = pool.config.policies.search.as_deref().unwrap_or("ff");
    let options = mergerfs::build_options(create_policy, search_policy);
    let mount_point = runtime.mount_root.join(&pool.name);
    mergerfs::mount_union(&branches, &mount_point, &options)?;

    let offset = pool.data_devices.len();
    for (i, device) in pool.parity_devices.iter().enumerate() {
        let operational = resolve_operational(pool, &*strategy, device, offset + i)?;
        let mount_point = PathBuf::from(pool_api::constants::snapraid_parity_mount_point(&pool.name, &device.slot));
        osutils::mount::mount_device(&operational, &mount_point, runtime.owner_uid, runtime.owner_gid)?;
    }
    Ok(())
}

fn resolve_operational(pool: &Pool, strategy: &dyn DeviceStrategy, device: &DeviceRef, physical_index: usize) -> Result<PathBuf, PoolError> {
    if pool.is_encrypted() {
        let physical = PathBuf::from(pool.devices.get(physical_index).cloned().unwrap_or_default());
        let prepared = strategy.prepare_devices(&pool.name, std::slice::from_ref(&(device.slot.clone(), physical)), false)?;
        Ok(prepared.into_iter().next().expect("one device").operational)
    } else {
        let physical = osutils::block_devices::real_path_from_uuid(&device.id.to_string())?;
        strategy.operational_device_path(&physical)
    }
}

/// Allows a degraded-capable union to keep serving the branches that are
/// present; a missing branch is excluded from the union list rather than
/// failing the whole mount, matching `findmnt`'s own tolerance for gaps
/// once `force` has been granted by the caller.
pub fn unmount(pool: &Pool, force: bool, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let mount_point = runtime.mount_root.join(&pool.name);
    mergerfs::unmount_union(&mount_point)?;

    for device in &pool.data_devices {
        let branch = mergerfs::branch_path(&pool.name, &device.slot);
        osutils::mount::unmount_device(&branch, force, true, runtime.retry_attempts)?;
    }
    for device in &pool.parity_devices {
        let mount_point = PathBuf::from(pool_api::constants::snapraid_parity_mount_point(&pool.name, &device.slot));
        osutils::mount::unmount_device(&mount_point, force, true, runtime.retry_attempts)?;
    }

    if pool.is_encrypted() {
        let strategy = strategy::strategy_for(true, None);
        let prepared: Vec<PreparedDevice> = pool
            .data_devices
            .iter()
            .chain(pool.parity_devices.iter())
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

/// Adds a new data branch to a live union: formats, mounts, adds it to the
/// mergerfs branch list (remounting the union with the new branch string),
/// and regenerates the SnapRAID config if parity is in use.
pub fn add_data_device(pool: &mut Pool, device: PathBuf, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let slot = pool.next_free_data_slot().to_string();
    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);
    let prepared = strategy.prepare_devices(&pool.name, std::slice::from_ref(&(slot.clone(), device)), false)?;
    let device = prepared.into_iter().next().expect("one device");

    let filesystem = pool.data_devices.first().map(|d| d.filesystem).unwrap_or(Filesystem::Ext4);
    if let Err(e) = mkfs::run(&device.operational, filesystem) {
        let _ = strategy.cleanup(&pool.name, std::slice::from_ref(&device));
        return Err(e);
    }
    let branch = mergerfs::branch_path(&pool.name, &slot);
    osutils::mount::mount_device(&device.operational, &branch, runtime.owner_uid, runtime.owner_gid)?;

    pool.data_devices.push(DeviceRef {
        slot: slot.clone(),
        id: OsUuid::from(strategy.device_uuid(&device)?),
        filesystem,
        spindown: None,
    });
    if pool.is_encrypted() {
        pool.devices.push(device.physical.display().to_string());
    }

    if pool.config.sync.enabled {
        regenerate_snapraid_config(pool)?;
    }
    Ok(())
}

/// Removes a data branch. The caller's safety guard has already confirmed
/// nothing is still reading through the branch or the union above it.
pub fn remove_data_device(pool: &mut Pool, slot: &str, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    pool.data_device_slot(slot)
        .ok_or_else(|| PoolError::new(PreconditionError::NotMounted { name: pool.name.clone() }))?;

    let branch = mergerfs::branch_path(&pool.name, slot);
    osutils::mount::unmount_device(&branch, false, true, runtime.retry_attempts)?;

    if pool.is_encrypted() {
        osutils::encryption::luks_close(&pool_api::constants::data_mapper_name(&pool.name, slot))?;
    }

    pool.data_devices.retain(|d| d.slot != slot);
    if pool.config.sync.enabled {
        regenerate_snapraid_config(pool)?;
    }
    Ok(())
}

/// Largest data device, measured at the physical partition for encrypted
/// pools (the mapper device reports the same size minus LUKS2 overhead, but
/// the spec compares against the partition itself).
fn largest_data_device_bytes(pool: &Pool) -> Result<u64, PoolError> {
    let mut largest = 0u64;
    for (i, device) in pool.data_devices.iter().enumerate() {
        let path = if pool.is_encrypted() {
            PathBuf::from(pool.devices.get(i).cloned().unwrap_or_default())
        } else {
            osutils::block_devices::real_path_from_uuid(&device.id.to_string())?
        };
        largest = largest.max(osutils::block_devices::device_size(&path)?);
    }
    Ok(largest)
}

/// Adds a SnapRAID parity device to a live union, validating it against the
/// largest data device's size first. Enables `sync` if this is the pool's
/// first parity device.
pub fn add_parity_device(pool: &mut Pool, device: PathBuf, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let largest_data = largest_data_device_bytes(pool)?;
    let candidate_bytes = osutils::block_devices::device_size(&device)?;
    validate::parity_at_least_largest_data(candidate_bytes, largest_data)?;

    let slot = pool.next_free_parity_slot().to_string();
    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);
    let prepared = strategy.prepare_devices(&pool.name, std::slice::from_ref(&(slot.clone(), device)), true)?;
    let device = prepared.into_iter().next().expect("one device");

    if let Err(e) = mkfs::run(&device.operational, Filesystem::Ext4) {
        let _ = strategy.cleanup(&pool.name, std::slice::from_ref(&device));
        return Err(e);
    }
    let mount_point = PathBuf::from(pool_api::constants::snapraid_parity_mount_point(&pool.name, &slot));
    osutils::mount::mount_device(&device.operational, &mount_point, runtime.owner_uid, runtime.owner_gid)?;

    pool.parity_devices.push(DeviceRef {
        slot: slot.clone(),
        id: OsUuid::from(strategy.device_uuid(&device)?),
        filesystem: Filesystem::Ext4,
        spindown: None,
    });
    if pool.is_encrypted() {
        pool.devices.push(device.physical.display().to_string());
    }
    pool.config.sync.enabled = true;
    regenerate_snapraid_config(pool)
}

/// Removes a SnapRAID parity device. Turns `sync` back off if it was the
/// last one, matching the way parity-less pools are created.
pub fn remove_parity_device(pool: &mut Pool, slot: &str, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    if !pool.parity_devices.iter().any(|d| d.slot == slot) {
        return Err(PoolError::new(PreconditionError::NotMounted { name: pool.name.clone() }));
    }

    let mount_point = PathBuf::from(pool_api::constants::snapraid_parity_mount_point(&pool.name, slot));
    osutils::mount::unmount_device(&mount_point, false, true, runtime.retry_attempts)?;

    if pool.is_encrypted() {
        osutils::encryption::luks_close(&pool_api::constants::parity_mapper_name(&pool.name, slot))?;
    }

    pool.parity_devices.retain(|d| d.slot != slot);
    if pool.parity_devices.is_empty() {
        pool.config.sync.enabled = false;
    }
    regenerate_snapraid_config(pool)
}

/// Replaces a parity device in place: validated, formatted, and mounted the
/// same as a fresh add, keeping the existing slot number and SnapRAID label.
pub fn replace_parity_device(pool: &mut Pool, slot: &str, new_device: PathBuf, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let existing_index = pool
        .parity_devices
        .iter()
        .position(|d| d.slot == slot)
        .ok_or_else(|| PoolError::new(PreconditionError::NotMounted { name: pool.name.clone() }))?;

    let largest_data = largest_data_device_bytes(pool)?;
    let candidate_bytes = osutils::block_devices::device_size(&new_device)?;
    validate::parity_at_least_largest_data(candidate_bytes, largest_data)?;

    let mount_point = PathBuf::from(pool_api::constants::snapraid_parity_mount_point(&pool.name, slot));
    osutils::mount::unmount_device(&mount_point, false, true, runtime.retry_attempts)?;
    if pool.is_encrypted() {
        osutils::encryption::luks_close(&pool_api::constants::parity_mapper_name(&pool.name, slot))?;
    }

    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);
    let prepared = strategy.prepare_devices(&pool.name, std::slice::from_ref(&(slot.to_string(), new_device)), true)?;
    let device = prepared.into_iter().next().expect("one device");
    mkfs::run(&device.operational, Filesystem::Ext4)?;
    osutils::mount::mount_device(&device.operational, &mount_point, runtime.owner_uid, runtime.owner_gid)?;

    pool.parity_devices[existing_index].id = OsUuid::from(strategy.device_uuid(&device)?);
    if pool.is_encrypted() {
        let data_offset = pool.data_devices.len();
        if let Some(slot_path) = pool.devices.get_mut(data_offset + existing_index) {
            *slot_path = device.physical.display().to_string();
        }
    }
    regenerate_snapraid_config(pool)
}

fn regenerate_snapraid_config(pool: &Pool) -> Result<(), PoolError> {
    let branches: Vec<snapraid::DataBranch> = pool
        .data_devices
        .iter()
        .enumerate()
        .map(|(i, d)| snapraid::DataBranch {
            identifier: format!("d{}", i + 1),
            path: mergerfs::branch_path(&pool.name, &d.slot),
        })
        .collect();
    let parity_slots: Vec<String> = pool.parity_devices.iter().map(|d| d.slot.clone()).collect();
    let contents = snapraid::render_config(&pool.name, &branches, &parity_slots);
    snapraid::write_config(&pool.name, &contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_pool_with_no_data_devices() {
        let req = CreateRequest {
            name: "media".into(),
            devices: vec![],
            filesystem: Filesystem::Xfs,
            parity_devices: vec![],
            create_policy: "mfs".into(),
            search_policy: "ff".into(),
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
