//! The NonRAID array: data and parity disks are registered with the
//! `md-nonraid` kernel module one `import` line at a time, assembled into
//! per-disk `/dev/mdN` nodes, and exposed as a MergerFS union the same way
//! the MergerFS engine does for its own branches — NonRAID and MergerFS
//! pools share that convention rather than each inventing mount layout.

use std::{path::PathBuf, thread, time::Duration};

use osutils::{mergerfs, mkfs, nonraid};
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
    pub data_devices: Vec<PathBuf>,
    pub parity_devices: Vec<PathBuf>,
    pub filesystem: Filesystem,
    pub encrypted: bool,
    pub passphrase: Option<String>,
    pub create_keyfile: bool,
    pub automount: bool,
    pub comment: String,
    pub md_writemode: pool_api::config::options::MdWriteMode,
    pub parity_valid: bool,
}

const MAX_DATA_SLOTS: usize = 28;
const ARRAY_COMMAND_RETRY_ATTEMPTS: u32 = 10;
const ARRAY_COMMAND_RETRY_INTERVAL: Duration = Duration::from_secs(2);

fn md_write_method_code(mode: pool_api::config::options::MdWriteMode) -> &'static str {
    match mode {
        pool_api::config::options::MdWriteMode::Normal => "0",
        pool_api::config::options::MdWriteMode::Turbo => "1",
    }
}

/// Retries `command` up to [`ARRAY_COMMAND_RETRY_ATTEMPTS`] times, 2s apart:
/// the kernel module rejects some commands for a moment right after the
/// array starts while it finishes bringing disks online.
fn write_command_with_retry(command: &str) -> Result<(), PoolError> {
    let mut last_err = None;
    for attempt in 0..ARRAY_COMMAND_RETRY_ATTEMPTS {
        match nonraid::write_command(command) {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < ARRAY_COMMAND_RETRY_ATTEMPTS {
                    thread::sleep(ARRAY_COMMAND_RETRY_INTERVAL);
                }
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

pub fn create(req: &CreateRequest, manifest: &Manifest, runtime: &RuntimeConfig) -> Result<Pool, PoolError> {
    validate::pool_name(&req.name)?;
    validate::name_available(manifest, &req.name)?;
    validate::no_existing_nonraid_pool(manifest)?;
    validate::minimum_devices(PoolType::Nonraid, "nonraid", 1, req.data_devices.len())?;
    validate::passphrase_present(req.encrypted, req.passphrase.as_deref(), req.create_keyfile)?;
    if req.data_devices.len() > MAX_DATA_SLOTS {
        return Err(PoolError::new(pool_api::error::ValidationError::SlotExhausted { pool: req.name.clone() }));
    }
    if req.encrypted {
        osutils::encryption::cleanup_existing_luks_mappers(&req.name)?;
    }

    let strategy = strategy::strategy_for(req.encrypted, req.passphrase.clone());

    let data_slots: Vec<(String, PathBuf)> = req
        .data_devices
        .iter()
        .enumerate()
        .map(|(i, p)| ((i + 1).to_string(), p.clone()))
        .collect();
    let parity_slots: Vec<(String, PathBuf)> = req
        .parity_devices
        .iter()
        .enumerate()
        .map(|(i, p)| ((i + 1).to_string(), p.clone()))
        .collect();

    let data_prepared = strategy.prepare_devices(&req.name, &data_slots, false)?;
    let parity_prepared = if parity_slots.is_empty() {
        Vec::new()
    } else {
        strategy.prepare_devices(&req.name, &parity_slots, true)?
    };

    if let Err(e) = assemble_array(&req.name, &data_prepared, &parity_prepared, req.md_writemode, req.parity_valid) {
        let _ = strategy.cleanup(&req.name, &data_prepared);
        let _ = strategy.cleanup(&req.name, &parity_prepared);
        return Err(e);
    }

    if let Err(e) = format_and_mount_branches(&req.name, &data_prepared, req.filesystem, runtime) {
        let _ = strategy.cleanup(&req.name, &data_prepared);
        let _ = strategy.cleanup(&req.name, &parity_prepared);
        return Err(e);
    }

    let branches: Vec<PathBuf> = data_prepared.iter().map(|d| mergerfs::branch_path(&req.name, &d.slot)).collect();
    let options = mergerfs::build_options("mfs", "ff");
    let mount_point = runtime.mount_root.join(&req.name);
    if let Err(e) = mergerfs::mount_union(&branches, &mount_point, &options) {
        let _ = strategy.cleanup(&req.name, &data_prepared);
        let _ = strategy.cleanup(&req.name, &parity_prepared);
        return Err(e);
    }

    let data_devices = data_device_refs(strategy.as_ref(), &data_prepared, req.filesystem)?;
    let parity_devices = parity_device_refs(&parity_prepared, req.filesystem)?;

    Ok(Pool {
        id: new_pool_id(),
        name: req.name.clone(),
        index: manifest.pools.len() as u32,
        comment: req.comment.clone(),
        automount: req.automount,
        pool_type: PoolType::Nonraid,
        data_devices,
        parity_devices,
        config: PoolConfig {
            encrypted: req.encrypted,
            create_keyfile: req.create_keyfile,
            md_writemode: Some(req.md_writemode),
            ..Default::default()
        },
        devices: if req.encrypted {
            data_prepared.iter().chain(parity_prepared.iter()).map(|d| d.physical.display().to_string()).collect()
        } else {
            vec![]
        },
    })
}

/// Data `DeviceRef.id` is the filesystem UUID, same identifier discipline
/// the mergerfs/btrfs/single engines use — only NonRAID *parity* devices are
/// identified by their by-id basename.
fn data_device_refs(strategy: &dyn DeviceStrategy, prepared: &[PreparedDevice], filesystem: Filesystem) -> Result<Vec<DeviceRef>, PoolError> {
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

fn parity_device_refs(prepared: &[PreparedDevice], filesystem: Filesystem) -> Result<Vec<DeviceRef>, PoolError> {
    prepared
        .iter()
        .map(|d| {
            let by_id = osutils::block_devices::device_by_id_path(&d.operational)?;
            let basename = by_id.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
            Ok(DeviceRef {
                slot: d.slot.clone(),
                id: OsUuid::from(basename),
                filesystem,
                spindown: None,
            })
        })
        .collect()
}

/// Loads the kernel module if needed and writes one `import` line per
/// data and parity disk, registering their slot, by-id identity, and size
/// with `md-nonraid`, then starts a brand-new array and brings its write
/// mode and initial parity sync up per the create sequence.
fn assemble_array(
    pool_name: &str,
    data: &[PreparedDevice],
    parity: &[PreparedDevice],
    md_writemode: pool_api::config::options::MdWriteMode,
    parity_valid: bool,
) -> Result<(), PoolError> {
    if !nonraid::is_module_loaded()? {
        nonraid::load_module(pool_api::constants::NONRAID_SUPERBLOCK_PATH)?;
    }

    for (i, device) in data.iter().enumerate() {
        import_data(i as u8 + 1, device)?;
    }
    for (i, device) in parity.iter().enumerate() {
        import_parity(i as u8 + 1, device)?;
    }

    if parity_valid {
        nonraid::write_command("set invalidslot 99 99")?;
    }

    nonraid::write_command("start NEW_ARRAY").message(format!("while starting nonraid array for pool '{pool_name}'"))?;

    write_command_with_retry(&format!("set md_write_method {}", md_write_method_code(md_writemode)))
        .message(format!("while setting write mode for pool '{pool_name}'"))?;

    if !parity.is_empty() && !parity_valid {
        write_command_with_retry("check").message(format!("while starting initial parity sync for pool '{pool_name}'"))?;
    }

    Ok(())
}

fn import_data(slot: u8, device: &PreparedDevice) -> Result<(), PoolError> {
    let by_id = osutils::block_devices::device_by_id_path(&device.operational)?;
    let basename = by_id.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let size_kb = osutils::block_devices::device_size_kb(&device.operational)?;
    nonraid::write_command(&nonraid::import_data_line(slot, basename, size_kb, basename))
}

fn import_parity(json_slot: u8, device: &PreparedDevice) -> Result<(), PoolError> {
    let by_id = osutils::block_devices::device_by_id_path(&device.operational)?;
    let basename = by_id.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let size_kb = osutils::block_devices::device_size_kb(&device.operational)?;
    nonraid::write_command(&nonraid::import_parity_line(json_slot, basename, size_kb, basename))
}

fn format_and_mount_branches(
    pool_name: &str,
    prepared: &[PreparedDevice],
    filesystem: Filesystem,
    runtime: &RuntimeConfig,
) -> Result<(), PoolError> {
    for device in prepared {
        mkfs::run(&device.operational, filesystem).message(format!("while formatting disk slot '{}'", device.slot))?;
        let branch = mergerfs::branch_path(pool_name, &device.slot);
        osutils::mount::mount_device(&device.operational, &branch, runtime.owner_uid, runtime.owner_gid)?;
    }
    Ok(())
}

/// Slots among `pool.data_devices` whose backing device can't currently be
/// resolved. Resolution is symlink-only (`real_path_from_uuid`) or, for an
/// encrypted pool, a plain existence check on the recorded physical path —
/// neither spins up a standby disk just to answer "is it there".
pub fn detect_missing_slots(pool: &Pool) -> Vec<String> {
    pool.data_devices
        .iter()
        .enumerate()
        .filter(|(i, device)| {
            if pool.is_encrypted() {
                !pool.devices.get(*i).map(|p| std::path::Path::new(p).exists()).unwrap_or(false)
            } else {
                osutils::block_devices::real_path_from_uuid(&device.id.to_string()).is_err()
            }
        })
        .map(|(_, device)| device.slot.clone())
        .collect()
}

/// Reassembles an existing array after a reboot and remounts its union.
/// Every data slot must be present; a missing disk goes through
/// [`degraded_mount`] instead.
pub fn mount(pool: &Pool, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    reassemble(pool, passphrase, &[], runtime)
}

/// Starts the array with `missing_slots` imported as empty so the remaining
/// disks can still be read. Refused outright when more disks are missing
/// than the pool has parity to reconstruct.
pub fn degraded_mount(pool: &Pool, passphrase: Option<String>, missing_slots: &[String], runtime: &RuntimeConfig) -> Result<(), PoolError> {
    if missing_slots.len() > pool.parity_devices.len() {
        return Err(PoolError::new(PreconditionError::DegradedMountNotPossible {
            name: pool.name.clone(),
            missing: missing_slots.len(),
            parity: pool.parity_devices.len(),
        }));
    }
    reassemble(pool, passphrase, missing_slots, runtime)
}

fn reassemble(pool: &Pool, passphrase: Option<String>, missing_slots: &[String], runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);

    if !nonraid::is_module_loaded()? {
        nonraid::load_module(pool_api::constants::NONRAID_SUPERBLOCK_PATH)?;
    }

    for (i, device) in pool.data_devices.iter().enumerate() {
        let slot_num = device.slot.parse::<u8>().unwrap_or(0);
        if missing_slots.contains(&device.slot) {
            nonraid::write_command(&nonraid::import_missing_line(slot_num))?;
            continue;
        }
        let physical = PathBuf::from(pool.devices.get(i).cloned().unwrap_or_default());
        let operational = if pool.is_encrypted() {
            strategy
                .prepare_devices(&pool.name, std::slice::from_ref(&(device.slot.clone(), physical)), false)?
                .into_iter()
                .next()
                .expect("one device")
                .operational
        } else {
            osutils::block_devices::real_path_from_uuid(&device.id.to_string())?
        };
        import_data(slot_num, &PreparedDevice { slot: device.slot.clone(), physical: PathBuf::new(), operational })?;
    }

    let offset = pool.data_devices.len();
    for (i, device) in pool.parity_devices.iter().enumerate() {
        let json_slot = device.slot.parse::<u8>().unwrap_or(1);
        let physical = PathBuf::from(pool.devices.get(offset + i).cloned().unwrap_or_default());
        let operational = if pool.is_encrypted() {
            strategy
                .prepare_devices(&pool.name, std::slice::from_ref(&(device.slot.clone(), physical)), true)?
                .into_iter()
                .next()
                .expect("one device")
                .operational
        } else {
            osutils::block_devices::real_path_from_id(&device.id.to_string())?
        };
        import_parity(json_slot, &PreparedDevice { slot: device.slot.clone(), physical: PathBuf::new(), operational })?;
    }

    nonraid::write_command("start").message(format!("while restarting nonraid array for pool '{}'", pool.name))?;

    for device in &pool.data_devices {
        if missing_slots.contains(&device.slot) {
            continue;
        }
        let branch = mergerfs::branch_path(&pool.name, &device.slot);
        let mdnode = PathBuf::from(format!("/dev/md{}", device.slot));
        osutils::mount::mount_device(&mdnode, &branch, runtime.owner_uid, runtime.owner_gid)?;
    }

    let branches: Vec<PathBuf> = pool
        .data_devices
        .iter()
        .filter(|d| !missing_slots.contains(&d.slot))
        .map(|d| mergerfs::branch_path(&pool.name, &d.slot))
        .collect();
    let options = mergerfs::build_options("mfs", "ff");
    let mount_point = runtime.mount_root.join(&pool.name);
    mergerfs::mount_union(&branches, &mount_point, &options)
}

pub fn unmount(pool: &Pool, force: bool, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let mount_point = runtime.mount_root.join(&pool.name);
    mergerfs::unmount_union(&mount_point)?;

    for device in &pool.data_devices {
        let branch = mergerfs::branch_path(&pool.name, &device.slot);
        osutils::mount::unmount_device(&branch, force, true, runtime.retry_attempts)?;
    }

    if nonraid::NmdStatus::read().map(|s| s.is_running()).unwrap_or(false) {
        nonraid::write_command("check CANCEL").message(format!("while cancelling parity check for pool '{}'", pool.name))?;
    }
    nonraid::write_command("stop").message(format!("while stopping nonraid array for pool '{}'", pool.name))?;

    if let Err(e) = nonraid::unload_module() {
        log::warn!("failed to unload md-nonraid after stopping pool '{}': {e}", pool.name);
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

/// Adds a new data disk to a running array: the next free slot, formatted
/// and mounted, then a parity sync is left for the caller to kick off via
/// `executeNonRaidParityOperation`.
pub fn add_data_device(pool: &mut Pool, device: PathBuf, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    if pool.data_devices.len() >= MAX_DATA_SLOTS {
        return Err(PoolError::new(pool_api::error::ValidationError::SlotExhausted { pool: pool.name.clone() }));
    }
    let slot = pool.next_free_data_slot().to_string();
    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);
    let prepared = strategy.prepare_devices(&pool.name, std::slice::from_ref(&(slot.clone(), device)), false)?;
    let device = prepared.into_iter().next().expect("one device");

    import_data(slot.parse().unwrap_or(0), &device)?;
    nonraid::write_command("start STARTED")?;

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

    if !pool.parity_devices.is_empty() && !nonraid::NmdStatus::read()?.parity_valid() {
        nonraid::write_command("check").message(format!("while triggering parity check after adding a device to pool '{}'", pool.name))?;
    }
    Ok(())
}

/// Adds a second parity disk (single-parity arrays support at most two).
pub fn add_parity_device(pool: &mut Pool, device: PathBuf, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    if pool.parity_devices.len() >= 2 {
        return Err(PoolError::new(pool_api::error::ValidationError::SlotExhausted { pool: pool.name.clone() }));
    }
    let json_slot = (pool.parity_devices.len() + 1) as u8;
    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);
    let prepared = strategy.prepare_devices(&pool.name, std::slice::from_ref(&(json_slot.to_string(), device)), true)?;
    let device = prepared.into_iter().next().expect("one device");

    import_parity(json_slot, &device)?;
    nonraid::write_command("start STARTED")?;

    let by_id = osutils::block_devices::device_by_id_path(&device.operational)?;
    let basename = by_id.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
    let filesystem = pool.data_devices.first().map(|d| d.filesystem).unwrap_or(Filesystem::Ext4);
    pool.parity_devices.push(DeviceRef {
        slot: json_slot.to_string(),
        id: OsUuid::from(basename),
        filesystem,
        spindown: None,
    });
    if pool.is_encrypted() {
        pool.devices.push(device.physical.display().to_string());
    }

    nonraid::write_command("check").message(format!("while starting parity check after adding parity to pool '{}'", pool.name))?;
    let _ = runtime;
    Ok(())
}

/// Replaces one or more failed/mismatched disks on a stopped array: the new
/// sizes are validated against the array's existing parity and data (the
/// devices being replaced are excluded from both comparisons), every slot is
/// re-imported, and the array is brought up with `start RECON_DISK` to copy
/// parity onto the freshly-imported members.
pub fn replace_devices(
    pool: &mut Pool,
    replacements: Vec<(String, PathBuf)>,
    passphrase: Option<String>,
    runtime: &RuntimeConfig,
) -> Result<(), PoolError> {
    let replaced_slots: Vec<&str> = replacements.iter().map(|(slot, _)| slot.as_str()).collect();

    let smallest_parity = pool
        .parity_devices
        .iter()
        .filter(|d| !replaced_slots.contains(&d.slot.as_str()))
        .map(|d| osutils::block_devices::device_size(&osutils::block_devices::real_path_from_id(&d.id.to_string())?))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .min();
    let largest_data = pool
        .data_devices
        .iter()
        .filter(|d| !replaced_slots.contains(&d.slot.as_str()))
        .map(|d| osutils::block_devices::device_size(&osutils::block_devices::real_path_from_uuid(&d.id.to_string())?))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .max()
        .unwrap_or(0);

    let strategy = strategy::strategy_for(pool.is_encrypted(), passphrase);
    let mut prepared_by_slot = std::collections::HashMap::new();
    for (slot, device) in &replacements {
        let is_parity = pool.parity_devices.iter().any(|d| &d.slot == slot);
        let bytes = osutils::block_devices::device_size(device)?;
        if is_parity {
            if bytes + 100 * 1024 * 1024 < largest_data {
                return Err(PoolError::new(pool_api::error::ValidationError::ParityTooSmall {
                    parity_bytes: bytes,
                    largest_data_bytes: largest_data,
                }));
            }
        } else if let Some(parity_bytes) = smallest_parity {
            if bytes > parity_bytes + 100 * 1024 * 1024 {
                return Err(PoolError::new(pool_api::error::ValidationError::ParityTooSmall {
                    parity_bytes,
                    largest_data_bytes: bytes,
                }));
            }
        }
        let prepared = strategy.prepare_devices(&pool.name, std::slice::from_ref(&(slot.clone(), device.clone())), is_parity)?;
        prepared_by_slot.insert(slot.clone(), prepared.into_iter().next().expect("one device"));
    }

    for device in &pool.data_devices {
        let slot_num = device.slot.parse::<u8>().unwrap_or(0);
        let prepared = prepared_by_slot.get(&device.slot);
        if let Some(prepared) = prepared {
            import_data(slot_num, prepared)?;
        } else {
            let operational = osutils::block_devices::real_path_from_uuid(&device.id.to_string())?;
            import_data(slot_num, &PreparedDevice { slot: device.slot.clone(), physical: PathBuf::new(), operational })?;
        }
    }
    for device in &pool.parity_devices {
        let json_slot = device.slot.parse::<u8>().unwrap_or(1);
        let prepared = prepared_by_slot.get(&device.slot);
        if let Some(prepared) = prepared {
            import_parity(json_slot, prepared)?;
        } else {
            let operational = osutils::block_devices::real_path_from_id(&device.id.to_string())?;
            import_parity(json_slot, &PreparedDevice { slot: device.slot.clone(), physical: PathBuf::new(), operational })?;
        }
    }

    nonraid::write_command("start RECON_DISK").message(format!("while reconstructing replaced disks for pool '{}'", pool.name))?;

    for (slot, prepared) in &prepared_by_slot {
        let is_parity = pool.parity_devices.iter().any(|d| &d.slot == slot);
        if is_parity {
            if let Some(d) = pool.parity_devices.iter_mut().find(|d| &d.slot == slot) {
                let by_id = osutils::block_devices::device_by_id_path(&prepared.operational)?;
                let basename = by_id.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
                d.id = OsUuid::from(basename);
            }
        } else {
            let branch = mergerfs::branch_path(&pool.name, slot);
            osutils::mount::mount_device(&prepared.operational, &branch, runtime.owner_uid, runtime.owner_gid)?;
            if let Some(d) = pool.data_devices.iter_mut().find(|d| &d.slot == slot) {
                d.id = OsUuid::from(strategy.device_uuid(prepared)?);
            }
        }
        if pool.is_encrypted() {
            let offset = if is_parity { pool.data_devices.len() } else { 0 };
            let index = if is_parity {
                pool.parity_devices.iter().position(|d| &d.slot == slot).unwrap_or(0)
            } else {
                pool.data_devices.iter().position(|d| &d.slot == slot).unwrap_or(0)
            };
            if let Some(slot_path) = pool.devices.get_mut(offset + index) {
                *slot_path = prepared.physical.display().to_string();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_second_nonraid_pool() {
        let existing = Pool {
            id: "1".into(),
            name: "array".into(),
            index: 0,
            comment: String::new(),
            automount: true,
            pool_type: PoolType::Nonraid,
            data_devices: vec![],
            parity_devices: vec![],
            config: PoolConfig::default(),
            devices: vec![],
        };
        let manifest = Manifest { version: 1, pools: vec![existing] };
        let req = CreateRequest {
            name: "array2".into(),
            data_devices: vec![PathBuf::from("/dev/sdb")],
            parity_devices: vec![],
            filesystem: Filesystem::Xfs,
            encrypted: false,
            passphrase: None,
            create_keyfile: false,
            automount: true,
            comment: String::new(),
            md_writemode: pool_api::config::options::MdWriteMode::Normal,
            parity_valid: false,
        };
        let runtime = RuntimeConfig::default();
        let err = create(&req, &manifest, &runtime).unwrap_err();
        assert!(matches!(err.kind(), pool_api::error::ErrorKind::Precondition(_)));
    }

    #[test]
    fn degraded_mount_refused_when_missing_exceeds_parity() {
        let pool = Pool {
            id: "1".into(),
            name: "array".into(),
            index: 0,
            comment: String::new(),
            automount: true,
            pool_type: PoolType::Nonraid,
            data_devices: vec![],
            parity_devices: vec![],
            config: PoolConfig::default(),
            devices: vec![],
        };
        let runtime = RuntimeConfig::default();
        let err = degraded_mount(&pool, None, &["1".into(), "2".into()], &runtime).unwrap_err();
        assert!(matches!(err.kind(), pool_api::error::ErrorKind::Precondition(_)));
    }
}
