//! The single entry point the CLI (and any future RPC surface) calls
//! through: validates, dispatches to the right [`crate::engines`] module,
//! runs the [`SafetyGuard`] ahead of anything destructive, and persists the
//! result through a [`ManifestStore`]. Every mutation is serialized behind
//! a per-pool lock plus the manifest-wide lock the store itself implies.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use pool_api::{
    config::{
        options::{CheckSchedule, MdWriteMode, MergerfsPolicies, RaidLevel, SnapraidSchedule},
        pool::{Pool, PoolType},
    },
    derived::PoolStatus,
    error::{PoolError, ValidationError},
};

use crate::{
    collaborators::{DiskInventory, DiskSummary, EventEmitter, ServiceDependencyProbe},
    config::RuntimeConfig,
    engines,
    manifest::ManifestStore,
    parity::{nonraid::NonraidParityOperation, snapraid::SnapraidOperation},
    reconciler,
    safety::SafetyGuard,
    validate,
};

/// `controlDisk`'s three actions. Unlike the read-only status probes this
/// forwards straight to `osutils::power::control`, which is allowed to
/// spin a drive up or down since the caller asked for it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskControlAction {
    Wake,
    Standby,
    Sleep,
}

/// `controlPool`'s actions: the coarse mount/unmount toggle the host UI
/// exposes as a single button, layered over the same engine calls
/// `mountPoolById`/`unmountPoolById` already make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolControlAction {
    Start,
    Stop,
    ForceStop,
}

/// Partial update for the free-form pool-config fields that don't already
/// have their own dedicated setter (`toggleAutomountById`,
/// `updatePoolComment`, `changePoolRaidLevel`). Every field left `None` is
/// left untouched in the stored config.
#[derive(Debug, Clone, Default)]
pub struct PoolConfigUpdate {
    pub policies: Option<MergerfsPolicies>,
    pub minfreespace: Option<String>,
    pub moveonenospc: Option<bool>,
    pub global_options: Option<String>,
    pub sync: Option<SnapraidSchedule>,
    pub md_writemode: Option<MdWriteMode>,
    pub check: Option<CheckSchedule>,
}

/// Holds everything a running instance needs across calls: the injected
/// collaborators, the manifest store, and one lock per pool name so two
/// operations on different pools never block each other while a long-running
/// one (a mount, a device add) is in flight.
pub struct PoolManager {
    disks: Box<dyn DiskInventory>,
    service_probe: Box<dyn ServiceDependencyProbe>,
    emitter: Box<dyn EventEmitter>,
    manifest: ManifestStore,
    runtime: RuntimeConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    manifest_lock: Mutex<()>,
}

impl PoolManager {
    pub fn new(
        disks: Box<dyn DiskInventory>,
        service_probe: Box<dyn ServiceDependencyProbe>,
        emitter: Box<dyn EventEmitter>,
        manifest: ManifestStore,
        runtime: RuntimeConfig,
    ) -> Self {
        Self {
            disks,
            service_probe,
            emitter,
            manifest,
            runtime,
            locks: Mutex::new(HashMap::new()),
            manifest_lock: Mutex::new(()),
        }
    }

    fn pool_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks.lock().unwrap().entry(name.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Serializes the manifest read-modify-write sequence across every pool,
    /// on top of the per-pool lock each caller already holds for the
    /// duration of its own operation.
    fn update_manifest(&self, mutate: impl FnOnce(&mut pool_api::config::Manifest) -> Result<(), PoolError>) -> Result<(), PoolError> {
        let _guard = self.manifest_lock.lock().unwrap();
        self.manifest.update(mutate)
    }

    fn notify(&self, pool_name: &str) {
        self.emitter.emit("pools:updated", pool_name);
    }

    pub fn list_pools(&self) -> Result<Vec<Pool>, PoolError> {
        Ok(self.manifest.load()?.pools)
    }

    pub fn get_pool_by_id(&self, id: &str) -> Result<Pool, PoolError> {
        self.manifest
            .load()?
            .pools
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))
    }

    pub fn get_pool_status(&self, name: &str) -> Result<PoolStatus, PoolError> {
        let manifest = self.manifest.load()?;
        let pool = validate::find_pool(&manifest, name)?;
        reconciler::build_status(pool, self.disks.as_ref())
    }

    pub fn get_available_pool_types(&self) -> Vec<PoolType> {
        vec![PoolType::Ext4, PoolType::Xfs, PoolType::Btrfs, PoolType::Mergerfs, PoolType::Nonraid]
    }

    pub fn get_disk_status(&self, skip_standby: bool) -> Result<Vec<DiskSummary>, PoolError> {
        self.disks.all_disks(skip_standby).map_err(|e| PoolError::with_source(ValidationError::Other("disk inventory query failed".into()), e))
    }

    pub fn create_single_device_pool(&self, req: engines::single::CreateRequest) -> Result<Pool, PoolError> {
        let _lock = self.pool_lock(&req.name);
        let mut created = None;
        self.update_manifest(|manifest| {
            let pool = engines::single::create(&req, manifest, &self.runtime)?;
            created = Some(pool.clone());
            manifest.pools.push(pool);
            Ok(())
        })?;
        self.notify(&req.name);
        Ok(created.expect("create populates pool on success"))
    }

    pub fn create_multi_device_pool(&self, req: engines::btrfs::CreateRequest) -> Result<Pool, PoolError> {
        let _lock = self.pool_lock(&req.name);
        let mut created = None;
        self.update_manifest(|manifest| {
            let pool = engines::btrfs::create(&req, manifest, &self.runtime)?;
            created = Some(pool.clone());
            manifest.pools.push(pool);
            Ok(())
        })?;
        self.notify(&req.name);
        Ok(created.expect("create populates pool on success"))
    }

    pub fn create_mergerfs_pool(&self, req: engines::mergerfs::CreateRequest) -> Result<Pool, PoolError> {
        let _lock = self.pool_lock(&req.name);
        let mut created = None;
        self.update_manifest(|manifest| {
            let pool = engines::mergerfs::create(&req, manifest, &self.runtime)?;
            created = Some(pool.clone());
            manifest.pools.push(pool);
            Ok(())
        })?;
        self.notify(&req.name);
        Ok(created.expect("create populates pool on success"))
    }

    pub fn create_nonraid_pool(&self, req: engines::nonraid::CreateRequest) -> Result<Pool, PoolError> {
        let _lock = self.pool_lock(&req.name);
        let mut created = None;
        self.update_manifest(|manifest| {
            let pool = engines::nonraid::create(&req, manifest, &self.runtime)?;
            created = Some(pool.clone());
            manifest.pools.push(pool);
            Ok(())
        })?;
        self.notify(&req.name);
        Ok(created.expect("create populates pool on success"))
    }

    pub fn mount_pool_by_id(&self, id: &str, passphrase: Option<String>, mount_missing: bool) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        let _lock = self.pool_lock(&pool.name);
        match pool.pool_type {
            PoolType::Ext4 | PoolType::Xfs => engines::single::mount(&pool, passphrase, &self.runtime),
            PoolType::Btrfs => engines::btrfs::mount(&pool, passphrase, &self.runtime),
            PoolType::Mergerfs => engines::mergerfs::mount(&pool, passphrase, &self.runtime),
            PoolType::Nonraid => {
                let missing = engines::nonraid::detect_missing_slots(&pool);
                if missing.is_empty() {
                    engines::nonraid::mount(&pool, passphrase, &self.runtime)
                } else if !mount_missing {
                    Err(PoolError::new(pool_api::error::PreconditionError::MissingDevicesRequireFlag {
                        name: pool.name.clone(),
                        missing: missing.len(),
                    }))
                } else {
                    engines::nonraid::degraded_mount(&pool, passphrase, &missing, &self.runtime)
                }
            }
        }
    }

    pub fn unmount_pool_by_id(&self, id: &str, force: bool) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        let _lock = self.pool_lock(&pool.name);
        let mount_point = self.runtime.mount_root.join(&pool.name);
        let branch_mounts: Vec<PathBuf> = pool
            .data_devices
            .iter()
            .chain(pool.parity_devices.iter())
            .filter(|_| matches!(pool.pool_type, PoolType::Mergerfs | PoolType::Nonraid))
            .map(|d| PathBuf::from(pool_api::constants::mergerfs_branch_path(&pool.name, &d.slot)))
            .collect();

        let guard = SafetyGuard::new(self.service_probe.as_ref());
        let result = guard.check(&pool.name, &mount_point, &branch_mounts, force);
        if let Err(e) = result {
            if !force || !e.is_precondition() {
                return Err(e);
            }
        }

        match pool.pool_type {
            PoolType::Ext4 | PoolType::Xfs => engines::single::unmount(&pool, force, &self.runtime),
            PoolType::Btrfs => engines::btrfs::unmount(&pool, force, &self.runtime),
            PoolType::Mergerfs => engines::mergerfs::unmount(&pool, force, &self.runtime),
            PoolType::Nonraid => engines::nonraid::unmount(&pool, force, &self.runtime),
        }
    }

    pub fn remove_pool_by_id(&self, id: &str, force: bool) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        if reconciler::build_status(&pool, self.disks.as_ref())?.mount_point.is_some() {
            self.unmount_pool_by_id(id, force)?;
        }
        let _lock = self.pool_lock(&pool.name);
        self.update_manifest(|manifest| {
            manifest.pools.retain(|p| p.id != id);
            Ok(())
        })?;
        self.notify(&pool.name);
        Ok(())
    }

    pub fn add_devices_to_pool(&self, id: &str, devices: Vec<PathBuf>, passphrase: Option<String>) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        let _lock = self.pool_lock(&pool.name);
        self.update_manifest(|manifest| {
            let slot = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            for device in devices {
                match slot.pool_type {
                    PoolType::Btrfs => engines::btrfs::add_device(slot, device, passphrase.clone(), &self.runtime)?,
                    PoolType::Mergerfs => engines::mergerfs::add_data_device(slot, device, passphrase.clone(), &self.runtime)?,
                    PoolType::Nonraid => engines::nonraid::add_data_device(slot, device, passphrase.clone(), &self.runtime)?,
                    other => return Err(PoolError::new(ValidationError::Other(format!("pool type '{other}' does not support adding devices")))),
                }
            }
            Ok(())
        })?;
        self.notify(&pool.name);
        Ok(())
    }

    pub fn remove_devices_from_pool(&self, id: &str, slots: Vec<String>, force: bool) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        let _lock = self.pool_lock(&pool.name);
        let mount_point = self.runtime.mount_root.join(&pool.name);
        let guard = SafetyGuard::new(self.service_probe.as_ref());
        guard.check(&pool.name, &mount_point, &[], force)?;

        self.update_manifest(|manifest| {
            let slot = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            for device_slot in &slots {
                match slot.pool_type {
                    PoolType::Btrfs => engines::btrfs::remove_device(slot, device_slot, &self.runtime)?,
                    PoolType::Mergerfs => engines::mergerfs::remove_data_device(slot, device_slot, &self.runtime)?,
                    other => return Err(PoolError::new(ValidationError::Other(format!("pool type '{other}' does not support removing devices")))),
                }
            }
            Ok(())
        })?;
        self.notify(&pool.name);
        Ok(())
    }

    pub fn replace_device_in_pool(&self, id: &str, slot: &str, new_device: PathBuf, passphrase: Option<String>) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        let _lock = self.pool_lock(&pool.name);
        self.update_manifest(|manifest| {
            let pool_mut = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            match pool_mut.pool_type {
                PoolType::Btrfs => engines::btrfs::replace_device(pool_mut, slot, new_device, passphrase, &self.runtime),
                other => Err(PoolError::new(ValidationError::Other(format!("pool type '{other}' does not support in-place device replacement")))),
            }
        })?;
        self.notify(&pool.name);
        Ok(())
    }

    pub fn add_parity_devices_to_pool(&self, id: &str, devices: Vec<PathBuf>, passphrase: Option<String>) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        let _lock = self.pool_lock(&pool.name);
        self.update_manifest(|manifest| {
            let slot = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            for device in devices {
                match slot.pool_type {
                    PoolType::Nonraid => engines::nonraid::add_parity_device(slot, device, passphrase.clone(), &self.runtime)?,
                    PoolType::Mergerfs => engines::mergerfs::add_parity_device(slot, device, passphrase.clone(), &self.runtime)?,
                    other => return Err(PoolError::new(ValidationError::Other(format!("pool type '{other}' does not support adding parity devices")))),
                }
            }
            Ok(())
        })?;
        self.notify(&pool.name);
        Ok(())
    }

    pub fn remove_parity_devices_from_pool(&self, id: &str, slots: Vec<String>, force: bool) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        let _lock = self.pool_lock(&pool.name);
        let mount_point = self.runtime.mount_root.join(&pool.name);
        let guard = SafetyGuard::new(self.service_probe.as_ref());
        guard.check(&pool.name, &mount_point, &[], force)?;

        self.update_manifest(|manifest| {
            let slot = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            if slot.pool_type != PoolType::Mergerfs {
                return Err(PoolError::new(ValidationError::Other(
                    "only MergerFS pools support removing parity devices after creation".into(),
                )));
            }
            for device_slot in &slots {
                engines::mergerfs::remove_parity_device(slot, device_slot, &self.runtime)?;
            }
            Ok(())
        })?;
        self.notify(&pool.name);
        Ok(())
    }

    pub fn replace_parity_device_in_pool(&self, id: &str, slot: &str, new_device: PathBuf, passphrase: Option<String>) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        let _lock = self.pool_lock(&pool.name);
        self.update_manifest(|manifest| {
            let pool_mut = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            match pool_mut.pool_type {
                PoolType::Mergerfs => engines::mergerfs::replace_parity_device(pool_mut, slot, new_device, passphrase, &self.runtime),
                other => Err(PoolError::new(ValidationError::Other(format!("pool type '{other}' does not support in-place parity replacement")))),
            }
        })?;
        self.notify(&pool.name);
        Ok(())
    }

    /// `replaceDevicesInNonRaidPool`: the pool must be unmounted first, since
    /// the NonRAID driver re-imports every slot before issuing `RECON_DISK`.
    pub fn replace_devices_in_nonraid_pool(
        &self,
        id: &str,
        replacements: Vec<(String, PathBuf)>,
        passphrase: Option<String>,
    ) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        let _lock = self.pool_lock(&pool.name);
        let mount_point = self.runtime.mount_root.join(&pool.name);
        if osutils::findmnt::is_mounted(&mount_point)? {
            return Err(PoolError::new(pool_api::error::PreconditionError::AlreadyMounted { name: pool.name.clone() }));
        }
        self.update_manifest(|manifest| {
            let slot = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            if slot.pool_type != PoolType::Nonraid {
                return Err(PoolError::new(ValidationError::Other("only NonRAID pools support bulk device replacement".into())));
            }
            engines::nonraid::replace_devices(slot, replacements.clone(), passphrase.clone(), &self.runtime)
        })?;
        self.notify(&pool.name);
        Ok(())
    }

    /// `controlDisk`: forwards straight to the host `hdparm`/`dd` primitives,
    /// independent of any pool the device might belong to.
    pub fn control_disk(&self, device: &std::path::Path, action: DiskControlAction) -> Result<(), PoolError> {
        let action = match action {
            DiskControlAction::Wake => osutils::power::PowerAction::Wake,
            DiskControlAction::Standby => osutils::power::PowerAction::Standby,
            DiskControlAction::Sleep => osutils::power::PowerAction::Sleep,
        };
        osutils::power::control(device, action)
    }

    /// `controlPool`: the coarse start/stop toggle layered over mount/unmount.
    pub fn control_pool(&self, id: &str, action: PoolControlAction) -> Result<(), PoolError> {
        match action {
            PoolControlAction::Start => self.mount_pool_by_id(id, None, false),
            PoolControlAction::Stop => self.unmount_pool_by_id(id, false),
            PoolControlAction::ForceStop => self.unmount_pool_by_id(id, true),
        }
    }

    /// `updatePoolConfig`: applies whichever fields of `update` are `Some`,
    /// leaving the rest of the stored config untouched.
    pub fn update_pool_config(&self, id: &str, update: PoolConfigUpdate) -> Result<(), PoolError> {
        self.update_manifest(|manifest| {
            let pool = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            if let Some(policies) = update.policies.clone() {
                pool.config.policies = policies;
            }
            if let Some(minfreespace) = update.minfreespace.clone() {
                pool.config.minfreespace = Some(minfreespace);
            }
            if let Some(moveonenospc) = update.moveonenospc {
                pool.config.moveonenospc = moveonenospc;
            }
            if let Some(global_options) = update.global_options.clone() {
                pool.config.global_options = Some(global_options);
            }
            if let Some(sync) = update.sync.clone() {
                pool.config.sync = sync;
            }
            if let Some(md_writemode) = update.md_writemode {
                pool.config.md_writemode = Some(md_writemode);
            }
            if let Some(check) = update.check.clone() {
                pool.config.check = check;
            }
            Ok(())
        })?;
        self.notify(id);
        Ok(())
    }

    pub fn change_pool_raid_level(&self, id: &str, new_level: RaidLevel) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        let _lock = self.pool_lock(&pool.name);
        self.update_manifest(|manifest| {
            let slot = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            if slot.pool_type != PoolType::Btrfs {
                return Err(PoolError::new(ValidationError::Other("only BTRFS pools support a RAID level change".into())));
            }
            engines::btrfs::change_raid_level(slot, new_level, &self.runtime)
        })?;
        self.notify(&pool.name);
        Ok(())
    }

    pub fn execute_snapraid_operation(&self, id: &str, operation: SnapraidOperation, fix_mount_points: Vec<PathBuf>) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        crate::parity::snapraid::execute(&pool, operation, &fix_mount_points)
    }

    pub fn execute_nonraid_parity_operation(&self, id: &str, operation: NonraidParityOperation) -> Result<(), PoolError> {
        let pool = self.get_pool_by_id(id)?;
        crate::parity::nonraid::execute(&pool, operation)
    }

    pub fn toggle_automount_by_id(&self, id: &str, automount: bool) -> Result<(), PoolError> {
        self.update_manifest(|manifest| {
            let pool = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            pool.automount = automount;
            Ok(())
        })
    }

    pub fn update_pool_comment(&self, id: &str, comment: String) -> Result<(), PoolError> {
        self.update_manifest(|manifest| {
            let pool = manifest
                .pools
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.to_string() }))?;
            pool.comment = comment;
            Ok(())
        })
    }

    pub fn update_pools_order(&self, ordered_ids: Vec<String>) -> Result<(), PoolError> {
        self.update_manifest(|manifest| {
            for (index, id) in ordered_ids.iter().enumerate() {
                let pool = manifest
                    .pools
                    .iter_mut()
                    .find(|p| &p.id == id)
                    .ok_or_else(|| PoolError::new(ValidationError::NoSuchPool { name: id.clone() }))?;
                pool.index = index as u32;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::{FakeDiskInventory, FakeEventEmitter, FakeServiceDependencyProbe};

    fn test_manager(dir: &std::path::Path) -> PoolManager {
        let runtime = RuntimeConfig {
            manifest_path: dir.join("pools.json"),
            mount_root: dir.join("mnt"),
            ..RuntimeConfig::default()
        };
        PoolManager::new(
            Box::new(FakeDiskInventory::default()),
            Box::new(FakeServiceDependencyProbe::default()),
            Box::new(FakeEventEmitter::default()),
            ManifestStore::new(runtime.manifest_path.clone()),
            runtime,
        )
    }

    #[test]
    fn get_pool_by_id_reports_no_such_pool() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let err = manager.get_pool_by_id("missing").unwrap_err();
        assert!(matches!(err.kind(), pool_api::error::ErrorKind::Validation(_)));
    }

    #[test]
    fn empty_manifest_lists_no_pools() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        assert!(manager.list_pools().unwrap().is_empty());
    }

    #[test]
    fn available_pool_types_cover_every_engine() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        assert_eq!(manager.get_available_pool_types().len(), 5);
    }

    #[test]
    fn toggle_automount_rejects_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let err = manager.toggle_automount_by_id("missing", true).unwrap_err();
        assert!(matches!(err.kind(), pool_api::error::ErrorKind::Validation(_)));
    }
}
