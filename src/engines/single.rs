//! Single-device ext4/xfs pools: one partition, optionally LUKS2-wrapped,
//! formatted directly and mounted at `/mnt/<name>`.

use std::path::PathBuf;

use osutils::mkfs;
use pool_api::{
    config::{
        options::PoolConfig,
        pool::{DeviceRef, Pool, PoolType},
        Manifest,
    },
    error::{PoolError, PoolResultExt},
};
use sysdefs::osuuid::OsUuid;

use crate::{
    config::RuntimeConfig,
    engines::{mount_pool_root, new_pool_id},
    strategy,
    validate,
};

pub struct CreateRequest {
    pub name: String,
    pub pool_type: PoolType,
    pub device: PathBuf,
    pub encrypted: bool,
    pub passphrase: Option<String>,
    pub create_keyfile: bool,
    pub automount: bool,
    pub comment: String,
}

/// Validates, partitions/encrypts, formats, mounts, and returns the [`Pool`]
/// record the caller should insert into the manifest. Any failure after
/// device preparation succeeds triggers the strategy's cleanup before the
/// error is returned, so a failed create never leaves an opened LUKS mapper
/// behind.
pub fn create(req: &CreateRequest, manifest: &Manifest, runtime: &RuntimeConfig) -> Result<Pool, PoolError> {
    validate::pool_name(&req.name)?;
    validate::name_available(manifest, &req.name)?;
    let filesystem = req.pool_type.single_device_filesystem().ok_or_else(|| {
        PoolError::new(pool_api::error::ValidationError::UnsupportedFilesystem {
            filesystem: req.pool_type.to_string(),
            pool_type: req.pool_type.to_string(),
        })
    })?;
    validate::passphrase_present(req.encrypted, req.passphrase.as_deref(), req.create_keyfile)?;
    if req.encrypted {
        osutils::encryption::cleanup_existing_luks_mappers(&req.name)?;
    }

    let strategy = strategy::strategy_for(req.encrypted, req.passphrase.clone());
    let prepared = strategy.prepare_devices(&req.name, std::slice::from_ref(&("1".to_string(), req.device.clone())), false)?;
    let device = prepared.into_iter().next().expect("exactly one device requested");

    if let Err(e) = mkfs::run(&device.operational, filesystem) {
        let _ = strategy.cleanup(&req.name, std::slice::from_ref(&device));
        return Err(e).message(format!("while formatting '{}'", device.operational.display()));
    }

    if let Err(e) = mount_pool_root(&device.operational, &req.name, runtime) {
        let _ = strategy.cleanup(&req.name, std::slice::from_ref(&device));
        return Err(e);
    }

    let uuid = strategy.device_uuid(&device)?;

    Ok(Pool {
        id: new_pool_id(),
        name: req.name.clone(),
        index: manifest.pools.len() as u32,
        comment: req.comment.clone(),
        automount: req.automount,
        pool_type: req.pool_type,
        data_devices: vec![DeviceRef {
            slot: "1".into(),
            id: OsUuid::from(uuid),
            filesystem,
            spindown: None,
        }],
        parity_devices: vec![],
        config: PoolConfig {
            encrypted: req.encrypted,
            create_keyfile: req.create_keyfile,
            ..Default::default()
        },
        devices: if req.encrypted {
            vec![device.physical.display().to_string()]
        } else {
            vec![]
        },
    })
}

/// Remounts an existing pool's device at its mount point. Used both for a
/// normal `mountPoolById` and to bring a pool back after a reboot.
///
/// Encrypted pools re-derive the operational path by reopening the LUKS
/// mapper from the physical partition recorded in `pool.devices`, since the
/// filesystem UUID on `data_devices` belongs to the mapper, not a path
/// that's resolvable before the mapper exists.
pub fn mount(pool: &Pool, passphrase: Option<String>, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let device = pool
        .data_devices
        .first()
        .ok_or_else(|| PoolError::new(pool_api::error::ValidationError::Other(format!("pool '{}' has no device", pool.name))))?;

    let operational = if pool.is_encrypted() {
        let physical = pool.devices.first().ok_or_else(|| {
            PoolError::new(pool_api::error::ValidationError::Other(format!(
                "encrypted pool '{}' is missing its recorded physical device",
                pool.name
            )))
        })?;
        let strategy = strategy::strategy_for(true, passphrase);
        let prepared = strategy.prepare_devices(
            &pool.name,
            std::slice::from_ref(&(device.slot.clone(), PathBuf::from(physical))),
            false,
        )?;
        prepared.into_iter().next().expect("one device requested").operational
    } else {
        osutils::block_devices::real_path_from_uuid(&device.id.to_string())?
    };

    mount_pool_root(&operational, &pool.name, runtime)?;
    Ok(())
}

pub fn unmount(pool: &Pool, force: bool, runtime: &RuntimeConfig) -> Result<(), PoolError> {
    let mount_point = runtime.mount_root.join(&pool.name);
    osutils::mount::unmount_device(&mount_point, force, true, runtime.retry_attempts)?;

    if pool.is_encrypted() {
        let strategy = strategy::strategy_for(true, None);
        let prepared: Vec<_> = pool
            .data_devices
            .iter()
            .map(|d| crate::strategy::PreparedDevice {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_pool_type_for_single_device() {
        let req = CreateRequest {
            name: "media".into(),
            pool_type: PoolType::Btrfs,
            device: PathBuf::from("/dev/sdb"),
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

    #[test]
    fn rejects_encrypted_request_missing_passphrase() {
        let req = CreateRequest {
            name: "vault".into(),
            pool_type: PoolType::Ext4,
            device: PathBuf::from("/dev/sdb"),
            encrypted: true,
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
