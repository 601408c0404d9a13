//! Shared precondition checks every engine runs before touching a device.
//! Kept as free functions rather than methods on [`pool_api::config::Pool`]
//! since most of them need the manifest, not just the pool being created.

use regex::Regex;

use pool_api::{
    config::{Manifest, Pool, PoolType},
    error::{PoolError, ValidationError},
};

/// Pool names become mount points, branch directory names, and LUKS mapper
/// name components; restricting them to this set keeps all three safe.
pub fn pool_name(name: &str) -> Result<(), PoolError> {
    let re = Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").expect("static pattern");
    if re.is_match(name) {
        Ok(())
    } else {
        Err(PoolError::new(ValidationError::InvalidName {
            name: name.to_string(),
        }))
    }
}

pub fn name_available(manifest: &Manifest, name: &str) -> Result<(), PoolError> {
    if manifest.pools.iter().any(|p| p.name == name) {
        return Err(PoolError::new(ValidationError::NameInUse {
            name: name.to_string(),
        }));
    }
    Ok(())
}

pub fn find_pool<'a>(manifest: &'a Manifest, name: &str) -> Result<&'a Pool, PoolError> {
    manifest
        .pools
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| {
            PoolError::new(ValidationError::NoSuchPool {
                name: name.to_string(),
            })
        })
}

pub fn minimum_devices(
    pool_type: PoolType,
    raid_level_name: &str,
    minimum: usize,
    actual: usize,
) -> Result<(), PoolError> {
    if actual < minimum {
        return Err(PoolError::new(ValidationError::NotEnoughDevices {
            raid_level: raid_level_name.to_string(),
            minimum,
            actual,
        }));
    }
    let _ = pool_type;
    Ok(())
}

pub fn passphrase_present(encrypted: bool, passphrase: Option<&str>, create_keyfile: bool) -> Result<(), PoolError> {
    if encrypted && !create_keyfile && passphrase.unwrap_or("").is_empty() {
        return Err(PoolError::new(ValidationError::MissingPassphrase));
    }
    Ok(())
}

/// A new parity device must be at least as large as the largest data
/// device, with a 100 MiB tolerance for marginally-smaller data.
pub fn parity_at_least_largest_data(parity_bytes: u64, largest_data_bytes: u64) -> Result<(), PoolError> {
    const TOLERANCE_BYTES: u64 = 100 * 1024 * 1024;
    if parity_bytes + TOLERANCE_BYTES < largest_data_bytes {
        return Err(PoolError::new(ValidationError::ParityTooSmall {
            parity_bytes,
            largest_data_bytes,
        }));
    }
    Ok(())
}

/// Only one NonRAID array may exist on a host; the kernel module has a
/// single `/proc/nmdcmd` instance, not one per pool.
pub fn no_existing_nonraid_pool(manifest: &Manifest) -> Result<(), PoolError> {
    if let Some(existing) = manifest.pools.iter().find(|p| p.pool_type == PoolType::Nonraid) {
        return Err(PoolError::new(
            pool_api::error::PreconditionError::NonRaidAlreadyExists {
                existing: existing.name.clone(),
            },
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_api::config::{options::PoolConfig, pool::PoolType as PT};

    fn pool(name: &str, pool_type: PT) -> Pool {
        Pool {
            id: "1".into(),
            name: name.into(),
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
    fn rejects_names_with_slashes() {
        assert!(pool_name("media/1").is_err());
        assert!(pool_name("media-1_ok").is_ok());
    }

    #[test]
    fn name_in_use_is_rejected() {
        let manifest = Manifest {
            version: 1,
            pools: vec![pool("media", PT::Xfs)],
        };
        assert!(name_available(&manifest, "media").is_err());
        assert!(name_available(&manifest, "backup").is_ok());
    }

    #[test]
    fn parity_within_tolerance_of_largest_data_is_accepted() {
        let largest = 10 * 1024 * 1024 * 1024u64;
        assert!(parity_at_least_largest_data(largest, largest).is_ok());
        assert!(parity_at_least_largest_data(largest - 50 * 1024 * 1024, largest).is_ok());
        assert!(parity_at_least_largest_data(largest - 200 * 1024 * 1024, largest).is_err());
    }

    #[test]
    fn second_nonraid_pool_is_refused() {
        let manifest = Manifest {
            version: 1,
            pools: vec![pool("array", PT::Nonraid)],
        };
        assert!(no_existing_nonraid_pool(&manifest).is_err());
    }
}
