use std::path::Path;

use osutils::findmnt;
use pool_api::error::{PoolError, PreconditionError};

use crate::collaborators::ServiceDependencyProbe;

/// Guards destructive operations (unmount, remove, or a mutation that
/// implies one) with two checks, both bypassed by `force: true`: a
/// sub-mount scan under the pool root, and a dependent-service path scan.
pub struct SafetyGuard<'a> {
    service_probe: &'a dyn ServiceDependencyProbe,
}

impl<'a> SafetyGuard<'a> {
    pub fn new(service_probe: &'a dyn ServiceDependencyProbe) -> Self {
        Self { service_probe }
    }

    /// `branch_mounts` are currently-mounted MergerFS/NonRAID branch paths
    /// (e.g. `/var/mergerfs/<name>/disk<slot>`) also checked for dependents,
    /// in addition to the pool root itself.
    pub fn check(
        &self,
        pool_name: &str,
        pool_root: &Path,
        branch_mounts: &[std::path::PathBuf],
        force: bool,
    ) -> Result<(), PoolError> {
        if force {
            return Ok(());
        }

        let sub_mounts = findmnt::sub_mounts(pool_root)?;
        if !sub_mounts.is_empty() {
            return Err(PoolError::new(PreconditionError::BusySubMounts {
                name: pool_name.to_string(),
                mounts: sub_mounts,
            }));
        }

        let dependents = self
            .service_probe
            .all_dependent_paths()
            .map_err(|e| PoolError::with_source(
                PreconditionError::DependentServices { name: pool_name.to_string(), paths: vec![] },
                e,
            ))?;

        let offending: Vec<String> = dependents
            .iter()
            .filter(|p| p.starts_with(pool_root) || branch_mounts.iter().any(|b| p.starts_with(b)))
            .map(|p| p.display().to_string())
            .collect();

        if !offending.is_empty() {
            return Err(PoolError::new(PreconditionError::DependentServices {
                name: pool_name.to_string(),
                paths: offending,
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::FakeServiceDependencyProbe;
    use pool_api::error::ErrorKind;
    use std::path::PathBuf;

    #[test]
    fn force_bypasses_all_checks() {
        let probe = FakeServiceDependencyProbe {
            docker: vec![PathBuf::from("/mnt/media/appdata")],
            ..Default::default()
        };
        let guard = SafetyGuard::new(&probe);
        guard
            .check("media", Path::new("/mnt/media"), &[], true)
            .unwrap();
    }

    #[test]
    fn blocks_when_dependent_path_resolves_under_pool_root() {
        let probe = FakeServiceDependencyProbe {
            docker: vec![PathBuf::from("/mnt/media/appdata")],
            ..Default::default()
        };
        let guard = SafetyGuard::new(&probe);
        let err = guard
            .check("media", Path::new("/mnt/media"), &[], false)
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Precondition(_)));
    }
}
