//! Capability interfaces the pool manager consumes but does not implement
//! itself. Defined here (a leaf module) and injected into
//! [`crate::manager::PoolManager`] at construction, rather than imported
//! lazily from inside an engine the way the source program's disk-inventory
//! lookup was wired.

use std::path::PathBuf;

/// Live power state of a physical disk, queried without spinning it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Active,
    Standby,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSummary {
    pub device: String,
    pub name: String,
    pub model: String,
    pub serial: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhancedDiskType {
    pub rotational: bool,
    pub removable: bool,
    pub usb: bool,
}

/// Host disk enumeration. Implementations must not wake a spun-down disk to
/// answer any of these queries.
pub trait DiskInventory: Send + Sync {
    fn all_disks(&self, skip_standby: bool) -> anyhow::Result<Vec<DiskSummary>>;
    fn enhanced_disk_type(&self, device: &str) -> anyhow::Result<EnhancedDiskType>;
    fn live_power_status(&self, device: &str) -> anyhow::Result<PowerState>;
}

/// Paths that other host services currently have mounted or otherwise
/// depend on, consulted by the safety guard before a destructive operation.
pub trait ServiceDependencyProbe: Send + Sync {
    fn docker_paths(&self) -> anyhow::Result<Vec<PathBuf>>;
    fn vm_paths(&self) -> anyhow::Result<Vec<PathBuf>>;
    fn lxc_paths(&self) -> anyhow::Result<Vec<PathBuf>>;

    fn all_dependent_paths(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut paths = self.docker_paths()?;
        paths.extend(self.vm_paths()?);
        paths.extend(self.lxc_paths()?);
        Ok(paths)
    }
}

/// Fire-and-forget event channel; the manager emits `pools:updated` on
/// every manifest write.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: &str, payload: &str);
}

/// An emitter that drops every event, for callers that don't need one.
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit(&self, _event: &str, _payload: &str) {}
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeDiskInventory {
        pub power: std::collections::HashMap<String, PowerState>,
    }

    impl DiskInventory for FakeDiskInventory {
        fn all_disks(&self, _skip_standby: bool) -> anyhow::Result<Vec<DiskSummary>> {
            Ok(vec![])
        }
        fn enhanced_disk_type(&self, _device: &str) -> anyhow::Result<EnhancedDiskType> {
            Ok(EnhancedDiskType { rotational: true, removable: false, usb: false })
        }
        fn live_power_status(&self, device: &str) -> anyhow::Result<PowerState> {
            Ok(*self.power.get(device).unwrap_or(&PowerState::Unknown))
        }
    }

    #[derive(Default)]
    pub struct FakeServiceDependencyProbe {
        pub docker: Vec<PathBuf>,
        pub vm: Vec<PathBuf>,
        pub lxc: Vec<PathBuf>,
    }

    impl ServiceDependencyProbe for FakeServiceDependencyProbe {
        fn docker_paths(&self) -> anyhow::Result<Vec<PathBuf>> {
            Ok(self.docker.clone())
        }
        fn vm_paths(&self) -> anyhow::Result<Vec<PathBuf>> {
            Ok(self.vm.clone())
        }
        fn lxc_paths(&self) -> anyhow::Result<Vec<PathBuf>> {
            Ok(self.lxc.clone())
        }
    }

    #[derive(Default)]
    pub struct FakeEventEmitter {
        pub events: Mutex<Vec<(String, String)>>,
    }

    impl EventEmitter for FakeEventEmitter {
        fn emit(&self, event: &str, payload: &str) {
            self.events.lock().unwrap().push((event.to_string(), payload.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    #[test]
    fn dependent_paths_merge_all_three_sources() {
        let probe = FakeServiceDependencyProbe {
            docker: vec![PathBuf::from("/mnt/media/appdata")],
            vm: vec![PathBuf::from("/mnt/media/domains/vm1.img")],
            lxc: vec![],
        };
        assert_eq!(probe.all_dependent_paths().unwrap().len(), 2);
    }

    #[test]
    fn fake_emitter_records_events() {
        let emitter = FakeEventEmitter::default();
        emitter.emit("pools:updated", "media");
        assert_eq!(emitter.events.lock().unwrap().len(), 1);
    }
}
