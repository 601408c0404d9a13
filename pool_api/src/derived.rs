use crate::{config::PoolType, primitives::bytes::ByteCount};

/// Runtime state of a single device, computed fresh on every status query.
/// None of this is persisted; a device that won't answer (spun down, pulled)
/// simply carries `None` in the fields that require probing it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub slot: String,
    pub device_path: Option<String>,
    pub disk_type: Option<String>,
    pub disk_info: Option<String>,
    pub size: Option<ByteCount>,
    pub used: Option<ByteCount>,
    pub available: Option<ByteCount>,
    pub usage_percent: Option<u8>,
    pub standby: bool,
    pub temperature_celsius: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerStatus {
    Active,
    Standby,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStatus {
    Mounted,
    Unmounted,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParityOperation {
    Idle,
    Sync,
    Scrub,
    Check,
}

/// The enriched, read-only view returned by status queries. Kept as a
/// separate type from [`crate::config::Pool`] on purpose: the persisted
/// struct is what `pools.json` holds, this is what a live probe produces,
/// and conflating the two makes it too easy to accidentally serialize a
/// derived field into the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStatus {
    pub name: String,
    pub pool_type: PoolType,
    pub mount_point: Option<String>,
    pub status: MountStatus,
    pub devices: Vec<DeviceStatus>,
    pub parity_devices: Vec<DeviceStatus>,
    pub storage: Option<ByteCount>,
    pub power_status: PowerStatus,
    pub parity_operation: ParityOperation,
    pub parity_progress_percent: Option<u8>,
    pub parity_speed: Option<String>,
    pub parity_valid: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_status_defaults_to_unknown_when_no_device_probed() {
        let status = PoolStatus {
            name: "media".into(),
            pool_type: PoolType::Mergerfs,
            mount_point: None,
            status: MountStatus::Unmounted,
            devices: vec![],
            parity_devices: vec![],
            storage: None,
            power_status: PowerStatus::Unknown,
            parity_operation: ParityOperation::Idle,
            parity_progress_percent: None,
            parity_speed: None,
            parity_valid: None,
        };
        assert_eq!(status.power_status, PowerStatus::Unknown);
    }
}
