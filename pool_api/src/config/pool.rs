use std::fmt::Display;

use serde::{Deserialize, Serialize};
use sysdefs::{filesystems::Filesystem, osuuid::OsUuid};

/// A single slot's worth of device state in the persisted manifest.
///
/// Slots are sparse strings, numerically ordered: removing a middle device
/// never renumbers the slots that remain, and the next `add` fills the
/// lowest free slot. See the identifier discipline in the crate-level docs
/// for what `id` means for each pool type and device role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DeviceRef {
    pub slot: String,
    pub id: OsUuid,
    pub filesystem: Filesystem,
    #[serde(default)]
    pub spindown: Option<u32>,
}

impl DeviceRef {
    /// Parses `slot` as an integer for sort/gap-finding purposes. Slots are
    /// always decimal digit strings; a non-numeric slot is a manifest
    /// integrity violation, not something callers should recover from.
    pub fn slot_number(&self) -> u32 {
        self.slot
            .parse()
            .unwrap_or_else(|_| panic!("non-numeric slot '{}' in manifest", self.slot))
    }
}

/// The pool types this manager can create and reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    Ext4,
    Xfs,
    Btrfs,
    Mergerfs,
    Nonraid,
}

impl Display for PoolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PoolType::Ext4 => "ext4",
            PoolType::Xfs => "xfs",
            PoolType::Btrfs => "btrfs",
            PoolType::Mergerfs => "mergerfs",
            PoolType::Nonraid => "nonraid",
        };
        f.write_str(s)
    }
}

impl PoolType {
    /// Single-device engines have a fixed filesystem equal to the pool type.
    pub fn single_device_filesystem(self) -> Option<Filesystem> {
        match self {
            PoolType::Ext4 => Some(Filesystem::Ext4),
            PoolType::Xfs => Some(Filesystem::Xfs),
            _ => None,
        }
    }

    pub fn is_single_device(self) -> bool {
        matches!(self, PoolType::Ext4 | PoolType::Xfs)
    }
}

/// A persisted pool. Every field here is written to `pools.json` verbatim;
/// runtime-only attributes live in [`crate::derived::PoolStatus`] instead so
/// the two representations can never be confused with each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub index: u32,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub automount: bool,
    #[serde(rename = "type")]
    pub pool_type: PoolType,
    pub data_devices: Vec<DeviceRef>,
    #[serde(default)]
    pub parity_devices: Vec<DeviceRef>,
    #[serde(default)]
    pub config: super::options::PoolConfig,
    /// Physical partition paths present at creation time, encrypted pools
    /// only; indexed identically to `data_devices`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
}

impl Pool {
    pub fn is_encrypted(&self) -> bool {
        self.config.encrypted
    }

    /// Lowest slot number not currently occupied by a data device.
    pub fn next_free_data_slot(&self) -> u32 {
        next_free_slot(self.data_devices.iter().map(DeviceRef::slot_number))
    }

    pub fn next_free_parity_slot(&self) -> u32 {
        next_free_slot(self.parity_devices.iter().map(DeviceRef::slot_number))
    }

    pub fn data_device_slot(&self, slot: &str) -> Option<&DeviceRef> {
        self.data_devices.iter().find(|d| d.slot == slot)
    }
}

fn next_free_slot(taken: impl Iterator<Item = u32>) -> u32 {
    let mut taken: Vec<u32> = taken.collect();
    taken.sort_unstable();
    let mut candidate = 1;
    for slot in taken {
        if slot == candidate {
            candidate += 1;
        } else if slot > candidate {
            break;
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(slot: &str) -> DeviceRef {
        DeviceRef {
            slot: slot.into(),
            id: OsUuid::from("AAAA-AAAA"),
            filesystem: Filesystem::Ext4,
            spindown: None,
        }
    }

    #[test]
    fn next_free_slot_fills_gap_left_by_removal() {
        assert_eq!(next_free_slot([1, 2, 4].into_iter()), 3);
        assert_eq!(next_free_slot([1, 2, 3].into_iter()), 4);
        assert_eq!(next_free_slot(std::iter::empty()), 1);
    }

    #[test]
    fn removing_middle_slot_does_not_renumber_others() {
        let mut pool = Pool {
            id: "1700000000000".into(),
            name: "media".into(),
            index: 0,
            comment: String::new(),
            automount: true,
            pool_type: PoolType::Mergerfs,
            data_devices: vec![dev("1"), dev("2"), dev("3")],
            parity_devices: vec![],
            config: Default::default(),
            devices: vec![],
        };
        pool.data_devices.retain(|d| d.slot != "2");
        assert_eq!(
            pool.data_devices.iter().map(|d| d.slot.as_str()).collect::<Vec<_>>(),
            vec!["1", "3"]
        );
        assert_eq!(pool.next_free_data_slot(), 2);
    }
}
