use serde::{Deserialize, Serialize};

/// The tagged configuration bag attached to every pool. Which nested struct
/// is meaningful depends on `Pool::pool_type`; unused sections are simply
/// left at their defaults and round-trip through the manifest untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct PoolConfig {
    pub encrypted: bool,
    /// Only meaningful at creation time; never read back out of the manifest
    /// by any later operation.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub create_keyfile: bool,
    pub unclean_check: bool,
    pub raid_level: Option<RaidLevel>,
    pub policies: MergerfsPolicies,
    pub minfreespace: Option<String>,
    pub moveonenospc: bool,
    pub global_options: Option<String>,
    pub sync: SnapraidSchedule,
    pub md_writemode: Option<MdWriteMode>,
    pub check: CheckSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidLevel {
    Single,
    Raid0,
    Raid1,
    Raid10,
}

impl RaidLevel {
    pub fn minimum_devices(self) -> usize {
        match self {
            RaidLevel::Single => 1,
            RaidLevel::Raid0 | RaidLevel::Raid1 => 2,
            RaidLevel::Raid10 => 4,
        }
    }

    pub fn btrfs_profile_name(self) -> &'static str {
        match self {
            RaidLevel::Single => "single",
            RaidLevel::Raid0 => "raid0",
            RaidLevel::Raid1 => "raid1",
            RaidLevel::Raid10 => "raid10",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct MergerfsPolicies {
    pub create: Option<String>,
    pub read: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct SnapraidSchedule {
    pub enabled: bool,
    pub schedule: Option<String>,
    pub check: CheckSchedule,
    pub scrub: CheckSchedule,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct CheckSchedule {
    pub enabled: bool,
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdWriteMode {
    Normal,
    Turbo,
}
