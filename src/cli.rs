use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    /// Logging verbosity [off, error, warn, info, debug, trace]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Info)]
    pub verbosity: LevelFilter,

    /// Print the external commands an operation would run instead of running them
    #[arg(global = true, long)]
    pub dry_run: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List every pool in the manifest
    List,

    /// Show the live status of one pool
    Status { id: String },

    /// List pool types this host can create
    PoolTypes,

    /// List physical disks visible to the host
    Disks {
        #[clap(long)]
        skip_standby: bool,
    },

    /// Create a single-device ext4/xfs pool
    CreateSingle {
        name: String,
        #[clap(value_enum)]
        pool_type: SingleDeviceType,
        device: PathBuf,
        #[clap(long)]
        encrypted: bool,
        #[clap(long)]
        passphrase: Option<String>,
        #[clap(long)]
        create_keyfile: bool,
    },

    /// Create a multi-device BTRFS pool
    CreateBtrfs {
        name: String,
        #[clap(value_enum)]
        raid_level: RaidLevelArg,
        #[clap(required = true)]
        devices: Vec<PathBuf>,
        #[clap(long)]
        encrypted: bool,
        #[clap(long)]
        passphrase: Option<String>,
    },

    /// Create a MergerFS union pool, optionally with SnapRAID parity
    CreateMergerfs {
        name: String,
        #[clap(required = true)]
        devices: Vec<PathBuf>,
        #[clap(long, default_value = "xfs")]
        filesystem: String,
        #[clap(long)]
        parity_devices: Vec<PathBuf>,
        #[clap(long, default_value = "mfs")]
        create_policy: String,
        #[clap(long, default_value = "ff")]
        search_policy: String,
        #[clap(long)]
        encrypted: bool,
        #[clap(long)]
        passphrase: Option<String>,
    },

    /// Create the host's NonRAID array
    CreateNonraid {
        name: String,
        #[clap(required = true)]
        data_devices: Vec<PathBuf>,
        #[clap(long)]
        parity_devices: Vec<PathBuf>,
        #[clap(long, default_value = "xfs")]
        filesystem: String,
        #[clap(long)]
        encrypted: bool,
        #[clap(long)]
        passphrase: Option<String>,
    },

    /// Mount a pool
    Mount {
        id: String,
        #[clap(long)]
        passphrase: Option<String>,
        /// Start a NonRAID array even if one or more data disks are missing
        #[clap(long)]
        mount_missing: bool,
    },

    /// Unmount a pool
    Unmount {
        id: String,
        #[clap(long)]
        force: bool,
    },

    /// Remove a pool from the manifest (unmounting it first if needed)
    Remove {
        id: String,
        #[clap(long)]
        force: bool,
    },

    /// Toggle whether a pool mounts automatically at boot
    Automount { id: String, enabled: bool },

    /// Update a pool's free-text comment
    Comment { id: String, comment: String },

    /// Reorder pools (first id gets index 0, and so on)
    Order {
        #[clap(required = true)]
        ids: Vec<String>,
    },

    /// Add one or more data devices to an existing pool
    AddDevices {
        id: String,
        #[clap(required = true)]
        devices: Vec<PathBuf>,
        #[clap(long)]
        passphrase: Option<String>,
    },

    /// Remove one or more data devices by slot from an existing pool
    RemoveDevices {
        id: String,
        #[clap(required = true)]
        slots: Vec<String>,
        #[clap(long)]
        force: bool,
    },

    /// Replace a single data device in place (BTRFS only)
    ReplaceDevice {
        id: String,
        slot: String,
        new_device: PathBuf,
        #[clap(long)]
        passphrase: Option<String>,
    },

    /// Add one or more parity devices to an existing pool
    AddParityDevices {
        id: String,
        #[clap(required = true)]
        devices: Vec<PathBuf>,
        #[clap(long)]
        passphrase: Option<String>,
    },

    /// Remove one or more parity devices by slot (MergerFS only)
    RemoveParityDevices {
        id: String,
        #[clap(required = true)]
        slots: Vec<String>,
        #[clap(long)]
        force: bool,
    },

    /// Replace a single parity device in place (MergerFS only)
    ReplaceParityDevice {
        id: String,
        slot: String,
        new_device: PathBuf,
        #[clap(long)]
        passphrase: Option<String>,
    },

    /// Replace multiple NonRAID devices at once (`slot=path`, e.g. `3=/dev/sdg`)
    ReplaceNonraidDevices {
        id: String,
        #[clap(required = true, value_parser = parse_slot_device)]
        replacements: Vec<(String, PathBuf)>,
        #[clap(long)]
        passphrase: Option<String>,
    },

    /// Convert a BTRFS pool between RAID levels
    ChangeRaidLevel {
        id: String,
        #[clap(value_enum)]
        raid_level: RaidLevelArg,
    },

    /// Run a SnapRAID operation against a MergerFS pool's parity
    Snapraid {
        id: String,
        #[clap(value_enum)]
        operation: SnapraidOperationArg,
        /// Mount points to restore, required for `fix`
        #[clap(long)]
        branch: Vec<PathBuf>,
    },

    /// Run a NonRAID array parity operation
    NonraidParity {
        id: String,
        #[clap(value_enum)]
        operation: NonraidOperationArg,
    },

    /// Wake, standby, or sleep a physical disk directly
    ControlDisk {
        device: PathBuf,
        #[clap(value_enum)]
        action: DiskActionArg,
    },

    /// Start (mount) or stop (unmount) a pool
    ControlPool {
        id: String,
        #[clap(value_enum)]
        action: PoolActionArg,
    },

    /// Update free-form pool config fields not covered by a dedicated command
    UpdateConfig {
        id: String,
        #[clap(long)]
        minfreespace: Option<String>,
        #[clap(long)]
        moveonenospc: Option<bool>,
        #[clap(long)]
        global_options: Option<String>,
        #[clap(long, value_enum)]
        md_writemode: Option<MdWriteModeArg>,
    },
}

fn parse_slot_device(raw: &str) -> Result<(String, PathBuf), String> {
    let (slot, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `slot=path`, got '{raw}'"))?;
    Ok((slot.to_string(), PathBuf::from(path)))
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum SnapraidOperationArg {
    Sync,
    Scrub,
    Check,
    Fix,
    ForceStop,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum NonraidOperationArg {
    Check,
    Scrub,
    Pause,
    Resume,
    Cancel,
    Auto,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiskActionArg {
    Wake,
    Standby,
    Sleep,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum PoolActionArg {
    Start,
    Stop,
    ForceStop,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum MdWriteModeArg {
    Normal,
    Turbo,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum SingleDeviceType {
    Ext4,
    Xfs,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum RaidLevelArg {
    Single,
    Raid0,
    Raid1,
    Raid10,
}
