use std::{process::ExitCode, str::FromStr};

use anyhow::Error;
use clap::Parser;
use log::{error, info};

use poolmgr::{
    collaborators::NullEmitter,
    config::RuntimeConfig,
    engines,
    host::{HostDiskInventory, PathPrefixServiceProbe},
    manager::{DiskControlAction, PoolConfigUpdate, PoolControlAction, PoolManager},
    manifest::ManifestStore,
    parity::{nonraid::NonraidParityOperation, snapraid::SnapraidOperation},
};
use pool_api::{
    config::{options::MdWriteMode, pool::PoolType},
    error::PoolError,
};

mod cli;

use cli::{Cli, Commands, DiskActionArg, MdWriteModeArg, NonraidOperationArg, PoolActionArg, SnapraidOperationArg};

fn setup_logging(args: &Cli) -> Result<(), Error> {
    env_logger::builder().format_timestamp(None).filter_level(args.verbosity).init();
    Ok(())
}

fn build_manager() -> Result<PoolManager, Error> {
    let runtime = RuntimeConfig::from_file_or_default(None)?;
    let manifest = ManifestStore::new(runtime.manifest_path.clone());
    Ok(PoolManager::new(
        Box::new(HostDiskInventory),
        Box::new(PathPrefixServiceProbe::default()),
        Box::new(NullEmitter),
        manifest,
        runtime,
    ))
}

fn run(args: &Cli, manager: &PoolManager) -> Result<(), PoolError> {
    match &args.command {
        Commands::List => {
            for pool in manager.list_pools()? {
                println!("{}\t{}\t{}", pool.id, pool.name, pool.pool_type);
            }
        }
        Commands::Status { id } => {
            let status = manager.get_pool_status(id)?;
            println!("{status:#?}");
        }
        Commands::PoolTypes => {
            for t in manager.get_available_pool_types() {
                println!("{t}");
            }
        }
        Commands::Disks { skip_standby } => {
            for disk in manager.get_disk_status(*skip_standby)? {
                println!("{}\t{}\t{}\t{}", disk.device, disk.name, disk.model, disk.serial);
            }
        }
        Commands::CreateSingle { name, pool_type, device, encrypted, passphrase, create_keyfile } => {
            let pool_type = match pool_type {
                cli::SingleDeviceType::Ext4 => PoolType::Ext4,
                cli::SingleDeviceType::Xfs => PoolType::Xfs,
            };
            let req = engines::single::CreateRequest {
                name: name.clone(),
                pool_type,
                device: device.clone(),
                encrypted: *encrypted,
                passphrase: passphrase.clone(),
                create_keyfile: *create_keyfile,
                automount: true,
                comment: String::new(),
            };
            let pool = manager.create_single_device_pool(req)?;
            println!("created pool '{}' ({})", pool.name, pool.id);
        }
        Commands::CreateBtrfs { name, raid_level, devices, encrypted, passphrase } => {
            let raid_level = raid_level_from_arg(*raid_level);
            let req = engines::btrfs::CreateRequest {
                name: name.clone(),
                devices: devices.clone(),
                raid_level,
                encrypted: *encrypted,
                passphrase: passphrase.clone(),
                create_keyfile: false,
                automount: true,
                comment: String::new(),
            };
            let pool = manager.create_multi_device_pool(req)?;
            println!("created pool '{}' ({})", pool.name, pool.id);
        }
        Commands::CreateMergerfs {
            name,
            devices,
            filesystem,
            parity_devices,
            create_policy,
            search_policy,
            encrypted,
            passphrase,
        } => {
            let filesystem = sysdefs::filesystems::Filesystem::from_str(filesystem)
                .map_err(|e| PoolError::new(pool_api::error::ValidationError::Other(e)))?;
            let req = engines::mergerfs::CreateRequest {
                name: name.clone(),
                devices: devices.clone(),
                filesystem,
                parity_devices: parity_devices.clone(),
                create_policy: create_policy.clone(),
                search_policy: search_policy.clone(),
                encrypted: *encrypted,
                passphrase: passphrase.clone(),
                create_keyfile: false,
                automount: true,
                comment: String::new(),
            };
            let pool = manager.create_mergerfs_pool(req)?;
            println!("created pool '{}' ({})", pool.name, pool.id);
        }
        Commands::CreateNonraid { name, data_devices, parity_devices, filesystem, encrypted, passphrase } => {
            let filesystem = sysdefs::filesystems::Filesystem::from_str(filesystem)
                .map_err(|e| PoolError::new(pool_api::error::ValidationError::Other(e)))?;
            let req = engines::nonraid::CreateRequest {
                name: name.clone(),
                data_devices: data_devices.clone(),
                parity_devices: parity_devices.clone(),
                filesystem,
                encrypted: *encrypted,
                passphrase: passphrase.clone(),
                create_keyfile: false,
                automount: true,
                comment: String::new(),
                md_writemode: MdWriteMode::Normal,
                parity_valid: false,
            };
            let pool = manager.create_nonraid_pool(req)?;
            println!("created pool '{}' ({})", pool.name, pool.id);
        }
        Commands::Mount { id, passphrase, mount_missing } => manager.mount_pool_by_id(id, passphrase.clone(), *mount_missing)?,
        Commands::Unmount { id, force } => manager.unmount_pool_by_id(id, *force)?,
        Commands::Remove { id, force } => manager.remove_pool_by_id(id, *force)?,
        Commands::Automount { id, enabled } => manager.toggle_automount_by_id(id, *enabled)?,
        Commands::Comment { id, comment } => manager.update_pool_comment(id, comment.clone())?,
        Commands::Order { ids } => manager.update_pools_order(ids.clone())?,
        Commands::AddDevices { id, devices, passphrase } => manager.add_devices_to_pool(id, devices.clone(), passphrase.clone())?,
        Commands::RemoveDevices { id, slots, force } => manager.remove_devices_from_pool(id, slots.clone(), *force)?,
        Commands::ReplaceDevice { id, slot, new_device, passphrase } => {
            manager.replace_device_in_pool(id, slot, new_device.clone(), passphrase.clone())?
        }
        Commands::AddParityDevices { id, devices, passphrase } => manager.add_parity_devices_to_pool(id, devices.clone(), passphrase.clone())?,
        Commands::RemoveParityDevices { id, slots, force } => manager.remove_parity_devices_from_pool(id, slots.clone(), *force)?,
        Commands::ReplaceParityDevice { id, slot, new_device, passphrase } => {
            manager.replace_parity_device_in_pool(id, slot, new_device.clone(), passphrase.clone())?
        }
        Commands::ReplaceNonraidDevices { id, replacements, passphrase } => {
            manager.replace_devices_in_nonraid_pool(id, replacements.clone(), passphrase.clone())?
        }
        Commands::ChangeRaidLevel { id, raid_level } => manager.change_pool_raid_level(id, raid_level_from_arg(*raid_level))?,
        Commands::Snapraid { id, operation, branch } => {
            let operation = match operation {
                SnapraidOperationArg::Sync => SnapraidOperation::Sync,
                SnapraidOperationArg::Scrub => SnapraidOperation::Scrub,
                SnapraidOperationArg::Check => SnapraidOperation::Check,
                SnapraidOperationArg::Fix => SnapraidOperation::Fix,
                SnapraidOperationArg::ForceStop => SnapraidOperation::ForceStop,
            };
            manager.execute_snapraid_operation(id, operation, branch.clone())?
        }
        Commands::NonraidParity { id, operation } => {
            let operation = match operation {
                NonraidOperationArg::Check => NonraidParityOperation::Check,
                NonraidOperationArg::Scrub => NonraidParityOperation::Scrub,
                NonraidOperationArg::Pause => NonraidParityOperation::Pause,
                NonraidOperationArg::Resume => NonraidParityOperation::Resume,
                NonraidOperationArg::Cancel => NonraidParityOperation::Cancel,
                NonraidOperationArg::Auto => NonraidParityOperation::Auto,
            };
            manager.execute_nonraid_parity_operation(id, operation)?
        }
        Commands::ControlDisk { device, action } => {
            let action = match action {
                DiskActionArg::Wake => DiskControlAction::Wake,
                DiskActionArg::Standby => DiskControlAction::Standby,
                DiskActionArg::Sleep => DiskControlAction::Sleep,
            };
            manager.control_disk(device, action)?
        }
        Commands::ControlPool { id, action } => {
            let action = match action {
                PoolActionArg::Start => PoolControlAction::Start,
                PoolActionArg::Stop => PoolControlAction::Stop,
                PoolActionArg::ForceStop => PoolControlAction::ForceStop,
            };
            manager.control_pool(id, action)?
        }
        Commands::UpdateConfig { id, minfreespace, moveonenospc, global_options, md_writemode } => {
            let update = PoolConfigUpdate {
                minfreespace: minfreespace.clone(),
                moveonenospc: *moveonenospc,
                global_options: global_options.clone(),
                md_writemode: md_writemode.map(|m| match m {
                    MdWriteModeArg::Normal => MdWriteMode::Normal,
                    MdWriteModeArg::Turbo => MdWriteMode::Turbo,
                }),
                ..Default::default()
            };
            manager.update_pool_config(id, update)?
        }
    }
    Ok(())
}

fn raid_level_from_arg(arg: cli::RaidLevelArg) -> pool_api::config::options::RaidLevel {
    use pool_api::config::options::RaidLevel;
    match arg {
        cli::RaidLevelArg::Single => RaidLevel::Single,
        cli::RaidLevelArg::Raid0 => RaidLevel::Raid0,
        cli::RaidLevelArg::Raid1 => RaidLevel::Raid1,
        cli::RaidLevelArg::Raid10 => RaidLevel::Raid10,
    }
}

fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(e) = setup_logging(&args) {
        eprintln!("failed to initialize logging: {e:?}");
        return ExitCode::from(1);
    }

    let manager = match build_manager() {
        Ok(manager) => manager,
        Err(e) => {
            error!("failed to initialize pool manager: {e:?}");
            return ExitCode::from(1);
        }
    };

    match run(&args, &manager) {
        Ok(()) => {
            info!("command completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("command failed: {e}");
            ExitCode::from(2)
        }
    }
}
