use std::{path::Path, thread, time::Duration};

use pool_api::error::{PoolError, PoolResultExt};

use crate::dependencies::Dependency;

const REPLACE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// `mkfs.btrfs -f -d <raid> -m <raid> -L <name> <dev...>`. Callers enforce
/// the minimum-device constraint for `raid_level` before calling this.
pub fn make_filesystem(
    name: &str,
    raid_level: &str,
    devices: &[impl AsRef<Path>],
) -> Result<(), PoolError> {
    let mut cmd = Dependency::MkfsBtrfs.cmd();
    cmd.arg("-f")
        .arg("-d")
        .arg(raid_level)
        .arg("-m")
        .arg(raid_level)
        .arg("-L")
        .arg(name);
    for device in devices {
        cmd.arg(device.as_ref());
    }
    cmd.run_and_check()
        .message(format!("while creating btrfs filesystem '{name}'"))
}

/// Member device paths as reported by `btrfs filesystem show <mountpoint>`,
/// used to re-read display paths after mount on non-encrypted pools.
pub fn filesystem_show(mount_point: impl AsRef<Path>) -> Result<Vec<String>, PoolError> {
    let output = Dependency::Btrfs
        .cmd()
        .arg("filesystem")
        .arg("show")
        .arg(mount_point.as_ref())
        .output_and_check()?;
    Ok(parse_filesystem_show(&output))
}

fn parse_filesystem_show(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("devid"))
        .filter_map(|rest| rest.rsplit_once("path ").map(|(_, path)| path.trim().to_string()))
        .collect()
}

pub fn device_add(mount_point: impl AsRef<Path>, device: impl AsRef<Path>) -> Result<(), PoolError> {
    Dependency::Btrfs
        .cmd()
        .arg("device")
        .arg("add")
        .arg(device.as_ref())
        .arg(mount_point.as_ref())
        .run_and_check()
        .message(format!("while adding '{}' to btrfs pool", device.as_ref().display()))
}

pub fn device_remove(mount_point: impl AsRef<Path>, device: impl AsRef<Path>) -> Result<(), PoolError> {
    Dependency::Btrfs
        .cmd()
        .arg("device")
        .arg("remove")
        .arg(device.as_ref())
        .arg(mount_point.as_ref())
        .run_and_check()
        .message(format!(
            "while removing '{}' from btrfs pool",
            device.as_ref().display()
        ))
}

/// Starts `btrfs replace` and polls `btrfs replace status` every 5s until it
/// reports completion. Blocking: the caller's thread is tied up for as long
/// as the replace takes.
pub fn device_replace(
    mount_point: impl AsRef<Path>,
    old_devid: &str,
    new_device: impl AsRef<Path>,
) -> Result<(), PoolError> {
    let mount_point = mount_point.as_ref();

    Dependency::Btrfs
        .cmd()
        .arg("replace")
        .arg("start")
        .arg(old_devid)
        .arg(new_device.as_ref())
        .arg(mount_point)
        .run_and_check()
        .message("while starting btrfs replace")?;

    loop {
        let status = Dependency::Btrfs
            .cmd()
            .arg("replace")
            .arg("status")
            .arg(mount_point)
            .output_and_check()?;
        if status.contains("finished") {
            return Ok(());
        }
        thread::sleep(REPLACE_POLL_INTERVAL);
    }
}

/// `btrfs balance start -dconvert=<L> -mconvert=<L>`. Free-space refusal for
/// raid0→raid1 is checked by the caller against enrichment data before this
/// is invoked.
pub fn balance_convert(mount_point: impl AsRef<Path>, raid_level: &str) -> Result<(), PoolError> {
    Dependency::Btrfs
        .cmd()
        .arg("balance")
        .arg("start")
        .arg(format!("-dconvert={raid_level}"))
        .arg(format!("-mconvert={raid_level}"))
        .arg(mount_point.as_ref())
        .run_and_check()
        .message(format!("while converting btrfs pool to raid level '{raid_level}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_paths_from_filesystem_show() {
        let sample = "Label: 'media'  uuid: abc-123\n\
            \tTotal devices 2 FS bytes used 1.00GiB\n\
            \tdevid    1 size 10.00GiB used 2.00GiB path /dev/mapper/media_1p1\n\
            \tdevid    2 size 10.00GiB used 2.00GiB path /dev/mapper/media_2p1\n";
        assert_eq!(
            parse_filesystem_show(sample),
            vec!["/dev/mapper/media_1p1", "/dev/mapper/media_2p1"]
        );
    }
}
