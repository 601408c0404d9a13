use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use log::warn;
use pool_api::error::{PoolError, PoolResultExt, ReportError, SubsystemError};
use regex::Regex;

use crate::{blkid, dependencies::Dependency, lsblk, udevadm};

/// True if `path` is already a partition node (as opposed to a whole disk),
/// judged purely from its name: `sd*N`, `nvme*pN`, `vd*N`, `hd*N`, or
/// anything under `/dev/mapper/`.
fn looks_like_partition(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if path.starts_with("/dev/mapper/") {
        return true;
    }
    let re = Regex::new(r"^(sd[a-z]+\d+|vd[a-z]+\d+|hd[a-z]+\d+|nvme\d+n\d+p\d+)$").unwrap();
    re.is_match(name)
}

fn derived_partition_path(disk: &Path) -> PathBuf {
    let name = disk.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.starts_with("nvme") || disk.starts_with("/dev/mapper/") {
        PathBuf::from(format!("{}p1", disk.display()))
    } else {
        PathBuf::from(format!("{}1", disk.display()))
    }
}

/// If `path` is already a partition, returns it unchanged. Otherwise writes
/// a fresh GPT label with a single primary partition spanning the whole
/// disk and returns the partition it created.
pub fn ensure_partition(path: impl AsRef<Path>) -> Result<PathBuf, PoolError> {
    let path = path.as_ref();
    if looks_like_partition(path) {
        return Ok(path.to_path_buf());
    }

    Dependency::Parted
        .cmd()
        .arg("--script")
        .arg(path)
        .arg("mklabel")
        .arg("gpt")
        .arg("mkpart")
        .arg("primary")
        .arg("2048s")
        .arg("100%")
        .run_and_check()
        .message(format!("while partitioning '{}'", path.display()))?;

    thread::sleep(Duration::from_millis(500));

    if let Err(e) = Dependency::Partprobe.cmd().arg(path).run_and_check() {
        warn!("partprobe failed for '{}': {e}", path.display());
    }
    udevadm::settle()?;

    Ok(derived_partition_path(path))
}

/// Outcome of probing a device for an existing filesystem.
pub struct FilesystemProbe {
    pub filesystem: String,
    /// The device that actually carries the filesystem: `path` itself, or
    /// one of its partitions if `path` is a bare partitioned disk.
    pub actual_device: PathBuf,
}

/// Checks whether `path` already carries a filesystem. A device that only
/// has a partition table (no recognized filesystem on the whole-disk node)
/// is *not* considered formatted; its partitions are probed instead, and
/// the first one with a real filesystem is reported with `actual_device`
/// pointing at the partition rather than the disk.
pub fn check_device_filesystem(path: impl AsRef<Path>) -> Result<Option<FilesystemProbe>, PoolError> {
    let path = path.as_ref();

    if let Some(fstype) = blkid::probe_type(path).unwrap_or(None) {
        return Ok(Some(FilesystemProbe {
            filesystem: fstype,
            actual_device: path.to_path_buf(),
        }));
    }

    if blkid::partition_table_type(path).unwrap_or(None).is_some() {
        for partition in lsblk::partitions_of(path)? {
            let part_path = PathBuf::from(&partition.name);
            if let Some(fstype) = partition.fstype {
                return Ok(Some(FilesystemProbe {
                    filesystem: fstype,
                    actual_device: part_path,
                }));
            }
        }
    }

    Ok(None)
}

pub fn device_uuid(path: impl AsRef<Path>) -> Result<String, PoolError> {
    blkid::filesystem_uuid(path)
}

pub fn device_partuuid(path: impl AsRef<Path>) -> Result<String, PoolError> {
    blkid::partition_uuid(path)
}

/// Scans `/dev/disk/by-id/` for the first stable link to `path` that isn't
/// a `wwn-`/`scsi-` alias (those aren't guaranteed model/serial-derived and
/// churn across controller rescans).
pub fn device_by_id_path(path: impl AsRef<Path>) -> Result<PathBuf, PoolError> {
    let path = path.as_ref();
    let canonical = fs::canonicalize(path).structured(SubsystemError {
        command: "by-id lookup".into(),
        detail: format!("failed to canonicalize '{}'", path.display()),
    })?;

    let mut entries: Vec<PathBuf> = fs::read_dir("/dev/disk/by-id/")
        .structured(SubsystemError {
            command: "by-id lookup".into(),
            detail: "failed to read /dev/disk/by-id/".into(),
        })?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            !name.starts_with("wwn-") && !name.starts_with("scsi-")
        })
        .filter(|p| fs::canonicalize(p).map(|c| c == canonical).unwrap_or(false))
        .collect();
    entries.sort();

    entries.into_iter().next().ok_or_else(|| {
        PoolError::new(SubsystemError {
            command: "by-id lookup".into(),
            detail: format!("no stable by-id link found for '{}'", path.display()),
        })
    })
}

/// Device size in bytes via `blockdev --getsize64`.
pub fn device_size(path: impl AsRef<Path>) -> Result<u64, PoolError> {
    let output = Dependency::Blockdev
        .cmd()
        .arg("--getsize64")
        .arg(path.as_ref())
        .output_and_check()?;
    output.trim().parse().structured(SubsystemError {
        command: Dependency::Blockdev.name().into(),
        detail: format!("unparseable size output '{output}'"),
    })
}

/// Device size in KB, matching NonRAID's `import` command convention
/// (sectors / 2 via `blockdev --getsz`).
pub fn device_size_kb(path: impl AsRef<Path>) -> Result<u64, PoolError> {
    let output = Dependency::Blockdev
        .cmd()
        .arg("--getsz")
        .arg(path.as_ref())
        .output_and_check()?;
    let sectors: u64 = output.trim().parse().structured(SubsystemError {
        command: Dependency::Blockdev.name().into(),
        detail: format!("unparseable sector count '{output}'"),
    })?;
    Ok(sectors / 2)
}

/// Resolves a `/dev/disk/by-uuid/<uuid>` symlink with `readlink` semantics
/// only: never stats or opens the target, so a spun-down disk is not woken
/// just to answer "what does this UUID point at".
pub fn real_path_from_uuid(uuid: &str) -> Result<PathBuf, PoolError> {
    real_path_from_symlink(Path::new("/dev/disk/by-uuid").join(uuid))
}

pub fn real_path_from_id(id: &str) -> Result<PathBuf, PoolError> {
    real_path_from_symlink(Path::new("/dev/disk/by-id").join(id))
}

fn real_path_from_symlink(link: PathBuf) -> Result<PathBuf, PoolError> {
    let target = fs::read_link(&link).structured(SubsystemError {
        command: "readlink".into(),
        detail: format!("failed to read symlink '{}'", link.display()),
    })?;
    Ok(if target.is_absolute() {
        target
    } else {
        link.parent().unwrap_or(Path::new("/")).join(target)
    })
}

/// Triggers udev and waits for the event queue to settle, refreshing
/// `/dev/disk/by-*` symlinks after a partition table change.
pub fn refresh_device_symlinks() -> Result<(), PoolError> {
    udevadm::trigger()?;
    udevadm::settle()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_existing_partitions_by_name() {
        assert!(looks_like_partition(Path::new("/dev/sda1")));
        assert!(looks_like_partition(Path::new("/dev/nvme0n1p1")));
        assert!(looks_like_partition(Path::new("/dev/mapper/media_1")));
        assert!(!looks_like_partition(Path::new("/dev/sda")));
        assert!(!looks_like_partition(Path::new("/dev/nvme0n1")));
    }

    #[test]
    fn derives_partition_suffix_by_device_naming_scheme() {
        assert_eq!(
            derived_partition_path(Path::new("/dev/sda")),
            PathBuf::from("/dev/sda1")
        );
        assert_eq!(
            derived_partition_path(Path::new("/dev/nvme0n1")),
            PathBuf::from("/dev/nvme0n1p1")
        );
        assert_eq!(
            derived_partition_path(Path::new("/dev/mapper/media_1")),
            PathBuf::from("/dev/mapper/media_1p1")
        );
    }
}
