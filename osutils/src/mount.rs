use std::{path::Path, thread, time::Duration};

use log::warn;
use pool_api::error::{PoolError, PoolResultExt, ReportError, SubsystemError};

use crate::{block_devices, dependencies::Dependency, files, findmnt, fuser, mountpoint};

/// Creates `mount_dir` with the given ownership if it doesn't exist yet, then
/// mounts `path` there. Mounts by filesystem UUID when one is known, so the
/// pool survives the underlying device renaming across a reboot; falls back
/// to mounting by path otherwise. A no-op success if `path` is already
/// mounted exactly at `mount_dir`.
pub fn mount_device(
    path: impl AsRef<Path>,
    mount_dir: impl AsRef<Path>,
    owner_uid: u32,
    owner_gid: u32,
) -> Result<(), PoolError> {
    let path = path.as_ref();
    let mount_dir = mount_dir.as_ref();

    if mountpoint::check_is_mountpoint(mount_dir)? {
        let sub_mounts = findmnt::sub_mounts(mount_dir)?;
        if sub_mounts.iter().any(|m| Path::new(m) == mount_dir) || sub_mounts.is_empty() {
            return Ok(());
        }
    }

    if !mount_dir.exists() {
        files::create_dirs(mount_dir).structured(SubsystemError {
            command: "mkdir".into(),
            detail: format!("failed to create mount point '{}'", mount_dir.display()),
        })?;
        // Ownership failures are non-fatal: the mount itself still succeeds.
        if let Err(e) = files::chown_recursive(mount_dir, owner_uid, owner_gid) {
            warn!("failed to chown mount point '{}': {e}", mount_dir.display());
        }
    }

    let source = match block_devices::device_uuid(path) {
        Ok(uuid) => format!("UUID={uuid}"),
        Err(_) => path.display().to_string(),
    };

    Dependency::Mount
        .cmd()
        .arg(&source)
        .arg(mount_dir)
        .run_and_check()
        .message(format!(
            "while mounting '{}' at '{}'",
            path.display(),
            mount_dir.display()
        ))
}

/// Unmounts `mount_dir`. The first attempt is a plain `umount` (`-f` if
/// `force`); on failure, up to `retries - 1` lazy `umount -l` attempts follow
/// with a 1.5s backoff between them. `remove_directory` is best-effort and
/// never turns a successful unmount into a failure.
pub fn unmount_device(
    mount_dir: impl AsRef<Path>,
    force: bool,
    remove_directory: bool,
    retries: u32,
) -> Result<(), PoolError> {
    let mount_dir = mount_dir.as_ref();

    let mut attempt = Dependency::Umount.cmd();
    if force {
        attempt.arg("-f");
    }
    let mut last_err = match attempt.arg(mount_dir).run_and_check() {
        Ok(()) => {
            maybe_remove_directory(mount_dir, remove_directory);
            return Ok(());
        }
        Err(e) => e,
    };

    for _ in 0..retries.saturating_sub(1) {
        thread::sleep(Duration::from_millis(1500));
        match Dependency::Umount.cmd().arg("-l").arg(mount_dir).run_and_check() {
            Ok(()) => {
                maybe_remove_directory(mount_dir, remove_directory);
                return Ok(());
            }
            Err(e) => last_err = e,
        }
    }

    if let Ok(pids) = fuser::run(mount_dir) {
        if !pids.is_empty() {
            warn!("'{}' is still held open by pids {:?}", mount_dir.display(), pids);
        }
    }

    Err(last_err).message(format!("while unmounting '{}'", mount_dir.display()))
}

fn maybe_remove_directory(mount_dir: &Path, remove_directory: bool) {
    if !remove_directory {
        return;
    }
    if let Err(e) = files::remove_dir_if_present(mount_dir) {
        warn!("failed to remove mount directory '{}': {e}", mount_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_zero_means_single_attempt() {
        // retries.saturating_sub(1) == 0 lazy attempts beyond the first plain one.
        assert_eq!(1u32.saturating_sub(1), 0);
        assert_eq!(3u32.saturating_sub(1), 2);
    }
}
