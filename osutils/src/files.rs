use std::path::Path;

use anyhow::{Context, Error};
use nix::unistd::{Gid, Uid};

/// Creates all directories in a path if they don't exist.
pub fn create_dirs(path: impl AsRef<Path>) -> Result<(), Error> {
    std::fs::create_dir_all(path.as_ref())
        .with_context(|| format!("Could not create path: {}", path.as_ref().display()))
}

pub fn remove_dir_if_present(path: impl AsRef<Path>) -> Result<(), Error> {
    if path.as_ref().exists() {
        std::fs::remove_dir_all(path.as_ref())
            .with_context(|| format!("Could not remove path: {}", path.as_ref().display()))?;
    }
    Ok(())
}

/// Recursively chowns `path` to the given uid/gid.
pub fn chown_recursive(path: impl AsRef<Path>, uid: u32, gid: u32) -> Result<(), Error> {
    chown_one(path.as_ref(), uid, gid)?;
    if path.as_ref().is_dir() {
        for entry in std::fs::read_dir(path.as_ref())
            .with_context(|| format!("Failed to read directory '{}'", path.as_ref().display()))?
        {
            chown_recursive(entry?.path(), uid, gid)?;
        }
    }
    Ok(())
}

fn chown_one(path: &Path, uid: u32, gid: u32) -> Result<(), Error> {
    nix::unistd::chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
        .with_context(|| format!("Failed to chown '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_dirs_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        create_dirs(&nested).unwrap();
        create_dirs(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn remove_dir_if_present_tolerates_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        remove_dir_if_present(&missing).unwrap();
    }
}
