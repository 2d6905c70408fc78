use crate::config::Paths;
use crate::error::{Error, Result};
use crate::version::{PhpVersion, Variant};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// One complete, usable installation. Records are only ever written after
/// the install directory is fully in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub version: PhpVersion,
    pub install_dir: PathBuf,
    pub installed_at: u64,
    pub checksum: Option<String>,
    pub source: String,
}

/// Everything phpvm persists, serialized as one JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub install_root: PathBuf,
    pub cache_root: PathBuf,
    pub active: Option<PhpVersion>,
    pub records: Vec<InstallRecord>,
}

/// Single source of truth for installed versions and the active pointer.
/// Every mutation rewrites `state.json` atomically (write-temp-then-rename),
/// so a crash never leaves a half-written state file behind.
pub struct StateStore {
    path: PathBuf,
    state: State,
}

impl StateStore {
    pub fn open(paths: &Paths) -> Result<Self> {
        let path = paths.state_file();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::State(format!("could not parse {}: {}", path.display(), e)))?
        } else {
            State {
                install_root: paths.default_install_root(),
                cache_root: paths.default_cache_root(),
                active: None,
                records: Vec::new(),
            }
        };
        Ok(StateStore { path, state })
    }

    /// Consistent copy for readers that must not observe a half-updated
    /// state.
    pub fn snapshot(&self) -> State {
        self.state.clone()
    }

    pub fn install_root(&self) -> &Path {
        &self.state.install_root
    }

    pub fn cache_root(&self) -> &Path {
        &self.state.cache_root
    }

    pub fn records(&self) -> &[InstallRecord] {
        &self.state.records
    }

    pub fn active(&self) -> Option<&PhpVersion> {
        self.state.active.as_ref()
    }

    /// Exact identity match.
    pub fn record(&self, version: &PhpVersion) -> Option<&InstallRecord> {
        self.state.records.iter().find(|r| &r.version == version)
    }

    /// Resolves an identity against the installed set. An exact match wins;
    /// an [`Variant::Unspecified`] query falls back to the first installed
    /// variant of the same base version.
    pub fn find_record(&self, version: &PhpVersion) -> Option<&InstallRecord> {
        if let Some(record) = self.record(version) {
            return Some(record);
        }
        if version.variant == Variant::Unspecified {
            return self
                .state
                .records
                .iter()
                .find(|r| r.version.same_base(version));
        }
        None
    }

    pub fn add_record(&mut self, record: InstallRecord) -> Result<()> {
        match self
            .state
            .records
            .iter_mut()
            .find(|r| r.version == record.version)
        {
            Some(existing) => *existing = record,
            None => self.state.records.push(record),
        }
        self.persist()
    }

    pub fn remove_record(&mut self, version: &PhpVersion) -> Result<()> {
        self.state.records.retain(|r| &r.version != version);
        if self.state.active.as_ref() == Some(version) {
            self.state.active = None;
        }
        self.persist()
    }

    /// Sets the active pointer. Activating an identity without a matching
    /// install record is a contract violation and is rejected.
    pub fn set_active(&mut self, version: Option<PhpVersion>) -> Result<()> {
        if let Some(ref v) = version {
            if self.record(v).is_none() {
                return Err(Error::NotFound(format!("installed version {}", v)));
            }
        }
        self.state.active = version;
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| Error::State("state path has no parent directory".to_string()))?;
        fs::create_dir_all(parent)?;
        let content = serde_json::to_string_pretty(&self.state)
            .map_err(|e| Error::State(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(version: &str) -> InstallRecord {
        let version = PhpVersion::parse(version).unwrap();
        InstallRecord {
            install_dir: PathBuf::from("/test").join(version.directory_name()),
            version,
            installed_at: unix_timestamp(),
            checksum: None,
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_open_defaults_when_missing() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(&Paths::with_base(dir.path())).unwrap();
        assert!(store.records().is_empty());
        assert_eq!(store.active(), None);
        assert_eq!(store.install_root(), dir.path().join("versions"));
    }

    #[test]
    fn test_mutations_survive_reload() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base(dir.path());
        let mut store = StateStore::open(&paths).unwrap();
        store.add_record(record("8.2.0-ts")).unwrap();
        store
            .set_active(Some(PhpVersion::parse("8.2.0-ts").unwrap()))
            .unwrap();

        let reloaded = StateStore::open(&paths).unwrap();
        assert_eq!(reloaded.records().len(), 1);
        assert_eq!(
            reloaded.active(),
            Some(&PhpVersion::parse("8.2.0-ts").unwrap())
        );
    }

    #[test]
    fn test_set_active_requires_record() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(&Paths::with_base(dir.path())).unwrap();
        let result = store.set_active(Some(PhpVersion::parse("8.2.0-ts").unwrap()));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_remove_record_clears_matching_active() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(&Paths::with_base(dir.path())).unwrap();
        let version = PhpVersion::parse("8.2.0-ts").unwrap();
        store.add_record(record("8.2.0-ts")).unwrap();
        store.set_active(Some(version.clone())).unwrap();
        store.remove_record(&version).unwrap();
        assert_eq!(store.active(), None);
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_find_record_resolves_unspecified_variant() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(&Paths::with_base(dir.path())).unwrap();
        store.add_record(record("8.2.0-nts")).unwrap();

        let bare = PhpVersion::parse("8.2.0").unwrap();
        let found = store.find_record(&bare).unwrap();
        assert_eq!(found.version, PhpVersion::parse("8.2.0-nts").unwrap());

        let ts = PhpVersion::parse("8.2.0-ts").unwrap();
        assert!(store.find_record(&ts).is_none());
    }
}
