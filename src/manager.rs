use crate::activate;
use crate::cache::ContentCache;
use crate::config::Paths;
use crate::download::ProgressSender;
use crate::error::Result;
use crate::install::Installer;
use crate::platform;
use crate::provider::{PhpNetProvider, ReleaseProvider, VersionInfo};
use crate::state::{InstallRecord, State, StateStore};
use crate::version::{PhpVersion, Variant};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::time::UNIX_EPOCH;

/// Derived view of one version: installed/active state joined with the
/// provider's catalog metadata. `online: None` means the provider could not
/// be reached; unknown is never reported as offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionStatus {
    pub version: PhpVersion,
    pub installed: bool,
    pub active: bool,
    pub online: Option<bool>,
    pub install_path: Option<PathBuf>,
    pub release_date: Option<String>,
    pub eol_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStatus {
    pub is_set: bool,
    pub current_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFile {
    pub hash: String,
    pub size: u64,
    /// Unix timestamp of the last modification.
    pub modified: u64,
    /// Version the archive belongs to, when an install record still knows
    /// its checksum.
    pub version: Option<String>,
}

struct Core {
    state: StateStore,
    cache: ContentCache,
    installer: Installer,
}

/// Facade over the whole version lifecycle. Every structural operation
/// (install, remove, switch, cache maintenance) runs under one exclusive
/// lock for its full duration; queries read a consistent snapshot and never
/// block behind a long-running operation's I/O... except to take the
/// snapshot itself.
pub struct PhpManager {
    paths: Paths,
    provider: Box<dyn ReleaseProvider>,
    core: Mutex<Core>,
}

impl PhpManager {
    pub fn new() -> Result<Self> {
        Self::with_paths(Paths::discover(), Box::new(PhpNetProvider::new()?))
    }

    /// Builds a manager rooted at explicit paths with a caller-supplied
    /// provider. This is the seam embedders and tests use.
    pub fn with_paths(paths: Paths, provider: Box<dyn ReleaseProvider>) -> Result<Self> {
        let state = StateStore::open(&paths)?;
        let cache = ContentCache::open(state.cache_root())?;
        let installer = Installer::new()?;
        Ok(PhpManager {
            paths,
            provider,
            core: Mutex::new(Core {
                state,
                cache,
                installer,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Core> {
        // A poisoned lock means a panic mid-operation; the on-disk state is
        // still consistent (mutations persist atomically), so carry on.
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot(&self) -> State {
        self.lock().state.snapshot()
    }

    /// Installs a version, streaming progress events to `progress` and
    /// honoring `cancel`. Holding the facade lock for the whole operation
    /// means a concurrent `install` of the same identity blocks and then
    /// short-circuits through the idempotence check.
    pub fn install(
        &self,
        version: &PhpVersion,
        progress: Option<&ProgressSender>,
        cancel: Option<&AtomicBool>,
    ) -> Result<InstallRecord> {
        let mut guard = self.lock();
        let core = &mut *guard;
        core.installer.install(
            &self.paths,
            &mut core.state,
            &core.cache,
            self.provider.as_ref(),
            version,
            progress,
            cancel,
        )
    }

    pub fn remove(&self, version: &PhpVersion) -> Result<()> {
        let mut guard = self.lock();
        activate::remove(&self.paths, &mut guard.state, version)
    }

    pub fn switch(&self, version: &PhpVersion) -> Result<()> {
        let mut guard = self.lock();
        activate::activate(&self.paths, &mut guard.state, version)
    }

    pub fn list_installed(&self) -> Vec<PhpVersion> {
        self.snapshot()
            .records
            .iter()
            .map(|r| r.version.clone())
            .collect()
    }

    pub fn get_active(&self) -> Option<PhpVersion> {
        self.snapshot().active
    }

    /// Executable path of the active version, if one is active and its
    /// install record is still present.
    pub fn active_executable(&self) -> Option<PathBuf> {
        let snapshot = self.snapshot();
        let active = snapshot.active.as_ref()?;
        let record = snapshot.records.iter().find(|r| &r.version == active)?;
        Some(platform::php_executable_path(&record.install_dir))
    }

    pub fn install_path(&self) -> PathBuf {
        self.snapshot().install_root
    }

    pub fn log_path(&self) -> PathBuf {
        self.paths.log_file()
    }

    pub fn path_status(&self) -> PathStatus {
        PathStatus {
            is_set: platform::is_path_set(&self.paths),
            current_path: self.paths.current_dir(),
        }
    }

    pub fn set_path(&self) -> Result<()> {
        platform::add_to_path(&self.paths)
    }

    /// Top-N known versions from the provider's catalog, newest first.
    pub fn list_available(&self, limit: usize) -> Result<Vec<PhpVersion>> {
        let catalog = self.provider.catalog()?;
        let mut versions: Vec<PhpVersion> = catalog
            .iter()
            .filter_map(|info| PhpVersion::parse(&info.version).ok())
            .collect();
        versions.sort_by(PhpVersion::newest_first);
        versions.truncate(limit);
        Ok(versions)
    }

    pub fn version_status(&self, version: &PhpVersion) -> VersionStatus {
        let mut statuses = self.version_statuses(std::slice::from_ref(version));
        statuses.swap_remove(0)
    }

    /// Status for a batch of versions, one entry per distinct identity in
    /// first-appearance order. Provider queries are deduplicated (one call
    /// per distinct identity) and run concurrently; sequential polling is
    /// the failure mode this exists to avoid. A provider error degrades
    /// that version to `online: None` instead of failing the batch.
    pub fn version_statuses(&self, versions: &[PhpVersion]) -> Vec<VersionStatus> {
        let snapshot = self.snapshot();

        let mut distinct: Vec<PhpVersion> = Vec::new();
        for version in versions {
            if !distinct.contains(version) {
                distinct.push(version.clone());
            }
        }

        let provider = self.provider.as_ref();
        let outcomes: Vec<(PhpVersion, Option<Option<VersionInfo>>)> =
            std::thread::scope(|scope| {
                let handles: Vec<_> = distinct
                    .iter()
                    .map(|version| {
                        let version = version.clone();
                        scope.spawn(move || provider.version_info(&version))
                    })
                    .collect();
                distinct
                    .iter()
                    .cloned()
                    .zip(handles)
                    .map(|(version, handle)| match handle.join() {
                        Ok(Ok(info)) => (version, Some(info)),
                        Ok(Err(e)) => {
                            tracing::warn!(%version, error = %e, "status refresh failed");
                            (version, None)
                        }
                        Err(_) => {
                            tracing::warn!(%version, "status refresh panicked");
                            (version, None)
                        }
                    })
                    .collect()
            });

        outcomes
            .into_iter()
            .map(|(version, outcome)| {
                let record = matching_record(&snapshot, &version);
                let active = match snapshot.active.as_ref() {
                    Some(active) if version.variant == Variant::Unspecified => {
                        active.same_base(&version)
                    }
                    Some(active) => active == &version,
                    None => false,
                };
                let (online, release_date, eol_date) = match outcome {
                    Some(Some(info)) => (
                        Some(info.download_url.is_some()),
                        info.release_date,
                        info.eol_date,
                    ),
                    Some(None) => (Some(false), None, None),
                    None => (None, None, None),
                };
                VersionStatus {
                    installed: record.is_some(),
                    active,
                    online,
                    install_path: record.map(|r| r.install_dir.clone()),
                    release_date,
                    eol_date,
                    version,
                }
            })
            .collect()
    }

    /// Finalized cache entries, newest first, joined with the install
    /// records that know their checksum.
    pub fn cached_files(&self) -> Result<Vec<CachedFile>> {
        let guard = self.lock();
        let entries = guard.cache.list()?;
        let snapshot = guard.state.snapshot();
        drop(guard);

        let mut files: Vec<CachedFile> = entries
            .into_iter()
            .map(|entry| {
                let version = snapshot
                    .records
                    .iter()
                    .find(|r| r.checksum.as_deref() == Some(entry.hash.as_str()))
                    .map(|r| r.version.to_string());
                CachedFile {
                    hash: entry.hash,
                    size: entry.size,
                    modified: entry
                        .modified
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0),
                    version,
                }
            })
            .collect();
        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(files)
    }

    pub fn remove_cached(&self, hash: &str) -> Result<()> {
        self.lock().cache.remove(hash)
    }

    pub fn clear_cache(&self) -> Result<usize> {
        self.lock().cache.clear()
    }
}

fn matching_record<'a>(snapshot: &'a State, version: &PhpVersion) -> Option<&'a InstallRecord> {
    if let Some(record) = snapshot.records.iter().find(|r| &r.version == version) {
        return Some(record);
    }
    if version.variant == Variant::Unspecified {
        return snapshot
            .records
            .iter()
            .find(|r| r.version.same_base(version));
    }
    None
}
