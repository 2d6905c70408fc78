use crate::config::Paths;
use crate::error::{Error, Result};
use crate::platform;
use crate::state::StateStore;
use crate::version::PhpVersion;
use std::fs;

/// Switches the active version. Two-phase: the state store's active pointer
/// is written first (it is the internal source of truth), then the external
/// shim and PATH entry. If only the external step fails the caller gets
/// [`Error::PartialActivation`] and can retry the cheap PATH step without
/// redoing any state work.
pub fn activate(paths: &Paths, state: &mut StateStore, version: &PhpVersion) -> Result<()> {
    let record = state
        .find_record(version)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("installed version {}", version)))?;
    let php_exe = platform::php_executable_path(&record.install_dir);
    if !php_exe.exists() {
        return Err(Error::NotFound(format!(
            "PHP executable {}",
            php_exe.display()
        )));
    }

    state.set_active(Some(record.version.clone()))?;

    let external = platform::write_current_shim(paths, &record.install_dir)
        .and_then(|_| platform::add_to_path(paths));
    if let Err(e) = external {
        return Err(Error::PartialActivation {
            identity: record.version.to_string(),
            reason: e.to_string(),
        });
    }
    tracing::info!(version = %record.version, "activated");
    Ok(())
}

/// Clears the active pointer. State first, shim cleanup best-effort: once
/// the pointer is gone the system no longer claims a version it might fail
/// to unlink.
pub fn deactivate(paths: &Paths, state: &mut StateStore) -> Result<()> {
    state.set_active(None)?;
    if let Err(e) = platform::clear_current_shim(paths) {
        tracing::warn!(error = %e, "could not clear current shim");
    }
    Ok(())
}

/// Removes an installed version. The active version is deactivated first so
/// the system never points at a deleted directory; if the directory cannot
/// be deleted the install record is retained and the error surfaced.
pub fn remove(paths: &Paths, state: &mut StateStore, version: &PhpVersion) -> Result<()> {
    let record = state
        .find_record(version)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("installed version {}", version)))?;

    if state.active() == Some(&record.version) {
        deactivate(paths, state)?;
    }

    if record.install_dir.exists() {
        fs::remove_dir_all(&record.install_dir).map_err(|e| Error::LockedResource {
            path: record.install_dir.clone(),
            reason: e.to_string(),
        })?;
    }
    state.remove_record(&record.version)?;
    tracing::info!(version = %record.version, "removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{InstallRecord, unix_timestamp};
    use tempfile::tempdir;

    fn install_fixture(paths: &Paths, state: &mut StateStore, version: &str) -> PhpVersion {
        let version = PhpVersion::parse(version).unwrap();
        let install_dir = paths.default_install_root().join(version.directory_name());
        fs::create_dir_all(install_dir.join("bin")).unwrap();
        fs::write(install_dir.join("bin").join("php"), b"#!/bin/sh\n").unwrap();
        state
            .add_record(InstallRecord {
                version: version.clone(),
                install_dir,
                installed_at: unix_timestamp(),
                checksum: None,
                source: "test".to_string(),
            })
            .unwrap();
        version
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_activate_unknown_version_is_not_found() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base(dir.path());
        let mut state = StateStore::open(&paths).unwrap();
        let result = activate(&paths, &mut state, &PhpVersion::parse("8.2.0-ts").unwrap());
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(state.active(), None);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_activate_then_switch_variant() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base(dir.path());
        let mut state = StateStore::open(&paths).unwrap();
        let ts = install_fixture(&paths, &mut state, "8.2.0-ts");
        let nts = install_fixture(&paths, &mut state, "8.2.0-nts");

        activate(&paths, &mut state, &ts).unwrap();
        assert_eq!(state.active(), Some(&ts));

        activate(&paths, &mut state, &nts).unwrap();
        assert_eq!(state.active(), Some(&nts));
        let shim = paths.current_dir().join("php");
        let target = fs::read_link(shim).unwrap();
        assert!(target.to_string_lossy().contains("php-8.2.0-nts"));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_partial_activation_keeps_internal_state() {
        let dir = tempdir().unwrap();
        let mut paths = Paths::with_base(dir.path());
        // An rc file in a nonexistent directory makes the external PATH
        // step fail after the state write succeeded.
        paths.shell_rc = Some(dir.path().join("no-such-dir").join("profile"));
        let mut state = StateStore::open(&paths).unwrap();
        let version = install_fixture(&paths, &mut state, "8.2.0-ts");

        let result = activate(&paths, &mut state, &version);
        assert!(matches!(result, Err(Error::PartialActivation { .. })));
        assert_eq!(state.active(), Some(&version));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_remove_active_version_deactivates_first() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base(dir.path());
        let mut state = StateStore::open(&paths).unwrap();
        let version = install_fixture(&paths, &mut state, "8.2.0-ts");
        activate(&paths, &mut state, &version).unwrap();

        let install_dir = state.record(&version).unwrap().install_dir.clone();
        remove(&paths, &mut state, &version).unwrap();

        assert_eq!(state.active(), None);
        assert!(state.records().is_empty());
        assert!(!install_dir.exists());
        assert!(!paths.current_dir().join("php").symlink_metadata().is_ok());
    }

    #[test]
    fn test_remove_unknown_version_is_not_found() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base(dir.path());
        let mut state = StateStore::open(&paths).unwrap();
        let result = remove(&paths, &mut state, &PhpVersion::parse("8.9.9").unwrap());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
