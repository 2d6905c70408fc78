use crate::config::Paths;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Path of the PHP executable inside one install directory.
#[cfg(target_os = "windows")]
pub fn php_executable_path(version_dir: &Path) -> PathBuf {
    version_dir.join("php.exe")
}

#[cfg(not(target_os = "windows"))]
pub fn php_executable_path(version_dir: &Path) -> PathBuf {
    version_dir.join("bin").join("php")
}

/// Rewrites the `current/` shim so it forwards to the given install
/// directory. On Unix that is a symlink; on Windows a copied `php.exe`
/// (IDEs resolve it directly), its DLLs, and a `php.bat` forwarder.
pub fn write_current_shim(paths: &Paths, install_dir: &Path) -> Result<()> {
    let current_dir = paths.current_dir();
    fs::create_dir_all(&current_dir)?;
    let php_exe = php_executable_path(install_dir);

    #[cfg(not(target_os = "windows"))]
    {
        use std::os::unix::fs::PermissionsExt;

        let shim = current_dir.join("php");
        if shim.symlink_metadata().is_ok() {
            fs::remove_file(&shim)?;
        }
        std::os::unix::fs::symlink(&php_exe, &shim)?;
        if let Ok(metadata) = fs::metadata(&php_exe) {
            let mut perms = metadata.permissions();
            perms.set_mode(0o755);
            let _ = fs::set_permissions(&php_exe, perms);
        }
    }

    #[cfg(target_os = "windows")]
    {
        clear_current_shim(paths)?;
        fs::copy(&php_exe, current_dir.join("php.exe"))?;
        for entry in fs::read_dir(install_dir)? {
            let path = entry?.path();
            let is_dll = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("dll"))
                .unwrap_or(false);
            if path.is_file() && is_dll {
                if let Some(name) = path.file_name() {
                    let _ = fs::copy(&path, current_dir.join(name));
                }
            }
        }
        let script = format!("@echo off\r\n\"{}\" %*\r\n", php_exe.display());
        fs::write(current_dir.join("php.bat"), script)?;
    }

    Ok(())
}

/// Empties the `current/` shim directory so no stale executable remains.
pub fn clear_current_shim(paths: &Paths) -> Result<()> {
    let current_dir = paths.current_dir();
    if !current_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(&current_dir)? {
        let path = entry?.path();
        if path.is_file() || path.symlink_metadata()?.file_type().is_symlink() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Ensures the `current/` directory is on the user's PATH. Unix appends an
/// export line to the shell rc file; Windows edits the per-user Environment
/// registry key.
#[cfg(not(target_os = "windows"))]
pub fn add_to_path(paths: &Paths) -> Result<()> {
    let rc_file = match &paths.shell_rc {
        Some(rc) => rc,
        None => return Ok(()),
    };
    let line = export_line(&paths.current_dir());
    let content = fs::read_to_string(rc_file).unwrap_or_default();
    if !content.contains(&line) {
        let mut updated = content;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&line);
        updated.push('\n');
        fs::write(rc_file, updated)?;
    }
    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn remove_from_path(paths: &Paths) -> Result<()> {
    let rc_file = match &paths.shell_rc {
        Some(rc) => rc,
        None => return Ok(()),
    };
    if !rc_file.exists() {
        return Ok(());
    }
    let line = export_line(&paths.current_dir());
    let content = fs::read_to_string(rc_file)?;
    if content.contains(&line) {
        let updated: String = content
            .lines()
            .filter(|l| *l != line)
            .map(|l| format!("{}\n", l))
            .collect();
        fs::write(rc_file, updated)?;
    }
    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn is_path_set(paths: &Paths) -> bool {
    let rc_file = match &paths.shell_rc {
        Some(rc) => rc,
        None => return false,
    };
    let line = export_line(&paths.current_dir());
    fs::read_to_string(rc_file)
        .map(|content| content.contains(&line))
        .unwrap_or(false)
}

#[cfg(not(target_os = "windows"))]
fn export_line(current_dir: &Path) -> String {
    format!("export PATH=\"{}:$PATH\"", current_dir.display())
}

#[cfg(target_os = "windows")]
pub fn add_to_path(paths: &Paths) -> Result<()> {
    use crate::error::Error;
    use winreg::RegKey;
    use winreg::enums::{HKEY_CURRENT_USER, KEY_READ, KEY_WRITE};

    let environment = RegKey::predef(HKEY_CURRENT_USER)
        .open_subkey_with_flags("Environment", KEY_READ | KEY_WRITE)
        .map_err(Error::Io)?;
    let path_value: String = environment.get_value("Path").unwrap_or_default();
    let current = paths.current_dir().to_string_lossy().to_string();

    let already_set = path_value
        .split(';')
        .any(|entry| entry.trim().eq_ignore_ascii_case(&current));
    if !already_set {
        let new_path = if path_value.trim().is_empty() {
            current
        } else {
            format!("{};{}", current, path_value)
        };
        environment.set_value("Path", &new_path).map_err(Error::Io)?;
    }
    Ok(())
}

#[cfg(target_os = "windows")]
pub fn remove_from_path(paths: &Paths) -> Result<()> {
    use crate::error::Error;
    use winreg::RegKey;
    use winreg::enums::{HKEY_CURRENT_USER, KEY_READ, KEY_WRITE};

    let environment = RegKey::predef(HKEY_CURRENT_USER)
        .open_subkey_with_flags("Environment", KEY_READ | KEY_WRITE)
        .map_err(Error::Io)?;
    let path_value: String = environment.get_value("Path").unwrap_or_default();
    let current = paths.current_dir().to_string_lossy().to_string();

    let new_path: Vec<&str> = path_value
        .split(';')
        .filter(|entry| !entry.trim().eq_ignore_ascii_case(&current))
        .collect();
    environment
        .set_value("Path", &new_path.join(";"))
        .map_err(Error::Io)?;
    Ok(())
}

#[cfg(target_os = "windows")]
pub fn is_path_set(paths: &Paths) -> bool {
    use winreg::RegKey;
    use winreg::enums::{HKEY_CURRENT_USER, KEY_READ};

    let environment = match RegKey::predef(HKEY_CURRENT_USER)
        .open_subkey_with_flags("Environment", KEY_READ)
    {
        Ok(key) => key,
        Err(_) => return false,
    };
    let path_value: String = environment.get_value("Path").unwrap_or_default();
    let current = paths.current_dir().to_string_lossy().to_string();
    path_value
        .split(';')
        .any(|entry| entry.trim().eq_ignore_ascii_case(&current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_add_to_path_is_idempotent() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base(dir.path());

        assert!(!is_path_set(&paths));
        add_to_path(&paths).unwrap();
        assert!(is_path_set(&paths));
        add_to_path(&paths).unwrap();

        let content = fs::read_to_string(paths.shell_rc.as_ref().unwrap()).unwrap();
        assert_eq!(content.matches("export PATH").count(), 1);

        remove_from_path(&paths).unwrap();
        assert!(!is_path_set(&paths));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_write_and_clear_current_shim() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base(dir.path());

        let install_dir = dir.path().join("versions").join("php-8.2.0-ts");
        fs::create_dir_all(install_dir.join("bin")).unwrap();
        fs::write(install_dir.join("bin").join("php"), b"#!/bin/sh\n").unwrap();

        write_current_shim(&paths, &install_dir).unwrap();
        let shim = paths.current_dir().join("php");
        assert!(shim.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&shim).unwrap(), php_executable_path(&install_dir));

        // Switching to another version replaces the link.
        let other_dir = dir.path().join("versions").join("php-8.3.2-ts");
        fs::create_dir_all(other_dir.join("bin")).unwrap();
        fs::write(other_dir.join("bin").join("php"), b"#!/bin/sh\n").unwrap();
        write_current_shim(&paths, &other_dir).unwrap();
        assert_eq!(fs::read_link(&shim).unwrap(), php_executable_path(&other_dir));

        clear_current_shim(&paths).unwrap();
        assert!(shim.symlink_metadata().is_err());
    }
}
