use crate::activate;
use crate::cache::ContentCache;
use crate::config::Paths;
use crate::download::{Downloader, ProgressSender};
use crate::error::{Error, Result};
use crate::provider::{self, ReleaseProvider};
use crate::state::{InstallRecord, StateStore, unix_timestamp};
use crate::version::{PhpVersion, Variant};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use walkdir::WalkDir;

#[cfg(target_os = "windows")]
const PHP_EXE: &str = "php.exe";
#[cfg(not(target_os = "windows"))]
const PHP_EXE: &str = "php";

/// Runs the install pipeline: resolve archive (cache-aware) → verify →
/// extract into a staging directory → atomic rename into the install root →
/// durable install record. Nothing outside the staging directory is touched
/// until the rename, so a failure at any step rolls back to a clean slate.
pub struct Installer {
    downloader: Downloader,
}

impl Installer {
    pub fn new() -> Result<Self> {
        Ok(Installer {
            downloader: Downloader::new()?,
        })
    }

    pub fn install(
        &self,
        paths: &Paths,
        state: &mut StateStore,
        cache: &ContentCache,
        provider: &dyn ReleaseProvider,
        version: &PhpVersion,
        progress: Option<&ProgressSender>,
        cancel: Option<&AtomicBool>,
    ) -> Result<InstallRecord> {
        let version = version.with_default_variant(Variant::ThreadSafe);

        // Idempotence: an installed identity short-circuits before any I/O.
        if let Some(record) = state.record(&version) {
            tracing::info!(%version, "already installed");
            return Ok(record.clone());
        }

        let info = provider.version_info(&version)?;
        let url = info
            .as_ref()
            .and_then(|i| i.download_url.clone())
            .unwrap_or_else(|| provider::download_url(&version));
        let checksum = info.as_ref().and_then(|i| i.checksum.clone());

        tracing::info!(%version, url, "installing");
        let (archive_path, entry) =
            self.downloader
                .fetch(cache, &url, checksum.as_deref(), progress, cancel)?;

        let install_root = state.install_root().to_path_buf();
        fs::create_dir_all(&install_root)?;
        // Staging lives inside the install root so the final rename stays on
        // one filesystem. The TempDir guard deletes whatever is left of it
        // on any failure path.
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&install_root)?;

        extract_archive(&archive_path, staging.path(), &url)?;
        let extracted_root = locate_extracted_root(staging.path())?;

        let install_dir = install_root.join(version.directory_name());
        if install_dir.exists() {
            // Stale leftover with no install record; a record would have
            // short-circuited above.
            tracing::warn!(path = %install_dir.display(), "clearing stale install directory");
            fs::remove_dir_all(&install_dir)?;
        }
        if let Err(e) = fs::rename(&extracted_root, &install_dir) {
            if install_dir.exists() {
                let _ = fs::remove_dir_all(&install_dir);
            }
            return Err(Error::Extraction(format!(
                "could not move extracted files into {}: {}",
                install_dir.display(),
                e
            )));
        }

        let record = InstallRecord {
            version: version.clone(),
            install_dir,
            installed_at: unix_timestamp(),
            checksum: Some(entry.hash),
            source: url,
        };
        let first_install = state.records().is_empty();
        state.add_record(record.clone())?;
        tracing::info!(%version, "installed");

        // The very first version ever installed becomes active as part of
        // the same logical operation; later installs never auto-activate.
        if first_install {
            activate::activate(paths, state, &version)?;
        }

        Ok(record)
    }
}

/// Unpacks `archive` into `dest`. The archive kind follows the source URL's
/// extension, defaulting to the platform's native format.
fn extract_archive(archive: &Path, dest: &Path, url: &str) -> Result<()> {
    let size = fs::metadata(archive)?.len();
    if size == 0 {
        return Err(Error::Extraction(format!(
            "archive file is empty: {}",
            archive.display()
        )));
    }
    tracing::debug!(archive = %archive.display(), size, "extracting");

    if url.ends_with(".zip") {
        extract_zip(archive, dest)
    } else if url.ends_with(".tar.gz") || url.ends_with(".tgz") {
        extract_tar_gz(archive, dest)
    } else if cfg!(target_os = "windows") {
        extract_zip(archive, dest)
    } else {
        extract_tar_gz(archive, dest)
    }
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    use zip::ZipArchive;

    let file = fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| Error::Extraction(format!("could not read zip archive: {}", e)))?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::Extraction(format!("corrupt zip entry {}: {}", i, e)))?;
        let relative = match entry.enclosed_name() {
            Some(path) => path,
            None => continue,
        };
        let out_path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| Error::Extraction(e.to_string()))?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::Extraction(e.to_string()))?;
            }
            let mut out_file = fs::File::create(&out_path)
                .map_err(|e| Error::Extraction(e.to_string()))?;
            std::io::copy(&mut entry, &mut out_file)
                .map_err(|e| Error::Extraction(e.to_string()))?;
        }
    }
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let file = fs::File::open(archive_path)?;
    let tar = GzDecoder::new(file);
    let mut archive = Archive::new(tar);
    archive
        .unpack(dest)
        .map_err(|e| Error::Extraction(format!("could not unpack tar archive: {}", e)))
}

/// Finds the directory inside the staging tree that holds the PHP build.
/// Windows zips are flat, Unix tarballs nest a `php-X.Y.Z/bin/php` layout;
/// either way the returned directory is the one to rename into place.
fn locate_extracted_root(staging: &Path) -> Result<PathBuf> {
    for entry in WalkDir::new(staging).max_depth(3) {
        let entry = entry.map_err(|e| Error::Extraction(e.to_string()))?;
        if entry.file_type().is_file() && entry.file_name() == PHP_EXE {
            let exe_dir = entry
                .path()
                .parent()
                .ok_or_else(|| Error::Extraction("executable has no parent".to_string()))?;
            let root = if !cfg!(target_os = "windows")
                && exe_dir.file_name().is_some_and(|n| n == "bin")
            {
                exe_dir.parent().unwrap_or(exe_dir)
            } else {
                exe_dir
            };
            return Ok(root.to_path_buf());
        }
    }
    Err(Error::Extraction(
        "PHP executable not found in extracted archive".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;

    fn build_php_tarball(dest: &Path, top_level: Option<&str>) {
        let tree = tempdir().unwrap();
        let root = match top_level {
            Some(dir) => tree.path().join(dir),
            None => tree.path().to_path_buf(),
        };
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin").join("php"), b"#!/bin/sh\necho php\n").unwrap();
        fs::write(root.join("php.ini"), b"memory_limit = 128M\n").unwrap();

        let gz = GzEncoder::new(fs::File::create(dest).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(gz);
        builder.append_dir_all(".", tree.path()).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_extract_and_locate_nested_layout() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("php.tar.gz");
        build_php_tarball(&archive, Some("php-8.2.0"));

        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        extract_archive(&archive, &staging, "https://example.test/php-8.2.0.tar.gz").unwrap();

        let root = locate_extracted_root(&staging).unwrap();
        assert_eq!(root, staging.join("php-8.2.0"));
        assert!(root.join("bin").join("php").is_file());
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_extract_and_locate_flat_layout() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("php.tar.gz");
        build_php_tarball(&archive, None);

        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        extract_archive(&archive, &staging, "https://example.test/php-8.2.0.tar.gz").unwrap();

        assert_eq!(locate_extracted_root(&staging).unwrap(), staging);
    }

    #[test]
    fn test_corrupt_archive_is_extraction_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("php.tar.gz");
        fs::write(&archive, b"this is not a gzip stream").unwrap();

        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        let result = extract_archive(&archive, &staging, "https://example.test/php.tar.gz");
        assert!(matches!(result, Err(Error::Extraction(_))));
    }

    #[test]
    fn test_empty_archive_is_extraction_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("php.zip");
        fs::write(&archive, b"").unwrap();

        let result = extract_archive(&archive, dir.path(), "https://example.test/php.zip");
        assert!(matches!(result, Err(Error::Extraction(_))));
    }

    #[test]
    fn test_locate_missing_executable() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join("readme.txt"), b"empty").unwrap();
        let result = locate_extracted_root(dir.path());
        assert!(matches!(result, Err(Error::Extraction(_))));
    }
}
