use crate::error::{Error, Result};
use crate::version::{PhpVersion, Variant};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

const RELEASES_URL: &str = "https://windows.php.net/downloads/releases/";
const ARCHIVES_URL: &str = "https://windows.php.net/downloads/releases/archives/";

/// Catalog metadata for one known release, as reported by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub release_date: Option<String>,
    pub eol_date: Option<String>,
    pub download_url: Option<String>,
    pub checksum: Option<String>,
}

/// External source of the catalog of known versions and their metadata.
/// The manager is the only consumer; it deduplicates calls within a status
/// batch, so one call per distinct version is the contract here.
pub trait ReleaseProvider: Send + Sync {
    fn catalog(&self) -> Result<Vec<VersionInfo>>;
    fn version_info(&self, version: &PhpVersion) -> Result<Option<VersionInfo>>;
}

/// Scrapes windows.php.net release listings, with a pinned fallback when
/// the page is unreachable or yields nothing. The scrape result is memoized
/// per instance: a status batch querying many versions costs one fetch, not
/// one per version.
pub struct PhpNetProvider {
    client: reqwest::blocking::Client,
    catalog: OnceLock<Vec<VersionInfo>>,
}

impl PhpNetProvider {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("phpvm/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Transfer(e.to_string()))?;
        Ok(PhpNetProvider {
            client,
            catalog: OnceLock::new(),
        })
    }

    /// Scrapes at most once; concurrent first callers race into one
    /// initialization and everyone else reuses it.
    fn cached_catalog(&self) -> &[VersionInfo] {
        self.catalog.get_or_init(|| match self.scrape_releases() {
            Ok(versions) if !versions.is_empty() => versions,
            Ok(_) => {
                tracing::warn!("release page yielded no versions, using fallback list");
                fallback_catalog()
            }
            Err(e) => {
                tracing::warn!(error = %e, "release page unreachable, using fallback list");
                fallback_catalog()
            }
        })
    }

    fn scrape_releases(&self) -> Result<Vec<VersionInfo>> {
        let response = self
            .client
            .get(RELEASES_URL)
            .send()
            .map_err(|e| Error::Transfer(format!("fetching {} failed: {}", RELEASES_URL, e)))?;
        let html = response
            .text()
            .map_err(|e| Error::Transfer(e.to_string()))?;

        // File names look like php-8.3.2-Win32-vs16-x64.zip, with an -nts
        // infix for the non-thread-safe build.
        let file_regex =
            Regex::new(r"php-(\d+)\.(\d+)\.(\d+)(?:-nts)?-Win32-(?:vs|vc|VC)\d+-x64\.zip")
                .expect("release file regex");

        let mut seen: HashMap<String, VersionInfo> = HashMap::new();
        for capture in file_regex.captures_iter(&html) {
            let major: u8 = capture[1].parse().unwrap_or(0);
            let minor: u8 = capture[2].parse().unwrap_or(0);
            let patch: u8 = capture[3].parse().unwrap_or(0);
            if major == 0 {
                continue;
            }
            let version = PhpVersion::new(major, minor, patch, Variant::ThreadSafe);
            let base = version.base_version();
            seen.entry(base.clone()).or_insert_with(|| VersionInfo {
                version: base,
                release_date: None,
                eol_date: eol_date(major, minor),
                download_url: Some(download_url(&version)),
                checksum: None,
            });
        }

        let mut versions: Vec<VersionInfo> = seen.into_values().collect();
        sort_newest_first(&mut versions);
        Ok(versions)
    }
}

impl ReleaseProvider for PhpNetProvider {
    fn catalog(&self) -> Result<Vec<VersionInfo>> {
        Ok(self.cached_catalog().to_vec())
    }

    fn version_info(&self, version: &PhpVersion) -> Result<Option<VersionInfo>> {
        let base = version.base_version();
        if let Some(mut info) = self
            .cached_catalog()
            .iter()
            .find(|v| v.version == base)
            .cloned()
        {
            if info.eol_date.is_none() {
                info.eol_date = eol_date(version.major, version.minor);
            }
            // The catalog lists the thread-safe file; regenerate so the URL
            // matches the requested variant.
            info.download_url = Some(download_url(version));
            return Ok(Some(info));
        }
        // Not listed any more (typically rotated off the release page); the
        // archives still serve it, so synthesize the metadata.
        Ok(Some(VersionInfo {
            version: base,
            release_date: None,
            eol_date: eol_date(version.major, version.minor),
            download_url: Some(download_url(version)),
            checksum: None,
        }))
    }
}

/// Download URL for one identity on windows.php.net. The compiler tag and
/// the base directory depend on the PHP line; the `-nts` infix selects the
/// non-thread-safe build.
pub fn download_url(version: &PhpVersion) -> String {
    let base = if version.major < 7 || (version.major == 7 && version.minor < 4) {
        ARCHIVES_URL
    } else {
        RELEASES_URL
    };
    let nts = match version.variant {
        Variant::NonThreadSafe => "-nts",
        _ => "",
    };
    format!(
        "{}php-{}{}-Win32-{}-x64.zip",
        base,
        version.base_version(),
        nts,
        compiler_tag(version.major, version.minor)
    )
}

fn compiler_tag(major: u8, minor: u8) -> &'static str {
    if major > 8 || (major == 8 && minor >= 4) {
        "vs17"
    } else if major == 8 {
        "vs16"
    } else if major == 7 {
        if minor >= 4 {
            "vc15"
        } else if minor >= 2 {
            "VC15"
        } else {
            "VC14"
        }
    } else {
        "VC11"
    }
}

/// Security-support end dates per PHP line.
pub fn eol_date(major: u8, minor: u8) -> Option<String> {
    let date = match (major, minor) {
        (8, 5) | (8, 4) => "2028-12-31",
        (8, 3) => "2026-11-26",
        (8, 2) => "2025-12-08",
        (8, 1) => "2024-11-25",
        (8, 0) => "2023-11-26",
        (7, 4) => "2022-11-28",
        _ => return None,
    };
    Some(date.to_string())
}

fn fallback_catalog() -> Vec<VersionInfo> {
    let pinned: &[(&str, Option<&str>)] = &[
        ("8.4.0", Some("2024-11-21")),
        ("8.3.2", Some("2024-01-18")),
        ("8.3.0", Some("2023-11-23")),
        ("8.2.14", Some("2024-01-18")),
        ("8.2.13", Some("2023-12-21")),
        ("8.1.27", Some("2023-11-16")),
        ("8.1.26", Some("2023-10-19")),
        ("8.0.30", Some("2023-03-16")),
        ("7.4.33", Some("2022-11-03")),
    ];
    pinned
        .iter()
        .filter_map(|(text, release)| {
            let version = PhpVersion::parse(text).ok()?;
            Some(VersionInfo {
                version: version.base_version(),
                release_date: release.map(|s| s.to_string()),
                eol_date: eol_date(version.major, version.minor),
                download_url: Some(download_url(
                    &version.with_default_variant(Variant::ThreadSafe),
                )),
                checksum: None,
            })
        })
        .collect()
}

fn sort_newest_first(versions: &mut [VersionInfo]) {
    versions.sort_by(|a, b| {
        let va = PhpVersion::parse(&a.version).unwrap_or(PhpVersion::new(0, 0, 0, Variant::Unspecified));
        let vb = PhpVersion::parse(&b.version).unwrap_or(PhpVersion::new(0, 0, 0, Variant::Unspecified));
        PhpVersion::newest_first(&va, &vb)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_scheme() {
        let ts = PhpVersion::parse("8.4.0-ts").unwrap();
        assert_eq!(
            download_url(&ts),
            "https://windows.php.net/downloads/releases/php-8.4.0-Win32-vs17-x64.zip"
        );

        let nts = PhpVersion::parse("8.2.14-nts").unwrap();
        assert_eq!(
            download_url(&nts),
            "https://windows.php.net/downloads/releases/php-8.2.14-nts-Win32-vs16-x64.zip"
        );

        let archived = PhpVersion::parse("7.2.34-ts").unwrap();
        assert_eq!(
            download_url(&archived),
            "https://windows.php.net/downloads/releases/archives/php-7.2.34-Win32-VC15-x64.zip"
        );
    }

    #[test]
    fn test_version_info_reuses_memoized_catalog() {
        let provider = PhpNetProvider::new().unwrap();
        // Seed the memo so no scrape ever happens; a lookup that ignored it
        // would synthesize an entry without this checksum.
        provider
            .catalog
            .set(vec![VersionInfo {
                version: "8.3.2".to_string(),
                release_date: Some("2024-01-18".to_string()),
                eol_date: None,
                download_url: None,
                checksum: Some("cafecafe".to_string()),
            }])
            .unwrap();

        let info = provider
            .version_info(&PhpVersion::parse("8.3.2-nts").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(info.checksum.as_deref(), Some("cafecafe"));
        assert_eq!(info.release_date.as_deref(), Some("2024-01-18"));
        assert_eq!(info.eol_date.as_deref(), Some("2026-11-26"));
        assert!(info.download_url.unwrap().contains("php-8.3.2-nts-"));

        // Repeated calls keep reading the same memo.
        let again = provider
            .version_info(&PhpVersion::parse("8.3.2").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(again.checksum.as_deref(), Some("cafecafe"));
        assert_eq!(provider.catalog().unwrap().len(), 1);
    }

    #[test]
    fn test_eol_table() {
        assert_eq!(eol_date(8, 3).as_deref(), Some("2026-11-26"));
        assert_eq!(eol_date(7, 4).as_deref(), Some("2022-11-28"));
        assert_eq!(eol_date(5, 6), None);
    }

    #[test]
    fn test_fallback_catalog_is_sorted_and_complete() {
        let catalog = fallback_catalog();
        assert!(!catalog.is_empty());
        for pair in catalog.windows(2) {
            let a = PhpVersion::parse(&pair[0].version).unwrap();
            let b = PhpVersion::parse(&pair[1].version).unwrap();
            assert_ne!(PhpVersion::newest_first(&a, &b), std::cmp::Ordering::Greater);
        }
        for info in &catalog {
            assert!(info.download_url.is_some());
        }
    }
}
