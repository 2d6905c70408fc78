//! # phpvm Core Library
//!
//! This crate contains the core logic of the `phpvm` tool – a PHP version
//! manager that installs official builds side by side, keeps a
//! content-addressed download cache, and switches the active version through
//! a stable `current/` shim directory on the user's PATH.
//!
//! The library is built for the `phpvm` CLI, but you can also reuse it as a
//! backend in other tools through [`PhpManager`].
//!
//! ## Modules Overview
//! - [`version`] – Parsing and ordering of version identities (`8.3.2-nts`)
//! - [`config`] – Filesystem layout and path discovery
//! - [`state`] – Durable install records and the active-version pointer
//! - [`cache`] – Content-addressed archive cache keyed by SHA-256
//! - [`download`] – Streaming downloader with progress events
//! - [`install`] – Staged, atomic install pipeline
//! - [`activate`] – Activation, deactivation, and removal
//! - [`platform`] – Shim and PATH handling per operating system
//! - [`provider`] – Release catalog sources (windows.php.net scraper)
//! - [`manager`] – The [`PhpManager`] facade tying it all together

pub mod activate;
pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod install;
pub mod manager;
pub mod platform;
pub mod provider;
pub mod state;
pub mod version;

pub use cache::{CacheEntry, ContentCache};
pub use config::Paths;
pub use download::{Downloader, Progress, ProgressSender};
pub use error::{Error, Result};
pub use install::Installer;
pub use manager::{CachedFile, PathStatus, PhpManager, VersionStatus};
pub use provider::{PhpNetProvider, ReleaseProvider, VersionInfo};
pub use state::{InstallRecord, State, StateStore};
pub use version::{PhpVersion, Variant};
