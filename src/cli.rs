use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    #[command(subcommand)]
    pub(crate) command: PhpvmCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum PhpvmCommand {
    /// Download and install a PHP version, e.g. `phpvm install 8.3.2`.
    /// The very first installed version becomes the active one
    Install {
        /// Version to install: `8.3`, `8.3.2`, `8.3.2-ts`, `8.3.2-nts`
        version: String,
        /// Install the non-thread-safe build
        #[clap(long)]
        nts: bool,
    },
    /// Remove an installed version. Removing the active version deactivates
    /// it first
    Remove {
        version: String,
    },
    /// Switch the active version. The `current/` shim is relinked
    #[clap(name = "use")]
    Use {
        version: String,
    },
    /// List installed versions, grouped by base version
    List,
    /// List versions available for download, newest first
    Available {
        /// Maximum number of versions to show
        #[clap(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the currently active version
    Active,
    /// Show installed/active/online status for one or more versions
    Status {
        versions: Vec<String>,
    },
    /// Print the path of the active PHP executable
    Which,
    /// Show whether the shim directory is on the PATH
    Path {
        /// Add the shim directory to the PATH
        #[clap(long)]
        set: bool,
    },
    /// Inspect and maintain the download cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum CacheCommand {
    /// List cached archives
    List,
    /// Remove one cached archive by its hash
    Remove {
        hash: String,
    },
    /// Remove all cached archives
    Clear,
}
