use directories::{ProjectDirs, UserDirs};
use std::path::PathBuf;

/// On-disk layout of one phpvm home. Everything the manager touches lives
/// under `base`: `state.json`, `versions/`, `cache/`, `current/`, `logs/`.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
    /// Shell rc file that receives the PATH export line on Unix. `None`
    /// when the platform manages PATH elsewhere (Windows registry).
    pub shell_rc: Option<PathBuf>,
}

impl Paths {
    /// Resolves the phpvm home for this machine. `PHPVM_HOME` overrides the
    /// platform data directory.
    pub fn discover() -> Paths {
        let base = match std::env::var_os("PHPVM_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("org", "phpvm", "phpvm")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".phpvm")),
        };
        Paths {
            base,
            shell_rc: default_shell_rc(),
        }
    }

    /// Layout rooted at an explicit directory, with the PATH entry kept
    /// inside it. Used by embedders and tests.
    pub fn with_base(base: impl Into<PathBuf>) -> Paths {
        let base = base.into();
        let shell_rc = Some(base.join("profile"));
        Paths { base, shell_rc }
    }

    pub fn state_file(&self) -> PathBuf {
        self.base.join("state.json")
    }

    pub fn default_install_root(&self) -> PathBuf {
        self.base.join("versions")
    }

    pub fn default_cache_root(&self) -> PathBuf {
        self.base.join("cache")
    }

    /// Directory exposed on PATH. Holds the shim for whichever version is
    /// active; its content changes on switch, its path never does.
    pub fn current_dir(&self) -> PathBuf {
        self.base.join("current")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("phpvm.log")
    }
}

fn default_shell_rc() -> Option<PathBuf> {
    if cfg!(windows) {
        return None;
    }
    let home = UserDirs::new()?.home_dir().to_path_buf();
    let shell = std::env::var("SHELL").unwrap_or_default();
    let rc = if shell.contains("zsh") {
        ".zshrc"
    } else {
        ".bashrc"
    };
    Some(home.join(rc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base_layout() {
        let paths = Paths::with_base("/tmp/phpvm-test");
        assert_eq!(paths.state_file(), PathBuf::from("/tmp/phpvm-test/state.json"));
        assert_eq!(
            paths.default_install_root(),
            PathBuf::from("/tmp/phpvm-test/versions")
        );
        assert_eq!(
            paths.default_cache_root(),
            PathBuf::from("/tmp/phpvm-test/cache")
        );
        assert_eq!(paths.current_dir(), PathBuf::from("/tmp/phpvm-test/current"));
        assert!(paths.shell_rc.is_some());
    }
}
