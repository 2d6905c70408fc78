use anyhow::{Result, bail};
use colored::Colorize;
use phpvm::version::group_by_base;
use phpvm::{PhpManager, PhpVersion, Progress, Variant};
use std::io::Write;
use std::sync::mpsc;
use crate::cli::{CLI, CacheCommand, PhpvmCommand};

pub fn execute(cli: CLI) -> Result<()> {
    let manager = PhpManager::new()?;
    match cli.command {
        PhpvmCommand::Install { version, nts } => {
            execute_install(&manager, &version, nts)
        }
        PhpvmCommand::Remove { version } => {
            execute_remove(&manager, &version)
        }
        PhpvmCommand::Use { version } => {
            execute_use(&manager, &version)
        }
        PhpvmCommand::List => {
            execute_list(&manager)
        }
        PhpvmCommand::Available { limit } => {
            execute_available(&manager, limit)
        }
        PhpvmCommand::Active => {
            execute_active(&manager)
        }
        PhpvmCommand::Status { versions } => {
            execute_status(&manager, versions)
        }
        PhpvmCommand::Which => {
            execute_which(&manager)
        }
        PhpvmCommand::Path { set } => {
            execute_path(&manager, set)
        }
        PhpvmCommand::Cache { command } => {
            execute_cache(&manager, command)
        }
    }
}

fn parse_version(text: &str, nts: bool) -> Result<PhpVersion> {
    let version = PhpVersion::parse(text)?;
    if nts {
        if version.variant == Variant::ThreadSafe {
            bail!("--nts conflicts with the `-ts` suffix in `{}`", text);
        }
        return Ok(version.with_default_variant(Variant::NonThreadSafe));
    }
    Ok(version)
}

fn execute_install(manager: &PhpManager, version: &str, nts: bool) -> Result<()> {
    let version = parse_version(version, nts)?;
    println!("Installing PHP {}...", version.to_string().bold());

    let (tx, rx) = mpsc::channel::<Progress>();
    let printer = std::thread::spawn(move || {
        let mut downloading = false;
        for progress in rx {
            if progress.from_cache {
                println!("  using cached archive");
                continue;
            }
            downloading = true;
            let mib = progress.downloaded as f64 / (1024.0 * 1024.0);
            let speed = progress.bytes_per_sec / (1024.0 * 1024.0);
            if progress.total > 0 {
                let total_mib = progress.total as f64 / (1024.0 * 1024.0);
                print!(
                    "\r  {:>3}%  {:.1}/{:.1} MiB  {:.1} MiB/s   ",
                    progress.percent, mib, total_mib, speed
                );
            } else {
                print!("\r  {:.1} MiB  {:.1} MiB/s   ", mib, speed);
            }
            let _ = std::io::stdout().flush();
        }
        if downloading {
            println!();
        }
    });

    let result = manager.install(&version, Some(&tx), None);
    drop(tx);
    let _ = printer.join();
    let record = result?;

    println!(
        "{} PHP {} installed to {}",
        "✓".green(),
        record.version,
        record.install_dir.display()
    );
    if manager.get_active().as_ref() == Some(&record.version) {
        println!("{} PHP {} is now active", "✓".green(), record.version);
    }
    Ok(())
}

fn execute_remove(manager: &PhpManager, version: &str) -> Result<()> {
    let version = PhpVersion::parse(version)?;
    manager.remove(&version)?;
    println!("{} PHP {} removed", "✓".green(), version);
    Ok(())
}

fn execute_use(manager: &PhpManager, version: &str) -> Result<()> {
    let version = PhpVersion::parse(version)?;
    manager.switch(&version)?;
    if let Some(active) = manager.get_active() {
        println!("{} now using PHP {}", "✓".green(), active.to_string().bold());
    }
    println!("Restart your shell for PATH changes to take effect.");
    Ok(())
}

fn execute_list(manager: &PhpManager) -> Result<()> {
    let installed = manager.list_installed();
    if installed.is_empty() {
        println!("No PHP versions installed. Try `phpvm install 8.3`.");
        return Ok(());
    }
    let active = manager.get_active();
    for (base, versions) in group_by_base(&installed) {
        println!("{}", base.bold());
        for version in versions {
            let marker = if active.as_ref() == Some(&version) {
                "*".green().to_string()
            } else {
                " ".to_string()
            };
            println!("  {} {}", marker, version);
        }
    }
    Ok(())
}

fn execute_available(manager: &PhpManager, limit: usize) -> Result<()> {
    let versions = manager.list_available(limit)?;
    if versions.is_empty() {
        println!("No versions reported by the release provider.");
        return Ok(());
    }
    let installed = manager.list_installed();
    for version in versions {
        let is_installed = installed.iter().any(|i| i.same_base(&version));
        if is_installed {
            println!("  {} {}", version.base_version(), "(installed)".green());
        } else {
            println!("  {}", version.base_version());
        }
    }
    Ok(())
}

fn execute_active(manager: &PhpManager) -> Result<()> {
    match manager.get_active() {
        Some(version) => println!("{}", version.to_string().bold()),
        None => println!("No active PHP version. Try `phpvm use <version>`."),
    }
    Ok(())
}

fn execute_status(manager: &PhpManager, versions: Vec<String>) -> Result<()> {
    let queried: Vec<PhpVersion> = if versions.is_empty() {
        manager.list_installed()
    } else {
        versions
            .iter()
            .map(|text| PhpVersion::parse(text).map_err(Into::into))
            .collect::<Result<_>>()?
    };
    if queried.is_empty() {
        println!("Nothing to report. Install a version or name one explicitly.");
        return Ok(());
    }

    for status in manager.version_statuses(&queried) {
        println!("{}", status.version.to_string().bold());
        let installed = if status.installed {
            "yes".green().to_string()
        } else {
            "no".to_string()
        };
        println!("  installed: {}", installed);
        if status.active {
            println!("  active:    {}", "yes".green());
        }
        if let Some(path) = &status.install_path {
            println!("  path:      {}", path.display());
        }
        match status.online {
            Some(true) => println!("  online:    available for download"),
            Some(false) => println!("  online:    {}", "not available".yellow()),
            None => println!("  online:    unknown (provider unreachable)"),
        }
        if let Some(date) = &status.release_date {
            println!("  released:  {}", date);
        }
        if let Some(date) = &status.eol_date {
            println!("  eol:       {}", date);
        }
    }
    Ok(())
}

fn execute_which(manager: &PhpManager) -> Result<()> {
    match manager.active_executable() {
        Some(path) => println!("{}", path.display()),
        None => bail!("no active PHP version"),
    }
    Ok(())
}

fn execute_path(manager: &PhpManager, set: bool) -> Result<()> {
    if set {
        manager.set_path()?;
        println!("{} shim directory added to PATH", "✓".green());
        println!("Restart your shell for the change to take effect.");
        return Ok(());
    }
    let status = manager.path_status();
    println!("shim directory: {}", status.current_path.display());
    if status.is_set {
        println!("PATH entry: {}", "present".green());
    } else {
        println!("PATH entry: {} (run `phpvm path --set`)", "missing".yellow());
    }
    Ok(())
}

fn execute_cache(manager: &PhpManager, command: CacheCommand) -> Result<()> {
    match command {
        CacheCommand::List => {
            let files = manager.cached_files()?;
            if files.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }
            for file in files {
                let mib = file.size as f64 / (1024.0 * 1024.0);
                let version = file.version.unwrap_or_else(|| "unknown".to_string());
                println!("{}  {:>8.1} MiB  {}", &file.hash[..12], mib, version);
            }
        }
        CacheCommand::Remove { hash } => {
            manager.remove_cached(&hash)?;
            println!("{} removed {}", "✓".green(), hash);
        }
        CacheCommand::Clear => {
            let removed = manager.clear_cache()?;
            println!("{} removed {} cached file(s)", "✓".green(), removed);
        }
    }
    Ok(())
}
