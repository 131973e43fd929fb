//! Locating the running mod manager and the directories derived from it.
//!
//! The manager owns `<install dir>/installed`; the backup snapshot lives next
//! to it as `<install dir>/installed_backup`.

use camino::{Utf8Path, Utf8PathBuf};
use sysinfo::System;
use thiserror::Error;

/// Directory the manager keeps installed mods in
pub const MODS_DIR_NAME: &str = "installed";

/// Sibling directory holding the single-generation backup
pub const BACKUP_DIR_NAME: &str = "installed_backup";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("{0} is not running. Please start it and try again.")]
    NotRunning(String),

    #[error("{0} is running but its executable path could not be read")]
    ExecutableUnavailable(String),

    #[error("Manager path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    #[error("Manager executable has no parent directory: {0}")]
    NoParent(Utf8PathBuf),
}

/// Paths derived from the manager's executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerPaths {
    pub executable: Utf8PathBuf,
    pub install_dir: Utf8PathBuf,
    pub mods_dir: Utf8PathBuf,
    pub backup_dir: Utf8PathBuf,
}

impl ManagerPaths {
    pub fn from_executable(executable: &Utf8Path) -> Result<Self, EnvironmentError> {
        let install_dir = executable
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .ok_or_else(|| EnvironmentError::NoParent(executable.to_path_buf()))?;

        Ok(Self::from_install_dir(executable, install_dir))
    }

    pub fn from_install_dir(executable: &Utf8Path, install_dir: &Utf8Path) -> Self {
        Self {
            executable: executable.to_path_buf(),
            install_dir: install_dir.to_path_buf(),
            mods_dir: install_dir.join(MODS_DIR_NAME),
            backup_dir: install_dir.join(BACKUP_DIR_NAME),
        }
    }
}

/// Finds the manager installation
pub trait ManagerLocator: Send + Sync {
    fn locate(&self) -> Result<ManagerPaths, EnvironmentError>;
}

/// Looks for the manager among running processes
#[derive(Debug, Clone)]
pub struct ProcessLocator {
    process_name: String,
}

impl ProcessLocator {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
        }
    }
}

impl ManagerLocator for ProcessLocator {
    fn locate(&self) -> Result<ManagerPaths, EnvironmentError> {
        let mut system = System::new_all();
        system.refresh_all();

        let mut matched = false;

        for process in system.processes().values() {
            let name = process.name().to_string_lossy();
            if !process_name_matches(&name, &self.process_name) {
                continue;
            }
            matched = true;

            let Some(exe) = process.exe() else {
                tracing::debug!("Process {} has no readable executable path", process.pid());
                continue;
            };

            let exe = Utf8PathBuf::try_from(exe.to_path_buf())
                .map_err(|e| EnvironmentError::NonUtf8Path(e.as_path().display().to_string()))?;

            tracing::info!("Found {} at {} (pid {})", self.process_name, exe, process.pid());
            return ManagerPaths::from_executable(&exe);
        }

        if matched {
            Err(EnvironmentError::ExecutableUnavailable(self.process_name.clone()))
        } else {
            Err(EnvironmentError::NotRunning(self.process_name.clone()))
        }
    }
}

/// Compare a process name with the wanted one, ignoring ASCII case and an
/// `.exe` suffix on either side
pub fn process_name_matches(candidate: &str, wanted: &str) -> bool {
    strip_exe(candidate).eq_ignore_ascii_case(strip_exe(wanted))
}

fn strip_exe(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe") {
        &name[..len - 4]
    } else {
        name
    }
}
