//! Single-generation snapshot of the mods directory.
//!
//! Each backup discards the previous snapshot entirely and copies the source
//! tree again, so files that only existed in an older snapshot do not survive.

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use walkdir::WalkDir;

/// What a backup copied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub destination: Utf8PathBuf,
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Replace `destination` with a full recursive copy of `source`.
///
/// Any error leaves the run without a usable backup and must stop it before
/// the source is touched.
pub fn backup(source: &Utf8Path, destination: &Utf8Path) -> Result<BackupReport> {
    if !source.is_dir() {
        bail!("Mods directory not found: {}", source);
    }
    if destination.starts_with(source) {
        bail!("Backup destination {} is inside {}", destination, source);
    }

    if destination.exists() {
        tracing::info!("Removing previous backup at {}", destination);
        fs::remove_dir_all(destination)
            .with_context(|| format!("Failed to remove previous backup: {}", destination))?;
    }

    fs::create_dir_all(destination)
        .with_context(|| format!("Failed to create backup directory: {}", destination))?;

    let mut report = BackupReport {
        destination: destination.to_path_buf(),
        ..BackupReport::default()
    };

    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", source))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("Entry outside of {}", source))?;
        let relative = Utf8Path::from_path(relative)
            .with_context(|| format!("Non UTF-8 path under {}: {}", source, relative.display()))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target))?;
            report.directories += 1;
        } else if entry.file_type().is_file() {
            let bytes = fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {} to {}", relative, target))?;
            report.files += 1;
            report.bytes += bytes;
        } else {
            tracing::debug!("Skipping non-regular entry: {}", relative);
        }
    }

    tracing::info!(
        "Backed up {} files ({} bytes) into {}",
        report.files,
        report.bytes,
        destination
    );
    Ok(report)
}
