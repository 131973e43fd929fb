//! File discovery and the path conventions shared by the stages.

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

/// Packed mod archives
pub const ARCHIVE_SUFFIX: &str = ".wad.client";

/// Binary configuration files inside an extracted tree
pub const RESOURCE_SUFFIX: &str = ".bin";

/// Extension the converter gives decompiled text
pub const TEXT_EXTENSION: &str = "py";

/// Recursively list files under `root` whose name ends with `suffix`
/// (ASCII case-insensitive), sorted.
///
/// Unreadable entries and non-UTF-8 paths are logged and skipped.
pub fn find_files_with_suffix(root: &Utf8Path, suffix: &str) -> Result<Vec<Utf8PathBuf>> {
    if !root.is_dir() {
        bail!("Directory not found: {}", root);
    }

    let suffix = suffix.to_ascii_lowercase();
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root, e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = match Utf8PathBuf::try_from(entry.into_path()) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Skipping non UTF-8 path: {}", e.as_path().display());
                continue;
            }
        };

        let matches = path
            .file_name()
            .is_some_and(|name| name.to_ascii_lowercase().ends_with(&suffix));
        if matches {
            files.push(path);
        }
    }

    files.sort();
    tracing::debug!("Found {} '{}' files under {}", files.len(), suffix, root);
    Ok(files)
}

/// Archives under the mods directory
pub fn find_archives(mods_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    find_files_with_suffix(mods_dir, ARCHIVE_SUFFIX)
        .with_context(|| format!("Failed to scan for archives in {}", mods_dir))
}

/// Resource files inside one extracted tree
pub fn find_resources(tree: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    find_files_with_suffix(tree, RESOURCE_SUFFIX)
        .with_context(|| format!("Failed to scan for resources in {}", tree))
}

/// Directory an archive extracts into: the archive path minus its last
/// extension (`skin.wad.client` -> `skin.wad`).
pub fn extracted_tree_for(archive: &Utf8Path) -> Utf8PathBuf {
    archive.with_extension("")
}

/// Decompiled text counterpart of a resource file
pub fn text_path_for(resource: &Utf8Path) -> Utf8PathBuf {
    resource.with_extension(TEXT_EXTENSION)
}

/// Resource file a decompiled text file compiles back into
pub fn resource_path_for(text: &Utf8Path) -> Utf8PathBuf {
    text.with_extension(RESOURCE_SUFFIX.trim_start_matches('.'))
}
