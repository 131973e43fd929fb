use camino::Utf8PathBuf;
use std::collections::BTreeMap;
use std::fmt;

/// Pipeline stages in execution order
///
/// The derived ordering follows declaration order, which is also run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    ResolveEnv,
    ProvisionHashes,
    Backup,
    Extract,
    ToText,
    Rewrite,
    ToBinary,
    Repack,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::ResolveEnv,
        Stage::ProvisionHashes,
        Stage::Backup,
        Stage::Extract,
        Stage::ToText,
        Stage::Rewrite,
        Stage::ToBinary,
        Stage::Repack,
    ];

    /// Operator-facing description of the stage
    pub fn label(self) -> &'static str {
        match self {
            Stage::ResolveEnv => "Locating mod manager",
            Stage::ProvisionHashes => "Checking hash files",
            Stage::Backup => "Backing up installed mods",
            Stage::Extract => "Extracting WAD files",
            Stage::ToText => "Converting BIN to PY",
            Stage::Rewrite => "Modifying extracted data",
            Stage::ToBinary => "Converting PY to BIN",
            Stage::Repack => "Repacking WAD files",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one item (file, archive, download) within a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Succeeded => "succeeded",
            FileStatus::Failed => "failed",
            FileStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTally {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StageTally {
    pub fn record(&mut self, status: FileStatus) {
        match status {
            FileStatus::Succeeded => self.succeeded += 1,
            FileStatus::Failed => self.failed += 1,
            FileStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Aggregate result of one pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub profile: String,
    pub tallies: BTreeMap<Stage, StageTally>,
    /// Extracted trees left on disk for diagnosis
    pub preserved_trees: Vec<Utf8PathBuf>,
    /// Hash files still absent after provisioning
    pub missing_hashes: Vec<String>,
}

impl RunSummary {
    pub fn tally(&self, stage: Stage) -> StageTally {
        self.tallies.get(&stage).copied().unwrap_or_default()
    }

    pub fn total_failures(&self) -> usize {
        self.tallies.values().map(|t| t.failed).sum()
    }

    /// True when nothing failed, nothing was preserved and no hash is missing
    pub fn is_clean(&self) -> bool {
        self.total_failures() == 0 && self.preserved_trees.is_empty() && self.missing_hashes.is_empty()
    }

    /// One-line description of failures, e.g. "2 failed in Extracting WAD files"
    pub fn failure_report(&self) -> String {
        let mut parts: Vec<String> = self
            .tallies
            .iter()
            .filter(|(_, t)| t.failed > 0)
            .map(|(stage, t)| format!("{} failed in {}", t.failed, stage))
            .collect();

        if !self.preserved_trees.is_empty() {
            parts.push(format!("{} extracted folders preserved", self.preserved_trees.len()));
        }
        if !self.missing_hashes.is_empty() {
            parts.push(format!("{} hash files missing", self.missing_hashes.len()));
        }

        if parts.is_empty() {
            "No failures".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Live state of the current run
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub is_running: bool,
    pub profile: Option<String>,
    pub current_stage: Option<Stage>,
    pub stage_completed: usize,
    pub stage_total: usize,
    pub summary: RunSummary,
}

impl RunState {
    /// Integer percentage of the current stage; an empty stage counts as complete
    pub fn percent(&self) -> u8 {
        percent(self.stage_completed, self.stage_total)
    }

    pub fn reset(&mut self) {
        *self = RunState::default();
    }
}

pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (completed.min(total) * 100 / total) as u8
}
