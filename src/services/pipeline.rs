//! End-to-end run for one rule profile.
//!
//! `ResolveEnv -> ProvisionHashes -> Backup -> Extract -> ToText -> Rewrite ->
//! ToBinary -> Repack -> Done`, with a barrier between stages. Fatal checks
//! (manager not running, strict hash policy, backup failure) all happen
//! before the mods directory is touched; everything after that is best
//! effort and counted in the [`RunSummary`].

use crate::metrics::Metrics;
use crate::models::{FileStatus, RuleProfile, RunSummary, Settings, Stage};
use crate::services::archive::ArchivePipeline;
use crate::services::backup::backup;
use crate::services::converter::ResourceConverter;
use crate::services::discovery::{find_archives, find_resources};
use crate::services::environment::{ManagerLocator, ManagerPaths};
use crate::services::fanout::{StageContext, effective_parallelism};
use crate::services::hashes::{HASH_FILES, HashProvisioner, ProvisionStatus};
use crate::services::rewriter::{AccessProbe, CompiledProfile, ReadWriteProbe, RuleRewriter};
use crate::services::tools::{ToolPaths, ToolRunner};
use crate::state::StateManager;
use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Conditions that end a run before any mutation
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Environment(#[from] crate::services::environment::EnvironmentError),

    #[error("Hash files still missing after download: {}", .0.join(", "))]
    HashesIncomplete(Vec<String>),

    #[error("Failed to prepare hash files: {0:#}")]
    HashDirectory(anyhow::Error),

    #[error("Backup failed, nothing was modified: {0:#}")]
    BackupFailed(anyhow::Error),

}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Done(RunSummary),
    Aborted { stage: Stage, reason: String },
    /// The profile's rules did not compile; no stage was started
    Rejected { profile: String, reason: String },
}

impl RunOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done(_))
    }
}

/// Knobs for a pipeline, usually built from [`Settings`]
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub tools: ToolPaths,
    pub hash_dir: Utf8PathBuf,
    pub hash_base_url: String,
    pub parallelism: usize,
    pub strict_hashes: bool,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            tools: ToolPaths::from_settings(settings),
            hash_dir: settings.hash_dir(),
            hash_base_url: settings.hash_base_url.clone(),
            parallelism: effective_parallelism(settings.max_parallel_tasks),
            strict_hashes: settings.strict_hashes,
        }
    }
}

/// An archive that extracted cleanly, and its tree
#[derive(Debug, Clone)]
struct Extracted {
    archive: Utf8PathBuf,
    tree: Utf8PathBuf,
}

pub struct Pipeline<R: ToolRunner, L: ManagerLocator> {
    runner: Arc<R>,
    locator: L,
    provisioner: HashProvisioner,
    probe: Arc<dyn AccessProbe>,
    options: PipelineOptions,
    state: Arc<StateManager>,
    metrics: Arc<Metrics>,
}

impl<R: ToolRunner, L: ManagerLocator> Pipeline<R, L> {
    pub fn new(
        runner: Arc<R>,
        locator: L,
        options: PipelineOptions,
        state: Arc<StateManager>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let provisioner = HashProvisioner::new(options.hash_base_url.clone())?;
        Ok(Self {
            runner,
            locator,
            provisioner,
            probe: Arc::new(ReadWriteProbe),
            options,
            state,
            metrics,
        })
    }

    /// Replace the read/write probe used by the rewrite stage
    pub fn with_probe(mut self, probe: Arc<dyn AccessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// Run every stage for `profile`.
    ///
    /// A started run always ends with a `RunFinished` or `RunAborted` event.
    /// A profile whose rules do not compile is rejected without emitting
    /// any event.
    pub async fn run(&self, profile: &RuleProfile) -> RunOutcome {
        let compiled = match CompiledProfile::compile(profile) {
            Ok(compiled) => Arc::new(compiled),
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::error!("Rejected profile '{}': {}", profile.name, reason);
                return RunOutcome::Rejected {
                    profile: profile.name.clone(),
                    reason,
                };
            }
        };

        self.state.start_run(&profile.name);
        tracing::info!(
            "Starting run with profile '{}' ({} rules)",
            profile.name,
            profile.rules.len()
        );

        let outcome = match self.run_stages(compiled).await {
            Ok(summary) => {
                tracing::info!("Run finished: {}", summary.failure_report());
                RunOutcome::Done(summary)
            }
            Err((stage, error)) => {
                tracing::error!("Run aborted during {}: {}", stage, error);
                let reason = error.to_string();
                self.state.abort_run(stage, reason.clone());
                RunOutcome::Aborted { stage, reason }
            }
        };

        self.metrics.record_run(outcome.is_done());
        outcome
    }

    async fn run_stages(
        &self,
        compiled: Arc<CompiledProfile>,
    ) -> Result<RunSummary, (Stage, PipelineError)> {
        let paths = self
            .resolve_env()
            .map_err(|e| (Stage::ResolveEnv, e))?;

        self.provision_hashes()
            .await
            .map_err(|e| (Stage::ProvisionHashes, e))?;

        self.backup(&paths)
            .await
            .map_err(|e| (Stage::Backup, e))?;

        let ctx = StageContext::new(
            Arc::clone(&self.state),
            Arc::clone(&self.metrics),
            self.options.parallelism,
        );
        let archives = ArchivePipeline::new(
            Arc::clone(&self.runner),
            self.options.tools.extractor.clone(),
            self.options.tools.repacker.clone(),
            ctx.clone(),
        );
        let converter = ResourceConverter::new(
            Arc::clone(&self.runner),
            self.options.tools.converter.clone(),
            ctx.clone(),
        );
        let rewriter = RuleRewriter::new(compiled, Arc::clone(&self.probe), ctx);

        let extracted = self.extract(&archives, &paths.mods_dir).await;
        let mut tainted: HashSet<Utf8PathBuf> = HashSet::new();

        // ToText
        let resources = self.discover_resources(&extracted, &mut tainted);
        self.state.begin_stage(Stage::ToText, resources.len());
        let decompiled = converter.to_text(&resources).await;
        self.state.finish_stage(Stage::ToText);

        let mut texts = Vec::new();
        for outcome in decompiled {
            if outcome.succeeded() {
                texts.push(outcome.output);
            } else {
                taint(&mut tainted, &extracted, &outcome.source);
            }
        }

        // Rewrite
        self.state.begin_stage(Stage::Rewrite, texts.len());
        for outcome in rewriter.apply(&texts).await {
            if outcome.status == FileStatus::Failed {
                taint(&mut tainted, &extracted, &outcome.path);
            }
        }
        self.state.finish_stage(Stage::Rewrite);

        // ToBinary
        self.state.begin_stage(Stage::ToBinary, texts.len());
        for outcome in converter.to_binary(&texts).await {
            if !outcome.succeeded() {
                taint(&mut tainted, &extracted, &outcome.source);
            }
        }
        self.state.finish_stage(Stage::ToBinary);

        self.repack(&archives, &extracted, &tainted).await;

        Ok(self.state.finish_run())
    }

    fn resolve_env(&self) -> Result<ManagerPaths, PipelineError> {
        self.state.begin_stage(Stage::ResolveEnv, 1);
        let paths = self.locator.locate()?;
        self.state.record_file(
            Stage::ResolveEnv,
            &paths.executable,
            FileStatus::Succeeded,
            format!("Mods directory: {}", paths.mods_dir),
        );
        self.state.finish_stage(Stage::ResolveEnv);
        Ok(paths)
    }

    async fn provision_hashes(&self) -> Result<(), PipelineError> {
        let hash_dir = &self.options.hash_dir;
        self.state
            .begin_stage(Stage::ProvisionHashes, HASH_FILES.len());

        let report = self
            .provisioner
            .ensure(hash_dir)
            .await
            .map_err(PipelineError::HashDirectory)?;

        self.metrics.record_hash_downloads(report.fetched.len());
        for name in &report.already_present {
            self.state.record_file(
                Stage::ProvisionHashes,
                &hash_dir.join(name),
                FileStatus::Skipped,
                "Already present",
            );
        }
        for name in &report.fetched {
            self.state.record_file(
                Stage::ProvisionHashes,
                &hash_dir.join(name),
                FileStatus::Succeeded,
                "Downloaded",
            );
        }
        for (name, reason) in &report.failed {
            self.state.record_file(
                Stage::ProvisionHashes,
                &hash_dir.join(name),
                FileStatus::Failed,
                reason.clone(),
            );
        }
        self.state.finish_stage(Stage::ProvisionHashes);

        if report.status() == ProvisionStatus::Ready {
            return Ok(());
        }

        let missing = report.missing();
        if self.options.strict_hashes {
            return Err(PipelineError::HashesIncomplete(missing));
        }

        tracing::warn!(
            "Continuing without {} hash files; converted output may contain unresolved hashes",
            missing.len()
        );
        self.state.set_missing_hashes(missing);
        Ok(())
    }

    async fn backup(&self, paths: &ManagerPaths) -> Result<(), PipelineError> {
        self.state.begin_stage(Stage::Backup, 1);

        let source = paths.mods_dir.clone();
        let destination = paths.backup_dir.clone();
        let result = tokio::task::spawn_blocking(move || backup(&source, &destination))
            .await
            .map_err(|e| PipelineError::BackupFailed(anyhow::anyhow!("Backup task failed: {}", e)))?;

        match result {
            Ok(report) => {
                self.state.record_file(
                    Stage::Backup,
                    &report.destination,
                    FileStatus::Succeeded,
                    format!("Copied {} files", report.files),
                );
                self.state.finish_stage(Stage::Backup);
                Ok(())
            }
            Err(e) => {
                self.state.record_file(
                    Stage::Backup,
                    &paths.backup_dir,
                    FileStatus::Failed,
                    format!("{:#}", e),
                );
                self.state.finish_stage(Stage::Backup);
                Err(PipelineError::BackupFailed(e))
            }
        }
    }

    async fn extract(&self, archives: &ArchivePipeline<R>, mods_dir: &Utf8Path) -> Vec<Extracted> {
        let found = find_archives(mods_dir).unwrap_or_else(|e| {
            tracing::error!("{:#}", e);
            Vec::new()
        });
        tracing::info!("Found {} archives in {}", found.len(), mods_dir);

        self.state.begin_stage(Stage::Extract, found.len());
        let outcomes = archives.extract_all(&found).await;
        self.state.finish_stage(Stage::Extract);

        let mut extracted = Vec::new();
        for outcome in outcomes {
            if outcome.succeeded() {
                extracted.push(Extracted {
                    archive: outcome.archive,
                    tree: outcome.tree,
                });
            } else if outcome.tree.is_dir() {
                tracing::warn!("Keeping partial extraction at {}", outcome.tree);
                self.state.preserve_tree(&outcome.tree);
            }
        }
        extracted
    }

    /// Resource files of every extracted tree; a tree that cannot be scanned
    /// is tainted
    fn discover_resources(
        &self,
        extracted: &[Extracted],
        tainted: &mut HashSet<Utf8PathBuf>,
    ) -> Vec<Utf8PathBuf> {
        let mut resources = Vec::new();
        for entry in extracted {
            match find_resources(&entry.tree) {
                Ok(found) => resources.extend(found),
                Err(e) => {
                    tracing::error!("{:#}", e);
                    tainted.insert(entry.tree.clone());
                }
            }
        }
        resources
    }

    async fn repack(
        &self,
        archives: &ArchivePipeline<R>,
        extracted: &[Extracted],
        tainted: &HashSet<Utf8PathBuf>,
    ) {
        let (ready, held): (Vec<&Extracted>, Vec<&Extracted>) =
            extracted.iter().partition(|e| !tainted.contains(&e.tree));

        self.state.begin_stage(Stage::Repack, extracted.len());

        for entry in &held {
            tracing::warn!(
                "Not repacking {}: conversion failed inside {}",
                entry.archive,
                entry.tree
            );
            self.state.preserve_tree(&entry.tree);
            self.state.record_file(
                Stage::Repack,
                &entry.archive,
                FileStatus::Skipped,
                format!("Kept original archive; folder preserved at {}", entry.tree),
            );
        }

        let ready: Vec<Utf8PathBuf> = ready.into_iter().map(|e| e.archive.clone()).collect();
        archives.repack_all(&ready).await;
        self.state.finish_stage(Stage::Repack);
    }
}

/// Mark the tree containing `path` as unsafe to repack
fn taint(tainted: &mut HashSet<Utf8PathBuf>, extracted: &[Extracted], path: &Utf8Path) {
    if let Some(entry) = extracted.iter().find(|e| path.starts_with(&e.tree)) {
        tainted.insert(entry.tree.clone());
    }
}
