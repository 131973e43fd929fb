//! Services module - the stages of a patch run and the orchestrator driving them.
//!
//! Nothing in here writes to the console. Progress flows out through
//! [`StateManager`](crate::state::StateManager) events and the returned outcomes.
//!
//! # Components
//!
//! - [`Pipeline`]: Runs one [`RuleProfile`](crate::models::RuleProfile) end to end:
//!   locate the manager, provision hashes, back up, extract, decompile, rewrite,
//!   recompile, repack
//! - [`ToolRunner`]: Seam for the external extractor, converter and repacker
//! - [`ManagerLocator`]: Finds the running mod manager and its mods directory
//! - [`HashProvisioner`]: Downloads missing hash tables
//! - [`backup()`]: Single-generation copy of the mods directory
//! - [`ArchivePipeline`], [`ResourceConverter`], [`RuleRewriter`]: Per-file stages,
//!   each fanned out over a bounded set of tokio tasks via [`fan_out`]
//!
//! # Failure policy
//!
//! Errors before the backup completes abort the run with nothing modified.
//! After that, a failing file is recorded and its siblings keep going; an
//! archive whose contents did not convert cleanly is left untouched and its
//! extracted folder is kept.

pub mod archive;
pub mod backup;
pub mod converter;
pub mod discovery;
pub mod environment;
pub mod fanout;
pub mod hashes;
pub mod pipeline;
pub mod rewriter;
pub mod tools;

pub use archive::{ArchiveOutcome, ArchivePipeline};
pub use backup::{BackupReport, backup};
pub use converter::{ConversionOutcome, ResourceConverter};
pub use environment::{EnvironmentError, ManagerLocator, ManagerPaths, ProcessLocator};
pub use fanout::{StageContext, effective_parallelism, fan_out};
pub use hashes::{HASH_FILES, HashProvisioner, ProvisionReport, ProvisionStatus};
pub use pipeline::{Pipeline, PipelineError, PipelineOptions, RunOutcome};
pub use rewriter::{AccessProbe, CompiledProfile, CompiledRule, ReadWriteProbe, RewriteOutcome, RuleRewriter};
pub use tools::{ProcessToolRunner, ToolError, ToolOutcome, ToolPaths, ToolRunner};
