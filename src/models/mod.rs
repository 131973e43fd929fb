//! Data models for PatchFixer.
//!
//! - [`RuleProfile`]: Ordered find/replace rules, including the built-in `base` and `extended` sets
//! - [`UserConfig`]: Tool paths, runtime settings and user profiles from `PatchFixer Config.yaml`
//! - [`RunState`]: Live progress of a pipeline run, owned by [`StateManager`](crate::state::StateManager)
//! - [`RunSummary`]: Per-stage tallies reported when a run ends

pub mod config;
pub mod profile;
pub mod run_state;

pub use config::{ProfileDefinition, Settings, UserConfig};
pub use profile::{BASE_PROFILE, EXTENDED_PROFILE, MatchMode, Rule, RuleProfile};
pub use run_state::{FileStatus, RunState, RunSummary, Stage, StageTally};
