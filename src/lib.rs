// PatchFixer - property-rename patcher for mods installed through cslol-manager
//
// This is the library crate containing the pipeline stages, state and configuration.
// The binary crate (main.rs) provides the interactive console entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{RuleProfile, RunSummary, Stage, UserConfig};
pub use services::{Pipeline, PipelineOptions, RunOutcome};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
