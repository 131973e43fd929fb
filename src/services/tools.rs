use crate::models::Settings;
use camino::{Utf8Path, Utf8PathBuf};
use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Exit information of one external tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ToolOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short human-readable status, e.g. "exit code 2"
    pub fn describe(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Errors launching or waiting on a tool
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },
}

/// Capability to run an external tool and observe its exit status.
///
/// Every stage goes through this seam so tests can substitute the extractor,
/// converter and repacker.
pub trait ToolRunner: Send + Sync + 'static {
    fn run(
        &self,
        tool: &Utf8Path,
        args: &[&str],
    ) -> impl Future<Output = Result<ToolOutcome, ToolError>> + Send;
}

/// Runs tools as child processes without a shell
#[derive(Debug, Clone, Default)]
pub struct ProcessToolRunner {
    timeout: Option<Duration>,
}

impl ProcessToolRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ToolRunner for ProcessToolRunner {
    async fn run(&self, tool: &Utf8Path, args: &[&str]) -> Result<ToolOutcome, ToolError> {
        tracing::debug!("Executing: {} {:?}", tool, args);

        let start = Instant::now();

        let mut cmd = Command::new(tool.as_std_path());
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

        let waited = match self.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    tracing::warn!("{} timed out after {:?}", tool, limit);
                    ToolError::Timeout {
                        tool: tool.to_string(),
                        timeout: limit,
                    }
                })?,
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

        let outcome = ToolOutcome {
            exit_code: output.status.code(),
            duration: start.elapsed(),
        };

        if outcome.success() {
            tracing::debug!(
                "{} completed in {:.2}s",
                tool,
                outcome.duration.as_secs_f32()
            );
        } else {
            tracing::warn!(
                "{} {:?} failed with {}: {}",
                tool,
                args,
                outcome.describe(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(outcome)
    }
}

/// Locations of the three external tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub extractor: Utf8PathBuf,
    pub repacker: Utf8PathBuf,
    pub converter: Utf8PathBuf,
}

impl ToolPaths {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            extractor: Utf8PathBuf::from(&settings.extractor_exe),
            repacker: Utf8PathBuf::from(&settings.repacker_exe),
            converter: Utf8PathBuf::from(&settings.converter_exe),
        }
    }

    /// Tools that are not present on disk
    pub fn missing(&self) -> Vec<&Utf8Path> {
        [&self.extractor, &self.repacker, &self.converter]
            .into_iter()
            .filter(|p| !p.is_file())
            .map(|p| p.as_path())
            .collect()
    }
}
