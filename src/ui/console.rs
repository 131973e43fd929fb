// Console shell - menu, progress rendering and the final banner
//
// The renderer is a tokio task subscribed to StateManager events. It is
// subscribed before the run starts and stops at the terminal event, so every
// progress line is printed before the banner.

use crate::models::{FileStatus, RuleProfile, Stage};
use crate::services::{ManagerLocator, Pipeline, RunOutcome, ToolRunner};
use crate::state::StateChange;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// A line of menu input, interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuChoice {
    /// Index into the profile list
    Run(usize),
    Exit,
    Invalid(String),
}

/// Numbered menu: one entry per profile, exit last
pub fn menu_text(profiles: &[RuleProfile]) -> String {
    let mut text = String::from("\nSelect a fix to apply:\n");
    for (index, profile) in profiles.iter().enumerate() {
        text.push_str(&format!("  {}. {}\n", index + 1, profile.description));
    }
    text.push_str(&format!("  {}. Exit\n", profiles.len() + 1));
    text.push_str("Enter your choice: ");
    text
}

pub fn parse_choice(input: &str, profile_count: usize) -> MenuChoice {
    let trimmed = input.trim();
    match trimmed.parse::<usize>() {
        Ok(n) if (1..=profile_count).contains(&n) => MenuChoice::Run(n - 1),
        Ok(n) if n == profile_count + 1 => MenuChoice::Exit,
        _ => MenuChoice::Invalid(trimmed.to_string()),
    }
}

/// Turns state events into console lines.
///
/// Successful files are not printed individually; progress is shown in 10%
/// steps per stage.
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    last_step: Option<(Stage, u8)>,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, change: &StateChange) -> Option<String> {
        match change {
            StateChange::RunStarted { profile } => Some(format!("Running profile '{}'", profile)),
            StateChange::StageStarted { stage, total } => {
                self.last_step = Some((*stage, 0));
                Some(format!("{}... ({} items)", stage, total))
            }
            StateChange::FileProcessed {
                stage,
                path,
                status,
                message,
            } => match status {
                FileStatus::Succeeded => None,
                FileStatus::Failed | FileStatus::Skipped => Some(format!(
                    "  [{}] {}: {} ({})",
                    status.as_str().to_uppercase(),
                    path,
                    message,
                    stage
                )),
            },
            StateChange::ProgressUpdated {
                stage,
                completed,
                total,
                percent,
            } => {
                let step = percent / 10;
                if self.last_step == Some((*stage, step)) {
                    return None;
                }
                self.last_step = Some((*stage, step));
                Some(format!("  {}/{} ({}%)", completed, total, percent))
            }
            StateChange::StageFinished { stage, tally } => Some(format!(
                "{}: {} succeeded, {} failed, {} skipped",
                stage, tally.succeeded, tally.failed, tally.skipped
            )),
            StateChange::RunFinished { .. } | StateChange::RunAborted { .. } => None,
        }
    }
}

/// Message printed once a run has ended
pub fn outcome_banner(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Done(summary) if summary.is_clean() => {
            format!("All done! Profile '{}' applied successfully.", summary.profile)
        }
        RunOutcome::Done(summary) => {
            let mut banner = format!(
                "Profile '{}' completed with failures: {}",
                summary.profile,
                summary.failure_report()
            );
            for tree in &summary.preserved_trees {
                banner.push_str(&format!("\n  Kept for inspection: {}", tree));
            }
            if !summary.missing_hashes.is_empty() {
                banner.push_str(&format!(
                    "\n  Missing hash files: {}",
                    summary.missing_hashes.join(", ")
                ));
            }
            banner
        }
        RunOutcome::Aborted { stage, reason } => {
            format!("Aborted during {}: {}\nNo mods were modified.", stage, reason)
        }
        RunOutcome::Rejected { profile, reason } => {
            format!("Profile '{}' was not run: {}\nNo mods were modified.", profile, reason)
        }
    }
}

/// Print events from `rx` until the run ends or the channel closes
pub fn spawn_renderer(mut rx: broadcast::Receiver<StateChange>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = ConsoleRenderer::new();
        loop {
            match rx.recv().await {
                Ok(change) => {
                    if let Some(line) = renderer.render(&change) {
                        println!("{}", line);
                    }
                    if change.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Console renderer lagged - {} events were skipped", skipped);
                }
            }
        }
    })
}

/// Run `profile` while rendering its progress, then print the banner
pub async fn run_with_console<R, L>(pipeline: &Pipeline<R, L>, profile: &RuleProfile) -> RunOutcome
where
    R: ToolRunner,
    L: ManagerLocator,
{
    let renderer = spawn_renderer(pipeline.state().subscribe());
    let outcome = pipeline.run(profile).await;

    // A rejected profile never starts a run, so no terminal event will come
    if matches!(outcome, RunOutcome::Rejected { .. }) {
        renderer.abort();
    } else if let Err(e) = renderer.await {
        tracing::error!("Console renderer failed: {}", e);
    }
    println!("{}", outcome_banner(&outcome));
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunSummary, StageTally};
    use camino::Utf8PathBuf;

    #[test]
    fn test_parse_choice_with_builtins() {
        assert_eq!(parse_choice("1", 2), MenuChoice::Run(0));
        assert_eq!(parse_choice(" 2\n", 2), MenuChoice::Run(1));
        assert_eq!(parse_choice("3", 2), MenuChoice::Exit);
        assert_eq!(parse_choice("4", 2), MenuChoice::Invalid("4".to_string()));
        assert_eq!(parse_choice("0", 2), MenuChoice::Invalid("0".to_string()));
        assert_eq!(parse_choice("abc", 2), MenuChoice::Invalid("abc".to_string()));
    }

    #[test]
    fn test_exit_stays_last_with_user_profiles() {
        let mut profiles = RuleProfile::builtins();
        profiles.push(RuleProfile::new("custom", "My rules", vec![]));

        let menu = menu_text(&profiles);
        assert!(menu.contains("3. My rules"));
        assert!(menu.contains("4. Exit"));
        assert_eq!(parse_choice("4", profiles.len()), MenuChoice::Exit);
    }

    #[test]
    fn test_progress_printed_in_steps() {
        let mut renderer = ConsoleRenderer::new();
        renderer.render(&StateChange::StageStarted {
            stage: Stage::Rewrite,
            total: 100,
        });

        let progress = |completed: usize| StateChange::ProgressUpdated {
            stage: Stage::Rewrite,
            completed,
            total: 100,
            percent: completed as u8,
        };

        assert!(renderer.render(&progress(1)).is_none());
        assert!(renderer.render(&progress(10)).is_some());
        assert!(renderer.render(&progress(15)).is_none());
        assert!(renderer.render(&progress(20)).is_some());
    }

    #[test]
    fn test_successful_files_are_quiet() {
        let mut renderer = ConsoleRenderer::new();
        let event = |status| StateChange::FileProcessed {
            stage: Stage::Extract,
            path: Utf8PathBuf::from("a.wad.client"),
            status,
            message: "x".to_string(),
        };

        assert!(renderer.render(&event(FileStatus::Succeeded)).is_none());
        let line = renderer.render(&event(FileStatus::Failed)).unwrap();
        assert!(line.contains("FAILED"));
        assert!(line.contains("a.wad.client"));
    }

    #[test]
    fn test_banners() {
        let clean = RunSummary {
            profile: "base".to_string(),
            ..RunSummary::default()
        };
        assert!(outcome_banner(&RunOutcome::Done(clean.clone())).starts_with("All done!"));

        let mut failed = clean;
        failed.tallies.insert(
            Stage::Extract,
            StageTally {
                succeeded: 1,
                failed: 2,
                skipped: 0,
            },
        );
        failed.preserved_trees.push(Utf8PathBuf::from("/mods/a.wad"));
        let banner = outcome_banner(&RunOutcome::Done(failed));
        assert!(banner.contains("completed with failures"));
        assert!(banner.contains("/mods/a.wad"));

        let aborted = outcome_banner(&RunOutcome::Aborted {
            stage: Stage::ResolveEnv,
            reason: "cslol-manager is not running. Please start it and try again.".to_string(),
        });
        assert!(aborted.contains("not running"));
        assert!(aborted.contains("No mods were modified"));

        let rejected = outcome_banner(&RunOutcome::Rejected {
            profile: "custom".to_string(),
            reason: "Invalid rule #1 ('(') in profile 'custom'".to_string(),
        });
        assert!(rejected.starts_with("Profile 'custom' was not run"));
        assert!(!rejected.contains("Locating mod manager"));
        assert!(rejected.contains("No mods were modified"));
    }
}
