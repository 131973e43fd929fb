use crate::models::{FileStatus, Stage};
use crate::services::discovery::extracted_tree_for;
use crate::services::fanout::{StageContext, fan_out};
use crate::services::tools::ToolRunner;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;

/// Result of extracting or repacking one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub archive: Utf8PathBuf,
    pub tree: Utf8PathBuf,
    pub status: FileStatus,
    pub message: String,
}

impl ArchiveOutcome {
    fn new(archive: &Utf8Path, status: FileStatus, message: impl Into<String>) -> Self {
        Self {
            archive: archive.to_path_buf(),
            tree: extracted_tree_for(archive),
            status,
            message: message.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == FileStatus::Succeeded
    }
}

/// Drives the external extractor and repacker over a set of archives.
///
/// Invocations:
/// - extract: `extractor <archive> <tree>`
/// - repack: `repacker <tree> <archive>`
///
/// The extracted tree is removed only after a repack that exited cleanly and
/// left the archive in place; otherwise it stays on disk for diagnosis.
pub struct ArchivePipeline<R: ToolRunner> {
    runner: Arc<R>,
    extractor: Utf8PathBuf,
    repacker: Utf8PathBuf,
    ctx: StageContext,
}

impl<R: ToolRunner> ArchivePipeline<R> {
    pub fn new(
        runner: Arc<R>,
        extractor: Utf8PathBuf,
        repacker: Utf8PathBuf,
        ctx: StageContext,
    ) -> Self {
        Self {
            runner,
            extractor,
            repacker,
            ctx,
        }
    }

    /// Extract every archive into its sibling tree, one task per archive
    pub async fn extract_all(&self, archives: &[Utf8PathBuf]) -> Vec<ArchiveOutcome> {
        let results = fan_out(archives.to_vec(), self.ctx.parallelism, |archive| {
            let runner = Arc::clone(&self.runner);
            let extractor = self.extractor.clone();
            let ctx = self.ctx.clone();
            async move {
                let outcome = extract_one(&*runner, &extractor, &ctx, &archive).await;
                ctx.state
                    .record_file(Stage::Extract, &archive, outcome.status, &outcome.message);
                outcome
            }
        })
        .await;

        collect(archives, results, Stage::Extract, &self.ctx)
    }

    /// Repack every archive from its tree, one task per archive
    pub async fn repack_all(&self, archives: &[Utf8PathBuf]) -> Vec<ArchiveOutcome> {
        let results = fan_out(archives.to_vec(), self.ctx.parallelism, |archive| {
            let runner = Arc::clone(&self.runner);
            let repacker = self.repacker.clone();
            let ctx = self.ctx.clone();
            async move {
                let outcome = repack_one(&*runner, &repacker, &ctx, &archive).await;
                if !outcome.succeeded() && outcome.tree.exists() {
                    ctx.state.preserve_tree(&outcome.tree);
                }
                ctx.state
                    .record_file(Stage::Repack, &archive, outcome.status, &outcome.message);
                outcome
            }
        })
        .await;

        collect(archives, results, Stage::Repack, &self.ctx)
    }
}

async fn extract_one<R: ToolRunner>(
    runner: &R,
    extractor: &Utf8Path,
    ctx: &StageContext,
    archive: &Utf8Path,
) -> ArchiveOutcome {
    let tree = extracted_tree_for(archive);

    if let Err(message) = ctx
        .invoke(runner, extractor, &[archive.as_str(), tree.as_str()])
        .await
    {
        return ArchiveOutcome::new(archive, FileStatus::Failed, message);
    }

    if !tree.is_dir() {
        return ArchiveOutcome::new(
            archive,
            FileStatus::Failed,
            format!("Extractor produced no folder at {}", tree),
        );
    }

    tracing::debug!("Extracted {} into {}", archive, tree);
    ArchiveOutcome::new(archive, FileStatus::Succeeded, format!("Extracted to {}", tree))
}

async fn repack_one<R: ToolRunner>(
    runner: &R,
    repacker: &Utf8Path,
    ctx: &StageContext,
    archive: &Utf8Path,
) -> ArchiveOutcome {
    let tree = extracted_tree_for(archive);

    if let Err(message) = ctx
        .invoke(runner, repacker, &[tree.as_str(), archive.as_str()])
        .await
    {
        tracing::warn!("Keeping {} after failed repack", tree);
        return ArchiveOutcome::new(archive, FileStatus::Failed, message);
    }

    if !archive.is_file() {
        return ArchiveOutcome::new(
            archive,
            FileStatus::Failed,
            "Repacker exited cleanly but the archive is missing",
        );
    }

    if let Err(e) = tokio::fs::remove_dir_all(&tree).await {
        return ArchiveOutcome::new(
            archive,
            FileStatus::Failed,
            format!("Repacked, but failed to remove {}: {}", tree, e),
        );
    }

    ArchiveOutcome::new(archive, FileStatus::Succeeded, "Repacked")
}

/// Pair each result with its archive; panicked tasks become failures
fn collect(
    archives: &[Utf8PathBuf],
    results: Vec<Option<ArchiveOutcome>>,
    stage: Stage,
    ctx: &StageContext,
) -> Vec<ArchiveOutcome> {
    archives
        .iter()
        .zip(results)
        .map(|(archive, result)| {
            result.unwrap_or_else(|| {
                let outcome = ArchiveOutcome::new(archive, FileStatus::Failed, "Task panicked");
                ctx.state
                    .record_file(stage, archive, outcome.status, &outcome.message);
                outcome
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::services::tools::{ToolError, ToolOutcome};
    use crate::state::StateManager;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Creates the extracted folder on extract and exits with `repack_code` on repack
    struct ScriptedRunner {
        repack_code: i32,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(repack_code: i32) -> Self {
            Self {
                repack_code,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ToolRunner for ScriptedRunner {
        async fn run(&self, tool: &Utf8Path, args: &[&str]) -> Result<ToolOutcome, ToolError> {
            self.calls
                .lock()
                .unwrap()
                .push(args.iter().map(|a| a.to_string()).collect());

            let code = if tool.as_str() == "extract" {
                fs::create_dir_all(args[1]).unwrap();
                0
            } else {
                self.repack_code
            };

            Ok(ToolOutcome {
                exit_code: Some(code),
                duration: Duration::from_millis(1),
            })
        }
    }

    fn setup(repack_code: i32) -> (TempDir, Utf8PathBuf, ArchivePipeline<ScriptedRunner>, Arc<StateManager>) {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let archive = root.join("Ahri.wad.client");
        fs::write(&archive, b"wad").unwrap();

        let state = Arc::new(StateManager::new());
        let ctx = StageContext::new(Arc::clone(&state), Arc::new(Metrics::new()), 2);
        let pipeline = ArchivePipeline::new(
            Arc::new(ScriptedRunner::new(repack_code)),
            "extract".into(),
            "repack".into(),
            ctx,
        );
        (temp, archive, pipeline, state)
    }

    #[tokio::test]
    async fn test_extract_passes_archive_and_tree() {
        let (_temp, archive, pipeline, _state) = setup(0);

        let outcomes = pipeline.extract_all(&[archive.clone()]).await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].succeeded());
        assert!(outcomes[0].tree.is_dir());

        let calls = pipeline.runner.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![archive.to_string(), extracted_tree_for(&archive).to_string()]
        );
    }

    #[tokio::test]
    async fn test_successful_repack_removes_tree() {
        let (_temp, archive, pipeline, _state) = setup(0);
        pipeline.extract_all(&[archive.clone()]).await;

        let outcomes = pipeline.repack_all(&[archive.clone()]).await;

        assert!(outcomes[0].succeeded());
        assert!(!outcomes[0].tree.exists());
        let calls = pipeline.runner.calls.lock().unwrap();
        assert_eq!(
            calls[1],
            vec![extracted_tree_for(&archive).to_string(), archive.to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_repack_preserves_tree() {
        let (_temp, archive, pipeline, state) = setup(1);
        pipeline.extract_all(&[archive.clone()]).await;

        let outcomes = pipeline.repack_all(&[archive.clone()]).await;

        assert_eq!(outcomes[0].status, FileStatus::Failed);
        assert!(outcomes[0].tree.is_dir());
        assert!(outcomes[0].message.contains("exit code 1"));
        assert_eq!(
            state.read(|s| s.summary.preserved_trees.clone()),
            vec![outcomes[0].tree.clone()]
        );
    }
}
