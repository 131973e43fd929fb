use crate::models::{FileStatus, Stage};
use crate::services::discovery::{resource_path_for, text_path_for};
use crate::services::fanout::{StageContext, fan_out};
use crate::services::tools::ToolRunner;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;

/// Result of converting one file in either direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    pub source: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub status: FileStatus,
    pub message: String,
}

impl ConversionOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == FileStatus::Succeeded
    }
}

/// Drives the binary/text converter, invoked as `converter <file>`.
///
/// The converter decides direction from the file it is given: `x.bin`
/// produces `x.py` and `x.py` produces `x.bin`.
pub struct ResourceConverter<R: ToolRunner> {
    runner: Arc<R>,
    converter: Utf8PathBuf,
    ctx: StageContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToText,
    ToBinary,
}

impl Direction {
    fn stage(self) -> Stage {
        match self {
            Direction::ToText => Stage::ToText,
            Direction::ToBinary => Stage::ToBinary,
        }
    }

    fn output_for(self, source: &Utf8Path) -> Utf8PathBuf {
        match self {
            Direction::ToText => text_path_for(source),
            Direction::ToBinary => resource_path_for(source),
        }
    }
}

impl<R: ToolRunner> ResourceConverter<R> {
    pub fn new(runner: Arc<R>, converter: Utf8PathBuf, ctx: StageContext) -> Self {
        Self {
            runner,
            converter,
            ctx,
        }
    }

    /// Decompile resource files; the binaries stay in place
    pub async fn to_text(&self, resources: &[Utf8PathBuf]) -> Vec<ConversionOutcome> {
        self.convert_all(resources, Direction::ToText).await
    }

    /// Recompile decompiled text, deleting each text file once its binary is back
    pub async fn to_binary(&self, texts: &[Utf8PathBuf]) -> Vec<ConversionOutcome> {
        self.convert_all(texts, Direction::ToBinary).await
    }

    async fn convert_all(&self, files: &[Utf8PathBuf], direction: Direction) -> Vec<ConversionOutcome> {
        let stage = direction.stage();

        let results = fan_out(files.to_vec(), self.ctx.parallelism, |source| {
            let runner = Arc::clone(&self.runner);
            let converter = self.converter.clone();
            let ctx = self.ctx.clone();
            async move {
                let outcome = convert_one(&*runner, &converter, &ctx, &source, direction).await;
                ctx.state
                    .record_file(stage, &source, outcome.status, &outcome.message);
                outcome
            }
        })
        .await;

        files
            .iter()
            .zip(results)
            .map(|(source, result)| {
                result.unwrap_or_else(|| {
                    let outcome = ConversionOutcome {
                        source: source.clone(),
                        output: direction.output_for(source),
                        status: FileStatus::Failed,
                        message: "Task panicked".to_string(),
                    };
                    self.ctx
                        .state
                        .record_file(stage, source, outcome.status, &outcome.message);
                    outcome
                })
            })
            .collect()
    }
}

async fn convert_one<R: ToolRunner>(
    runner: &R,
    converter: &Utf8Path,
    ctx: &StageContext,
    source: &Utf8Path,
    direction: Direction,
) -> ConversionOutcome {
    let output = direction.output_for(source);
    let finish = |status: FileStatus, message: String| ConversionOutcome {
        source: source.to_path_buf(),
        output: output.clone(),
        status,
        message,
    };

    // The binary decompiled earlier is still in place; move it aside so a
    // converter that writes nothing cannot pass for a fresh recompile
    let set_aside = if direction == Direction::ToBinary && output.is_file() {
        let original = set_aside_path(&output);
        if let Err(e) = tokio::fs::rename(&output, &original).await {
            return finish(
                FileStatus::Failed,
                format!("Failed to move {} aside before recompiling: {}", output, e),
            );
        }
        Some(original)
    } else {
        None
    };

    let failure = match ctx.invoke(runner, converter, &[source.as_str()]).await {
        Err(message) => Some(message),
        Ok(()) if !output.is_file() => {
            Some(format!("Converter exited cleanly but {} is missing", output))
        }
        Ok(()) => None,
    };

    if let Some(message) = failure {
        if let Some(original) = &set_aside {
            restore_original(original, &output).await;
        }
        return finish(FileStatus::Failed, message);
    }

    if let Some(original) = &set_aside {
        if let Err(e) = tokio::fs::remove_file(original).await {
            tracing::warn!("Failed to remove {}: {}", original, e);
        }
    }

    if direction == Direction::ToBinary {
        if let Err(e) = tokio::fs::remove_file(source).await {
            return finish(
                FileStatus::Failed,
                format!("Recompiled, but failed to delete {}: {}", source, e),
            );
        }
    }

    finish(FileStatus::Succeeded, format!("Converted to {}", output))
}

/// `x.bin` -> `x.bin.orig`
fn set_aside_path(binary: &Utf8Path) -> Utf8PathBuf {
    let mut path = binary.as_str().to_string();
    path.push_str(".orig");
    Utf8PathBuf::from(path)
}

/// Put the pre-recompile binary back, replacing anything partial
async fn restore_original(original: &Utf8Path, output: &Utf8Path) {
    if output.exists() {
        if let Err(e) = tokio::fs::remove_file(output).await {
            tracing::warn!("Failed to remove partial output {}: {}", output, e);
        }
    }
    if let Err(e) = tokio::fs::rename(original, output).await {
        tracing::error!("Failed to restore {} from {}: {}", output, original, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::services::tools::{ToolError, ToolOutcome};
    use crate::state::StateManager;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Swaps `.bin` and `.py`, failing for paths containing "broken" and
    /// exiting cleanly without output for paths containing "silent"
    struct FlipRunner;

    impl ToolRunner for FlipRunner {
        async fn run(&self, _tool: &Utf8Path, args: &[&str]) -> Result<ToolOutcome, ToolError> {
            let source = Utf8Path::new(args[0]);
            let code = if source.as_str().contains("broken") {
                1
            } else if source.as_str().contains("silent") {
                0
            } else {
                let target = if source.extension() == Some("bin") {
                    text_path_for(source)
                } else {
                    resource_path_for(source)
                };
                fs::copy(source, target).unwrap();
                0
            };
            Ok(ToolOutcome {
                exit_code: Some(code),
                duration: Duration::ZERO,
            })
        }
    }

    fn converter() -> ResourceConverter<FlipRunner> {
        let ctx = StageContext::new(Arc::new(StateManager::new()), Arc::new(Metrics::new()), 4);
        ResourceConverter::new(Arc::new(FlipRunner), "ritobin".into(), ctx)
    }

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[tokio::test]
    async fn test_to_text_keeps_binary() {
        let (_temp, root) = temp_root();
        let bin = root.join("skin0.bin");
        fs::write(&bin, "data").unwrap();

        let outcomes = converter().to_text(&[bin.clone()]).await;

        assert!(outcomes[0].succeeded());
        assert_eq!(outcomes[0].output, root.join("skin0.py"));
        assert!(bin.exists());
        assert!(root.join("skin0.py").exists());
    }

    #[tokio::test]
    async fn test_to_binary_deletes_text_on_success_only() {
        let (_temp, root) = temp_root();
        let good = root.join("good.py");
        let bad = root.join("broken.py");
        fs::write(&good, "a").unwrap();
        fs::write(&bad, "b").unwrap();

        let outcomes = converter().to_binary(&[good.clone(), bad.clone()]).await;

        assert!(outcomes[0].succeeded());
        assert!(!good.exists());
        assert!(root.join("good.bin").exists());

        assert_eq!(outcomes[1].status, FileStatus::Failed);
        assert!(bad.exists(), "text must survive a failed recompile");
    }

    #[tokio::test]
    async fn test_to_binary_replaces_previous_binary() {
        let (_temp, root) = temp_root();
        let text = root.join("skin0.py");
        let bin = root.join("skin0.bin");
        fs::write(&bin, "stale").unwrap();
        fs::write(&text, "patched").unwrap();

        let outcomes = converter().to_binary(&[text.clone()]).await;

        assert!(outcomes[0].succeeded());
        assert_eq!(fs::read_to_string(&bin).unwrap(), "patched");
        assert!(!root.join("skin0.bin.orig").exists());
    }

    #[tokio::test]
    async fn test_to_binary_without_new_output_fails_and_restores() {
        let (_temp, root) = temp_root();
        let text = root.join("silent.py");
        let bin = root.join("silent.bin");
        fs::write(&bin, "original").unwrap();
        fs::write(&text, "patched").unwrap();

        let outcomes = converter().to_binary(&[text.clone()]).await;

        assert_eq!(outcomes[0].status, FileStatus::Failed);
        assert!(outcomes[0].message.contains("missing"));
        assert_eq!(fs::read_to_string(&bin).unwrap(), "original");
        assert!(text.exists(), "text must survive a recompile that wrote nothing");
        assert!(!root.join("silent.bin.orig").exists());
    }

    #[tokio::test]
    async fn test_failed_recompile_restores_previous_binary() {
        let (_temp, root) = temp_root();
        let text = root.join("broken.py");
        let bin = root.join("broken.bin");
        fs::write(&bin, "original").unwrap();
        fs::write(&text, "patched").unwrap();

        let outcomes = converter().to_binary(&[text.clone()]).await;

        assert_eq!(outcomes[0].status, FileStatus::Failed);
        assert_eq!(fs::read_to_string(&bin).unwrap(), "original");
        assert!(!root.join("broken.bin.orig").exists());
    }
}
