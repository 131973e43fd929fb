use crate::models::{FileStatus, MatchMode, Rule, RuleProfile, Stage};
use crate::services::fanout::{StageContext, fan_out};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::{NoExpand, Regex, RegexBuilder};
use std::fs::{self, OpenOptions};
use std::sync::Arc;

/// Decides whether a file may be rewritten
#[cfg_attr(test, mockall::automock)]
pub trait AccessProbe: Send + Sync {
    fn can_modify(&self, path: &Utf8Path) -> bool;
}

/// Opens the file for read and write, then closes it
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadWriteProbe;

impl AccessProbe for ReadWriteProbe {
    fn can_modify(&self, path: &Utf8Path) -> bool {
        OpenOptions::new().read(true).write(true).open(path).is_ok()
    }
}

/// A rule compiled into its matcher
#[derive(Debug, Clone)]
pub struct CompiledRule {
    matcher: Regex,
    replacement: String,
    mode: MatchMode,
}

impl CompiledRule {
    pub fn compile(rule: &Rule) -> Result<Self, regex::Error> {
        let source = match rule.mode {
            MatchMode::Literal => regex::escape(&rule.find),
            MatchMode::Pattern => rule.find.clone(),
        };

        let matcher = RegexBuilder::new(&source).case_insensitive(true).build()?;

        Ok(Self {
            matcher,
            replacement: rule.replace.clone(),
            mode: rule.mode,
        })
    }

    /// Replace every non-overlapping match; returns the new text and match count
    pub fn apply(&self, text: &str) -> (String, usize) {
        let count = self.matcher.find_iter(text).count();
        if count == 0 {
            return (text.to_string(), 0);
        }

        let replaced = match self.mode {
            MatchMode::Literal => self
                .matcher
                .replace_all(text, NoExpand(&self.replacement))
                .into_owned(),
            MatchMode::Pattern => self
                .matcher
                .replace_all(text, self.replacement.as_str())
                .into_owned(),
        };
        (replaced, count)
    }
}

/// A profile with all of its rules compiled, ready to share across tasks
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub name: String,
    rules: Vec<CompiledRule>,
}

impl CompiledProfile {
    pub fn compile(profile: &RuleProfile) -> Result<Self> {
        let rules = profile
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                CompiledRule::compile(rule).with_context(|| {
                    format!(
                        "Invalid rule #{} ('{}') in profile '{}'",
                        index + 1,
                        rule.find,
                        profile.name
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: profile.name.clone(),
            rules,
        })
    }

    /// Apply each rule in order, one full pass per rule
    pub fn apply(&self, text: &str) -> (String, usize) {
        let mut current = text.to_string();
        let mut total = 0;
        for rule in &self.rules {
            let (next, count) = rule.apply(&current);
            current = next;
            total += count;
        }
        (current, total)
    }
}

/// Result of rewriting one decompiled file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub path: Utf8PathBuf,
    pub status: FileStatus,
    pub replacements: usize,
    pub message: String,
}

impl RewriteOutcome {
    fn new(path: &Utf8Path, status: FileStatus, replacements: usize, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            status,
            replacements,
            message: message.into(),
        }
    }
}

/// Rewrite a single file in place.
///
/// A file the probe rejects is skipped untouched. The file is only written
/// when at least one rule matched.
pub fn rewrite_file(profile: &CompiledProfile, probe: &dyn AccessProbe, path: &Utf8Path) -> RewriteOutcome {
    if !probe.can_modify(path) {
        tracing::warn!("Permission denied for file: {}", path);
        return RewriteOutcome::new(path, FileStatus::Skipped, 0, "Permission denied");
    }

    match rewrite_contents(profile, path) {
        Ok(0) => RewriteOutcome::new(path, FileStatus::Succeeded, 0, "No matches"),
        Ok(count) => {
            tracing::debug!("Updated {} ({} replacements)", path, count);
            RewriteOutcome::new(
                path,
                FileStatus::Succeeded,
                count,
                format!("Updated ({} replacements)", count),
            )
        }
        Err(e) => {
            tracing::error!("File Error: Cannot update file {}: {:#}", path, e);
            RewriteOutcome::new(path, FileStatus::Failed, 0, format!("{:#}", e))
        }
    }
}

fn rewrite_contents(profile: &CompiledProfile, path: &Utf8Path) -> Result<usize> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;

    let (rewritten, count) = profile.apply(&content);
    if count > 0 {
        fs::write(path, rewritten).with_context(|| format!("Failed to write {}", path))?;
    }
    Ok(count)
}

/// Applies a compiled profile to many files concurrently.
///
/// One file's failure never stops the others, and files already rewritten are
/// not rolled back.
pub struct RuleRewriter {
    profile: Arc<CompiledProfile>,
    probe: Arc<dyn AccessProbe>,
    ctx: StageContext,
}

impl RuleRewriter {
    pub fn new(profile: Arc<CompiledProfile>, probe: Arc<dyn AccessProbe>, ctx: StageContext) -> Self {
        Self { profile, probe, ctx }
    }

    pub async fn apply(&self, files: &[Utf8PathBuf]) -> Vec<RewriteOutcome> {
        let results = fan_out(files.to_vec(), self.ctx.parallelism, |path| {
            let profile = Arc::clone(&self.profile);
            let probe = Arc::clone(&self.probe);
            let ctx = self.ctx.clone();
            async move {
                let blocking_path = path.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    rewrite_file(&profile, probe.as_ref(), &blocking_path)
                })
                .await
                .unwrap_or_else(|e| {
                    RewriteOutcome::new(&path, FileStatus::Failed, 0, format!("Task failed: {}", e))
                });

                match outcome.status {
                    FileStatus::Skipped => ctx.metrics.record_skipped_file(),
                    _ => ctx.metrics.record_rewrite(outcome.replacements),
                }
                ctx.state
                    .record_file(Stage::Rewrite, &path, outcome.status, &outcome.message);
                outcome
            }
        })
        .await;

        files
            .iter()
            .zip(results)
            .map(|(path, result)| {
                result.unwrap_or_else(|| {
                    let outcome = RewriteOutcome::new(path, FileStatus::Failed, 0, "Task panicked");
                    self.ctx
                        .state
                        .record_file(Stage::Rewrite, path, outcome.status, &outcome.message);
                    outcome
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::state::StateManager;
    use tempfile::TempDir;

    fn compiled(profile: RuleProfile) -> CompiledProfile {
        CompiledProfile::compile(&profile).unwrap()
    }

    #[test]
    fn test_literal_rule_is_case_insensitive_and_global() {
        let rule = CompiledRule::compile(&Rule::literal("textureName: string =", "texturePath: string =")).unwrap();
        let text = "a TEXTURENAME: string = x\nb texturename: string = y\n";

        let (out, count) = rule.apply(text);
        assert_eq!(count, 2);
        assert_eq!(out, "a texturePath: string = x\nb texturePath: string = y\n");
    }

    #[test]
    fn test_literal_rule_escapes_metacharacters() {
        let rule = CompiledRule::compile(&Rule::literal("a.b", "$1")).unwrap();
        let (out, count) = rule.apply("axb a.b");
        assert_eq!(count, 1);
        assert_eq!(out, "axb $1");
    }

    #[test]
    fn test_pattern_rule_expands_groups() {
        let rule = CompiledRule::compile(&Rule::pattern(r"(\w+)Name: string =", "${1}Path: string =")).unwrap();
        let (out, _) = rule.apply("textureName: string = \"a\"");
        assert_eq!(out, "texturePath: string = \"a\"");
    }

    #[test]
    fn test_invalid_pattern_names_rule() {
        let profile = RuleProfile::new("bad", "", vec![Rule::pattern("(", "x")]);
        let err = CompiledProfile::compile(&profile).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid rule #1"));
    }

    #[test]
    fn test_match_inside_larger_identifier() {
        let profile = compiled(RuleProfile::base());
        let (out, count) = profile.apply("mytextureName: string = \"a\"");
        assert_eq!(count, 1);
        assert_eq!(out, "mytexturePath: string = \"a\"");
    }

    #[test]
    fn test_extended_rules_apply_in_order() {
        let profile = compiled(RuleProfile::extended());
        let text = "textureName: string = \"a.dds\"\nsamplerName: string = \"b\"\n";

        let (out, count) = profile.apply(text);
        assert_eq!(count, 2);
        assert_eq!(out, "texturePath: string = \"a.dds\"\ntextureName: string = \"b\"\n");
    }

    #[test]
    fn test_probe_rejection_skips_file() {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp.path().join("locked.py")).unwrap();
        fs::write(&path, "textureName: string = \"a\"").unwrap();

        let expected = path.clone();
        let mut probe = MockAccessProbe::new();
        probe
            .expect_can_modify()
            .withf(move |p| p.as_str() == expected.as_str())
            .times(1)
            .return_const(false);

        let outcome = rewrite_file(&compiled(RuleProfile::base()), &probe, &path);

        assert_eq!(outcome.status, FileStatus::Skipped);
        assert_eq!(fs::read_to_string(&path).unwrap(), "textureName: string = \"a\"");
    }

    #[test]
    fn test_unreadable_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp.path().join("missing.py")).unwrap();

        let mut probe = MockAccessProbe::new();
        probe.expect_can_modify().return_const(true);

        let outcome = rewrite_file(&compiled(RuleProfile::base()), &probe, &path);
        assert_eq!(outcome.status, FileStatus::Failed);
    }

    #[tokio::test]
    async fn test_rewriter_counts_replacements() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let a = root.join("a.py");
        let b = root.join("b.py");
        fs::write(&a, "TextureName: string = \"x\"\ntextureName: string = \"y\"").unwrap();
        fs::write(&b, "nothing here").unwrap();

        let metrics = Arc::new(Metrics::new());
        let ctx = StageContext::new(Arc::new(StateManager::new()), Arc::clone(&metrics), 2);
        let rewriter = RuleRewriter::new(
            Arc::new(compiled(RuleProfile::base())),
            Arc::new(ReadWriteProbe),
            ctx,
        );

        let outcomes = rewriter.apply(&[a.clone(), b.clone()]).await;

        assert_eq!(outcomes[0].replacements, 2);
        assert_eq!(outcomes[1].replacements, 0);
        assert_eq!(outcomes[1].message, "No matches");
        assert_eq!(
            metrics.files_rewritten.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }
}
