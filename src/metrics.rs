// Performance metrics module
//
// Process-wide counters across every run started from the menu

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Lock-free counters logged on shutdown
#[derive(Debug)]
pub struct Metrics {
    /// Pipeline runs that reached `Done`
    pub runs_completed: AtomicUsize,

    /// Pipeline runs that were aborted
    pub runs_aborted: AtomicUsize,

    /// External tool invocations
    pub tools_run: AtomicUsize,

    /// External tool invocations that failed to launch or exited non-zero
    pub tool_failures: AtomicUsize,

    /// Total time spent inside external tools in milliseconds
    pub total_tool_time_ms: AtomicU64,

    /// Decompiled files written back with at least one replacement
    pub files_rewritten: AtomicUsize,

    /// Decompiled files skipped for permission reasons
    pub files_skipped: AtomicUsize,

    /// Individual substitutions applied
    pub replacements: AtomicUsize,

    /// Hash files fetched from the remote source
    pub hash_downloads: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_completed: AtomicUsize::new(0),
            runs_aborted: AtomicUsize::new(0),
            tools_run: AtomicUsize::new(0),
            tool_failures: AtomicUsize::new(0),
            total_tool_time_ms: AtomicU64::new(0),
            files_rewritten: AtomicUsize::new(0),
            files_skipped: AtomicUsize::new(0),
            replacements: AtomicUsize::new(0),
            hash_downloads: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_run(&self, completed: bool) {
        if completed {
            self.runs_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_aborted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one tool invocation and whether it succeeded
    pub fn record_tool(&self, duration: Duration, success: bool) {
        self.tools_run.fetch_add(1, Ordering::Relaxed);
        self.total_tool_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        if !success {
            self.tool_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rewrite(&self, replacements: usize) {
        if replacements > 0 {
            self.files_rewritten.fetch_add(1, Ordering::Relaxed);
            self.replacements.fetch_add(replacements, Ordering::Relaxed);
        }
    }

    pub fn record_skipped_file(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hash_downloads(&self, count: usize) {
        self.hash_downloads.fetch_add(count, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average wall time per tool invocation in milliseconds
    pub fn avg_tool_time_ms(&self) -> f64 {
        let total = self.total_tool_time_ms.load(Ordering::Relaxed);
        let count = self.tools_run.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Performance Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Runs: {} completed, {} aborted",
            self.runs_completed.load(Ordering::Relaxed),
            self.runs_aborted.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Tools: {} invocations, {} failures (avg: {:.2}ms)",
            self.tools_run.load(Ordering::Relaxed),
            self.tool_failures.load(Ordering::Relaxed),
            self.avg_tool_time_ms()
        );
        tracing::info!(
            "Rewrites: {} files, {} replacements, {} skipped; hash downloads: {}",
            self.files_rewritten.load(Ordering::Relaxed),
            self.replacements.load(Ordering::Relaxed),
            self.files_skipped.load(Ordering::Relaxed),
            self.hash_downloads.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
