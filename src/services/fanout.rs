//! Bounded per-item task fan-out with a stage barrier.
//!
//! Every item gets its own tokio task; a semaphore caps how many run at once.
//! [`fan_out`] returns only after every task has finished, which is what gives
//! the pipeline its stage-level happens-before ordering.

use crate::metrics::Metrics;
use crate::services::tools::ToolRunner;
use crate::state::StateManager;
use camino::Utf8Path;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Fallback when the platform cannot report its parallelism
const FALLBACK_PARALLELISM: usize = 4;

/// Resolve a configured limit; 0 means "available parallelism"
pub fn effective_parallelism(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(FALLBACK_PARALLELISM)
}

/// What every per-file stage needs besides its own inputs
#[derive(Clone)]
pub struct StageContext {
    pub state: Arc<StateManager>,
    pub metrics: Arc<Metrics>,
    pub parallelism: usize,
}

impl StageContext {
    pub fn new(state: Arc<StateManager>, metrics: Arc<Metrics>, parallelism: usize) -> Self {
        Self {
            state,
            metrics,
            parallelism: parallelism.max(1),
        }
    }

    /// Run a tool and turn anything but a zero exit into an error message
    pub async fn invoke<R: ToolRunner>(
        &self,
        runner: &R,
        tool: &Utf8Path,
        args: &[&str],
    ) -> Result<(), String> {
        match runner.run(tool, args).await {
            Ok(outcome) => {
                self.metrics.record_tool(outcome.duration, outcome.success());
                if outcome.success() {
                    Ok(())
                } else {
                    Err(format!("{} failed with {}", tool, outcome.describe()))
                }
            }
            Err(e) => {
                self.metrics.record_tool(std::time::Duration::ZERO, false);
                Err(e.to_string())
            }
        }
    }
}

/// Run `task` for every item with at most `limit` tasks in flight.
///
/// Results come back in input order. A task that panics yields `None` for its
/// item; the caller decides how to report it.
pub async fn fan_out<T, O, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Vec<Option<O>>
where
    T: Send + 'static,
    O: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = O> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));

    let handles: Vec<_> = items
        .into_iter()
        .map(|item| {
            let semaphore = Arc::clone(&semaphore);
            let work = task(item);
            tokio::spawn(async move {
                // The semaphore is never closed, so acquisition only fails if
                // that invariant is broken.
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(work.await)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!("Task join error: {}", e);
                results.push(None);
            }
        }
    }
    results
}
