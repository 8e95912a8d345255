//! Bounded-parallel batch publishing.
//!
//! Each post in a batch is merged on the blocking pool while holding one
//! permit from a fixed-size semaphore. The permit moves into the task and is
//! released when the task ends, whether it returns, fails or panics.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::publish::{publish_media, PublishOptions, Published};

/// Default number of merges allowed to run at once.
pub const DEFAULT_MAX_PROCS: usize = 10;

/// Cooperative cancellation shared by every merge in a run. Merges check
/// it once, before they start; merges already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counting throttle over a tokio semaphore.
#[derive(Debug, Clone)]
pub struct Throttle {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Throttle {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot. The slot is returned when the permit is dropped.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PROCS)
    }
}

#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Position of the post in the batch.
    pub index: usize,
    pub path: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub published: Vec<Published>,
    pub cancelled: usize,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.published.len() + self.cancelled + self.failed.len()
    }
}

enum Outcome {
    Published(Published),
    Cancelled,
    Failed(String),
}

/// `path` of a raw post, for log lines. Best effort.
fn post_label(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(body)
        .ok()?
        .get("path")?
        .as_str()
        .map(str::to_string)
}

/// Merge every post, at most `throttle.capacity()` at a time. Per-post
/// failures are logged and collected; they never stop the batch.
pub async fn publish_batch(
    opts: Arc<PublishOptions>,
    throttle: &Throttle,
    cancel: &CancelToken,
    posts: Vec<Vec<u8>>,
) -> BatchReport {
    let mut tasks = JoinSet::new();
    let mut labels = Vec::with_capacity(posts.len());

    for (index, body) in posts.into_iter().enumerate() {
        labels.push(post_label(&body));

        let Some(permit) = throttle.acquire().await else {
            error!("Throttle closed, abandoning remaining posts");
            break;
        };

        let opts = opts.clone();
        let cancel = cancel.clone();

        tasks.spawn_blocking(move || {
            let _permit = permit;
            let outcome = match publish_media(&cancel, &opts, &body) {
                Ok(Some(published)) => Outcome::Published(published),
                Ok(None) => Outcome::Cancelled,
                Err(e) => Outcome::Failed(format!("{:#}", anyhow::Error::from(e))),
            };
            (index, outcome)
        });
    }

    let mut report = BatchReport::default();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Outcome::Published(published))) => report.published.push(published),
            Ok((_, Outcome::Cancelled)) => report.cancelled += 1,
            Ok((index, Outcome::Failed(error))) => {
                let path = labels.get(index).cloned().flatten();
                warn!(index, path = path.as_deref().unwrap_or("-"), error = %error, "Failed to publish media");
                report.failed.push(BatchFailure { index, path, error });
            }
            Err(join_error) => {
                error!(error = %join_error, "Publish task aborted");
                report.failed.push(BatchFailure {
                    index: usize::MAX,
                    path: None,
                    error: join_error.to_string(),
                });
            }
        }
    }

    report.failed.sort_by_key(|f| f.index);

    info!(
        published = report.published.len(),
        cancelled = report.cancelled,
        failed = report.failed.len(),
        "Batch complete"
    );

    report
}
