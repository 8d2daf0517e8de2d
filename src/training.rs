//! Training progress monitoring.
//!
//! [`TrainingMonitor`] is the pure state machine: it is fed each poll outcome
//! and answers with how long to wait, or that training is done. The async
//! driver [`poll_until_trained`] runs it against a [`ProgressSource`] until
//! completion or until the shared "still polling" flag is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PollIntervals;
use crate::error::ApiError;
use crate::schema::ProgressResponse;

/// Anything that can report training progress.
#[async_trait]
pub trait ProgressSource: Send + Sync {
    async fn fetch_progress(&self) -> Result<ProgressResponse, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Running,
    Completed,
    Idle,
}

/// Display-ready view of one progress response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub run_id: i64,
    pub current: i64,
    pub total: i64,
    /// Completion in `0.0..=1.0`; 0.0 while the total is unknown.
    pub fraction: f64,
    pub status: TrainingStatus,
}

impl From<&ProgressResponse> for ProgressSnapshot {
    fn from(p: &ProgressResponse) -> Self {
        let fraction = if p.total > 0 {
            (p.current as f64 / p.total as f64).min(1.0)
        } else {
            0.0
        };
        let status = if p.running {
            TrainingStatus::Running
        } else if p.trained {
            TrainingStatus::Completed
        } else {
            TrainingStatus::Idle
        };

        Self {
            run_id: p.run_id,
            current: p.current,
            total: p.total,
            fraction,
            status,
        }
    }
}

impl ProgressSnapshot {
    /// `"<current> / <total> epoch"`, or `None` while the total is unknown.
    pub fn epoch_line(&self) -> Option<String> {
        (self.total > 0).then(|| format!("{} / {} epoch", self.current, self.total))
    }
}

/// What the polling loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Wait(Duration),
    Done,
}

/// How a polling run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { run_id: i64 },
    Cancelled,
}

#[derive(Debug)]
pub struct TrainingMonitor {
    intervals: PollIntervals,
    finished: bool,
    failures: u64,
}

impl TrainingMonitor {
    pub fn new(intervals: PollIntervals) -> Self {
        Self {
            intervals,
            finished: false,
            failures: 0,
        }
    }

    /// Consecutive failed fetches since the last good one.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Feed a successful poll. Once training is reported done, every later
    /// call also answers `Done`.
    pub fn observe(&mut self, snapshot: &ProgressSnapshot) -> PollStep {
        if self.finished {
            return PollStep::Done;
        }
        self.failures = 0;
        match snapshot.status {
            TrainingStatus::Completed => {
                self.finished = true;
                PollStep::Done
            }
            TrainingStatus::Running => PollStep::Wait(self.intervals.running()),
            TrainingStatus::Idle => PollStep::Wait(self.intervals.idle()),
        }
    }

    /// Feed a failed poll.
    pub fn observe_failure(&mut self) -> PollStep {
        if self.finished {
            return PollStep::Done;
        }
        self.failures += 1;
        PollStep::Wait(self.intervals.failure())
    }
}

/// Poll `source` until training completes or `polling` is cleared.
///
/// `polling` is checked at the top of each iteration only; a sleep or request
/// already under way runs to its end. Fetch errors are logged and retried
/// after the failure interval, without limit. `on_update` sees every good
/// snapshot, including the final completed one exactly once.
pub async fn poll_until_trained<S, F>(
    source: &S,
    intervals: PollIntervals,
    polling: &AtomicBool,
    mut on_update: F,
) -> PollOutcome
where
    S: ProgressSource + ?Sized,
    F: FnMut(&ProgressSnapshot),
{
    let mut monitor = TrainingMonitor::new(intervals);

    while polling.load(Ordering::SeqCst) {
        let step = match source.fetch_progress().await {
            Ok(progress) => {
                let snapshot = ProgressSnapshot::from(&progress);
                debug!(
                    "Progress run={} {}/{} {:?}",
                    snapshot.run_id, snapshot.current, snapshot.total, snapshot.status
                );
                on_update(&snapshot);
                match monitor.observe(&snapshot) {
                    PollStep::Done => {
                        polling.store(false, Ordering::SeqCst);
                        info!("Training run {} completed", snapshot.run_id);
                        return PollOutcome::Completed {
                            run_id: snapshot.run_id,
                        };
                    }
                    step => step,
                }
            }
            Err(e) => {
                let step = monitor.observe_failure();
                warn!(
                    "Progress fetch failed ({} in a row): {}",
                    monitor.failures(),
                    e
                );
                step
            }
        };

        if let PollStep::Wait(delay) = step {
            tokio::time::sleep(delay).await;
        }
    }

    info!("Progress polling cancelled");
    PollOutcome::Cancelled
}
