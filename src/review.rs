//! Review stage: the retry state machine.
//!
//! A single worker sits between execution and analysis. Every pass through
//! review charges one attempt; jobs still marked for retry after the budget
//! is spent are failed and dropped, finished jobs go to analysis, and
//! everything else circles back through the retries queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::harness::stats::HarnessStats;
use crate::job::{Job, Status};

/// Routes executed jobs by status; exactly one runs per harness.
pub struct ReviewWorker {
    results: mpsc::Receiver<Job>,
    retries: mpsc::Sender<Job>,
    analysis: mpsc::Sender<Job>,
    retry_budget: u32,
    stats: Arc<HarnessStats>,
}

impl ReviewWorker {
    pub fn new(
        results: mpsc::Receiver<Job>,
        retries: mpsc::Sender<Job>,
        analysis: mpsc::Sender<Job>,
        retry_budget: u32,
        stats: Arc<HarnessStats>,
    ) -> Self {
        Self {
            results,
            retries,
            analysis,
            retry_budget,
            stats,
        }
    }

    /// Routes jobs until the results queue closes.
    pub async fn run(mut self) {
        debug!("review worker started");
        while let Some(mut job) = self.results.recv().await {
            job.attempts += 1;

            if job.status == Status::Retry && job.attempts > self.retry_budget {
                job.status = Status::Fail;
            }

            match job.status {
                Status::Done => {
                    self.stats.record_done(&job);
                    if self.analysis.send(job).await.is_err() {
                        break;
                    }
                }
                Status::Pending | Status::Retry => {
                    self.stats.record_retry();
                    debug!(attempts = job.attempts, status = %job.status, "re-queueing job");
                    // During shutdown the generator stops pulling retries;
                    // dropping the job here lets the pipeline keep draining.
                    if self.retries.send(job).await.is_err() {
                        continue;
                    }
                }
                Status::Fail => {
                    self.stats.record_fail();
                    warn!(
                        attempts = job.attempts,
                        rounds = job.rounds.len(),
                        "retry budget exhausted, dropping job"
                    );
                }
            }
        }
        debug!("review worker stopped");
    }
}
