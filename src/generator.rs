//! Paced job generation.
//!
//! The generator is the pipeline's sole source of work and the actuator end
//! of the feedback loop: before every job it re-reads the shared pacing
//! delay and sleeps that long. Retries take precedence over fresh jobs, but
//! only opportunistically; an empty retries queue never blocks generation.
//!
//! Dropping the jobs sender on exit is what shuts the pipeline down: the
//! workers drain the queue and close their own downstream in turn.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::debug;

use crate::harness::stats::HarnessStats;
use crate::job::{Job, Request};
use crate::pacing::PacingDelay;

/// Produces jobs onto the jobs queue until told to stop.
pub struct Generator {
    target: Arc<Request>,
    jobs: mpsc::Sender<Job>,
    retries: mpsc::Receiver<Job>,
    delay: Arc<PacingDelay>,
    shutdown: broadcast::Receiver<()>,
    stats: Arc<HarnessStats>,
}

impl Generator {
    pub fn new(
        target: Arc<Request>,
        jobs: mpsc::Sender<Job>,
        retries: mpsc::Receiver<Job>,
        delay: Arc<PacingDelay>,
        shutdown: broadcast::Receiver<()>,
        stats: Arc<HarnessStats>,
    ) -> Self {
        Self {
            target,
            jobs,
            retries,
            delay,
            shutdown,
            stats,
        }
    }

    fn shutdown_requested(&mut self) -> bool {
        !matches!(self.shutdown.try_recv(), Err(TryRecvError::Empty))
    }

    /// Generates jobs until shutdown is signalled or the pipeline closes.
    pub async fn run(mut self) {
        debug!("generator started");
        loop {
            if self.shutdown_requested() {
                break;
            }

            let job = match self.retries.try_recv() {
                Ok(job) => {
                    debug!(attempts = job.attempts, "re-issuing retried job");
                    job
                }
                Err(mpsc::error::TryRecvError::Empty) => {
                    self.stats.record_generated();
                    Job::single(Arc::clone(&self.target))
                }
                // Review is gone, which only happens during teardown.
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            };

            tokio::select! {
                sent = self.jobs.send(job) => {
                    if sent.is_err() {
                        break;
                    }
                }
                _ = self.shutdown.recv() => break,
            }

            let pause = Duration::from_secs_f64(self.delay.get());
            debug!(delay_secs = pause.as_secs_f64(), "pacing next job");
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.shutdown.recv() => break,
            }
        }
        debug!("generator stopped");
        // Dropping self.jobs here closes the jobs queue downstream.
    }
}
