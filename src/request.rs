//! Request execution stage.
//!
//! A pool of workers pulls jobs off the shared jobs queue, executes each
//! job's requests strictly in order through the transport, and forwards the
//! job to review. Classification happens here: a transport failure abandons
//! the pass without judging the job, while a non-2xx answer marks it for
//! retry.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::job::{Job, Status};
use crate::transport::Transport;

/// One member of the execution pool.
///
/// Workers share a single receiver behind a mutex so each queued job is
/// claimed by exactly one of them.
pub struct RequestWorker {
    id: usize,
    transport: Arc<dyn Transport>,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<Job>,
}

impl RequestWorker {
    pub fn new(
        id: usize,
        transport: Arc<dyn Transport>,
        jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
        results: mpsc::Sender<Job>,
    ) -> Self {
        Self {
            id,
            transport,
            jobs,
            results,
        }
    }

    /// Claims and processes jobs until the jobs queue closes.
    pub async fn run(self) {
        debug!(worker_id = self.id, "request worker started");
        loop {
            let job = {
                let mut jobs = self.jobs.lock().await;
                jobs.recv().await
            };
            let Some(mut job) = job else {
                break;
            };

            self.process(&mut job).await;

            if self.results.send(job).await.is_err() {
                // Review already shut down; nothing left to forward to.
                break;
            }
        }
        debug!(worker_id = self.id, "request worker stopped");
    }

    /// Executes one pass over the job's requests.
    ///
    /// Requests run sequentially. The first transport error ends the pass
    /// with the status untouched; the first non-2xx response ends it as
    /// `Retry`. A pass that completes every request cleanly resolves
    /// `Pending` to `Done`.
    async fn process(&self, job: &mut Job) {
        // A job re-queued for retry starts its pass with a clean slate.
        if job.status == Status::Retry {
            job.status = Status::Pending;
        }

        // Rounds accumulate across passes, so completion is judged by what
        // this pass produced, not by the total.
        let rounds_before = job.rounds.len();

        for request in &job.requests {
            match self.transport.execute(request).await {
                Ok(round) => {
                    let success = round.response.is_success();
                    let status = round.response.status;
                    job.rounds.push(round);
                    if !success {
                        debug!(
                            worker_id = self.id,
                            url = %request.url,
                            status,
                            "non-success response, marking for retry"
                        );
                        job.status = Status::Retry;
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        worker_id = self.id,
                        url = %request.url,
                        error = %err,
                        "transport failure, abandoning pass"
                    );
                    break;
                }
            }
        }

        if job.status == Status::Pending
            && job.rounds.len() - rounds_before == job.requests.len()
        {
            job.status = Status::Done;
        }
    }
}
