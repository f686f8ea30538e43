//! Pipeline assembly and lifecycle.
//!
//! The harness owns the pieces every stage shares: validated configuration,
//! the transport, the pacing delay, the run counters, and the shutdown
//! signal. [`Harness::run`] wires the four bounded queues, spawns the
//! stages, and supervises them until the pipeline drains.
//!
//! Shutdown is a cascade rather than an abort: the broadcast signal stops
//! the generator, whose dropped sender closes the jobs queue; each stage
//! then finishes its queue and closes its own downstream, ending with the
//! analyzer's summary. A drain that overruns the configured timeout is
//! reported as an error with the stage tasks abandoned.

pub mod config;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::analyze::{AnalyzeWorker, Analyzer};
use crate::generator::Generator;
use crate::job::Request;
use crate::pacing::PacingDelay;
use crate::request::RequestWorker;
use crate::review::ReviewWorker;
use crate::transport::{TracedClient, Transport};

pub use config::{ConfigError, HarnessConfig, QueueCapacities};
pub use stats::HarnessStats;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{stage} task panicked: {message}")]
    StagePanicked { stage: &'static str, message: String },

    #[error("pipeline failed to drain within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Handle for requesting a graceful stop from outside the pipeline.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger(broadcast::Sender<()>);

impl ShutdownTrigger {
    /// Signals the harness to stop generating and drain.
    ///
    /// Idempotent; later calls are no-ops.
    pub fn trigger(&self) {
        let _ = self.0.send(());
    }
}

/// One configured load-testing run.
pub struct Harness {
    config: HarnessConfig,
    transport: Arc<dyn Transport>,
    delay: Arc<PacingDelay>,
    stats: Arc<HarnessStats>,
    shutdown: broadcast::Sender<()>,
}

impl Harness {
    /// Creates a harness over an explicit transport.
    pub fn new(
        config: HarnessConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, HarnessError> {
        config.validate()?;
        let delay = Arc::new(PacingDelay::new(config.initial_delay_secs));
        let (shutdown, _) = broadcast::channel(1);
        Ok(Self {
            config,
            transport,
            delay,
            stats: Arc::new(HarnessStats::default()),
            shutdown,
        })
    }

    /// Creates a harness over the production phase-timed transport.
    pub fn from_config(config: HarnessConfig) -> Result<Self, HarnessError> {
        let transport = Arc::new(TracedClient::new(config.request_timeout()));
        Self::new(config, transport)
    }

    /// A cloneable handle that stops this harness when triggered.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger(self.shutdown.clone())
    }

    /// The shared run counters.
    pub fn stats(&self) -> Arc<HarnessStats> {
        Arc::clone(&self.stats)
    }

    /// The shared pacing delay.
    pub fn delay(&self) -> Arc<PacingDelay> {
        Arc::clone(&self.delay)
    }

    /// Runs the pipeline until shutdown is triggered and the queues drain.
    pub async fn run(self) -> Result<(), HarnessError> {
        let target = Arc::new(
            Request::get(self.config.target_url.clone())
                .with_headers(self.config.headers.clone()),
        );

        let (jobs_tx, jobs_rx) = mpsc::channel(self.config.queues.jobs);
        let (retries_tx, retries_rx) = mpsc::channel(self.config.queues.retries);
        let (results_tx, results_rx) = mpsc::channel(self.config.queues.results);
        let (analysis_tx, analysis_rx) = mpsc::channel(self.config.queues.analysis);

        info!(
            target = %target.url,
            workers = self.config.workers,
            slo_secs = self.config.slo_secs,
            initial_delay_secs = self.config.initial_delay_secs,
            retry_budget = self.config.retry_budget,
            "starting harness"
        );

        let analyzer = Analyzer::new(
            self.config.slo_secs,
            self.config.digest_compression,
            self.config.window_capacity,
            self.config.truncate_interval,
            Arc::clone(&self.delay),
        );
        let analyze_handle = tokio::spawn(AnalyzeWorker::new(analysis_rx, analyzer).run());

        let review_handle = tokio::spawn(
            ReviewWorker::new(
                results_rx,
                retries_tx,
                analysis_tx,
                self.config.retry_budget,
                Arc::clone(&self.stats),
            )
            .run(),
        );

        let jobs_rx = Arc::new(Mutex::new(jobs_rx));
        let worker_handles: Vec<JoinHandle<()>> = (0..self.config.workers)
            .map(|id| {
                let worker = RequestWorker::new(
                    id,
                    Arc::clone(&self.transport),
                    Arc::clone(&jobs_rx),
                    results_tx.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect();
        // The workers hold the only remaining results senders.
        drop(results_tx);

        let generator_handle = tokio::spawn(
            Generator::new(
                target,
                jobs_tx,
                retries_rx,
                Arc::clone(&self.delay),
                self.shutdown.subscribe(),
                Arc::clone(&self.stats),
            )
            .run(),
        );

        generator_handle
            .await
            .map_err(|err| HarnessError::StagePanicked {
                stage: "generator",
                message: err.to_string(),
            })?;
        debug!("generator finished, draining pipeline");

        let drain = async {
            for (id, handle) in worker_handles.into_iter().enumerate() {
                handle.await.map_err(|err| HarnessError::StagePanicked {
                    stage: "request worker",
                    message: format!("worker {id}: {err}"),
                })?;
            }
            review_handle
                .await
                .map_err(|err| HarnessError::StagePanicked {
                    stage: "review",
                    message: err.to_string(),
                })?;
            analyze_handle
                .await
                .map_err(|err| HarnessError::StagePanicked {
                    stage: "analyze",
                    message: err.to_string(),
                })?;
            Ok::<(), HarnessError>(())
        };
        match timeout(self.config.shutdown_timeout(), drain).await {
            Ok(result) => result?,
            Err(_) => return Err(HarnessError::ShutdownTimeout(self.config.shutdown_timeout())),
        }

        info!(
            generated = self.stats.generated(),
            done = self.stats.done(),
            rounds = self.stats.rounds(),
            retried = self.stats.retried(),
            failed = self.stats.failed(),
            "harness finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::job::{ResponseSummary, Round, Timing};
    use crate::transport::TransportError;

    use super::*;

    struct InstantOk;

    #[async_trait]
    impl Transport for InstantOk {
        async fn execute(&self, request: &Arc<Request>) -> Result<Round, TransportError> {
            let start = std::time::Instant::now();
            let total = Duration::from_millis(1);
            Ok(Round {
                request: Arc::clone(request),
                timing: Timing {
                    start,
                    stop: start + total,
                    dns: Duration::ZERO,
                    connection: Duration::ZERO,
                    tls: Duration::ZERO,
                    request: Duration::ZERO,
                    delay: total,
                    response: Duration::ZERO,
                    duration: total,
                },
                response: ResponseSummary {
                    status: 200,
                    content_length: Some(0),
                },
            })
        }
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = HarnessConfig::default();
        assert!(matches!(
            Harness::new(config, Arc::new(InstantOk)),
            Err(HarnessError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_trigger_and_reports_work() {
        let config = HarnessConfig::new("http://localhost:10080")
            .with_initial_delay_secs(0.01)
            .with_workers(2);
        let harness = Harness::new(config, Arc::new(InstantOk)).unwrap();
        let stats = harness.stats();
        let trigger = harness.shutdown_trigger();

        let run = tokio::spawn(harness.run());
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.trigger();

        run.await.unwrap().unwrap();
        assert!(stats.generated() > 0);
        assert!(stats.done() > 0);
        assert_eq!(stats.failed(), 0);
    }

    #[tokio::test]
    async fn test_trigger_is_idempotent() {
        let config =
            HarnessConfig::new("http://localhost:10080").with_initial_delay_secs(0.01);
        let harness = Harness::new(config, Arc::new(InstantOk)).unwrap();
        let trigger = harness.shutdown_trigger();

        let run = tokio::spawn(harness.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
        trigger.trigger();

        run.await.unwrap().unwrap();
    }
}
