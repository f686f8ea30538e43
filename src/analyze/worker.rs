//! Analysis stage: streaming statistics plus the feedback control step.
//!
//! A single worker drains the analysis queue. Every ingested job feeds the
//! long-horizon phase digests and the short trailing window; the window's
//! 0.95 quantile is the controller's error signal, and the controller's
//! clamped output is applied to the shared pacing delay.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::job::Job;
use crate::pacing::PacingDelay;

use super::controller::PidController;
use super::record::PhaseRecord;
use super::window::TrailingWindow;

/// Proportional gain.
const KP: f64 = 10.0;
/// Integral gain.
const KI: f64 = 0.5;
/// Derivative gain.
const KD: f64 = 0.3;

/// Quantile of the trailing window used as the control signal.
const SIGNAL_QUANTILE: f64 = 0.95;

/// The stateful analysis core, free of channels so tests can drive it
/// directly.
#[derive(Debug)]
pub struct Analyzer {
    record: PhaseRecord,
    window: TrailingWindow,
    pid: PidController,
    delay: Arc<PacingDelay>,
    truncate_interval: u32,
    since_truncate: u32,
    last_control: Option<Instant>,
}

impl Analyzer {
    /// Creates an analyzer targeting `slo_secs`.
    pub fn new(
        slo_secs: f64,
        digest_compression: f64,
        window_capacity: usize,
        truncate_interval: u32,
        delay: Arc<PacingDelay>,
    ) -> Self {
        Self {
            record: PhaseRecord::new(digest_compression),
            window: TrailingWindow::new(window_capacity),
            pid: PidController::new(KP, KI, KD)
                .with_setpoint(slo_secs)
                .with_output_limits(-1.0, 1.0),
            delay,
            truncate_interval: truncate_interval.max(1),
            since_truncate: 0,
            last_control: None,
        }
    }

    /// Ingests one analyzed job and runs the control step.
    ///
    /// Every round contributes its seven phase durations to the digests and
    /// its total duration to the trailing window. The control step is
    /// skipped while the window is still empty.
    pub fn ingest(&mut self, job: &Job) {
        self.since_truncate += 1;
        if self.since_truncate > self.truncate_interval {
            self.record.truncate(SIGNAL_QUANTILE);
            self.since_truncate = 0;
        }

        for round in &job.rounds {
            self.record.add_round(round);
            self.window.push(round.timing.duration.as_secs_f64());
        }

        let Some(signal) = self.window.quantile(SIGNAL_QUANTILE) else {
            return;
        };

        let now = Instant::now();
        let dt = self
            .last_control
            .map(|previous| now - previous)
            .unwrap_or_default();
        self.last_control = Some(now);

        let adjustment = self.pid.update(signal, dt);
        let updated = self.delay.adjust(adjustment);
        debug!(
            signal,
            adjustment,
            delay_secs = updated,
            "pacing delay adjusted"
        );
    }

    /// Logs the long-horizon quantile summary, one line per phase.
    pub fn log_summary(&mut self) {
        let total = self.record.count();
        info!(rounds = total, "latency summary");
        for label in PhaseRecord::phases() {
            let p50 = self.phase_quantile(label, 0.50);
            let p95 = self.phase_quantile(label, 0.95);
            let p99 = self.phase_quantile(label, 0.99);
            info!(phase = label, p50, p95, p99, "phase quantiles");
        }
    }

    fn phase_quantile(&mut self, label: &str, q: f64) -> f64 {
        self.record
            .quantiles(q)
            .iter()
            .find(|(name, _)| *name == label)
            .and_then(|(_, value)| *value)
            .unwrap_or(f64::NAN)
    }
}

/// Channel-driven wrapper around [`Analyzer`]; exactly one runs per harness.
pub struct AnalyzeWorker {
    analysis: mpsc::Receiver<Job>,
    analyzer: Analyzer,
}

impl AnalyzeWorker {
    /// Creates the worker around an already-configured analyzer.
    pub fn new(analysis: mpsc::Receiver<Job>, analyzer: Analyzer) -> Self {
        Self { analysis, analyzer }
    }

    /// Drains the analysis queue until it closes, then logs the final
    /// summary.
    pub async fn run(mut self) {
        debug!("analyze worker started");
        while let Some(job) = self.analysis.recv().await {
            debug!(
                attempts = job.attempts,
                rounds = job.rounds.len(),
                "analyzing job"
            );
            self.analyzer.ingest(&job);
        }
        self.analyzer.log_summary();
        debug!("analyze worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::job::{Request, ResponseSummary, Round, Status, Timing};
    use crate::pacing::{MAX_DELAY_SECS, MIN_DELAY_SECS};

    use super::*;

    fn job_with_latency(total: Duration) -> Job {
        let request = Arc::new(Request::get("http://localhost:10080"));
        let start = Instant::now();
        let mut job = Job::single(Arc::clone(&request));
        job.status = Status::Done;
        job.rounds.push(Round {
            request,
            timing: Timing {
                start,
                stop: start + total,
                dns: Duration::ZERO,
                connection: Duration::ZERO,
                tls: Duration::ZERO,
                request: Duration::ZERO,
                delay: total / 2,
                response: total / 2,
                duration: total,
            },
            response: ResponseSummary {
                status: 200,
                content_length: Some(0),
            },
        });
        job
    }

    fn analyzer(slo: f64, delay: &Arc<PacingDelay>) -> Analyzer {
        Analyzer::new(slo, 100.0, 10, 10, Arc::clone(delay))
    }

    #[test]
    fn test_empty_job_skips_control_step() {
        let delay = Arc::new(PacingDelay::new(0.5));
        let mut analyzer = analyzer(0.25, &delay);

        let mut job = Job::single(Arc::new(Request::get("http://localhost:10080")));
        job.status = Status::Done;
        analyzer.ingest(&job);

        // No rounds means no window sample and an untouched delay.
        assert!((delay.get() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_convergence_slows_generation_when_over_slo() {
        // SLO 0.25s, observed latency fixed at 0.5s: the delay must move
        // monotonically toward larger values and stay within its range.
        let delay = Arc::new(PacingDelay::new(0.5));
        let mut analyzer = analyzer(0.25, &delay);

        let mut previous = delay.get();
        for _ in 0..20 {
            analyzer.ingest(&job_with_latency(Duration::from_millis(500)));
            let current = delay.get();
            assert!(
                current >= previous,
                "delay moved faster ({previous} -> {current}) while over the SLO"
            );
            assert!((MIN_DELAY_SECS..=MAX_DELAY_SECS).contains(&current));
            previous = current;
        }
        assert!(previous > 0.5, "delay never slowed down");
        assert!(previous <= MAX_DELAY_SECS);
    }

    #[test]
    fn test_fast_responses_speed_generation_up() {
        let delay = Arc::new(PacingDelay::new(2.0));
        let mut analyzer = analyzer(1.0, &delay);

        for _ in 0..10 {
            analyzer.ingest(&job_with_latency(Duration::from_millis(10)));
        }
        assert!(delay.get() < 2.0, "delay never sped up");
        assert!(delay.get() >= MIN_DELAY_SECS);
    }

    #[test]
    fn test_truncate_interval_reseeds_duration_digest() {
        let delay = Arc::new(PacingDelay::new(0.5));
        let mut analyzer = Analyzer::new(0.25, 100.0, 10, 3, Arc::clone(&delay));

        for _ in 0..5 {
            analyzer.ingest(&job_with_latency(Duration::from_millis(100)));
        }
        // Interval of 3: a truncate fired on the fourth ingest, after which
        // one reseed sample plus subsequent rounds remain.
        assert!(analyzer.record.count() < 5.0);
    }

    #[tokio::test]
    async fn test_worker_drains_channel_until_close() {
        let delay = Arc::new(PacingDelay::new(0.5));
        let (tx, rx) = mpsc::channel(4);
        let worker = AnalyzeWorker::new(rx, analyzer(0.25, &delay));
        let handle = tokio::spawn(worker.run());

        tx.send(job_with_latency(Duration::from_millis(500)))
            .await
            .expect("send");
        drop(tx);

        handle.await.expect("worker task");
        assert!(delay.get() > 0.5);
    }
}
