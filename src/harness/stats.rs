//! Shared run counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::job::Job;

/// Counters shared across stages, updated lock-free.
#[derive(Debug, Default)]
pub struct HarnessStats {
    generated: AtomicU64,
    done: AtomicU64,
    rounds: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

impl HarnessStats {
    pub fn record_generated(&self) {
        self.generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a finished job along with however many rounds it took.
    pub fn record_done(&self, job: &Job) {
        self.done.fetch_add(1, Ordering::Relaxed);
        self.rounds.fetch_add(job.rounds.len() as u64, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fail(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Fresh jobs generated.
    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    /// Jobs that finished with every request successful.
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Rounds belonging to finished jobs.
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    /// Review passes that sent a job back for another attempt.
    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    /// Jobs dropped after exhausting the retry budget.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::job::Request;

    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = HarnessStats::default();
        assert_eq!(stats.generated(), 0);
        assert_eq!(stats.done(), 0);
        assert_eq!(stats.rounds(), 0);
        assert_eq!(stats.retried(), 0);
        assert_eq!(stats.failed(), 0);
    }

    #[test]
    fn test_done_counts_rounds() {
        let stats = HarnessStats::default();
        let mut job = Job::single(Arc::new(Request::get("http://localhost:10080")));
        job.rounds.clear();

        stats.record_done(&job);
        assert_eq!(stats.done(), 1);
        assert_eq!(stats.rounds(), 0);

        stats.record_generated();
        stats.record_retry();
        stats.record_fail();
        assert_eq!(stats.generated(), 1);
        assert_eq!(stats.retried(), 1);
        assert_eq!(stats.failed(), 1);
    }
}
