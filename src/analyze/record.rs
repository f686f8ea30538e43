//! Long-horizon per-phase latency record.
//!
//! Seven independent merging digests, one per timing phase, fed with every
//! round the analyzer ingests. These back the end-of-run quantile summary;
//! the controller reads the short trailing window instead.

use tracing::debug;

use crate::job::{Round, Timing};

use super::digest::MergingDigest;

/// Per-phase digest set over everything analyzed so far.
#[derive(Debug, Clone)]
pub struct PhaseRecord {
    compression: f64,
    digests: [MergingDigest; 7],
}

impl PhaseRecord {
    /// Creates an empty record; `compression` is the per-digest centroid
    /// budget.
    pub fn new(compression: f64) -> Self {
        Self {
            compression,
            digests: std::array::from_fn(|_| MergingDigest::new(compression)),
        }
    }

    /// Phase labels in the order [`PhaseRecord::quantiles`] reports them.
    pub fn phases() -> [&'static str; 7] {
        Timing::PHASES
    }

    /// Inserts every phase duration of one round, in seconds, with unit
    /// weight.
    pub fn add_round(&mut self, round: &Round) {
        let seconds = round.timing.phase_seconds();
        for (digest, value) in self.digests.iter_mut().zip(seconds) {
            digest.add(value, 1.0);
        }
    }

    /// Number of rounds ingested.
    pub fn count(&self) -> f64 {
        self.digests[6].count()
    }

    /// The `q` quantile of each phase, labelled, `None` per phase until a
    /// sample arrives.
    pub fn quantiles(&mut self, q: f64) -> [(&'static str, Option<f64>); 7] {
        let mut out = [("", None); 7];
        for (slot, (label, digest)) in out
            .iter_mut()
            .zip(Timing::PHASES.into_iter().zip(self.digests.iter_mut()))
        {
            *slot = (label, digest.quantile(q));
        }
        out
    }

    /// The `q` quantile of the total-duration phase.
    pub fn duration_quantile(&mut self, q: f64) -> Option<f64> {
        self.digests[6].quantile(q)
    }

    /// Reseeds the total-duration digest with only its own current `q`
    /// quantile as a single sample, bounding drift toward stale history.
    /// The other phase digests are left alone. No-op while empty.
    pub fn truncate(&mut self, q: f64) {
        let Some(last) = self.digests[6].quantile(q) else {
            return;
        };
        debug!(quantile = q, seed = last, "truncating duration digest");
        let mut fresh = MergingDigest::new(self.compression);
        fresh.add(last, 1.0);
        self.digests[6] = fresh;
    }
}
