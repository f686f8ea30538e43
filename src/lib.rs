//! paceline: closed-loop HTTP load harness.
//!
//! Probes a target endpoint, measures every request in seven phases, and
//! paces its own request generation with a PID feedback loop so observed
//! latency converges on a configured SLO.

// Core modules
pub mod analyze;
pub mod cli;
pub mod generator;
pub mod harness;
pub mod job;
pub mod pacing;
pub mod request;
pub mod review;
pub mod transport;

// Re-export the types most callers need
pub use harness::{Harness, HarnessConfig, HarnessError, HarnessStats, ShutdownTrigger};
pub use job::{Job, Request, Round, Status, Timing};
pub use pacing::PacingDelay;
pub use transport::{TracedClient, Transport, TransportError};
