//! Streaming latency analysis and feedback pacing.

pub mod controller;
pub mod digest;
pub mod record;
pub mod window;
pub mod worker;

pub use controller::PidController;
pub use digest::MergingDigest;
pub use record::PhaseRecord;
pub use window::TrailingWindow;
pub use worker::{AnalyzeWorker, Analyzer};
