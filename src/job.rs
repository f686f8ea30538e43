//! Shared value types flowing through every pipeline stage.
//!
//! This module defines the unit-of-work model:
//!
//! - `Request`: one HTTP request to issue, immutable once constructed
//! - `Timing`: the seven measured phases of one executed request
//! - `Round`: one executed attempt of one request
//! - `Job`: an ordered sequence of requests plus the rounds produced so far
//! - `Status`: the job lifecycle state
//!
//! Exactly one stage owns a `Job` at any instant; ownership moves along the
//! pipeline channels, so none of these types need interior synchronization.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;

/// Lifecycle state of a [`Job`].
///
/// `Fail` is terminal; all other states are transient. A job starts as
/// `Pending` and is mutated in place by whichever stage currently holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Not yet resolved; a transport-level failure leaves the job here so it
    /// stays eligible for another pass.
    Pending,
    /// Every request completed with a 2xx status.
    Done,
    /// A request came back with a non-2xx status; the job should be retried.
    Retry,
    /// The retry budget was exhausted. Terminal.
    Fail,
}

impl Status {
    /// Returns whether this status ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Fail)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Done => write!(f, "done"),
            Status::Retry => write!(f, "retry"),
            Status::Fail => write!(f, "fail"),
        }
    }
}

/// A single HTTP request to issue.
///
/// Immutable once constructed. Jobs hold requests behind `Arc` so the rounds
/// they produce can reference their originating request without owning it.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Full target URL, including scheme.
    pub url: String,
    /// Header map; keys are unique.
    pub headers: BTreeMap<String, String>,
    /// Optional request body.
    pub body: Option<String>,
}

impl Request {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Creates a GET request, the baseline workload shape.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Adds a header, replacing any existing value for the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replaces the whole header map.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Wall-clock phase boundaries of one executed request.
///
/// `duration` is `stop - start` and covers the full exchange including body
/// drain. Phases may overlap at their boundaries, so the total is not
/// required to equal the sum of the parts, but it is never smaller than any
/// individual phase.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Instant the exchange began, before DNS resolution.
    pub start: Instant,
    /// Instant the response body was fully drained.
    pub stop: Instant,
    /// DNS resolution time.
    pub dns: Duration,
    /// TCP connection establishment time.
    pub connection: Duration,
    /// TLS handshake time; zero for plaintext targets.
    pub tls: Duration,
    /// Request transmission time.
    pub request: Duration,
    /// Server think time: write-complete until the first response byte.
    pub delay: Duration,
    /// Response transfer time, including draining the body.
    pub response: Duration,
    /// Total exchange time, `stop - start`.
    pub duration: Duration,
}

impl Timing {
    /// Phase labels, in the order [`Timing::phase_seconds`] reports them.
    pub const PHASES: [&'static str; 7] = [
        "dns",
        "connection",
        "tls",
        "request",
        "delay",
        "response",
        "duration",
    ];

    /// The seven phase durations in seconds, in [`Timing::PHASES`] order.
    pub fn phase_seconds(&self) -> [f64; 7] {
        [
            self.dns.as_secs_f64(),
            self.connection.as_secs_f64(),
            self.tls.as_secs_f64(),
            self.request.as_secs_f64(),
            self.delay.as_secs_f64(),
            self.response.as_secs_f64(),
            self.duration.as_secs_f64(),
        ]
    }
}

/// Status line and length summary of one response.
#[derive(Debug, Clone, Copy)]
pub struct ResponseSummary {
    /// HTTP status code.
    pub status: u16,
    /// Declared content length; `None` when the server did not say.
    pub content_length: Option<u64>,
}

impl ResponseSummary {
    /// Returns whether the status code counts as a success, i.e. in [200, 300).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One executed attempt of one [`Request`].
#[derive(Debug, Clone)]
pub struct Round {
    /// The originating request.
    pub request: Arc<Request>,
    /// Measured phase boundaries.
    pub timing: Timing,
    /// Response summary.
    pub response: ResponseSummary,
}

/// The unit of work flowing through the pipeline.
///
/// `requests` execute strictly in insertion order; `rounds` accumulates in
/// the same order across the job's whole lifetime, including retries, and is
/// never cleared. `attempts` increments once per pass through review.
#[derive(Debug, Clone)]
pub struct Job {
    /// Requests to execute, in order.
    pub requests: Vec<Arc<Request>>,
    /// Rounds produced so far, append-only.
    pub rounds: Vec<Round>,
    /// Number of review passes this job has been through.
    pub attempts: u32,
    /// Current lifecycle state.
    pub status: Status,
}

impl Job {
    /// Creates a pending job with no rounds and zero attempts.
    pub fn new(requests: Vec<Arc<Request>>) -> Self {
        Self {
            requests,
            rounds: Vec::new(),
            attempts: 0,
            status: Status::Pending,
        }
    }

    /// Creates a job around a single request, the baseline workload.
    pub fn single(request: Arc<Request>) -> Self {
        Self::new(vec![request])
    }
}
