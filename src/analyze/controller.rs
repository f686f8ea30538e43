//! Proportional-integral-derivative feedback controller.
//!
//! Drives the pacing delay toward the latency SLO: the setpoint is the SLO
//! in seconds, the measured value is the short-horizon latency quantile, and
//! the clamped output becomes the delay adjustment.

use std::time::Duration;

/// PID controller with clamped output and anti-windup on the integral term.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    setpoint: f64,
    integral: f64,
    previous_error: Option<f64>,
    output_min: f64,
    output_max: f64,
}

impl PidController {
    /// Creates a controller with the given gains, a zero setpoint, and an
    /// unbounded output range.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            setpoint: 0.0,
            integral: 0.0,
            previous_error: None,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
        }
    }

    /// Sets the target value the controller holds the measurement near.
    pub fn with_setpoint(mut self, setpoint: f64) -> Self {
        self.setpoint = setpoint;
        self
    }

    /// Clamps the output (and the integral contribution) to `[min, max]`.
    pub fn with_output_limits(mut self, min: f64, max: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.output_min = min;
        self.output_max = max;
        self
    }

    /// The configured setpoint.
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Feeds one measurement and returns the clamped control output.
    ///
    /// `dt` is the time since the previous update; a zero `dt` skips the
    /// integral accumulation and the derivative term.
    pub fn update(&mut self, measured: f64, dt: Duration) -> f64 {
        let dt_secs = dt.as_secs_f64();
        let error = self.setpoint - measured;

        if dt_secs > 0.0 {
            self.integral += error * dt_secs;
            if self.ki != 0.0 {
                // Anti-windup: keep the integral contribution inside the
                // output range so a long saturation cannot bank up error.
                let bound_a = self.output_min / self.ki;
                let bound_b = self.output_max / self.ki;
                let (lo, hi) = if bound_a <= bound_b {
                    (bound_a, bound_b)
                } else {
                    (bound_b, bound_a)
                };
                self.integral = self.integral.clamp(lo, hi);
            }
        }

        let derivative = match self.previous_error {
            Some(previous) if dt_secs > 0.0 => (error - previous) / dt_secs,
            _ => 0.0,
        };
        self.previous_error = Some(error);

        let output = self.kp * error + self.ki * self.integral + self.kd * derivative;
        output.clamp(self.output_min, self.output_max)
    }
}
