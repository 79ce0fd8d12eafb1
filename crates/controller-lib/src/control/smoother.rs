//! EWMA smoothing of node utilization
//!
//! Smoothing is biased upward: a smoothed value is never allowed to sit
//! below the sample it was computed from, so a rising load is reflected in
//! the same cycle it shows up.

use crate::models::SmoothedValue;

/// Weight given to the newest sample
pub const EWMA_ALPHA: f64 = 0.4;

/// Added to the current sample when the EWMA lags below it
pub const BIAS_MARGIN: f64 = 5.0;

/// Exponentially weighted moving average with upward bias correction
#[derive(Debug, Clone, Copy)]
pub struct Smoother {
    pub alpha: f64,
    pub margin: f64,
    pub bias: bool,
}

impl Default for Smoother {
    fn default() -> Self {
        Self {
            alpha: EWMA_ALPHA,
            margin: BIAS_MARGIN,
            bias: true,
        }
    }
}

impl Smoother {
    /// Smooth a single metric
    pub fn smooth(&self, current: f64, previous: f64) -> f64 {
        let ewma = self.alpha * current + (1.0 - self.alpha) * previous;
        if self.bias && ewma < current {
            current + self.margin
        } else {
            ewma
        }
    }

    /// Smooth CPU and memory together; with no previous value the raw
    /// sample is used as the previous one
    pub fn update(&self, cpu: f64, mem: f64, previous: Option<SmoothedValue>) -> SmoothedValue {
        let prev = previous.unwrap_or(SmoothedValue::new(cpu, mem));
        SmoothedValue::new(
            self.smooth(cpu, prev.ewma_cpu),
            self.smooth(mem, prev.ewma_mem),
        )
    }
}
