//! Backpressure hysteresis over a pipeline's `EnhancedDoubleBuffer` (§4.5.5).
//!
//! Applies at HIGH/CRITICAL fill, releases only once fill drops back to
//! LOW/EMPTY — a dead band that avoids rapid apply/release flapping right
//! at a single threshold. A timeout forces release regardless, so a stuck
//! consumer can never wedge the producer forever.

use std::time::{Duration, Instant};

use crate::double_buffer::{CRITICAL_WATERMARK, EMPTY_WATERMARK, HIGH_WATERMARK, LOW_WATERMARK};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const SLEEP_ON_PRESSURE: Duration = Duration::from_millis(10);

pub struct Backpressure {
    in_pressure: bool,
    applied_at: Option<Instant>,
    timeout: Duration,
    dropped_count: u64,
}

impl Default for Backpressure {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Backpressure {
    pub fn new(timeout: Duration) -> Self {
        Self {
            in_pressure: false,
            applied_at: None,
            timeout,
            dropped_count: 0,
        }
    }

    pub fn is_in_pressure(&self) -> bool {
        self.in_pressure
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// Re-evaluates pressure from the buffer's current fill ratio. Returns
    /// `true` if writes to the buffer should be refused right now.
    pub fn evaluate(&mut self, fill_ratio: f64, now: Instant) -> bool {
        if self.in_pressure {
            if fill_ratio <= LOW_WATERMARK || fill_ratio <= EMPTY_WATERMARK {
                self.release();
            } else if let Some(applied_at) = self.applied_at {
                if now.duration_since(applied_at) >= self.timeout {
                    log::warn!("backpressure timeout exceeded; forcing release");
                    self.release();
                }
            }
        } else if fill_ratio >= HIGH_WATERMARK || fill_ratio >= CRITICAL_WATERMARK {
            self.in_pressure = true;
            self.applied_at = Some(now);
        }
        self.in_pressure
    }

    fn release(&mut self) {
        self.in_pressure = false;
        self.applied_at = None;
    }

    /// Records a write refused due to pressure, returning the producer's
    /// sleep duration for this iteration.
    pub fn record_drop(&mut self, bytes: usize) -> Duration {
        self.dropped_count += bytes as u64;
        SLEEP_ON_PRESSURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_at_high_watermark() {
        let mut bp = Backpressure::default();
        assert!(!bp.evaluate(0.5, Instant::now()));
        assert!(bp.evaluate(0.81, Instant::now()));
        assert!(bp.is_in_pressure());
    }

    #[test]
    fn stays_in_pressure_between_high_and_low() {
        let mut bp = Backpressure::default();
        let t0 = Instant::now();
        bp.evaluate(0.90, t0);
        assert!(bp.evaluate(0.50, t0 + Duration::from_millis(10)));
    }

    #[test]
    fn releases_once_fill_drops_to_low() {
        let mut bp = Backpressure::default();
        let t0 = Instant::now();
        bp.evaluate(0.90, t0);
        assert!(!bp.evaluate(0.15, t0 + Duration::from_millis(10)));
    }

    #[test]
    fn timeout_forces_release_even_above_low_watermark() {
        let mut bp = Backpressure::new(Duration::from_millis(100));
        let t0 = Instant::now();
        bp.evaluate(0.90, t0);
        assert!(!bp.evaluate(0.70, t0 + Duration::from_millis(150)));
    }

    #[test]
    fn dropped_bytes_accumulate_and_request_a_short_sleep() {
        let mut bp = Backpressure::default();
        let sleep = bp.record_drop(128);
        assert_eq!(sleep, SLEEP_ON_PRESSURE);
        assert_eq!(bp.dropped_count(), 128);
    }
}
