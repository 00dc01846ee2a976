//! Half-duplex scheduler (§4.5.4).
//!
//! Picks which direction (serial→telnet or telnet→serial) gets to run next,
//! bounding per-direction wait time while keeping throughput reasonable on a
//! link that can only move data one way at a time.

use std::time::{Duration, Instant};

use super::Direction;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub base_quantum_ms: u64,
    pub min_quantum_ms: u64,
    pub max_quantum_ms: u64,
    pub starvation_threshold_ms: u64,
    pub latency_bound_ms: u64,
    pub low_speed: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_quantum_ms: 50,
            min_quantum_ms: 10,
            max_quantum_ms: 200,
            starvation_threshold_ms: 500,
            latency_bound_ms: 200,
            low_speed: false,
        }
    }
}

impl SchedulerConfig {
    /// Builds a scheduler config from the INI-derived `crate::config`
    /// settings; `crate::config::BridgeConfig::latency_bound_ms` already
    /// applies the low-speed doubling, so only the *further* forced-switch
    /// multiplier is controlled by `low_speed` here.
    pub fn from_bridge_config(config: &crate::config::BridgeConfig) -> Self {
        Self {
            base_quantum_ms: config.scheduler.quantum_ms,
            min_quantum_ms: 10,
            max_quantum_ms: 200,
            starvation_threshold_ms: config.scheduler.starvation_threshold_ms,
            latency_bound_ms: config.latency_bound_ms(),
            low_speed: config.serial.baudrate <= 2400,
        }
    }
}

fn index(direction: Direction) -> usize {
    match direction {
        Direction::SerialToTelnet => 0,
        Direction::TelnetToSerial => 1,
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    current: Direction,
    quantum_ms: u64,
    quantum_started_at: Instant,
    last_switch_at: Option<Instant>,
    last_service: [Instant; 2],
    ema_wait_ms: [f64; 2],
    weights: [u32; 2],
    iterations: u64,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, now: Instant) -> Self {
        let quantum_ms = config.base_quantum_ms;
        Self {
            current: Direction::SerialToTelnet,
            quantum_ms,
            quantum_started_at: now,
            last_switch_at: None,
            last_service: [now, now],
            ema_wait_ms: [0.0, 0.0],
            weights: [5, 5],
            iterations: 0,
            config,
        }
    }

    pub fn current_direction(&self) -> Direction {
        self.current
    }

    pub fn current_quantum_ms(&self) -> u64 {
        self.quantum_ms
    }

    pub fn weights(&self) -> (u32, u32) {
        (self.weights[0], self.weights[1])
    }

    /// Scales `base` by this direction's share of the `{serial, telnet}`
    /// weight pair (§4.5.4's weighted fair queueing), so the direction
    /// with higher recent latency gets a bigger chunk per turn instead of
    /// both directions always draining the same fixed amount. Weights sum
    /// to 10 and default to `{5, 5}`, so an untuned scheduler reproduces
    /// `base` exactly; never shrinks below an eighth of `base`.
    pub fn chunk_size(&self, direction: Direction, base: usize) -> usize {
        let weight = self.weights[index(direction)] as usize;
        (base * weight / 5).max(base / 8).max(1)
    }

    /// `latency_bound_ms` is expected to already reflect the low-speed
    /// doubling (`BridgeConfig::latency_bound_ms`); `low_speed` here only
    /// controls the further 1.5x on the forced-switch threshold (§4.5.4).
    fn effective_latency_bound(&self) -> Duration {
        Duration::from_millis(self.config.latency_bound_ms)
    }

    fn wait_time(&self, direction: Direction, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_service[index(direction)])
    }

    /// Call once per scheduler iteration. Returns the direction that should
    /// be serviced next; may differ from `current_direction()` before the
    /// call if a switch happened.
    pub fn tick(&mut self, now: Instant) -> Direction {
        let other = self.current.opposite();
        let other_wait = self.wait_time(other, now);
        let lb = self.effective_latency_bound();
        let starvation_threshold = Duration::from_millis(self.config.starvation_threshold_ms);

        if other_wait > starvation_threshold {
            self.switch_to(other, now, true);
            return self.current;
        }

        let violation_threshold = lb.mul_f64(1.5);
        if other_wait > violation_threshold {
            log::warn!(
                "scheduler latency bound violated for {:?}: waited {:?} (bound {:?})",
                other,
                other_wait,
                lb
            );
            let mut forced_threshold = violation_threshold;
            if self.config.low_speed {
                forced_threshold = forced_threshold.mul_f64(1.5);
            }
            if other_wait > forced_threshold {
                self.switch_to(other, now, true);
                return self.current;
            }
        }

        let quantum_elapsed =
            now.duration_since(self.quantum_started_at) >= Duration::from_millis(self.quantum_ms);
        if quantum_elapsed {
            let cooldown_ok = match self.last_switch_at {
                None => true,
                Some(last) => now.duration_since(last) >= Duration::from_secs(1),
            };
            if cooldown_ok {
                self.switch_to(other, now, false);
            }
        }

        self.current
    }

    fn switch_to(&mut self, to: Direction, now: Instant, forced: bool) {
        let wait = self.wait_time(to, now);
        self.record_wait_sample(to, wait);
        self.current = to;
        self.last_switch_at = Some(now);
        if !forced {
            self.quantum_started_at = now;
            self.recompute_quantum();
        }
    }

    /// Marks `direction` as having just been serviced, resetting its wait
    /// clock. Called by the pipeline executor after each processed chunk.
    pub fn record_service(&mut self, direction: Direction, now: Instant) {
        self.last_service[index(direction)] = now;
        self.iterations += 1;
        if self.iterations % 100 == 0 {
            self.update_weights();
        }
    }

    fn record_wait_sample(&mut self, direction: Direction, wait: Duration) {
        let idx = index(direction);
        let sample = wait.as_millis() as f64;
        self.ema_wait_ms[idx] = 0.9 * self.ema_wait_ms[idx] + 0.1 * sample;
    }

    fn recompute_quantum(&mut self) {
        let max_wait = self.ema_wait_ms[0].max(self.ema_wait_ms[1]).max(1.0);
        let min_wait = self.ema_wait_ms[0].min(self.ema_wait_ms[1]).max(1.0);
        let ratio = max_wait / min_wait;

        let mut quantum = if ratio > 3.0 {
            self.config.min_quantum_ms
        } else if ratio > 1.5 {
            (self.config.base_quantum_ms as f64 * 0.7) as u64
        } else {
            self.config.base_quantum_ms
        };

        if self.config.low_speed {
            let floor = self.config.latency_bound_ms / 4;
            quantum = quantum.max(floor);
        }

        self.quantum_ms = quantum.clamp(self.config.min_quantum_ms, self.config.max_quantum_ms);
    }

    fn update_weights(&mut self) {
        let total = self.ema_wait_ms[0] + self.ema_wait_ms[1];
        if total <= 0.0 {
            return;
        }
        let serial_share = (self.ema_wait_ms[0] / total * 10.0).round() as u32;
        let serial_weight = serial_share.clamp(1, 9);
        self.weights = [serial_weight, 10 - serial_weight];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantum_expiry_switches_direction_after_cooldown_free_start() {
        let mut sched = Scheduler::new(SchedulerConfig::default(), Instant::now());
        let t0 = Instant::now();
        let after_quantum = t0 + Duration::from_millis(60);
        let direction = sched.tick(after_quantum);
        assert_eq!(direction, Direction::TelnetToSerial);
    }

    #[test]
    fn starvation_forces_an_immediate_switch() {
        let t0 = Instant::now();
        let mut sched = Scheduler::new(SchedulerConfig::default(), t0);
        // Current direction keeps getting serviced; the other starves.
        let starved_at = t0 + Duration::from_millis(600);
        let direction = sched.tick(starved_at);
        assert_eq!(direction, Direction::TelnetToSerial);
    }

    #[test]
    fn cooldown_blocks_a_second_quantum_switch_within_one_second() {
        let t0 = Instant::now();
        let mut sched = Scheduler::new(SchedulerConfig::default(), t0);
        let first_switch = t0 + Duration::from_millis(60);
        assert_eq!(sched.tick(first_switch), Direction::TelnetToSerial);
        sched.record_service(Direction::TelnetToSerial, first_switch);

        // Quantum expires again almost immediately, but cooldown blocks it.
        let too_soon = first_switch + Duration::from_millis(60);
        assert_eq!(sched.tick(too_soon), Direction::TelnetToSerial);
    }

    #[test]
    fn chunk_size_reflects_skewed_weights() {
        let mut sched = Scheduler::new(SchedulerConfig::default(), Instant::now());
        assert_eq!(sched.chunk_size(Direction::SerialToTelnet, 512), 512);
        sched.weights = [8, 2];
        assert_eq!(sched.chunk_size(Direction::SerialToTelnet, 512), 512 * 8 / 5);
        assert_eq!(sched.chunk_size(Direction::TelnetToSerial, 512), (512 / 8).max(512 * 2 / 5));
    }

    #[test]
    fn forced_latency_switch_does_not_reset_the_quantum_timer() {
        let t0 = Instant::now();
        let mut sched = Scheduler::new(
            SchedulerConfig {
                latency_bound_ms: 100,
                ..SchedulerConfig::default()
            },
            t0,
        );
        let quantum_before = sched.current_quantum_ms();
        // 1.5x100ms = 150ms violation threshold, forced switch above that.
        let forced_at = t0 + Duration::from_millis(260);
        sched.tick(forced_at);
        assert_eq!(sched.current_quantum_ms(), quantum_before);
    }
}
