//! L3 — the pipeline manager (§4.5).
//!
//! Owns the two half-duplex pipelines (one per direction), the system state
//! machine, the scheduler that picks which pipeline runs next, and the
//! backpressure/filters applied along the way. L1 and L2 each own their own
//! fd; L3 only touches the ring/double buffers shared with them.

pub mod backpressure;
pub mod hayes;
pub mod scheduler;
pub mod state;
pub mod telnet_filter;

pub use state::SystemState;

use std::time::Instant;

use crate::double_buffer::EnhancedDoubleBuffer;
use crate::errors::BridgeResult;
use backpressure::Backpressure;
use hayes::HayesFilterContext;
use scheduler::{Scheduler, SchedulerConfig};
use telnet_filter::TelnetControlFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    SerialToTelnet,
    TelnetToSerial,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::SerialToTelnet => Direction::TelnetToSerial,
            Direction::TelnetToSerial => Direction::SerialToTelnet,
        }
    }
}

/// One direction's buffer plus the backpressure state guarding it.
pub struct Pipeline {
    pub direction: Direction,
    pub buffer: EnhancedDoubleBuffer,
    pub backpressure: Backpressure,
}

impl Pipeline {
    pub fn new(direction: Direction, initial_size: usize, min_size: usize, max_size: usize) -> Self {
        Self {
            direction,
            buffer: EnhancedDoubleBuffer::new(initial_size, min_size, max_size),
            backpressure: Backpressure::default(),
        }
    }

    /// Enqueues `data`, honoring backpressure (§4.5.5). Returns the number
    /// of bytes actually accepted (0 while in pressure).
    pub fn enqueue(&mut self, data: &[u8], now: Instant) -> usize {
        let fill = self.buffer.fill_ratio();
        let refused = self.backpressure.evaluate(fill, now);
        if refused {
            std::thread::sleep(self.backpressure.record_drop(data.len()));
            0
        } else {
            self.buffer.write(data)
        }
    }

    pub fn maybe_resize(&self, now: Instant) -> Option<(usize, usize)> {
        self.buffer.maybe_resize(now)
    }
}

pub struct L3Config {
    pub escape_char: u8,
    pub escape_guard_time_ms: u64,
    pub buffer_initial: usize,
    pub buffer_min: usize,
    pub buffer_max: usize,
    pub scheduler: SchedulerConfig,
}

impl L3Config {
    pub fn from_bridge_config(config: &crate::config::BridgeConfig, modem: &crate::modem::Modem) -> Self {
        Self {
            escape_char: modem.settings.escape_char(),
            escape_guard_time_ms: modem.settings.escape_guard_time_ms(),
            buffer_initial: config.buffers.size_bytes,
            buffer_min: config.buffers.min_bytes,
            buffer_max: config.buffers.max_bytes,
            scheduler: SchedulerConfig::from_bridge_config(config),
        }
    }
}

pub struct L3Context {
    pub system_state: SystemState,
    pub previous_state: SystemState,
    pub state_change_time: Instant,
    pub dcd_state: bool,
    pub dcd_rising_detected: bool,
    pub serial_to_telnet: Pipeline,
    pub telnet_to_serial: Pipeline,
    pub hayes: HayesFilterContext,
    pub telnet_filter: TelnetControlFilter,
    pub scheduler: Scheduler,
}

impl L3Context {
    pub fn new(config: L3Config, now: Instant) -> Self {
        Self {
            system_state: SystemState::Uninitialized,
            previous_state: SystemState::Uninitialized,
            state_change_time: now,
            dcd_state: false,
            dcd_rising_detected: false,
            serial_to_telnet: Pipeline::new(
                Direction::SerialToTelnet,
                config.buffer_initial,
                config.buffer_min,
                config.buffer_max,
            ),
            telnet_to_serial: Pipeline::new(
                Direction::TelnetToSerial,
                config.buffer_initial,
                config.buffer_min,
                config.buffer_max,
            ),
            hayes: HayesFilterContext::new(config.escape_char, config.escape_guard_time_ms),
            telnet_filter: TelnetControlFilter::new(),
            scheduler: Scheduler::new(config.scheduler, now),
        }
    }

    /// Validates and applies a system-state transition (§4.5.1), syncing
    /// the Hayes filter's online flag on entry/exit of DATA_TRANSFER.
    pub fn transition(&mut self, to: SystemState, now: Instant) -> BridgeResult<()> {
        state::transition(self.system_state, to)?;
        self.previous_state = self.system_state;
        self.system_state = to;
        self.state_change_time = now;
        self.hayes.in_online_mode = to.is_online();
        Ok(())
    }

    /// Applies the current state's timeout recovery if its deadline has
    /// passed. Returns `true` if a recovery transition happened.
    pub fn apply_timeout_recovery(&mut self, now: Instant) -> bool {
        if now.duration_since(self.state_change_time) < self.system_state.timeout() {
            return false;
        }
        let Some(recovery) = self.system_state.recovery() else {
            return false;
        };
        log::warn!(
            "system state {:?} exceeded its deadline; recovering to {:?}",
            self.system_state,
            recovery
        );
        self.transition(recovery, now).is_ok()
    }

    /// Entry point for the DCD callback (§4.3's "DCD event callback"): the
    /// caller is expected to hold this context behind a `try_lock` so this
    /// never blocks on the modem mutex. Records the edge for the FSM's next
    /// tick rather than acting on it immediately.
    pub fn on_dcd_edge(&mut self, rising: bool) {
        self.dcd_state = rising;
        if rising {
            self.dcd_rising_detected = true;
        }
    }

    /// Consumes a previously recorded DCD-rising edge, if any (one-shot).
    pub fn take_dcd_rising(&mut self) -> bool {
        std::mem::replace(&mut self.dcd_rising_detected, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> L3Config {
        L3Config {
            escape_char: b'+',
            escape_guard_time_ms: 1000,
            buffer_initial: 1024,
            buffer_min: 256,
            buffer_max: 8192,
            scheduler: SchedulerConfig::default(),
        }
    }

    #[test]
    fn direction_opposite_is_involutive() {
        assert_eq!(Direction::SerialToTelnet.opposite(), Direction::TelnetToSerial);
        assert_eq!(Direction::TelnetToSerial.opposite().opposite(), Direction::TelnetToSerial);
    }

    #[test]
    fn full_startup_sequence_reaches_data_transfer() {
        let now = Instant::now();
        let mut ctx = L3Context::new(test_config(), now);
        ctx.transition(SystemState::Initializing, now).unwrap();
        ctx.transition(SystemState::Ready, now).unwrap();
        ctx.transition(SystemState::Connecting, now).unwrap();
        ctx.transition(SystemState::DataTransfer, now).unwrap();
        assert_eq!(ctx.system_state, SystemState::DataTransfer);
        assert!(ctx.hayes.in_online_mode);
    }

    #[test]
    fn leaving_data_transfer_flips_hayes_back_to_command_mode() {
        let now = Instant::now();
        let mut ctx = L3Context::new(test_config(), now);
        ctx.transition(SystemState::Initializing, now).unwrap();
        ctx.transition(SystemState::Ready, now).unwrap();
        ctx.transition(SystemState::Connecting, now).unwrap();
        ctx.transition(SystemState::DataTransfer, now).unwrap();
        ctx.transition(SystemState::Flushing, now).unwrap();
        assert!(!ctx.hayes.in_online_mode);
    }

    #[test]
    fn invalid_transition_is_rejected_and_state_unchanged() {
        let now = Instant::now();
        let mut ctx = L3Context::new(test_config(), now);
        let err = ctx.transition(SystemState::DataTransfer, now).unwrap_err();
        assert!(matches!(err, crate::errors::BridgeError::InvalidTransition { .. }));
        assert_eq!(ctx.system_state, SystemState::Uninitialized);
    }

    #[test]
    fn connecting_timeout_recovers_to_ready() {
        let now = Instant::now();
        let mut ctx = L3Context::new(test_config(), now);
        ctx.transition(SystemState::Initializing, now).unwrap();
        ctx.transition(SystemState::Ready, now).unwrap();
        ctx.transition(SystemState::Connecting, now).unwrap();

        let later = now + SystemState::Connecting.timeout() + std::time::Duration::from_secs(1);
        assert!(ctx.apply_timeout_recovery(later));
        assert_eq!(ctx.system_state, SystemState::Ready);
    }

    #[test]
    fn dcd_rising_edge_is_recorded_and_consumed_once() {
        let now = Instant::now();
        let mut ctx = L3Context::new(test_config(), now);
        ctx.on_dcd_edge(true);
        assert!(ctx.take_dcd_rising());
        assert!(!ctx.take_dcd_rising());
    }

    #[test]
    fn pipeline_enqueue_respects_backpressure() {
        let now = Instant::now();
        let mut pipeline = Pipeline::new(Direction::SerialToTelnet, 16, 4, 64);
        // Fill both halves (combined capacity 32) past the 80% watermark.
        pipeline.buffer.write(&[0u8; 16]);
        pipeline.buffer.switch_buffers();
        pipeline.buffer.write(&[0u8; 14]);
        let accepted = pipeline.enqueue(b"xx", now);
        assert_eq!(accepted, 0);
        assert!(pipeline.backpressure.is_in_pressure());
    }
}
