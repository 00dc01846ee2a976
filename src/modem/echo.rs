//! Echo injector (§4.3), consumed by L1 in Level-1-only deployments where
//! there is no telnet peer to echo for the caller.
//!
//! Multi-byte characters must be assembled before they're echoed back so a
//! lead byte doesn't get split across two echoed writes. We don't decode
//! the specific encoding (UTF-8, EUC-KR, Shift-JIS all use high-bit lead
//! bytes followed by continuation bytes) — any run of bytes with the high
//! bit set is held until it looks complete under UTF-8 rules, or until
//! `flush_after` elapses, whichever comes first. ASCII passes straight
//! through with no delay.

use std::time::{Duration, Instant};

pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

pub struct EchoInjector {
    prefix: String,
    pending: Vec<u8>,
    pending_since: Option<Instant>,
    flush_after: Duration,
    immediate: bool,
    batch_interval: Duration,
    batch: Vec<u8>,
    batch_since: Option<Instant>,
}

impl EchoInjector {
    pub fn new(prefix: String) -> Self {
        Self::with_flush_timeout(prefix, DEFAULT_FLUSH_TIMEOUT)
    }

    pub fn with_flush_timeout(prefix: String, flush_after: Duration) -> Self {
        Self {
            prefix,
            pending: Vec::new(),
            pending_since: None,
            flush_after,
            immediate: true,
            batch_interval: Duration::ZERO,
            batch: Vec::new(),
            batch_since: None,
        }
    }

    /// Switches from immediate emission (`echo_immediate = true`, the
    /// default) to batched: completed echo units are held and released
    /// together every `interval`, rather than the instant each one
    /// completes.
    pub fn set_batching(&mut self, interval: Duration) {
        self.immediate = false;
        self.batch_interval = interval;
    }

    /// Feed freshly-read caller bytes at `now`. Returns the bytes ready to
    /// echo back right now (may be empty if everything is being held for a
    /// possible multi-byte continuation, or for the next batch release).
    pub fn feed(&mut self, data: &[u8], now: Instant) -> Vec<u8> {
        let mut ready = Vec::new();
        for &byte in data {
            self.pending.push(byte);
            if self.pending_since.is_none() {
                self.pending_since = Some(now);
            }
            if self.sequence_complete() {
                ready.extend(self.take_pending());
            }
        }
        self.route(ready, now)
    }

    /// Call periodically; flushes a stalled incomplete sequence once
    /// `flush_after` has elapsed since its first byte arrived, and releases
    /// a pending batch once its interval has elapsed.
    pub fn poll_timeout(&mut self, now: Instant) -> Vec<u8> {
        let stalled = match self.pending_since {
            Some(since) if now.duration_since(since) >= self.flush_after => self.take_pending(),
            _ => Vec::new(),
        };
        self.route(stalled, now)
    }

    /// Routes newly-completed bytes: straight out in immediate mode, or into
    /// the batch, releasing the whole batch once `batch_interval` has
    /// elapsed since its first addition.
    fn route(&mut self, mut newly_ready: Vec<u8>, now: Instant) -> Vec<u8> {
        if self.immediate {
            return newly_ready;
        }
        if !newly_ready.is_empty() {
            if self.batch_since.is_none() {
                self.batch_since = Some(now);
            }
            self.batch.append(&mut newly_ready);
        }
        match self.batch_since {
            Some(since) if now.duration_since(since) >= self.batch_interval => {
                self.batch_since = None;
                std::mem::take(&mut self.batch)
            }
            _ => Vec::new(),
        }
    }

    fn take_pending(&mut self) -> Vec<u8> {
        self.pending_since = None;
        std::mem::take(&mut self.pending)
    }

    /// A run is "complete" once it parses as valid UTF-8, or once its last
    /// byte is plain ASCII (high bit clear) with nothing held before it.
    fn sequence_complete(&self) -> bool {
        if self.pending.iter().all(|&b| b < 0x80) {
            return true;
        }
        std::str::from_utf8(&self.pending).is_ok()
    }

    /// Formats one echoed chunk with the configured prefix, if any.
    pub fn format(&self, bytes: &[u8]) -> Vec<u8> {
        if self.prefix.is_empty() {
            return bytes.to_vec();
        }
        let mut out = Vec::with_capacity(self.prefix.len() + bytes.len());
        out.extend_from_slice(self.prefix.as_bytes());
        out.extend_from_slice(bytes);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_echoed_immediately() {
        let mut echo = EchoInjector::new(String::new());
        let now = Instant::now();
        assert_eq!(echo.feed(b"hi", now), b"hi");
    }

    #[test]
    fn multibyte_utf8_is_held_until_the_sequence_completes() {
        let mut echo = EchoInjector::new(String::new());
        let now = Instant::now();
        let bytes = "é".as_bytes(); // 2-byte UTF-8 sequence
        assert!(echo.feed(&bytes[..1], now).is_empty());
        assert_eq!(echo.feed(&bytes[1..], now), bytes);
    }

    #[test]
    fn incomplete_sequence_flushes_after_timeout() {
        let mut echo = EchoInjector::with_flush_timeout(String::new(), Duration::from_millis(500));
        let t0 = Instant::now();
        assert!(echo.feed(&[0xE2], t0).is_empty());
        assert!(echo.poll_timeout(t0 + Duration::from_millis(200)).is_empty());
        assert_eq!(
            echo.poll_timeout(t0 + Duration::from_millis(600)),
            vec![0xE2]
        );
    }

    #[test]
    fn prefix_is_prepended_when_configured() {
        let echo = EchoInjector::new("ECHO:".to_string());
        assert_eq!(echo.format(b"x"), b"ECHO:x");
    }

    #[test]
    fn batched_mode_withholds_until_the_interval_elapses() {
        let mut echo = EchoInjector::new(String::new());
        echo.set_batching(Duration::from_millis(500));
        let t0 = Instant::now();
        assert!(echo.feed(b"ab", t0).is_empty());
        assert!(echo
            .feed(b"c", t0 + Duration::from_millis(200))
            .is_empty());
        assert!(echo
            .poll_timeout(t0 + Duration::from_millis(300))
            .is_empty());
        assert_eq!(
            echo.poll_timeout(t0 + Duration::from_millis(600)),
            b"abc"
        );
    }
}
