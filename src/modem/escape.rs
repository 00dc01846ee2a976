//! `+++` escape-sequence detector (§4.3).
//!
//! Requires silence of at least `guard_time` before the first escape
//! character and between each of the three; any non-escape byte resets the
//! count. Runs inline in the ONLINE-mode filter and must not consume user
//! data beyond the three triggering bytes.

use std::time::{Duration, Instant};

pub struct EscapeDetector {
    escape_char: u8,
    count: u8,
    plus_start: Option<Instant>,
    last_char_at: Option<Instant>,
}

impl EscapeDetector {
    pub fn new(escape_char: u8) -> Self {
        Self {
            escape_char,
            count: 0,
            plus_start: None,
            last_char_at: None,
        }
    }

    pub fn set_escape_char(&mut self, escape_char: u8) {
        self.escape_char = escape_char;
        self.reset();
    }

    /// Number of qualifying escape characters accumulated so far (0–2; a
    /// complete run of 3 resets back to 0 via `feed`'s own bookkeeping).
    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.plus_start = None;
        self.last_char_at = None;
    }

    /// Feed one byte at time `now`. Returns `true` exactly when the third
    /// qualifying escape character completes the sequence.
    pub fn feed(&mut self, byte: u8, now: Instant, guard_time: Duration) -> bool {
        if byte != self.escape_char {
            self.reset();
            self.last_char_at = Some(now);
            return false;
        }

        let silence_ok = match self.last_char_at {
            None => true,
            Some(last) => now.duration_since(last) >= guard_time,
        };

        if !silence_ok {
            // Arrived too soon after the previous byte (escape or not):
            // this breaks the required lead-in/inter-character silence.
            self.reset();
            self.last_char_at = Some(now);
            return false;
        }

        if self.count == 0 {
            self.plus_start = Some(now);
        }
        self.count += 1;
        self.last_char_at = Some(now);

        if self.count >= 3 {
            self.reset();
            return true;
        }
        false
    }
}
