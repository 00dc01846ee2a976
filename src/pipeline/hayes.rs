//! Hayes filter, serial→telnet direction (§4.5.2).
//!
//! Keeps modem chatter — AT command lines typed by the operator's own
//! terminal program and the result codes the modem controller emits in
//! response — out of the telnet stream. COMMAND mode buffers a whole line
//! at a time before deciding (everything typed there is a command). ONLINE
//! mode cannot afford that: most online traffic is raw interactive bytes
//! with no line terminator at all, so it reuses only a bounded,
//! line-*start* classification window (at most the first three bytes of
//! each line) to catch AT commands appearing in live traffic, alongside the
//! `+++` escape-guard-time detector. Once a line is classified, every
//! further byte in it is emitted (or suppressed) immediately; nothing is
//! held waiting on an arbitrary future byte, and `poll_timeout` bounds even
//! the classification window itself to the guard time.

use std::time::{Duration, Instant};

use crate::modem::escape::EscapeDetector;

const MAX_LINE: usize = 1024;
/// `is_known_at_line` only ever looks at a line's first three characters.
const ONLINE_PREFIX_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    Normal,
    CrWait,
}

/// ONLINE-mode line-start classifier state (§4.5.2): distinct from
/// `LineState`, which buffers a whole COMMAND-mode line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnlineLineState {
    /// Start of a new line; still deciding whether it opens with "AT".
    Classifying,
    /// Classified as ordinary: forward the rest of the line untouched.
    Ordinary,
    /// Classified as a known AT command: swallow the rest of the line.
    Suppressing,
}

pub struct HayesFilterContext {
    pub in_online_mode: bool,
    line_state: LineState,
    line_buffer: Vec<u8>,
    suppress_next_result: bool,
    escape: EscapeDetector,
    escape_char: u8,
    guard_time: Duration,
    pending_escape: Vec<u8>,
    pending_escape_since: Option<Instant>,
    online_line_state: OnlineLineState,
    online_prefix: Vec<u8>,
    online_prefix_since: Option<Instant>,
}

impl HayesFilterContext {
    pub fn new(escape_char: u8, guard_time_ms: u64) -> Self {
        Self {
            in_online_mode: false,
            line_state: LineState::Normal,
            line_buffer: Vec::new(),
            suppress_next_result: false,
            escape: EscapeDetector::new(escape_char),
            escape_char,
            guard_time: Duration::from_millis(guard_time_ms),
            pending_escape: Vec::new(),
            pending_escape_since: None,
            online_line_state: OnlineLineState::Classifying,
            online_prefix: Vec::new(),
            online_prefix_since: None,
        }
    }

    pub fn set_escape_char(&mut self, escape_char: u8) {
        self.escape_char = escape_char;
        self.escape.set_escape_char(escape_char);
    }

    pub fn set_guard_time_ms(&mut self, guard_time_ms: u64) {
        self.guard_time = Duration::from_millis(guard_time_ms);
    }

    /// True exactly on the call where the `+++` sequence completed.
    pub fn feed(&mut self, data: &[u8], now: Instant, out: &mut Vec<u8>) -> bool {
        if self.in_online_mode {
            return self.feed_online(data, now, out);
        }
        self.feed_command(data, out);
        false
    }

    fn feed_online(&mut self, data: &[u8], now: Instant, out: &mut Vec<u8>) -> bool {
        let _ = self.escape_char;
        for &byte in data {
            let prior_count = self.escape.count();
            if self.escape.feed(byte, now, self.guard_time) {
                self.in_online_mode = false;
                self.pending_escape.clear();
                self.pending_escape_since = None;
                self.reset_online_line_state();
                return true;
            }
            let new_count = self.escape.count();
            if new_count == prior_count + 1 {
                // Live candidate for the current `+++` run; held only until
                // the guard window lapses without completing (poll_timeout)
                // or the detector resets on a later byte.
                self.pending_escape.push(byte);
                self.pending_escape_since = Some(now);
                continue;
            }
            // The detector reset on this byte: whatever we were holding
            // back turned out to be ordinary data after all.
            let held = std::mem::take(&mut self.pending_escape);
            self.pending_escape_since = None;
            for held_byte in held {
                self.classify_online_byte(held_byte, now, out);
            }
            if new_count == 1 {
                self.pending_escape.push(byte);
                self.pending_escape_since = Some(now);
            } else {
                self.classify_online_byte(byte, now, out);
            }
        }
        false
    }

    /// Line-start AT classifier for ONLINE mode (§4.5.2). Holds back at
    /// most the first `ONLINE_PREFIX_LEN` bytes of a line while deciding;
    /// every byte after that decision (or after a terminator resets the
    /// classifier) is forwarded or suppressed the instant it arrives.
    fn classify_online_byte(&mut self, byte: u8, now: Instant, out: &mut Vec<u8>) {
        let is_terminator = byte == b'\r' || byte == b'\n';
        match self.online_line_state {
            OnlineLineState::Ordinary => {
                out.push(byte);
                if is_terminator {
                    self.reset_online_line_state();
                }
            }
            OnlineLineState::Suppressing => {
                if is_terminator {
                    self.reset_online_line_state();
                }
            }
            OnlineLineState::Classifying => {
                if is_terminator {
                    // Line ended before the prefix filled up ("AT" alone,
                    // or an empty line); classify what we have.
                    let prefix = std::mem::take(&mut self.online_prefix);
                    self.online_prefix_since = None;
                    if !is_known_at_line(&prefix_as_str(&prefix)) {
                        out.extend_from_slice(&prefix);
                        out.push(byte);
                    }
                    self.reset_online_line_state();
                    return;
                }
                if self.online_prefix.is_empty() {
                    self.online_prefix_since = Some(now);
                }
                self.online_prefix.push(byte);
                if self.online_prefix.len() < ONLINE_PREFIX_LEN {
                    return;
                }
                self.resolve_online_prefix(out);
            }
        }
    }

    fn resolve_online_prefix(&mut self, out: &mut Vec<u8>) {
        if is_known_at_line(&prefix_as_str(&self.online_prefix)) {
            self.online_line_state = OnlineLineState::Suppressing;
        } else {
            out.append(&mut self.online_prefix);
            self.online_line_state = OnlineLineState::Ordinary;
        }
        self.online_prefix.clear();
        self.online_prefix_since = None;
    }

    fn reset_online_line_state(&mut self) {
        self.online_line_state = OnlineLineState::Classifying;
        self.online_prefix.clear();
        self.online_prefix_since = None;
    }

    /// Releases state the filter has been holding back pending more input:
    /// a `+++` candidate whose guard window lapsed without completing, and
    /// an ONLINE-mode line-start prefix that never reached
    /// `ONLINE_PREFIX_LEN` or a terminator. Called periodically by L3 so
    /// bytes already sent over the wire don't wait on the caller's next
    /// keystroke to reach the peer.
    pub fn poll_timeout(&mut self, now: Instant, out: &mut Vec<u8>) {
        if !self.in_online_mode {
            return;
        }
        if let Some(since) = self.pending_escape_since {
            if now.duration_since(since) >= self.guard_time {
                let held = std::mem::take(&mut self.pending_escape);
                self.pending_escape_since = None;
                for held_byte in held {
                    self.classify_online_byte(held_byte, now, out);
                }
            }
        }
        if let Some(since) = self.online_prefix_since {
            if now.duration_since(since) >= self.guard_time {
                out.append(&mut self.online_prefix);
                self.online_line_state = OnlineLineState::Ordinary;
                self.online_prefix_since = None;
            }
        }
    }

    fn feed_command(&mut self, data: &[u8], out: &mut Vec<u8>) {
        for &byte in data {
            match self.line_state {
                LineState::Normal => {
                    if byte == b'\r' {
                        self.line_state = LineState::CrWait;
                        self.terminate_line(out);
                    } else if byte == b'\n' {
                        self.terminate_line(out);
                    } else {
                        self.line_buffer.push(byte);
                        if self.line_buffer.len() > MAX_LINE {
                            self.flush_raw(out);
                        }
                    }
                }
                LineState::CrWait => {
                    self.line_state = LineState::Normal;
                    if byte != b'\n' {
                        // Not a CRLF pair; reprocess this byte as the start
                        // of the next line.
                        self.feed_command(&[byte], out);
                    }
                }
            }
        }
    }

    fn terminate_line(&mut self, out: &mut Vec<u8>) {
        let line = std::mem::take(&mut self.line_buffer);
        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim();

        if is_known_at_line(trimmed) {
            self.suppress_next_result = true;
            return;
        }
        if self.suppress_next_result && is_known_result_line(trimmed) {
            self.suppress_next_result = false;
            return;
        }

        out.extend_from_slice(&line);
        out.push(b'\r');
        out.push(b'\n');
    }

    fn flush_raw(&mut self, out: &mut Vec<u8>) {
        out.append(&mut self.line_buffer);
    }
}

/// Lossily decodes a short classification prefix for `is_known_at_line`,
/// which only ever inspects the first three characters.
fn prefix_as_str(prefix: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(prefix)
}

fn is_known_at_line(line: &str) -> bool {
    let Some(tail) = line.get(..2).filter(|p| p.eq_ignore_ascii_case("at")) else {
        return false;
    };
    let rest = &line[2..];
    let Some(first) = rest.chars().next() else {
        return true; // bare "AT" is itself a known line (attention).
    };
    matches!(
        first.to_ascii_uppercase(),
        'A'..='Z' | '0'..='9' | '+' | '&' | '%' | '\\' | '*' | '#'
    )
}

fn is_known_result_line(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    let upper = line.to_ascii_uppercase();
    if upper.parse::<u8>().is_ok() {
        return true; // numeric (V0) result code.
    }
    matches!(
        upper.as_str(),
        "OK" | "ERROR" | "NO CARRIER" | "NO DIALTONE" | "BUSY" | "NO ANSWER" | "RING" | "DELAYED"
            | "BLACKLISTED"
    ) || upper.starts_with("CONNECT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_mode_suppresses_at_line_and_its_result() {
        let mut filter = HayesFilterContext::new(b'+', 1000);
        let mut out = Vec::new();
        filter.feed(b"ATE0\r\n", Instant::now(), &mut out);
        filter.feed(b"OK\r\n", Instant::now(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn command_mode_filter_is_idempotent() {
        // §8 "Hayes idempotence": running the already-filtered output back
        // through a fresh filter must reproduce it unchanged, whether the
        // line was suppressed (AT command + its result) or passed through.
        let mut first_pass = HayesFilterContext::new(b'+', 1000);
        let mut once = Vec::new();
        first_pass.feed(b"ATE0\r\n", Instant::now(), &mut once);
        first_pass.feed(b"OK\r\n", Instant::now(), &mut once);
        first_pass.feed(b"hello world\r\n", Instant::now(), &mut once);

        let mut second_pass = HayesFilterContext::new(b'+', 1000);
        let mut twice = Vec::new();
        second_pass.feed(&once, Instant::now(), &mut twice);

        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_line_passes_through_unmodified() {
        let mut filter = HayesFilterContext::new(b'+', 1000);
        let mut out = Vec::new();
        filter.feed(b"hello world\r\n", Instant::now(), &mut out);
        assert_eq!(out, b"hello world\r\n");
    }

    #[test]
    fn online_mode_passes_ordinary_bytes_straight_through() {
        let mut filter = HayesFilterContext::new(b'+', 1000);
        filter.in_online_mode = true;
        let mut out = Vec::new();
        let triggered = filter.feed(b"hello", Instant::now(), &mut out);
        assert!(!triggered);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn online_mode_non_triggering_plus_runs_still_reach_the_peer() {
        let mut filter = HayesFilterContext::new(b'+', 1000);
        filter.in_online_mode = true;
        let t0 = Instant::now();
        let mut out = Vec::new();
        // Two '+' with proper silence, then ordinary data: never reaches 3,
        // so both '+' characters must still be forwarded as real data.
        filter.feed(b"+", t0, &mut out);
        filter.feed(b"+", t0 + Duration::from_millis(1100), &mut out);
        filter.feed(b"x", t0 + Duration::from_millis(1200), &mut out);
        assert_eq!(out, b"++x");
    }

    #[test]
    fn online_mode_escape_sequence_flips_to_command_mode() {
        let mut filter = HayesFilterContext::new(b'+', 1000);
        filter.in_online_mode = true;
        let t0 = Instant::now();
        let mut out = Vec::new();
        assert!(!filter.feed(b"+", t0, &mut out));
        assert!(!filter.feed(b"+", t0 + Duration::from_millis(1100), &mut out));
        assert!(filter.feed(b"+", t0 + Duration::from_millis(2200), &mut out));
        assert!(!filter.in_online_mode);
    }

    #[test]
    fn online_mode_stale_escape_candidate_flushes_via_poll_timeout() {
        let mut filter = HayesFilterContext::new(b'+', 1000);
        filter.in_online_mode = true;
        let t0 = Instant::now();
        let mut out = Vec::new();
        filter.feed(b"+", t0, &mut out);
        assert!(out.is_empty(), "a live candidate is held, not dropped");
        filter.poll_timeout(t0 + Duration::from_millis(500), &mut out);
        assert!(out.is_empty(), "still inside the guard window");
        filter.poll_timeout(t0 + Duration::from_millis(1100), &mut out);
        assert_eq!(out, b"+", "stale candidate reaches the peer without waiting on a keystroke");
    }

    #[test]
    fn online_mode_suppresses_an_at_command_typed_mid_session() {
        let mut filter = HayesFilterContext::new(b'+', 1000);
        filter.in_online_mode = true;
        let mut out = Vec::new();
        filter.feed(b"hello\r\nATH0\r\nbye\r\n", Instant::now(), &mut out);
        assert_eq!(out, b"hello\r\nbye\r\n");
    }
}
