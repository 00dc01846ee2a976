//! Unsolicited hardware-message classifier (§4.3).
//!
//! Maintains a rolling buffer across reads (`<= 256` bytes) so a message
//! split across two serial reads is still recognized; partial prefixes are
//! retained until completion or a 20s timeout from the last byte seen.

use std::time::{Duration, Instant};

const MAX_BUFFER: usize = 256;
const PARTIAL_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsolicitedMessage {
    Ring,
    Connect { speed: Option<u32> },
    NoCarrier,
    Busy,
    NoDialtone,
}

pub struct UnsolicitedClassifier {
    buffer: Vec<u8>,
    last_byte_at: Option<Instant>,
}

impl Default for UnsolicitedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl UnsolicitedClassifier {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            last_byte_at: None,
        }
    }

    /// Feed freshly read bytes (COMMAND/CONNECTING/RINGING states, or the
    /// NO-CARRIER-only scan in ONLINE — the caller decides which messages it
    /// cares about and ignores the rest of the result). Returns every
    /// complete message recognized, in order.
    pub fn feed(&mut self, data: &[u8], now: Instant) -> Vec<UnsolicitedMessage> {
        if let Some(last) = self.last_byte_at {
            if now.duration_since(last) > PARTIAL_TIMEOUT {
                self.buffer.clear();
            }
        }
        self.last_byte_at = Some(now);

        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_BUFFER {
            let overflow = self.buffer.len() - MAX_BUFFER;
            self.buffer.drain(0..overflow);
        }

        let mut results = Vec::new();
        loop {
            let Some(nl_pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(0..=nl_pos).collect();
            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(message) = classify_line(trimmed) {
                results.push(message);
            }
        }
        results
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_byte_at = None;
    }
}

fn classify_line(line: &str) -> Option<UnsolicitedMessage> {
    let upper = line.to_ascii_uppercase();
    if upper == "RING" {
        return Some(UnsolicitedMessage::Ring);
    }
    if upper.starts_with("CONNECT") {
        return Some(UnsolicitedMessage::Connect {
            speed: parse_connect_speed(&upper),
        });
    }
    if upper == "NO CARRIER" || upper == "NO CAR" {
        return Some(UnsolicitedMessage::NoCarrier);
    }
    if upper == "BUSY" {
        return Some(UnsolicitedMessage::Busy);
    }
    if upper == "NO DIALTONE" {
        return Some(UnsolicitedMessage::NoDialtone);
    }
    None
}

/// Parses `CONNECT[ <speed>[/<proto>]]`, tolerating an `/ARQ`-style suffix.
fn parse_connect_speed(upper: &str) -> Option<u32> {
    let rest = upper.strip_prefix("CONNECT")?.trim();
    if rest.is_empty() {
        return None;
    }
    let speed_token = rest.split('/').next().unwrap_or(rest).trim();
    speed_token.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_ring() {
        let mut classifier = UnsolicitedClassifier::new();
        let msgs = classifier.feed(b"\r\nRING\r\n", Instant::now());
        assert_eq!(msgs, vec![UnsolicitedMessage::Ring]);
    }

    #[test]
    fn parses_connect_speed_and_tolerates_arq_suffix() {
        let mut classifier = UnsolicitedClassifier::new();
        let msgs = classifier.feed(b"\r\nCONNECT 2400/ARQ\r\n", Instant::now());
        assert_eq!(
            msgs,
            vec![UnsolicitedMessage::Connect { speed: Some(2400) }]
        );
    }

    #[test]
    fn bare_connect_has_no_speed() {
        let mut classifier = UnsolicitedClassifier::new();
        let msgs = classifier.feed(b"\r\nCONNECT\r\n", Instant::now());
        assert_eq!(msgs, vec![UnsolicitedMessage::Connect { speed: None }]);
    }

    #[test]
    fn assembles_a_message_split_across_two_reads() {
        let mut classifier = UnsolicitedClassifier::new();
        let now = Instant::now();
        assert!(classifier.feed(b"\r\nNO CAR", now).is_empty());
        let msgs = classifier.feed(b"RIER\r\n", now);
        assert_eq!(msgs, vec![UnsolicitedMessage::NoCarrier]);
    }

    #[test]
    fn partial_prefix_is_dropped_after_20s_of_silence() {
        let mut classifier = UnsolicitedClassifier::new();
        let t0 = Instant::now();
        assert!(classifier.feed(b"\r\nNO CAR", t0).is_empty());
        let t1 = t0 + Duration::from_secs(21);
        // The stale "NO CAR" prefix is discarded; this completes a fresh,
        // unrelated line instead of stitching onto the abandoned one.
        let msgs = classifier.feed(b"RING\r\n", t1);
        assert_eq!(msgs, vec![UnsolicitedMessage::Ring]);
    }

    #[test]
    fn recognizes_busy_and_no_dialtone() {
        let mut classifier = UnsolicitedClassifier::new();
        assert_eq!(
            classifier.feed(b"\r\nBUSY\r\n", Instant::now()),
            vec![UnsolicitedMessage::Busy]
        );
        assert_eq!(
            classifier.feed(b"\r\nNO DIALTONE\r\n", Instant::now()),
            vec![UnsolicitedMessage::NoDialtone]
        );
    }
}
