//! Timestamp injector (§4.3), consumed by L1 while the modem is online.
//!
//! `should_send` lives on `Modem` itself (it needs `connect_time`); this
//! module only formats the line and drives the bounded-time write with its
//! retry policy, since those concerns don't need access to modem state.

use std::time::Duration;

use crate::errors::{BridgeError, BridgeResult};
use crate::serial::SerialPort;

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

pub fn format_line(prefix: &str, now: jiff::Zoned, suffix: &str) -> String {
    format!(
        "\r\n[{}] [{}] {}\r\n",
        prefix,
        now.strftime("%Y-%m-%d %H:%M:%S"),
        suffix
    )
}

/// Writes `line` to the serial port with up to `MAX_RETRIES` bounded-time
/// attempts, `RETRY_DELAY` apart. On exhaustion, the caller is expected to
/// force the modem offline (§4.3: "On any write error, force the modem
/// OFFLINE").
pub fn send_with_retry(port: &mut SerialPort, line: &[u8]) -> BridgeResult<()> {
    let mut last_err = None;
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            std::thread::sleep(RETRY_DELAY);
        }
        match port.write_with_epoll(line, WRITE_TIMEOUT) {
            Ok(_) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(BridgeError::Timeout("timestamp injector write")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_prefix_date_time_and_suffix() {
        let now: jiff::Zoned = "2026-07-27T12:00:00Z".parse().unwrap();
        let line = format_line("TIME", now, "end");
        assert!(line.starts_with("\r\n[TIME] ["));
        assert!(line.trim_end().ends_with("end"));
    }
}
