//! Serial port primitive (§4.2).
//!
//! Wraps the OS tty so L1 (`crate::modem`) never touches raw termios or fds
//! directly. On Unix this holds a `serialport::TTYPort` rather than the
//! boxed trait object so carrier-detect-driven `CLOCAL` toggling and the
//! bounded-time write can reach the raw fd with `nix`; non-Unix targets fall
//! back to the portable boxed handle and treat those two operations as
//! no-ops (CLOCAL has no POSIX-free equivalent worth emulating).

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort as _;

use crate::errors::{BridgeError, BridgeResult};
use crate::lockfile::LockFile;

#[cfg(unix)]
type PortHandle = serialport::TTYPort;
#[cfg(not(unix))]
type PortHandle = Box<dyn serialport::SerialPort>;

/// Line speeds the modem is expected to negotiate; anything else falls back
/// to 9600 with a logged warning (§4.2).
const KNOWN_BAUD_RATES: &[u32] = &[
    300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400,
];

pub fn validate_baud_rate(requested: u32) -> u32 {
    if KNOWN_BAUD_RATES.contains(&requested) {
        requested
    } else {
        log::warn!(
            "unrecognized baud rate {} requested, falling back to 9600",
            requested
        );
        9600
    }
}

pub struct SerialPort {
    port: PortHandle,
    path: String,
    carrier_detect_enabled: bool,
    _lock: LockFile,
}

impl SerialPort {
    /// Acquire the UUCP lock, open the device, and configure 8N1 raw mode at
    /// `speed`. `flow` selects RTS/CTS hardware flow control.
    pub fn open(
        path: &str,
        speed: u32,
        flow: serialport::FlowControl,
    ) -> BridgeResult<Self> {
        let lock = LockFile::acquire(path)?;
        let speed = validate_baud_rate(speed);

        let builder = serialport::new(path, speed)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(flow)
            .timeout(Duration::from_millis(100));

        #[cfg(unix)]
        let port = builder.open_native()?;
        #[cfg(not(unix))]
        let port = builder.open()?;

        log::info!("serial port {} opened at {} baud", path, speed);

        Ok(Self {
            port,
            path: path.to_string(),
            carrier_detect_enabled: true,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    /// `write_with_epoll` (§4.2): a bounded-time write used for timestamp
    /// injection. Retries a short-circuited write loop until every byte is
    /// accepted or `timeout` elapses.
    pub fn write_with_epoll(&mut self, buf: &[u8], timeout: Duration) -> BridgeResult<usize> {
        let deadline = Instant::now() + timeout;
        let mut written = 0usize;

        while written < buf.len() {
            if Instant::now() >= deadline {
                return Err(BridgeError::Timeout("serial bounded write"));
            }
            #[cfg(unix)]
            {
                if !Self::wait_writable(&self.port, deadline) {
                    return Err(BridgeError::Timeout("serial bounded write"));
                }
            }
            match self.port.write(&buf[written..]) {
                Ok(0) => continue,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(written)
    }

    #[cfg(unix)]
    fn wait_writable(port: &PortHandle, deadline: Instant) -> bool {
        use nix::poll::{poll, PollFd, PollFlags};
        use std::os::fd::AsFd;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        let mut fds = [PollFd::new(port.as_fd(), PollFlags::POLLOUT)];
        matches!(poll(&mut fds, remaining.as_millis() as u16), Ok(n) if n > 0)
    }

    pub fn set_baudrate(&mut self, speed: u32) -> BridgeResult<()> {
        let speed = validate_baud_rate(speed);
        self.port.set_baud_rate(speed)?;
        log::info!("serial port {} speed adjusted to {}", self.path, speed);
        Ok(())
    }

    pub fn set_dtr(&mut self, on: bool) -> BridgeResult<()> {
        self.port.write_data_terminal_ready(on)?;
        Ok(())
    }

    pub fn set_rts(&mut self, on: bool) -> BridgeResult<()> {
        self.port.write_request_to_send(on)?;
        Ok(())
    }

    pub fn get_dcd(&mut self) -> BridgeResult<bool> {
        if !self.carrier_detect_enabled {
            return Ok(true);
        }
        Ok(self.port.read_carrier_detect()?)
    }

    /// Toggles the `CLOCAL` control flag: disabling it lets the kernel raise
    /// I/O errors when carrier drops mid-write, which the modem's
    /// immediate-cleanup path (§4.3.4) wants during hangup; enabling it
    /// (the normal state) lets DCD be read without the port itself erroring.
    pub fn enable_carrier_detect(&mut self) -> BridgeResult<()> {
        self.carrier_detect_enabled = true;
        self.set_clocal(true)
    }

    pub fn disable_carrier_detect(&mut self) -> BridgeResult<()> {
        self.carrier_detect_enabled = false;
        self.set_clocal(false)
    }

    #[cfg(unix)]
    fn set_clocal(&mut self, clocal: bool) -> BridgeResult<()> {
        use nix::sys::termios::{self, SetArg};

        let mut attrs = termios::tcgetattr(&self.port)
            .map_err(|e| BridgeError::SerialUnavailable(e.to_string()))?;
        if clocal {
            attrs.control_flags |= nix::sys::termios::ControlFlags::CLOCAL;
        } else {
            attrs.control_flags.remove(nix::sys::termios::ControlFlags::CLOCAL);
        }
        termios::tcsetattr(&self.port, SetArg::TCSANOW, &attrs)
            .map_err(|e| BridgeError::SerialUnavailable(e.to_string()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn set_clocal(&mut self, _clocal: bool) -> BridgeResult<()> {
        Ok(())
    }

    /// `&D2`/`&D3` hangup path (§4.3.5): assert 0V on DTR for at least
    /// 500ms, with `CLOCAL` temporarily forced so the kernel doesn't fault
    /// the write calls that are still draining while carrier drops.
    pub fn dtr_drop_hangup(&mut self) -> BridgeResult<()> {
        let was_enabled = self.carrier_detect_enabled;
        self.enable_carrier_detect()?;
        self.set_dtr(false)?;
        std::thread::sleep(Duration::from_millis(550));
        self.set_dtr(true)?;
        if !was_enabled {
            self.disable_carrier_detect()?;
        }
        Ok(())
    }

    pub fn bytes_to_read(&self) -> BridgeResult<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    pub fn clear(&self, buffer: serialport::ClearBuffer) -> BridgeResult<()> {
        Ok(self.port.clear(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_baud_rates_pass_through() {
        for rate in KNOWN_BAUD_RATES {
            assert_eq!(validate_baud_rate(*rate), *rate);
        }
    }

    #[test]
    fn unknown_baud_rate_falls_back_to_9600() {
        assert_eq!(validate_baud_rate(31250), 9600);
    }
}
