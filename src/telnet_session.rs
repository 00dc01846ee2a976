//! Telnet session, L2 (§4.4).
//!
//! Wraps a non-blocking `TcpStream` plus the RFC 1143 option negotiator and
//! IAC parser from `telnet_negotiation`. Negotiation policy is minimal:
//! accept `WILL ECHO` and `WILL SUPPRESS_GO_AHEAD` silently; answer
//! everything else `WONT`/`DONT`. The session never initiates negotiation.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use telnet_negotiation::{
    escape_iac, OptionNegotiator, Side, TelnetCommand, TelnetOption, TelnetParser, TelnetSequence,
};

use crate::errors::{BridgeError, BridgeResult};

pub struct TelnetSession {
    stream: Option<TcpStream>,
    parser: TelnetParser,
    negotiator: OptionNegotiator,
    outbound: VecDeque<u8>,
    /// Set once `WILL ECHO` is accepted from the peer — L1's own echo must
    /// be suppressed while this is true (§4.3/§6 echo-sync rule).
    peer_echo_active: bool,
}

impl TelnetSession {
    pub fn new() -> Self {
        Self {
            stream: None,
            parser: TelnetParser::new(),
            negotiator: OptionNegotiator::new(),
            outbound: VecDeque::new(),
            peer_echo_active: false,
        }
    }

    /// Connects to `host:port`, putting the socket into non-blocking mode
    /// immediately so `process_events` can drive the rest of the connect
    /// without blocking the calling thread.
    pub fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> BridgeResult<()> {
        let addr = format!("{}:{}", host, port);
        let mut last_err = None;
        for candidate in std::net::ToSocketAddrs::to_socket_addrs(&addr)? {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true).ok();
                    self.stream = Some(stream);
                    self.parser.reset();
                    self.outbound.clear();
                    log::info!("telnet connected to {}", candidate);
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .map(BridgeError::from)
            .unwrap_or(BridgeError::Timeout("telnet connect")))
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn disconnect(&mut self) {
        self.stream = None;
        self.outbound.clear();
        self.parser.reset();
        self.peer_echo_active = false;
    }

    pub fn peer_echo_active(&self) -> bool {
        self.peer_echo_active
    }

    /// Reads raw bytes off the socket into `raw`. Returns bytes read; `Ok(0)`
    /// means no data right now (`WouldBlock`), not EOF.
    pub fn recv(&mut self, raw: &mut [u8]) -> BridgeResult<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(BridgeError::SerialUnavailable("telnet not connected".into()));
        };
        match stream.read(raw) {
            Ok(0) => Err(BridgeError::ClientDisconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// IAC-decodes `raw`, appending application bytes to `out` and handling
    /// any negotiation sequences found along the way (queues a response via
    /// `queue_write` if one is due).
    pub fn process_input(&mut self, raw: &[u8], out: &mut Vec<u8>) {
        let result = self.parser.parse(raw);
        out.extend(result.data);
        for sequence in result.sequences {
            self.handle_sequence(sequence);
        }
    }

    fn handle_sequence(&mut self, sequence: TelnetSequence) {
        let TelnetSequence::Negotiation { command, option } = sequence else {
            return;
        };
        let side = match command {
            TelnetCommand::WILL | TelnetCommand::WONT => Side::Remote,
            TelnetCommand::DO | TelnetCommand::DONT => Side::Local,
            _ => return,
        };
        let result = match command {
            TelnetCommand::WILL => self.negotiator.handle_will(option),
            TelnetCommand::WONT => self.negotiator.handle_wont(option),
            TelnetCommand::DO => self.negotiator.handle_do(option),
            TelnetCommand::DONT => self.negotiator.handle_dont(option),
            _ => return,
        };

        if side == Side::Remote && option == TelnetOption::ECHO {
            self.peer_echo_active = result.enabled;
        }

        if let Some(response) = result.response {
            self.queue_write(&response.to_bytes());
        }
        if let Some(err) = result.error {
            log::warn!("telnet negotiation error on {:?}: {}", option, err);
        }
    }

    /// IAC-escapes `app` (doubling every 0xFF) into `out`, ready to queue.
    pub fn prepare_output(app: &[u8], out: &mut Vec<u8>) {
        out.extend(escape_iac(app));
    }

    pub fn queue_write(&mut self, bytes: &[u8]) {
        self.outbound.extend(bytes);
    }

    /// Drains as much of the outbound queue into the socket as the kernel
    /// buffer accepts right now.
    pub fn flush_writes(&mut self) -> BridgeResult<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        while !self.outbound.is_empty() {
            let (front, _) = self.outbound.as_slices();
            match stream.write(front) {
                Ok(0) => break,
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Advances nonblocking connect bookkeeping and flushes pending writes.
    /// With `std::net::TcpStream` the connect already completes inside
    /// `connect_timeout`, so this call is primarily the periodic write
    /// flush plus a liveness probe.
    pub fn process_events(&mut self, _timeout_ms: u64) -> BridgeResult<()> {
        self.flush_writes()
    }
}

impl Default for TelnetSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn connect_and_round_trip_application_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).unwrap();
            stream.write_all(&buf[..n]).unwrap();
        });

        let mut session = TelnetSession::new();
        session
            .connect("127.0.0.1", addr.port(), Duration::from_secs(2))
            .unwrap();
        assert!(session.is_connected());

        let mut escaped = Vec::new();
        TelnetSession::prepare_output(b"hi", &mut escaped);
        session.queue_write(&escaped);
        session.flush_writes().unwrap();

        server.join().unwrap();

        let mut raw = [0u8; 16];
        let mut got = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while got.is_empty() && std::time::Instant::now() < deadline {
            let n = session.recv(&mut raw).unwrap();
            if n > 0 {
                let mut out = Vec::new();
                session.process_input(&raw[..n], &mut out);
                got.extend(out);
            }
        }
        assert_eq!(got, b"hi");
    }

    #[test]
    fn accepts_will_echo_and_flags_peer_echo_active() {
        let mut session = TelnetSession::new();
        let mut out = Vec::new();
        session.process_input(&[0xFF, 0xFB, 0x01], &mut out); // IAC WILL ECHO
        assert!(session.peer_echo_active());
        assert!(out.is_empty());
    }

    #[test]
    fn refuses_unrecognized_do_requests_with_wont() {
        let mut session = TelnetSession::new();
        let mut out = Vec::new();
        // IAC DO <some option nobody asked for>
        session.process_input(&[0xFF, 0xFD, 24], &mut out);
        session.flush_writes().ok();
        // No live socket, but the response should still have been queued.
        assert!(!session.outbound.is_empty());
    }
}
