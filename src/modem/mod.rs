//! L1 — the serial/modem controller (§4.3).
//!
//! Owns the AT command-mode interpreter, the unsolicited-message classifier,
//! the `+++` escape detector, and the DCD/DTR policy. Does not touch the
//! serial fd directly — `crate::serial::SerialPort` is handed to the caller
//! (`crate::bridge`), which drives reads/writes and calls into `Modem` to
//! interpret them.

pub mod at_parser;
pub mod echo;
pub mod escape;
pub mod result_codes;
pub mod settings;
pub mod timestamp;
pub mod unsolicited;

use std::time::{Duration, Instant};

use at_parser::AtCommand;
pub use result_codes::ModemResultCode;
use settings::{DtrMode, ModemSettings};
use unsolicited::{UnsolicitedClassifier, UnsolicitedMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemState {
    Command,
    Online,
    Connecting,
    Ringing,
    Disconnected,
}

impl ModemState {
    pub fn is_online(self) -> bool {
        matches!(self, ModemState::Online)
    }
}

/// One tick's worth of action the caller (L1's driving loop) must perform in
/// response to something the modem controller decided. Kept as data rather
/// than callbacks so the controller itself never touches the serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemAction {
    WriteToSerial(Vec<u8>),
    SetBaudRate(u32),
    TransitionTo(ModemState),
    DcdRising,
    DcdFalling,
    HangUpRequested,
}

pub struct Modem {
    pub settings: ModemSettings,
    pub state: ModemState,
    classifier: UnsolicitedClassifier,
    escape: escape::EscapeDetector,
    connect_time: Option<Instant>,
    last_timestamp_sent: Option<Instant>,
}

impl Default for Modem {
    fn default() -> Self {
        Self::new(ModemSettings::default())
    }
}

impl Modem {
    pub fn new(settings: ModemSettings) -> Self {
        let escape_char = settings.escape_char();
        Self {
            settings,
            state: ModemState::Command,
            classifier: UnsolicitedClassifier::new(),
            escape: escape::EscapeDetector::new(escape_char),
            connect_time: None,
            last_timestamp_sent: None,
        }
    }

    /// Applies a full init string (`[modem] init_command`, semicolon
    /// separated) at startup.
    pub fn apply_init_string(&mut self, init: &str) -> Vec<ModemAction> {
        let mut actions = Vec::new();
        for segment in init.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            actions.extend(self.process_command_line(segment));
        }
        actions
    }

    /// Processes one complete AT command line (CR-terminated, stripped by
    /// the caller). Returns the formatted response plus any side-effect
    /// actions, as a single write action carrying the response text.
    pub fn process_command_line(&mut self, line: &str) -> Vec<ModemAction> {
        let mut actions = Vec::new();
        let Some(tail) = at_parser::strip_at_prefix(line) else {
            return actions;
        };

        let outcome = at_parser::parse_command_tail(tail);
        for letter in &outcome.unknown {
            log::warn!("unrecognized AT command letter '{}'", letter);
        }

        let mut result = ModemResultCode::Ok;
        let mut dial_requested = false;

        for command in outcome.commands {
            match command {
                AtCommand::Attach => {
                    self.state = ModemState::Connecting;
                    actions.push(ModemAction::TransitionTo(ModemState::Connecting));
                }
                AtCommand::Dial(_) => {
                    // Dial-out is explicitly out of scope (§1 Non-goals).
                    result = ModemResultCode::Error;
                    dial_requested = true;
                }
                AtCommand::Echo(on) => self.settings.echo = on,
                AtCommand::Hook(off_hook) => {
                    if !off_hook {
                        actions.push(ModemAction::HangUpRequested);
                    }
                }
                AtCommand::Info(_) => {}
                AtCommand::SpeakerVolume(_) | AtCommand::SpeakerMode(_) => {}
                AtCommand::GoOnline => {
                    self.state = ModemState::Online;
                    actions.push(ModemAction::TransitionTo(ModemState::Online));
                }
                AtCommand::Quiet(on) => self.settings.quiet = on,
                AtCommand::SetRegister(r, v) => {
                    if r < 256 {
                        self.settings.s_registers[r] = v;
                        if r == settings::S2_ESCAPE_CHAR {
                            self.escape.set_escape_char(v);
                        }
                    }
                }
                AtCommand::QueryRegister(r) => {
                    let value = if r < 256 { self.settings.s_registers[r] } else { 0 };
                    actions.push(ModemAction::WriteToSerial(
                        format!("\r\n{:03}\r\n", value).into_bytes(),
                    ));
                }
                AtCommand::Verbose(on) => self.settings.verbose = on,
                AtCommand::ResultFilter(x) => self.settings.result_mode_x = x,
                AtCommand::Reset => self.settings = ModemSettings::default(),
                AtCommand::DcdMode(mode) => self.settings.dcd_mode = mode,
                AtCommand::DtrMode(mode) => self.settings.dtr_mode = mode,
                AtCommand::FactoryDefaults => self.settings = ModemSettings::default(),
                AtCommand::ViewSettings | AtCommand::WriteProfile(_) | AtCommand::StoreProfile(_) => {}
                AtCommand::Escape(_) => {}
            }
        }

        let _ = dial_requested;
        let filtered = result.apply_x_filter(self.settings.result_mode_x);
        actions.push(ModemAction::WriteToSerial(
            filtered
                .format(self.settings.verbose, self.settings.quiet)
                .into_bytes(),
        ));
        actions
    }

    /// Feeds raw serial bytes to the unsolicited classifier. Only
    /// meaningful in COMMAND/CONNECTING/RINGING states; ONLINE data should
    /// go through `scan_online_for_no_carrier` instead (§4.3).
    pub fn feed_unsolicited(&mut self, data: &[u8], now: Instant) -> Vec<ModemAction> {
        let messages = self.classifier.feed(data, now);
        let mut actions = Vec::new();
        for message in messages {
            actions.extend(self.handle_unsolicited(message, now));
        }
        actions
    }

    fn handle_unsolicited(&mut self, message: UnsolicitedMessage, now: Instant) -> Vec<ModemAction> {
        let mut actions = Vec::new();
        match message {
            UnsolicitedMessage::Ring => {
                self.state = ModemState::Ringing;
                self.settings.set_ring_count(self.settings.ring_count().saturating_add(1));
                let threshold = self.settings.autoanswer_threshold();
                if threshold > 0 && self.settings.ring_count() >= threshold {
                    self.state = ModemState::Connecting;
                    actions.push(ModemAction::TransitionTo(ModemState::Connecting));
                } else if threshold == 0 && self.settings.ring_count() >= 2 {
                    actions.push(ModemAction::WriteToSerial(b"ATA\r\n".to_vec()));
                    self.state = ModemState::Connecting;
                    actions.push(ModemAction::TransitionTo(ModemState::Connecting));
                }
            }
            UnsolicitedMessage::Connect { speed } => {
                if let Some(bps) = speed {
                    actions.push(ModemAction::SetBaudRate(bps));
                }
                self.state = ModemState::Online;
                self.connect_time = Some(now);
                self.last_timestamp_sent = None;
                actions.push(ModemAction::TransitionTo(ModemState::Online));
                actions.push(ModemAction::DcdRising);
            }
            UnsolicitedMessage::NoCarrier => {
                actions.extend(self.immediate_cleanup());
            }
            UnsolicitedMessage::Busy | UnsolicitedMessage::NoDialtone => {
                actions.extend(self.immediate_cleanup());
            }
        }
        actions
    }

    /// Scans ONLINE-mode traffic for `NO CARRIER` only — everything else
    /// passes through untouched (§4.3).
    pub fn scan_online_for_no_carrier(&mut self, data: &[u8], now: Instant) -> Vec<ModemAction> {
        if !self.state.is_online() {
            return Vec::new();
        }
        let messages = self.classifier.feed(data, now);
        let mut actions = Vec::new();
        for message in messages {
            if message == UnsolicitedMessage::NoCarrier {
                actions.extend(self.immediate_cleanup());
            }
        }
        actions
    }

    /// `+++` detection (§4.3). Must be called only while ONLINE, one byte
    /// at a time, from the Hayes filter's pass over serial→telnet traffic.
    pub fn feed_escape_byte(&mut self, byte: u8, now: Instant) -> bool {
        if !self.state.is_online() {
            return false;
        }
        let guard = Duration::from_millis(self.settings.escape_guard_time_ms());
        if self.escape.feed(byte, now, guard) {
            self.state = ModemState::Command;
            true
        } else {
            false
        }
    }

    /// §4.3.4: NO CARRIER or a DCD falling edge while ONLINE/CONNECTING/
    /// RINGING forces an immediate, synchronous cleanup.
    pub fn immediate_cleanup(&mut self) -> Vec<ModemAction> {
        let from = self.state;
        if !matches!(
            from,
            ModemState::Online | ModemState::Connecting | ModemState::Ringing
        ) {
            return Vec::new();
        }
        let to = if from == ModemState::Connecting {
            ModemState::Command
        } else {
            ModemState::Disconnected
        };
        self.state = to;
        self.settings.reset_ring_count();
        self.classifier.reset();
        self.escape.reset();
        self.connect_time = None;

        let mut actions = vec![ModemAction::TransitionTo(to), ModemAction::DcdFalling];
        if matches!(self.settings.dtr_mode, DtrMode::HangUp | DtrMode::Reset) {
            actions.push(ModemAction::HangUpRequested);
        }
        actions
    }

    /// §4.3 DTR/DCD policy: what an observed DTR-off transition should do.
    pub fn on_dtr_off(&mut self) -> Vec<ModemAction> {
        match self.settings.dtr_mode {
            DtrMode::Ignore => Vec::new(),
            DtrMode::ToCommand => {
                self.state = ModemState::Command;
                vec![ModemAction::TransitionTo(ModemState::Command)]
            }
            DtrMode::HangUp => self.immediate_cleanup(),
            DtrMode::Reset => {
                let mut actions = self.immediate_cleanup();
                self.settings = ModemSettings::default();
                actions
            }
        }
    }

    /// Time the link went online, if it's currently online.
    pub fn connected_since(&self) -> Option<Instant> {
        self.connect_time
    }

    /// §4.3 timestamp injector predicate: true at `connect_time + first_delay`
    /// and every `interval` thereafter.
    pub fn should_send_timestamp(
        &mut self,
        now: Instant,
        first_delay: Duration,
        interval: Duration,
    ) -> bool {
        let Some(connect_time) = self.connect_time else {
            return false;
        };
        let due = match self.last_timestamp_sent {
            None => connect_time + first_delay,
            Some(last) => last + interval,
        };
        if now >= due {
            self.last_timestamp_sent = Some(now);
            true
        } else {
            false
        }
    }
}
