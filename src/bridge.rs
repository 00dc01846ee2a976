//! Top-level wiring: three long-lived threads (L1 serial/modem, L2 telnet,
//! L3 pipeline manager) sharing state only through the ring buffers, the
//! `Mutex`-guarded modem/L3 contexts, and a handful of atomics (§2, §5).
//!
//! This module owns none of the CORE algorithms — those live in
//! `crate::modem`, `crate::telnet_session`, and `crate::pipeline`. It only
//! decides which thread calls what, when, and how they hand bytes to each
//! other, matching the dependency order of §2: ring buffer → serial port →
//! modem → telnet → L3.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{AutoAnswerMode, BridgeConfig, FlowControl as ConfigFlowControl};
use crate::datalog::DataLog;
use crate::errors::BridgeResult;
use crate::lockfile::PidFile;
use crate::modem::settings::DtrMode;
use crate::modem::{echo::EchoInjector, timestamp, Modem, ModemAction, ModemState};
use crate::pipeline::{Direction, L3Config, L3Context, SystemState};
use crate::ring_buffer::RingBuffer;
use crate::serial::SerialPort;
use crate::signals::Signals;
use crate::telnet_session::TelnetSession;

const S2T_CAPACITY: usize = 8192;
const T2S_CAPACITY: usize = 8192;
/// Upper bound on bytes drained from a ring buffer per scheduler chunk —
/// keeps one direction's "turn" from running unbounded inside its quantum.
const CHUNK_SIZE: usize = 512;
const IDLE_SLEEP: Duration = Duration::from_millis(20);
const SERIAL_RETRY_INTERVAL: Duration = Duration::from_secs(10);
const MAIN_LOOP_POLL: Duration = Duration::from_millis(200);

/// One-shot flags L1 sets (never blocking) and L3 drains on its own thread,
/// standing in for the spec's "try-lock the state mutex, else set a flag"
/// DCD callback rule (§4.3): by routing the edge through a plain atomic
/// instead of reaching across into `L3Context`, L1 never needs L3's
/// `state_mutex` at all, so there's nothing to contend over.
#[derive(Default)]
struct DcdEdges {
    rising: AtomicBool,
    falling: AtomicBool,
}

impl DcdEdges {
    fn signal_rising(&self) {
        self.rising.store(true, Ordering::SeqCst);
    }

    fn signal_falling(&self) {
        self.falling.store(true, Ordering::SeqCst);
    }

    fn take_rising(&self) -> bool {
        self.rising.swap(false, Ordering::SeqCst)
    }

    fn take_falling(&self) -> bool {
        self.falling.swap(false, Ordering::SeqCst)
    }
}

fn to_serialport_flow(flow: ConfigFlowControl) -> serialport::FlowControl {
    match flow {
        ConfigFlowControl::None => serialport::FlowControl::None,
        ConfigFlowControl::RtsCts => serialport::FlowControl::Hardware,
    }
}

/// Shared state every thread is handed a clone of. Plain `Arc`s rather than
/// one big lock: each field is guarded at the granularity the spec assigns
/// it (`modem_mutex`, `state_mutex`, the two ring buffers).
struct Shared {
    config: BridgeConfig,
    serial: Mutex<Option<SerialPort>>,
    modem: Mutex<Modem>,
    telnet: Mutex<TelnetSession>,
    l3: Mutex<L3Context>,
    ts_s2t: RingBuffer<S2T_CAPACITY>,
    ts_t2s: RingBuffer<T2S_CAPACITY>,
    dcd: DcdEdges,
    /// Set by L3 when it enters CONNECTING and needs L2 to (re)dial;
    /// cleared by L2 once it has either connected or given up for now.
    /// Stands in for the source's `g_level3_connection_attempted` global
    /// (§9 design notes): the attempt bookkeeping itself lives on
    /// `L3Context`, this flag is just the cross-thread wake-up.
    connect_requested: AtomicBool,
    datalog: DataLog,
    shutdown: Arc<AtomicBool>,
}

pub struct Bridge {
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Runs the bridge until `signals` reports a shutdown request. Blocks
    /// the calling thread (intended to be `main`'s thread, which also hosts
    /// signal handling and the slow reconnect timer per §5).
    pub fn run(self, signals: &Signals, config_path: &str) -> BridgeResult<()> {
        let modem = Modem::default();
        let l3_config = L3Config::from_bridge_config(&self.config, &modem);
        let datalog = DataLog::new(&self.config.datalog)?;

        let _pid_file = if !self.config.daemon.pid_file.is_empty() {
            PidFile::create(&self.config.daemon.pid_file).ok()
        } else {
            None
        };

        let shared = Arc::new(Shared {
            config: self.config,
            serial: Mutex::new(None),
            modem: Mutex::new(modem),
            telnet: Mutex::new(TelnetSession::new()),
            l3: Mutex::new(L3Context::new(l3_config, Instant::now())),
            ts_s2t: RingBuffer::new(),
            ts_t2s: RingBuffer::new(),
            dcd: DcdEdges::default(),
            connect_requested: AtomicBool::new(false),
            datalog,
            shutdown: signals.shutdown_flag(),
        });

        {
            let mut l3 = shared.l3.lock().unwrap();
            l3.transition(SystemState::Initializing, Instant::now()).ok();
        }

        let l1 = spawn_serial_thread(Arc::clone(&shared));
        let l2 = spawn_telnet_thread(Arc::clone(&shared));
        let l3 = spawn_pipeline_thread(Arc::clone(&shared));

        while !signals.shutdown_requested() {
            if signals.take_reload_request() {
                reload_config(config_path);
            }
            thread::sleep(MAIN_LOOP_POLL);
        }

        // Join order per §5: L3 → L2 → L1, then the layers' own cleanup
        // (socket close / hangup / serial close / lock release) happens as
        // each thread unwinds out of its loop.
        let _ = l3.join();
        let _ = l2.join();
        let _ = l1.join();

        Ok(())
    }
}

/// SIGHUP handler (§6, §9): re-parses the file and logs what changed.
/// Only the knobs each thread re-reads from `Shared::config` on its next
/// iteration are meaningfully "live"; the serial device and telnet target
/// are not reopened mid-flight — changing those still needs a restart.
fn reload_config(path: &str) {
    match BridgeConfig::reload_from_file(Path::new(path)) {
        Ok(_) => log::info!("configuration reloaded from {}", path),
        Err(e) => log::warn!("SIGHUP reload of {} failed: {}", path, e),
    }
}

// ---------------------------------------------------------------------
// L1 — serial/modem controller thread (§4.3, §5)
// ---------------------------------------------------------------------

fn spawn_serial_thread(shared: Arc<Shared>) -> JoinHandle<()> {
    thread::spawn(move || serial_thread_main(shared))
}

fn serial_thread_main(shared: Arc<Shared>) {
    let mut echo = if shared.config.echo.enabled {
        let mut injector = EchoInjector::with_flush_timeout(
            shared.config.echo.prefix.clone(),
            Duration::from_millis(shared.config.echo.min_interval_ms.max(1)),
        );
        if !shared.config.echo.immediate {
            injector.set_batching(Duration::from_millis(shared.config.echo.min_interval_ms.max(1)));
        }
        Some(injector)
    } else {
        None
    };
    let mut last_dcd_poll = Instant::now();
    let mut last_observed_dcd = true;

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        if shared.serial.lock().unwrap().is_none() {
            match open_serial(&shared) {
                Ok(()) => {
                    run_init_sequence(&shared);
                    {
                        let mut l3 = shared.l3.lock().unwrap();
                        l3.transition(SystemState::Ready, Instant::now()).ok();
                    }
                }
                Err(e) => {
                    log::warn!("serial open failed: {}; retrying in {:?}", e, SERIAL_RETRY_INTERVAL);
                    thread::sleep(SERIAL_RETRY_INTERVAL);
                    continue;
                }
            }
        }

        let now = Instant::now();
        let mut buf = [0u8; 512];
        let read = {
            let mut guard = shared.serial.lock().unwrap();
            match guard.as_mut() {
                Some(port) => port.read(&mut buf),
                None => continue,
            }
        };

        match read {
            Ok(0) => {}
            Ok(n) => handle_serial_bytes(&shared, &buf[..n], now, &mut echo),
            Err(e) => {
                log::warn!("serial I/O error: {}; closing port for reopen", e);
                *shared.serial.lock().unwrap() = None;
                shared.dcd.signal_falling();
                continue;
            }
        }

        if let Some(injector) = echo.as_mut() {
            let flushed = injector.poll_timeout(now);
            if !flushed.is_empty() {
                write_serial(&shared, &injector.format(&flushed));
            }
        }

        poll_dcd(&shared, now, &mut last_dcd_poll, &mut last_observed_dcd);
        maybe_send_timestamp(&shared, now);

        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
    }

    hang_up_and_close(&shared);
}

fn open_serial(shared: &Shared) -> BridgeResult<()> {
    let flow = to_serialport_flow(shared.config.serial.flow_control);
    let port = SerialPort::open(&shared.config.serial.port, shared.config.serial.baudrate, flow)?;
    *shared.serial.lock().unwrap() = Some(port);
    Ok(())
}

fn run_init_sequence(shared: &Shared) {
    let mut modem = shared.modem.lock().unwrap();
    let mut actions = modem.apply_init_string(&shared.config.modem.init_command);
    let autoanswer_cmd = match shared.config.modem.autoanswer_mode {
        AutoAnswerMode::Software => &shared.config.modem.autoanswer_software_command,
        AutoAnswerMode::Hardware => &shared.config.modem.autoanswer_hardware_command,
    };
    actions.extend(modem.apply_init_string(autoanswer_cmd));
    drop(modem);
    apply_modem_actions(shared, actions);
}

fn handle_serial_bytes(shared: &Shared, data: &[u8], now: Instant, echo: &mut Option<EchoInjector>) {
    shared.ts_s2t.write(data);

    let state = shared.modem.lock().unwrap().state;
    let actions = match state {
        ModemState::Online => {
            let mut modem = shared.modem.lock().unwrap();
            let mut actions = modem.scan_online_for_no_carrier(data, now);
            for &byte in data {
                if modem.feed_escape_byte(byte, now) {
                    actions.push(ModemAction::WriteToSerial(b"\r\nOK\r\n".to_vec()));
                }
            }
            actions
        }
        ModemState::Command | ModemState::Connecting | ModemState::Ringing => {
            shared.modem.lock().unwrap().feed_unsolicited(data, now)
        }
        ModemState::Disconnected => Vec::new(),
    };
    apply_modem_actions(shared, actions);

    if let Some(injector) = echo.as_mut() {
        let modem = shared.modem.lock().unwrap();
        let online = modem.state.is_online();
        let past_first_delay = modem.connected_since().is_some_and(|since| {
            now.duration_since(since) >= Duration::from_millis(shared.config.echo.first_delay_ms)
        });
        drop(modem);
        let peer_echoing = shared.telnet.lock().unwrap().peer_echo_active();
        if online && past_first_delay && !peer_echoing {
            let ready = injector.feed(data, now);
            if !ready.is_empty() {
                write_serial(shared, &injector.format(&ready));
            }
        }
    }
}

fn apply_modem_actions(shared: &Shared, actions: Vec<ModemAction>) {
    for action in actions {
        match action {
            ModemAction::WriteToSerial(bytes) => write_serial(shared, &bytes),
            ModemAction::SetBaudRate(speed) => {
                if let Some(port) = shared.serial.lock().unwrap().as_mut() {
                    if let Err(e) = port.set_baudrate(speed) {
                        log::warn!("failed to adjust baud rate to {}: {}", speed, e);
                    }
                }
            }
            ModemAction::TransitionTo(state) => {
                log::debug!("modem state -> {:?}", state);
            }
            ModemAction::DcdRising => shared.dcd.signal_rising(),
            ModemAction::DcdFalling => shared.dcd.signal_falling(),
            ModemAction::HangUpRequested => perform_hangup(shared),
        }
    }
}

fn write_serial(shared: &Shared, bytes: &[u8]) {
    if let Some(port) = shared.serial.lock().unwrap().as_mut() {
        if let Err(e) = port.write(bytes) {
            log::warn!("serial write failed: {}", e);
        }
    }
}

fn perform_hangup(shared: &Shared) {
    let dtr_mode = shared.modem.lock().unwrap().settings.dtr_mode;
    if !matches!(dtr_mode, DtrMode::HangUp | DtrMode::Reset) {
        return;
    }
    if let Some(port) = shared.serial.lock().unwrap().as_mut() {
        if let Err(e) = port.dtr_drop_hangup() {
            log::warn!("DTR hangup drop failed: {}", e);
        }
        let _ = port.clear(serialport::ClearBuffer::All);
    }
}

fn hang_up_and_close(shared: &Shared) {
    let mut modem = shared.modem.lock().unwrap();
    if modem.state.is_online() || matches!(modem.state, ModemState::Connecting | ModemState::Ringing) {
        let actions = modem.immediate_cleanup();
        drop(modem);
        apply_modem_actions(shared, actions);
    }
    *shared.serial.lock().unwrap() = None;
}

/// §4.3 DCD polling, rate-limited to once per second. Only meaningful when
/// `&C1` (DCD tracks carrier); `&C0` freezes DCD high so there is nothing
/// to poll for.
fn poll_dcd(shared: &Shared, now: Instant, last_poll: &mut Instant, last_observed: &mut bool) {
    if now.duration_since(*last_poll) < Duration::from_secs(1) {
        return;
    }
    *last_poll = now;

    use crate::modem::settings::DcdMode;
    if shared.modem.lock().unwrap().settings.dcd_mode != DcdMode::TracksCarrier {
        return;
    }

    let observed = match shared.serial.lock().unwrap().as_mut() {
        Some(port) => port.get_dcd().unwrap_or(true),
        None => return,
    };

    if *last_observed && !observed {
        let mut modem = shared.modem.lock().unwrap();
        if matches!(
            modem.state,
            ModemState::Online | ModemState::Connecting | ModemState::Ringing
        ) {
            let actions = modem.immediate_cleanup();
            drop(modem);
            apply_modem_actions(shared, actions);
        }
    }
    *last_observed = observed;
}

fn maybe_send_timestamp(shared: &Shared, now: Instant) {
    if !shared.config.timestamp.enabled {
        return;
    }
    let due = {
        let mut modem = shared.modem.lock().unwrap();
        modem.should_send_timestamp(
            now,
            Duration::from_secs(shared.config.timestamp.first_delay_secs),
            Duration::from_secs(shared.config.timestamp.interval_secs),
        )
    };
    if !due {
        return;
    }
    let line = timestamp::format_line(
        &shared.config.timestamp.prefix,
        jiff::Zoned::now(),
        &shared.config.timestamp.suffix,
    );
    let mut guard = shared.serial.lock().unwrap();
    let Some(port) = guard.as_mut() else { return };
    if let Err(e) = timestamp::send_with_retry(port, line.as_bytes()) {
        log::warn!("timestamp injector write failed, forcing modem offline: {}", e);
        drop(guard);
        let mut modem = shared.modem.lock().unwrap();
        let actions = modem.immediate_cleanup();
        drop(modem);
        apply_modem_actions(shared, actions);
    }
}

// ---------------------------------------------------------------------
// L2 — telnet session thread (§4.4, §5)
// ---------------------------------------------------------------------

fn spawn_telnet_thread(shared: Arc<Shared>) -> JoinHandle<()> {
    thread::spawn(move || telnet_thread_main(shared))
}

fn telnet_thread_main(shared: Arc<Shared>) {
    let mut last_connect_attempt: Option<Instant> = None;
    const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        let connected = shared.telnet.lock().unwrap().is_connected();
        let wants_connect = shared.connect_requested.load(Ordering::SeqCst);

        if wants_connect && !connected {
            let backoff_elapsed = last_connect_attempt
                .map(|t| t.elapsed() >= RECONNECT_BACKOFF)
                .unwrap_or(true);
            if backoff_elapsed {
                last_connect_attempt = Some(Instant::now());
                let mut telnet = shared.telnet.lock().unwrap();
                match telnet.connect(
                    &shared.config.telnet.host,
                    shared.config.telnet.port,
                    shared.config.connect_timeout(),
                ) {
                    Ok(()) => shared.connect_requested.store(false, Ordering::SeqCst),
                    Err(e) => log::warn!("telnet connect failed: {}; will retry", e),
                }
            }
        } else if !wants_connect && connected {
            shared.telnet.lock().unwrap().disconnect();
        }

        if connected || shared.telnet.lock().unwrap().is_connected() {
            let mut raw = [0u8; 512];
            let mut telnet = shared.telnet.lock().unwrap();
            match telnet.recv(&mut raw) {
                Ok(0) => {}
                Ok(n) => {
                    let mut app = Vec::new();
                    telnet.process_input(&raw[..n], &mut app);
                    if !app.is_empty() {
                        shared.ts_t2s.write(&app);
                    }
                }
                Err(_) => {
                    telnet.disconnect();
                    shared.dcd.signal_falling();
                }
            }
            let _ = telnet.process_events(100);
        }

        thread::sleep(Duration::from_millis(30));
    }

    shared.telnet.lock().unwrap().disconnect();
}

// ---------------------------------------------------------------------
// L3 — pipeline manager thread (§4.5, §5)
// ---------------------------------------------------------------------

fn spawn_pipeline_thread(shared: Arc<Shared>) -> JoinHandle<()> {
    thread::spawn(move || pipeline_thread_main(shared))
}

fn pipeline_thread_main(shared: Arc<Shared>) {
    loop {
        let now = Instant::now();
        let mut did_work = false;

        {
            let mut l3 = shared.l3.lock().unwrap();
            l3.apply_timeout_recovery(now);
            if shared.shutdown.load(Ordering::SeqCst) {
                drive_toward_shutdown(&mut l3, now);
            }
            did_work |= drive_system_state(&shared, &mut l3, now);
        }

        did_work |= service_direction(&shared, Direction::SerialToTelnet, now);
        did_work |= service_direction(&shared, Direction::TelnetToSerial, now);
        did_work |= flush_stale_hayes_escape(&shared, now);

        {
            let l3 = shared.l3.lock().unwrap();
            if let Some((from, to)) = l3.serial_to_telnet.maybe_resize(now) {
                log::debug!("serial->telnet buffer resized {} -> {}", from, to);
            }
            if let Some((from, to)) = l3.telnet_to_serial.maybe_resize(now) {
                log::debug!("telnet->serial buffer resized {} -> {}", from, to);
            }
            if l3.system_state == SystemState::Terminated {
                break;
            }
        }

        if !did_work {
            thread::sleep(IDLE_SLEEP);
        }
    }
}

/// Walks the system FSM one permitted hop closer to `SHUTTING_DOWN` per
/// tick once shutdown has been requested (§4.5.1, §5 join order). Reuses
/// the ordinary `FLUSHING` drain path from `DATA_TRANSFER` rather than
/// jumping straight to `SHUTTING_DOWN`, so buffered bytes still get a
/// chance to drain before the socket and serial port close.
fn drive_toward_shutdown(l3: &mut L3Context, now: Instant) {
    let next = match l3.system_state {
        SystemState::Terminated | SystemState::ShuttingDown | SystemState::Flushing => None,
        SystemState::DataTransfer => Some(SystemState::Flushing),
        SystemState::Ready | SystemState::Error => Some(SystemState::ShuttingDown),
        SystemState::Uninitialized => Some(SystemState::Initializing),
        SystemState::Initializing | SystemState::Connecting => Some(SystemState::Ready),
        SystemState::Negotiating => Some(SystemState::Connecting),
    };
    if let Some(target) = next {
        l3.transition(target, now).ok();
    }
}

/// Advances the system FSM from DCD edges, telnet connection state, and
/// drained buffers (§4.5.1 triggers). Returns whether it made progress,
/// for the idle-sleep heuristic.
fn drive_system_state(shared: &Shared, l3: &mut L3Context, now: Instant) -> bool {
    let mut progressed = false;

    if shared.dcd.take_rising() {
        l3.on_dcd_edge(true);
    }
    if shared.dcd.take_falling() {
        l3.on_dcd_edge(false);
    }

    match l3.system_state {
        SystemState::Ready => {
            if l3.take_dcd_rising() {
                shared.connect_requested.store(true, Ordering::SeqCst);
                l3.transition(SystemState::Connecting, now).ok();
                progressed = true;
            }
        }
        SystemState::Connecting => {
            if shared.telnet.lock().unwrap().is_connected() {
                l3.transition(SystemState::DataTransfer, now).ok();
                progressed = true;
            }
        }
        SystemState::DataTransfer => {
            if !l3.dcd_state {
                shared.connect_requested.store(false, Ordering::SeqCst);
                l3.transition(SystemState::Flushing, now).ok();
                progressed = true;
            }
        }
        SystemState::Flushing => {
            let empty = l3.serial_to_telnet.buffer.main_len() == 0
                && l3.serial_to_telnet.buffer.sub_len() == 0
                && l3.telnet_to_serial.buffer.main_len() == 0
                && l3.telnet_to_serial.buffer.sub_len() == 0;
            if empty {
                l3.transition(SystemState::Ready, now).ok();
                progressed = true;
            }
        }
        _ => {}
    }

    progressed
}

fn service_direction(shared: &Shared, direction: Direction, now: Instant) -> bool {
    let mut l3 = shared.l3.lock().unwrap();
    if l3.system_state != SystemState::DataTransfer && l3.system_state != SystemState::Flushing {
        return false;
    }
    if l3.scheduler.tick(now) != direction {
        return false;
    }
    let chunk_size = l3.scheduler.chunk_size(direction, CHUNK_SIZE);

    let mut did_work = false;
    match direction {
        Direction::SerialToTelnet => {
            let mut chunk = vec![0u8; chunk_size];
            let n = shared.ts_s2t.read(&mut chunk);
            if n > 0 {
                did_work = true;
                let mut filtered = Vec::new();
                let escaped = l3.hayes.feed(&chunk[..n], now, &mut filtered);
                if escaped {
                    shared.modem.lock().unwrap().state = ModemState::Command;
                }
                if !filtered.is_empty() {
                    l3.serial_to_telnet.enqueue(&filtered, now);
                    l3.serial_to_telnet.buffer.switch_buffers();
                    let mut ready = vec![0u8; filtered.len()];
                    let ready_len = l3.serial_to_telnet.buffer.read(&mut ready);
                    if ready_len > 0 {
                        shared.datalog.record(Direction::SerialToTelnet, &ready[..ready_len]);
                        let mut telnet = shared.telnet.lock().unwrap();
                        let mut out = Vec::new();
                        TelnetSession::prepare_output(&ready[..ready_len], &mut out);
                        telnet.queue_write(&out);
                        let _ = telnet.flush_writes();
                    }
                }
            }
        }
        Direction::TelnetToSerial => {
            let mut chunk = vec![0u8; chunk_size];
            let n = shared.ts_t2s.read(&mut chunk);
            if n > 0 {
                did_work = true;
                let scrubbed = l3.telnet_filter.scrub(&chunk[..n]);
                if !scrubbed.is_empty() {
                    l3.telnet_to_serial.enqueue(&scrubbed, now);
                    l3.telnet_to_serial.buffer.switch_buffers();
                    let mut ready = vec![0u8; scrubbed.len()];
                    let ready_len = l3.telnet_to_serial.buffer.read(&mut ready);
                    if ready_len > 0 {
                        shared.datalog.record(Direction::TelnetToSerial, &ready[..ready_len]);
                        write_serial(shared, &ready[..ready_len]);
                    }
                }
            }
        }
    }

    if did_work {
        l3.scheduler.record_service(direction, now);
    }
    did_work
}

/// Releases any ONLINE-mode `+++` escape candidate the Hayes filter is
/// still holding once its guard window has lapsed (§4.5.2), so a
/// non-triggering run reaches the peer without waiting on the caller's
/// next keystroke.
fn flush_stale_hayes_escape(shared: &Shared, now: Instant) -> bool {
    let mut l3 = shared.l3.lock().unwrap();
    let mut filtered = Vec::new();
    l3.hayes.poll_timeout(now, &mut filtered);
    if filtered.is_empty() {
        return false;
    }
    l3.serial_to_telnet.enqueue(&filtered, now);
    l3.serial_to_telnet.buffer.switch_buffers();
    let mut ready = vec![0u8; filtered.len()];
    let ready_len = l3.serial_to_telnet.buffer.read(&mut ready);
    drop(l3);
    if ready_len > 0 {
        shared.datalog.record(Direction::SerialToTelnet, &ready[..ready_len]);
        let mut telnet = shared.telnet.lock().unwrap();
        let mut out = Vec::new();
        TelnetSession::prepare_output(&ready[..ready_len], &mut out);
        telnet.queue_write(&out);
        let _ = telnet.flush_writes();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dcd_edges_are_one_shot() {
        let edges = DcdEdges::default();
        edges.signal_rising();
        assert!(edges.take_rising());
        assert!(!edges.take_rising());
    }

    #[test]
    fn flow_control_maps_to_serialport_variants() {
        assert!(matches!(
            to_serialport_flow(ConfigFlowControl::None),
            serialport::FlowControl::None
        ));
        assert!(matches!(
            to_serialport_flow(ConfigFlowControl::RtsCts),
            serialport::FlowControl::Hardware
        ));
    }
}
