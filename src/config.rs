use crate::errors::ConfigError;

use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    RtsCts,
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
    pub flow_control: FlowControl,
}

#[derive(Debug, Clone)]
pub struct TelnetConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoAnswerMode {
    /// Software counts RING lines and issues ATA itself after 2 rings.
    Software,
    /// Hardware auto-answers once S0 rings have been counted.
    Hardware,
}

#[derive(Debug, Clone)]
pub struct ModemInitConfig {
    pub init_command: String,
    pub autoanswer_mode: AutoAnswerMode,
    pub autoanswer_software_command: String,
    pub autoanswer_hardware_command: String,
}

#[derive(Debug, Clone)]
pub struct EchoConfig {
    pub enabled: bool,
    pub immediate: bool,
    pub first_delay_ms: u64,
    pub min_interval_ms: u64,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct TimestampConfig {
    pub enabled: bool,
    pub first_delay_secs: u64,
    pub interval_secs: u64,
    pub prefix: String,
    pub suffix: String,
}

#[derive(Debug, Clone)]
pub struct DataLogConfig {
    pub enabled: bool,
    pub file: String,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub pid_file: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub quantum_ms: u64,
    pub latency_bound_ms: u64,
    pub starvation_threshold_ms: u64,
}

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub size_bytes: usize,
    pub min_bytes: usize,
    pub max_bytes: usize,
}

/// Parsed once at startup from the INI file named in the external-interfaces
/// section; every field has a usable default so a missing file is not fatal.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub serial: SerialConfig,
    pub telnet: TelnetConfig,
    pub modem: ModemInitConfig,
    pub echo: EchoConfig,
    pub timestamp: TimestampConfig,
    pub datalog: DataLogConfig,
    pub daemon: DaemonConfig,
    pub scheduler: SchedulerConfig,
    pub buffers: BufferConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig {
                port: "/dev/ttyS0".to_string(),
                baudrate: 9600,
                flow_control: FlowControl::None,
            },
            telnet: TelnetConfig {
                host: "localhost".to_string(),
                port: 23,
                connect_timeout_ms: 5000,
            },
            modem: ModemInitConfig {
                init_command: "ATZ;E1;Q0;V1;&C1;&D2".to_string(),
                autoanswer_mode: AutoAnswerMode::Software,
                autoanswer_software_command: "ATS0=0".to_string(),
                autoanswer_hardware_command: "ATS0=1".to_string(),
            },
            echo: EchoConfig {
                enabled: false,
                immediate: true,
                first_delay_ms: 0,
                min_interval_ms: 0,
                prefix: String::new(),
            },
            timestamp: TimestampConfig {
                enabled: false,
                first_delay_secs: 300,
                interval_secs: 300,
                prefix: "TIME".to_string(),
                suffix: String::new(),
            },
            datalog: DataLogConfig {
                enabled: false,
                file: "modembridge.log.bin".to_string(),
            },
            daemon: DaemonConfig {
                pid_file: "/var/run/modembridge.pid".to_string(),
            },
            scheduler: SchedulerConfig {
                quantum_ms: 50,
                latency_bound_ms: 100,
                starvation_threshold_ms: 500,
            },
            buffers: BufferConfig {
                size_bytes: 8192,
                min_bytes: 2048,
                max_bytes: 65536,
            },
        }
    }
}

impl BridgeConfig {
    /// Load from `path`, falling back to (and writing out) the documented
    /// default if the file does not exist yet — this is a deliberate operator
    /// convenience, not a CORE requirement.
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse_config(&content),
            Err(_) => {
                let config = Self::default();
                if let Err(e) = fs::write(path, config.to_config_file_format()) {
                    log::warn!("could not write default config to {}: {}", path, e);
                }
                Ok(config)
            }
        }
    }

    /// Re-parse `path` in place; used by the SIGHUP reload path. Returns the
    /// freshly parsed config without touching the file on disk.
    pub fn reload_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_config(&content)
    }

    fn parse_config(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut section = String::new();

        for raw_line in content.lines() {
            let line = raw_line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].to_string();
                continue;
            }

            let Some(eq_pos) = line.find('=') else {
                continue;
            };
            let key = line[..eq_pos].trim();
            let value = line[eq_pos + 1..].trim().trim_matches('"');

            match section.as_str() {
                "serial" => config.parse_serial(key, value)?,
                "telnet" => config.parse_telnet(key, value)?,
                "modem" => config.parse_modem(key, value)?,
                "echo" => config.parse_echo(key, value)?,
                "timestamp" => config.parse_timestamp(key, value)?,
                "datalog" => config.parse_datalog(key, value)?,
                "daemon" => config.parse_daemon(key, value)?,
                "scheduler" => config.parse_scheduler(key, value)?,
                "buffers" => config.parse_buffers(key, value)?,
                _ => return Err(ConfigError::UnknownSection(section.clone())),
            }
        }

        Ok(config)
    }

    fn parse_serial(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "port" => self.serial.port = value.to_string(),
            "baudrate" => self.serial.baudrate = parse_value(key, value)?,
            "flow_control" => {
                self.serial.flow_control = match value {
                    "none" => FlowControl::None,
                    "rtscts" => FlowControl::RtsCts,
                    _ => return Err(invalid(key, value)),
                };
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn parse_telnet(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "host" => self.telnet.host = value.to_string(),
            "port" => self.telnet.port = parse_value(key, value)?,
            "connect_timeout_ms" => self.telnet.connect_timeout_ms = parse_value(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn parse_modem(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "init_command" => self.modem.init_command = value.to_string(),
            "autoanswer_mode" => {
                self.modem.autoanswer_mode = match value {
                    "0" => AutoAnswerMode::Software,
                    "1" => AutoAnswerMode::Hardware,
                    _ => return Err(invalid(key, value)),
                };
            }
            "autoanswer_software_command" => {
                self.modem.autoanswer_software_command = value.to_string()
            }
            "autoanswer_hardware_command" => {
                self.modem.autoanswer_hardware_command = value.to_string()
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn parse_echo(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "enabled" => self.echo.enabled = parse_value(key, value)?,
            "immediate" => self.echo.immediate = parse_value(key, value)?,
            "first_delay_ms" => self.echo.first_delay_ms = parse_value(key, value)?,
            "min_interval_ms" => self.echo.min_interval_ms = parse_value(key, value)?,
            "prefix" => self.echo.prefix = value.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn parse_timestamp(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "enabled" => self.timestamp.enabled = parse_value(key, value)?,
            "first_delay_secs" => self.timestamp.first_delay_secs = parse_value(key, value)?,
            "interval_secs" => self.timestamp.interval_secs = parse_value(key, value)?,
            "prefix" => self.timestamp.prefix = value.to_string(),
            "suffix" => self.timestamp.suffix = value.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn parse_datalog(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "enabled" => self.datalog.enabled = parse_value(key, value)?,
            "file" => self.datalog.file = value.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn parse_daemon(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "pid_file" => self.daemon.pid_file = value.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn parse_scheduler(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "quantum_ms" => self.scheduler.quantum_ms = parse_value(key, value)?,
            "latency_bound_ms" => self.scheduler.latency_bound_ms = parse_value(key, value)?,
            "starvation_threshold_ms" => {
                self.scheduler.starvation_threshold_ms = parse_value(key, value)?
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn parse_buffers(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "size_bytes" => self.buffers.size_bytes = parse_value(key, value)?,
            "min_bytes" => self.buffers.min_bytes = parse_value(key, value)?,
            "max_bytes" => self.buffers.max_bytes = parse_value(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Low-speed links (≤2400 bps) get doubled latency bounds per §4.5.4.
    pub fn latency_bound_ms(&self) -> u64 {
        if self.serial.baudrate <= 2400 {
            self.scheduler.latency_bound_ms * 2
        } else {
            self.scheduler.latency_bound_ms
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.telnet.connect_timeout_ms)
    }

    fn to_config_file_format(&self) -> String {
        format!(
            r#"# modembridge configuration file
# Lines starting with # or ; are comments.

[serial]
port = "{}"
baudrate = {}
flow_control = "{}"

[telnet]
host = "{}"
port = {}
connect_timeout_ms = {}

[modem]
init_command = "{}"
autoanswer_mode = {}
autoanswer_software_command = "{}"
autoanswer_hardware_command = "{}"

[echo]
enabled = {}
immediate = {}
first_delay_ms = {}
min_interval_ms = {}
prefix = "{}"

[timestamp]
enabled = {}
first_delay_secs = {}
interval_secs = {}
prefix = "{}"
suffix = "{}"

[datalog]
enabled = {}
file = "{}"

[daemon]
pid_file = "{}"

[scheduler]
quantum_ms = {}
latency_bound_ms = {}
starvation_threshold_ms = {}

[buffers]
size_bytes = {}
min_bytes = {}
max_bytes = {}
"#,
            self.serial.port,
            self.serial.baudrate,
            match self.serial.flow_control {
                FlowControl::None => "none",
                FlowControl::RtsCts => "rtscts",
            },
            self.telnet.host,
            self.telnet.port,
            self.telnet.connect_timeout_ms,
            self.modem.init_command,
            match self.modem.autoanswer_mode {
                AutoAnswerMode::Software => 0,
                AutoAnswerMode::Hardware => 1,
            },
            self.modem.autoanswer_software_command,
            self.modem.autoanswer_hardware_command,
            self.echo.enabled,
            self.echo.immediate,
            self.echo.first_delay_ms,
            self.echo.min_interval_ms,
            self.echo.prefix,
            self.timestamp.enabled,
            self.timestamp.first_delay_secs,
            self.timestamp.interval_secs,
            self.timestamp.prefix,
            self.timestamp.suffix,
            self.datalog.enabled,
            self.datalog.file,
            self.daemon.pid_file,
            self.scheduler.quantum_ms,
            self.scheduler.latency_bound_ms,
            self.scheduler.starvation_threshold_ms,
            self.buffers.size_bytes,
            self.buffers.min_bytes,
            self.buffers.max_bytes,
        )
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue(key.to_string(), value.to_string())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_the_file_format() {
        let original = BridgeConfig::default();
        let reparsed = BridgeConfig::parse_config(&original.to_config_file_format()).unwrap();
        assert_eq!(original.serial.port, reparsed.serial.port);
        assert_eq!(original.serial.baudrate, reparsed.serial.baudrate);
        assert_eq!(original.telnet.host, reparsed.telnet.host);
        assert_eq!(original.telnet.port, reparsed.telnet.port);
        assert_eq!(
            original.scheduler.quantum_ms,
            reparsed.scheduler.quantum_ms
        );
        assert_eq!(original.buffers.size_bytes, reparsed.buffers.size_bytes);
    }

    #[test]
    fn unknown_section_is_reported() {
        let err = BridgeConfig::parse_config("[bogus]\nfoo = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSection(s) if s == "bogus"));
    }

    #[test]
    fn unknown_key_is_reported() {
        let err = BridgeConfig::parse_config("[serial]\nfoo = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(s) if s == "foo"));
    }

    #[test]
    fn invalid_value_is_reported() {
        let err = BridgeConfig::parse_config("[serial]\nbaudrate = fast\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(k, v) if k == "baudrate" && v == "fast"));
    }

    #[test]
    fn low_speed_links_double_the_latency_bound() {
        let mut config = BridgeConfig::default();
        config.serial.baudrate = 2400;
        config.scheduler.latency_bound_ms = 100;
        assert_eq!(config.latency_bound_ms(), 200);
        config.serial.baudrate = 9600;
        assert_eq!(config.latency_bound_ms(), 100);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.conf");
        let config = BridgeConfig::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.serial.baudrate, BridgeConfig::default().serial.baudrate);
        assert!(path.exists(), "default config should be written back out");
    }
}
