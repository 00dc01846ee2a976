use std::fmt;

use crate::modem::ModemResultCode;
use crate::pipeline::SystemState;

/// Errors raised while parsing the INI-style configuration file.
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String, String),
    UnknownKey(String),
    UnknownSection(String),
    Io(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(key, value) => {
                write!(f, "invalid value '{}' for key '{}'", value, key)
            }
            ConfigError::UnknownKey(key) => write!(f, "unknown configuration key: '{}'", key),
            ConfigError::UnknownSection(section) => write!(f, "unknown section: '{}'", section),
            ConfigError::Io(err) => write!(f, "I/O error reading config: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

/// Crate-wide error taxonomy threading through every CORE `Result` boundary.
///
/// Follows the propagation policy of the specification's error-handling design:
/// local recovery (retry, mode flip, force-switch) happens first, inside L1/L2/L3;
/// a `BridgeError` only surfaces when local recovery would itself violate an
/// invariant (e.g. the serial port cannot be reopened).
#[derive(Debug)]
pub enum BridgeError {
    /// Raw I/O failure on a file descriptor or socket.
    Io(std::io::Error),
    /// Configuration could not be loaded or parsed.
    Config(ConfigError),
    /// The serial port is not currently open/usable (closed, locked, never opened).
    SerialUnavailable(String),
    /// The modem reported a protocol-level failure (BUSY, NO ANSWER, NO DIALTONE, ERROR).
    ModemProtocol(ModemResultCode),
    /// An L3 system-state transition was requested that §4.5.1 does not permit.
    InvalidTransition {
        from: SystemState,
        to: SystemState,
    },
    /// A bounded wait (AT response, bounded write, state deadline) expired.
    Timeout(&'static str),
    /// The telnet peer, or the caller, disconnected.
    ClientDisconnected,
    /// A caller asked for something programmer-detectable and wrong (bad argument,
    /// operation invalid in the current state). Never retried.
    InvalidArgument(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Io(err) => write!(f, "I/O error: {}", err),
            BridgeError::Config(err) => write!(f, "configuration error: {}", err),
            BridgeError::SerialUnavailable(msg) => write!(f, "serial port unavailable: {}", msg),
            BridgeError::ModemProtocol(code) => write!(f, "modem result: {:?}", code),
            BridgeError::InvalidTransition { from, to } => {
                write!(f, "invalid system state transition: {:?} -> {:?}", from, to)
            }
            BridgeError::Timeout(scope) => write!(f, "timeout waiting for {}", scope),
            BridgeError::ClientDisconnected => write!(f, "peer disconnected"),
            BridgeError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Io(err) => Some(err),
            BridgeError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                BridgeError::ClientDisconnected
            }
            _ => BridgeError::Io(err),
        }
    }
}

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        BridgeError::Config(err)
    }
}

impl From<serialport::Error> for BridgeError {
    fn from(err: serialport::Error) -> Self {
        BridgeError::SerialUnavailable(err.to_string())
    }
}

/// Result type alias used throughout the bridge.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_kinds_convert_to_client_disconnected() {
        for kind in [
            std::io::ErrorKind::UnexpectedEof,
            std::io::ErrorKind::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted,
        ] {
            let err: BridgeError = std::io::Error::from(kind).into();
            assert!(matches!(err, BridgeError::ClientDisconnected));
        }
    }

    #[test]
    fn other_io_error_kinds_convert_to_io() {
        let err: BridgeError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(matches!(err, BridgeError::Io(_)));
    }

    #[test]
    fn config_error_wraps_into_bridge_error() {
        let err: BridgeError = ConfigError::UnknownSection("bogus".into()).into();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
