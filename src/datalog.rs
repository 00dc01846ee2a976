//! Append-only data log sink (§4.6, §6 Persisted state).
//!
//! Forensic/debug aid only — never parsed back by the CORE. Each record is
//! `[direction: u8][len: u32 LE][bytes]`; disabled unless
//! `[datalog] enabled = true` in the config file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::Mutex;

use crate::config::DataLogConfig;
use crate::errors::BridgeResult;
use crate::pipeline::Direction;

pub struct DataLog {
    writer: Option<Mutex<BufWriter<File>>>,
}

impl DataLog {
    pub fn new(config: &DataLogConfig) -> BridgeResult<Self> {
        if !config.enabled {
            return Ok(Self { writer: None });
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.file)?;
        Ok(Self {
            writer: Some(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn disabled() -> Self {
        Self { writer: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn record(&self, direction: Direction, bytes: &[u8]) {
        let Some(writer) = &self.writer else {
            return;
        };
        let mut writer = writer.lock().unwrap();
        let tag: u8 = match direction {
            Direction::SerialToTelnet => 0,
            Direction::TelnetToSerial => 1,
        };
        let len = bytes.len() as u32;
        if let Err(e) = writer
            .write_all(&[tag])
            .and_then(|_| writer.write_all(&len.to_le_bytes()))
            .and_then(|_| writer.write_all(bytes))
        {
            log::warn!("data log write failed: {}", e);
        }
    }

    pub fn flush(&self) {
        if let Some(writer) = &self.writer {
            let _ = writer.lock().unwrap().flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn disabled_log_records_nothing() {
        let log = DataLog::disabled();
        log.record(Direction::SerialToTelnet, b"hello");
        assert!(!log.is_enabled());
    }

    #[test]
    fn enabled_log_appends_framed_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        let config = DataLogConfig {
            enabled: true,
            file: path.to_str().unwrap().to_string(),
        };
        let log = DataLog::new(&config).unwrap();
        log.record(Direction::SerialToTelnet, b"ab");
        log.record(Direction::TelnetToSerial, b"xyz");
        log.flush();
        drop(log);

        let mut contents = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(
            contents,
            vec![0u8, 2, 0, 0, 0, b'a', b'b', 1, 3, 0, 0, 0, b'x', b'y', b'z']
        );
    }
}
