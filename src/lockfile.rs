//! UUCP-style device lock file and the daemon PID file (§6, §3 SerialPort
//! lifecycle: "acquire UUCP-style lock → open → configure termios → use →
//! drop lock on release"). Both are thin RAII wrappers, not CORE state
//! machines — `SerialPort::open` holds a `LockFile` for its own lifetime and
//! the release happens automatically on `Drop`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{BridgeError, BridgeResult};

const DEFAULT_LOCK_DIR: &str = "/var/lock";

pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Acquire `/var/lock/LCK..<tty basename>`, the conventional UUCP lock
    /// location (§6 Persisted state).
    pub fn acquire(tty_path: &str) -> BridgeResult<Self> {
        Self::acquire_in(Path::new(DEFAULT_LOCK_DIR), tty_path)
    }

    pub fn acquire_in(dir: &Path, tty_path: &str) -> BridgeResult<Self> {
        let name = Path::new(tty_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| tty_path.to_string());
        let path = dir.join(format!("LCK..{}", name));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{:>10}", std::process::id())?;
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(
                BridgeError::SerialUnavailable(format!(
                    "lock file {} already exists",
                    path.display()
                )),
            ),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn create(path: &str) -> BridgeResult<Self> {
        fs::write(path, format!("{}\n", std::process::id()))?;
        Ok(Self {
            path: PathBuf::from(path),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to remove pid file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquiring_twice_fails_until_the_first_guard_drops() {
        let dir = tempfile::tempdir().unwrap();
        let first = LockFile::acquire_in(dir.path(), "/dev/ttyS0").unwrap();
        let err = LockFile::acquire_in(dir.path(), "/dev/ttyS0").unwrap_err();
        assert!(matches!(err, BridgeError::SerialUnavailable(_)));
        drop(first);
        assert!(LockFile::acquire_in(dir.path(), "/dev/ttyS0").is_ok());
    }

    #[test]
    fn lock_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("LCK..ttyS0");
        {
            let _lock = LockFile::acquire_in(dir.path(), "/dev/ttyS0").unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn pid_file_writes_current_pid_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modembridge.pid");
        {
            let _pid = PidFile::create(path.to_str().unwrap()).unwrap();
            let content = fs::read_to_string(&path).unwrap();
            assert_eq!(content.trim(), std::process::id().to_string());
        }
        assert!(!path.exists());
    }
}
