//! Sysfs attribute gateway
//!
//! Low-level read/write of scalar attributes exposed by the kernel.
//!
//! # Failure classes
//!
//! - **Transient** (EINTR-class, EAGAIN/EBUSY/ENODEV while a device settles
//!   after hotplug): retried up to a small fixed bound within the same call.
//! - **Permanent** (missing attribute, permission, malformed content,
//!   timeout): returned immediately so the caller can count it.
//!
//! A read that outlives the timeout keeps its helper thread. At most one
//! such reader exists per attribute; until it finishes, further reads of
//! that attribute time out at once.
//!
//! Temperatures are exchanged in milli-degrees Celsius as integers.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::SystemConfig;
use crate::constants::io as io_const;
use crate::error::{Result, ThermalError};

/// Access to kernel-exposed attribute files
///
/// Every sensor goes through this trait; tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
pub trait SysfsIo: Send + Sync {
    /// Read an integer attribute
    fn read_int(&self, path: &Path) -> Result<i64>;

    /// Read a text attribute, trimmed
    fn read_text(&self, path: &Path) -> Result<String>;

    /// Write an integer attribute
    fn write_int(&self, path: &Path, value: i64) -> Result<()>;

    /// Whether an attribute (or the symlink standing for it) exists
    ///
    /// The answer may be up to `max_age` old.
    fn probe(&self, path: &Path, max_age: Duration) -> bool;
}

/// Production gateway over the real filesystem
pub struct SysfsGateway {
    retries: u32,
    retry_delay: Duration,
    read_timeout: Option<Duration>,
    probe_cache: Mutex<HashMap<PathBuf, (bool, Instant)>>,
    /// Readers that exceeded the timeout and are still blocked
    stuck: Mutex<HashMap<PathBuf, Receiver<Result<String>>>>,
}

impl SysfsGateway {
    pub fn new() -> Self {
        Self {
            retries: io_const::DEFAULT_READ_RETRIES,
            retry_delay: io_const::RETRY_DELAY,
            read_timeout: Some(Duration::from_millis(io_const::DEFAULT_READ_TIMEOUT_MS)),
            probe_cache: Mutex::new(HashMap::new()),
            stuck: Mutex::new(HashMap::new()),
        }
    }

    /// Gateway tuned from the loaded configuration
    pub fn from_config(config: &SystemConfig) -> Self {
        Self::new()
            .with_retries(config.read_retries)
            .with_read_timeout(config.read_timeout)
    }

    /// Total attempts for a transient failure (at least one)
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Bound on a single read; `None` reads inline
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Drop all cached presence answers
    pub fn invalidate_probes(&self) {
        self.probe_cache.lock().clear();
    }

    fn with_retry<T>(&self, path: &Path, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_transient() && attempt < self.retries => {
                    trace!(
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "Transient sysfs failure, retrying"
                    );
                    attempt += 1;
                    if !self.retry_delay.is_zero() {
                        thread::sleep(self.retry_delay);
                    }
                }
                other => return other,
            }
        }
    }

    fn read_once(&self, path: &Path) -> Result<String> {
        let Some(limit) = self.read_timeout else {
            return read_attr(path);
        };
        let timeout = || ThermalError::Timeout {
            path: path.to_path_buf(),
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        };

        // A late answer from the stuck reader is the freshest value there is
        let mut stuck = self.stuck.lock();
        if let Some(rx) = stuck.get(path) {
            match rx.try_recv() {
                Err(TryRecvError::Empty) => return Err(timeout()),
                Ok(result) => {
                    stuck.remove(path);
                    debug!(path = %path.display(), "Stuck attribute read completed");
                    return result;
                }
                Err(TryRecvError::Disconnected) => {
                    stuck.remove(path);
                }
            }
        }
        drop(stuck);

        let (tx, rx) = mpsc::channel();
        let owned = path.to_path_buf();
        thread::Builder::new()
            .name("sysfs-read".into())
            .spawn(move || {
                let _ = tx.send(read_attr(&owned));
            })
            .map_err(|e| ThermalError::from_io(path, e))?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                debug!(path = %path.display(), "Attribute read exceeded {:?}", limit);
                self.stuck.lock().insert(path.to_path_buf(), rx);
                Err(timeout())
            }
            Err(RecvTimeoutError::Disconnected) => Err(ThermalError::Transient {
                path: path.to_path_buf(),
                reason: "reader thread exited".into(),
            }),
        }
    }

    /// Number of attributes with a reader still blocked past the timeout
    #[cfg(test)]
    fn stuck_reads(&self) -> usize {
        self.stuck.lock().len()
    }
}

impl Default for SysfsGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsIo for SysfsGateway {
    fn read_int(&self, path: &Path) -> Result<i64> {
        let text = self.read_text(path)?;
        parse_int(path, &text)
    }

    fn read_text(&self, path: &Path) -> Result<String> {
        self.with_retry(path, || self.read_once(path))
            .map(|s| s.trim().to_string())
    }

    fn write_int(&self, path: &Path, value: i64) -> Result<()> {
        self.with_retry(path, || {
            fs::write(path, value.to_string()).map_err(|e| match ThermalError::from_io(path, e) {
                ThermalError::Io(e) => ThermalError::Write {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                },
                other => other,
            })
        })
    }

    fn probe(&self, path: &Path, max_age: Duration) -> bool {
        let now = Instant::now();
        let mut cache = self.probe_cache.lock();
        if let Some(&(present, at)) = cache.get(path) {
            if now.duration_since(at) < max_age {
                return present;
            }
        }
        let present = path.symlink_metadata().is_ok();
        cache.insert(path.to_path_buf(), (present, now));
        present
    }
}

fn read_attr(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| ThermalError::from_io(path, e))?;
    let mut content = String::new();
    file.take(io_const::MAX_ATTR_LEN as u64)
        .read_to_string(&mut content)
        .map_err(|e| ThermalError::from_io(path, e))?;
    Ok(content)
}

/// Parse a trimmed integer attribute value
pub fn parse_int(path: &Path, text: &str) -> Result<i64> {
    let trimmed = text.trim();
    trimmed.parse::<i64>().map_err(|_| ThermalError::Malformed {
        path: path.to_path_buf(),
        content: trimmed.chars().take(64).collect(),
    })
}
