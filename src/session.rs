//! Acquisition sessions.
//!
//! An [`AcquisitionSession`] owns one board id, one channel-name mapping and
//! one sample buffer. Between [`AcquisitionSession::start`] and
//! [`AcquisitionSession::stop`] the session holds the open board handle and a
//! dedicated worker thread reads through it, appending one row per sampling
//! interval. Only `stop` (or a failed `start`) closes the handle, so the board
//! stays exclusive to the session even after the worker has given up.
//!
//! ```text
//! Idle --start--> Running --stop--> Stopped --start--> Running --stop--> ...
//! ```
//!
//! ## Threading
//!
//! ```text
//!   caller thread                       worker thread ("daq-board-<id>")
//!   ─────────────                       ───────────────────────────────
//!   start() ── open board ──spawn──▶    loop while running:
//!                                          read_scan(channels)
//!   snapshot() ◀── Mutex<Vec<Row>> ◀──     push Row
//!                                          park until next tick
//!   stop() ── running=false, unpark ──▶ exit
//!          ◀───────── join ─────────────
//!          close board
//! ```
//!
//! The worker is the only writer. Readers copy the buffer under the same
//! short-lived lock, so a snapshot always contains whole rows.
//!
//! ## Restart
//!
//! A successful `start` clears the buffer; timestamps of the new run are
//! measured from the new start.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::DaqConfig;
use crate::data::table::{Row, Table};
use crate::error::{AppResult, DaqError};
use crate::hardware::{BoardDriver, BoardHandle};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Constructed, never started
    Idle,
    /// Worker is sampling
    Running,
    /// Stopped at least once, not running
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Counters for the current (or last) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Rows in the buffer
    pub rows: usize,
    /// Completed sampling cycles
    pub cycles: u64,
    /// Failed reads (the worker stops on the first one)
    pub read_errors: u64,
    /// Sampling ticks missed because a read cycle overran the interval
    pub overruns: u64,
}

/// State shared between the session and its worker.
#[derive(Default)]
struct Shared {
    buffer: Mutex<Vec<Row>>,
    board: Mutex<Option<Box<dyn BoardHandle>>>,
    running: AtomicBool,
    fault: Mutex<Option<String>>,
    cycles: AtomicU64,
    read_errors: AtomicU64,
    overruns: AtomicU64,
}

impl Shared {
    fn reset(&self) {
        self.buffer.lock().clear();
        *self.fault.lock() = None;
        self.cycles.store(0, Ordering::SeqCst);
        self.read_errors.store(0, Ordering::SeqCst);
        self.overruns.store(0, Ordering::SeqCst);
    }

    fn record_fault(&self, message: String) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(message);
        }
    }
}

/// Continuous sampling of named channels on one board.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeMap;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use mccdaq::hardware::mock::MockDriver;
/// use mccdaq::{AcquisitionSession, SessionState};
///
/// let channels = BTreeMap::from([(0, "ch0".to_string()), (1, "ch1".to_string())]);
/// let mut session = AcquisitionSession::new(
///     0,
///     channels,
///     Arc::new(MockDriver::default()),
///     Duration::from_millis(5),
/// )?;
///
/// session.start()?;
/// std::thread::sleep(Duration::from_millis(50));
/// session.stop()?;
///
/// let table = session.snapshot();
/// assert_eq!(table.columns(), ["ch0", "ch1"]);
/// assert_eq!(session.state(), SessionState::Stopped);
/// # Ok::<(), mccdaq::DaqError>(())
/// ```
pub struct AcquisitionSession {
    board_id: u32,
    channels: BTreeMap<u32, String>,
    indices: Vec<u32>,
    columns: Vec<String>,
    sample_interval: Duration,
    driver: Arc<dyn BoardDriver>,
    state: SessionState,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl AcquisitionSession {
    /// Create an idle session.
    ///
    /// The board is not opened here; it only has to exist at `start`.
    ///
    /// # Errors
    ///
    /// - [`DaqError::InvalidChannelMap`] if `channels` is empty, or a name is
    ///   blank or used twice.
    /// - [`DaqError::Configuration`] if `sample_interval` is zero.
    pub fn new(
        board_id: u32,
        channels: BTreeMap<u32, String>,
        driver: Arc<dyn BoardDriver>,
        sample_interval: Duration,
    ) -> AppResult<Self> {
        validate_channels(&channels)?;
        if sample_interval.is_zero() {
            return Err(DaqError::Configuration(
                "sample interval must be greater than zero".to_string(),
            ));
        }

        let indices: Vec<u32> = channels.keys().copied().collect();
        let columns: Vec<String> = channels.values().cloned().collect();

        info!(
            board_id,
            driver = driver.name(),
            n_channels = indices.len(),
            interval_us = sample_interval.as_micros() as u64,
            "Created acquisition session"
        );

        Ok(Self {
            board_id,
            channels,
            indices,
            columns,
            sample_interval,
            driver,
            state: SessionState::Idle,
            shared: Arc::new(Shared::default()),
            worker: None,
        })
    }

    /// Create a session from loaded configuration.
    ///
    /// When `board.device_name` is set, the board id is resolved through the
    /// driver's inventory.
    pub fn from_config(config: &DaqConfig, driver: Arc<dyn BoardDriver>) -> AppResult<Self> {
        config.validate()?;
        let board_id = match &config.board.device_name {
            Some(name) => {
                let id = driver.find_board(name)?;
                info!(device = %name, board_id = id, "Found device");
                id
            }
            None => config.board.board_id,
        };
        Self::new(board_id, config.channel_map()?, driver, config.sample_interval())
    }

    /// Open the board and begin sampling in the background.
    ///
    /// Clears the rows of any previous run.
    ///
    /// # Errors
    ///
    /// - [`DaqError::InvalidState`] if already running.
    /// - [`DaqError::DeviceUnavailable`] if the board cannot be opened. The
    ///   state and buffer are left untouched.
    pub fn start(&mut self) -> AppResult<()> {
        if self.state == SessionState::Running {
            return Err(DaqError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        let handle = self.driver.open(self.board_id)?;
        debug!(board_id = self.board_id, "Board opened");

        self.shared.reset();
        *self.shared.board.lock() = Some(handle);
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let indices = self.indices.clone();
        let interval = self.sample_interval;
        let board_id = self.board_id;
        let spawned = thread::Builder::new()
            .name(format!("daq-board-{board_id}"))
            .spawn(move || sample_loop(board_id, &indices, interval, &shared));

        match spawned {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                if let Err(close_err) = self.release_board() {
                    warn!(board_id, error = %close_err, "Error closing board after failed spawn");
                }
                return Err(e.into());
            }
        }

        self.state = SessionState::Running;
        info!(
            board_id = self.board_id,
            channels = ?self.columns,
            "Started acquisition"
        );
        Ok(())
    }

    /// Halt sampling and release the board.
    ///
    /// No rows are appended after this returns. The state is `Stopped` even
    /// when an error is returned.
    ///
    /// # Errors
    ///
    /// - [`DaqError::InvalidState`] if not running.
    /// - The board's close error, if closing the handle failed.
    /// - [`DaqError::Driver`] if the worker panicked.
    pub fn stop(&mut self) -> AppResult<()> {
        if self.state != SessionState::Running {
            return Err(DaqError::InvalidState {
                operation: "stop",
                state: self.state,
            });
        }

        self.shared.running.store(false, Ordering::SeqCst);
        let joined = match self.worker.take() {
            Some(worker) => {
                worker.thread().unpark();
                worker.join()
            }
            None => Ok(()),
        };
        let closed = self.release_board();
        self.state = SessionState::Stopped;

        let stats = self.stats();
        info!(
            board_id = self.board_id,
            rows = stats.rows,
            read_errors = stats.read_errors,
            overruns = stats.overruns,
            "Stopped acquisition"
        );

        if let Err(e) = &closed {
            error!(board_id = self.board_id, error = %e, "Error closing board");
        }
        if joined.is_err() {
            error!(board_id = self.board_id, "Sampling worker panicked");
            return Err(DaqError::Driver("sampling worker panicked".to_string()));
        }
        closed
    }

    fn release_board(&self) -> AppResult<()> {
        let handle = self.shared.board.lock().take();
        match handle {
            Some(handle) => {
                let result = handle.close();
                debug!(board_id = self.board_id, ok = result.is_ok(), "Board closed");
                result
            }
            None => Ok(()),
        }
    }

    /// Copy of the rows captured so far.
    pub fn snapshot(&self) -> Table {
        Table::new(self.columns.clone(), self.shared.buffer.lock().clone())
    }

    /// A cloneable reader that can take snapshots from other threads.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            columns: Arc::new(self.columns.clone()),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while the session is `Running`.
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Board this session samples.
    pub fn board_id(&self) -> u32 {
        self.board_id
    }

    /// Channel index to name mapping.
    pub fn channels(&self) -> &BTreeMap<u32, String> {
        &self.channels
    }

    /// Time between sampling cycles.
    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Error that ended the worker early, if any.
    ///
    /// A read failure stops sampling but leaves the session `Running` with the
    /// board still held; the caller still has to call
    /// [`AcquisitionSession::stop`].
    pub fn fault(&self) -> Option<String> {
        self.shared.fault.lock().clone()
    }

    /// Counters for the current or last run.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            rows: self.shared.buffer.lock().len(),
            cycles: self.shared.cycles.load(Ordering::SeqCst),
            read_errors: self.shared.read_errors.load(Ordering::SeqCst),
            overruns: self.shared.overruns.load(Ordering::SeqCst),
        }
    }
}

impl fmt::Debug for AcquisitionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionSession")
            .field("board_id", &self.board_id)
            .field("channels", &self.channels)
            .field("sample_interval", &self.sample_interval)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for AcquisitionSession {
    fn drop(&mut self) {
        if self.state == SessionState::Running {
            if let Err(e) = self.stop() {
                error!("Error stopping session on drop: {}", e);
            }
        }
    }
}

/// Takes snapshots of a session's buffer from any thread.
#[derive(Clone)]
pub struct SnapshotReader {
    columns: Arc<Vec<String>>,
    shared: Arc<Shared>,
}

impl SnapshotReader {
    /// Copy of the rows captured so far.
    pub fn snapshot(&self) -> Table {
        Table::new(self.columns.to_vec(), self.shared.buffer.lock().clone())
    }

    /// Number of rows captured so far.
    pub fn len(&self) -> usize {
        self.shared.buffer.lock().len()
    }

    /// True if nothing has been captured yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_channels(channels: &BTreeMap<u32, String>) -> AppResult<()> {
    if channels.is_empty() {
        return Err(DaqError::InvalidChannelMap(
            "at least one channel is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for (index, name) in channels {
        if name.trim().is_empty() {
            return Err(DaqError::InvalidChannelMap(format!(
                "channel {index} has a blank name"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(DaqError::InvalidChannelMap(format!(
                "duplicate channel name '{name}'"
            )));
        }
    }
    Ok(())
}

/// Worker body. Reads through the session's board slot; never closes it.
fn sample_loop(board_id: u32, channels: &[u32], interval: Duration, shared: &Shared) {
    let epoch = Instant::now();
    let mut next_tick = epoch;
    let mut overrun_reported = false;

    while shared.running.load(Ordering::SeqCst) {
        let elapsed = epoch.elapsed();
        let scan = match shared.board.lock().as_mut() {
            Some(handle) => handle.read_scan(channels),
            None => break,
        };
        match scan {
            Ok(values) => {
                shared.buffer.lock().push(Row { elapsed, values });
                shared.cycles.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                error!(board_id, error = %e, "Read failed, sampling halted");
                shared.read_errors.fetch_add(1, Ordering::SeqCst);
                shared.record_fault(e.to_string());
                break;
            }
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick < now {
            // Behind schedule: every tick up to now is lost, resume from now.
            let late = (now - next_tick).as_nanos() / interval.as_nanos();
            let missed = u64::try_from(late).unwrap_or(u64::MAX).saturating_add(1);
            shared.overruns.fetch_add(missed, Ordering::SeqCst);
            if !overrun_reported {
                warn!(board_id, missed, "Sampling overrun, reads slower than the interval");
                overrun_reported = true;
            }
            next_tick = now;
            continue;
        }
        while shared.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= next_tick {
                break;
            }
            thread::park_timeout(next_tick - now);
        }
    }

    debug!(board_id, "Sampling worker exiting");
}
