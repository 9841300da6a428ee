//! Mock Hardware Implementations
//!
//! Provides a simulated board driver for testing without physical hardware.
//!
//! # Behaviour
//!
//! - Each channel produces `offset + amplitude * sin(2πft + phase) + noise`,
//!   clamped to the ±10 V input range. The phase is offset by π/4 per channel
//!   so channels are distinguishable.
//! - Noise comes from a seeded ChaCha RNG, so runs are reproducible when a
//!   seed is given.
//! - The driver keeps a registry of open boards; a second `open` of the same
//!   board fails until the first handle is closed or dropped.
//! - Boards can be marked unavailable, and reads can be made to fail after a
//!   number of successful reads. Closing can be made to fail, and every read
//!   can be given a fixed conversion latency.

use std::collections::HashSet;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::{BoardDriver, BoardHandle, DeviceDescriptor};
use crate::error::{AppResult, DaqError};

/// Input range of the simulated boards, in volts.
pub const INPUT_RANGE_VOLTS: f64 = 10.0;

/// Description of one simulated board.
#[derive(Debug, Clone)]
pub struct MockBoardSpec {
    /// Board number
    pub board_id: u32,
    /// Product name reported by the inventory
    pub product_name: String,
    /// Unique id reported by the inventory
    pub unique_id: String,
    /// Vendor product id
    pub product_id: u32,
    /// Number of analog input channels
    pub n_channels: u32,
}

impl MockBoardSpec {
    /// A board with the given id and number of channels.
    pub fn new(board_id: u32, product_name: impl Into<String>, n_channels: u32) -> Self {
        Self {
            board_id,
            product_name: product_name.into(),
            unique_id: format!("00:80:2F:00:00:{board_id:02X}"),
            product_id: 0x12F,
            n_channels,
        }
    }

    /// An E-1608 with 8 single-ended inputs.
    pub fn e1608(board_id: u32) -> Self {
        Self {
            board_id,
            product_name: "E-1608-394C95".to_string(),
            unique_id: "00:80:2F:39:4C:95".to_string(),
            product_id: 0x12F,
            n_channels: 8,
        }
    }

    fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            board_id: self.board_id,
            product_name: self.product_name.clone(),
            unique_id: self.unique_id.clone(),
            product_id: self.product_id,
        }
    }
}

/// Signal generated on every channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waveform {
    /// DC offset in volts
    pub offset: f64,
    /// Peak amplitude in volts
    pub amplitude: f64,
    /// Frequency in Hz
    pub frequency_hz: f64,
    /// Peak uniform noise in volts
    pub noise: f64,
}

impl Default for Waveform {
    fn default() -> Self {
        Self {
            offset: 0.0,
            amplitude: 1.0,
            frequency_hz: 5.0,
            noise: 0.01,
        }
    }
}

impl Waveform {
    /// A constant level with no noise.
    pub fn constant(volts: f64) -> Self {
        Self {
            offset: volts,
            amplitude: 0.0,
            frequency_hz: 0.0,
            noise: 0.0,
        }
    }

    fn sample(&self, t_secs: f64, channel: u32, noise: f64) -> f64 {
        let phase = f64::from(channel) * PI / 4.0;
        let v = self.offset
            + self.amplitude * (2.0 * PI * self.frequency_hz * t_secs + phase).sin()
            + self.noise * noise;
        v.clamp(-INPUT_RANGE_VOLTS, INPUT_RANGE_VOLTS)
    }
}

struct MockInner {
    boards: Vec<MockBoardSpec>,
    unavailable: Mutex<HashSet<u32>>,
    open: Mutex<HashSet<u32>>,
    waveform: Waveform,
    seed: Option<u64>,
    fail_reads_after: Option<u64>,
    fail_close: bool,
    read_latency: Duration,
    opens: AtomicU64,
    closes: AtomicU64,
    reads: AtomicU64,
}

impl MockInner {
    fn release(&self, board_id: u32) {
        self.open.lock().remove(&board_id);
        self.closes.fetch_add(1, Ordering::SeqCst);
        debug!(board_id, "MockDriver: board closed");
    }
}

/// Simulated board driver.
///
/// Cloning is cheap and clones share the board registry and counters.
///
/// # Example
///
/// ```rust
/// use mccdaq::hardware::mock::{MockBoardSpec, MockDriver};
/// use mccdaq::hardware::BoardDriver;
///
/// let driver = MockDriver::builder()
///     .board(MockBoardSpec::e1608(0))
///     .seed(7)
///     .build();
/// let mut handle = driver.open(0)?;
/// let volts = handle.read_channel(0)?;
/// assert!(volts.abs() <= 10.0);
/// handle.close()?;
/// # Ok::<(), mccdaq::DaqError>(())
/// ```
#[derive(Clone)]
pub struct MockDriver {
    inner: Arc<MockInner>,
}

impl MockDriver {
    /// Start building a driver.
    pub fn builder() -> MockDriverBuilder {
        MockDriverBuilder::default()
    }

    /// Mark a board reachable or unreachable.
    pub fn set_available(&self, board_id: u32, available: bool) {
        let mut unavailable = self.inner.unavailable.lock();
        if available {
            unavailable.remove(&board_id);
        } else {
            unavailable.insert(board_id);
        }
    }

    /// Whether a board is currently held by a handle.
    pub fn is_open(&self, board_id: u32) -> bool {
        self.inner.open.lock().contains(&board_id)
    }

    /// Successful opens so far.
    pub fn opens(&self) -> u64 {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Handles released so far (closed or dropped).
    pub fn closes(&self) -> u64 {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Channel reads attempted so far.
    pub fn reads(&self) -> u64 {
        self.inner.reads.load(Ordering::SeqCst)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::builder().board(MockBoardSpec::e1608(0)).build()
    }
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDriver")
            .field("boards", &self.inner.boards.len())
            .field("opens", &self.opens())
            .field("closes", &self.closes())
            .finish()
    }
}

impl BoardDriver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn inventory(&self) -> AppResult<Vec<DeviceDescriptor>> {
        let unavailable = self.inner.unavailable.lock();
        Ok(self
            .inner
            .boards
            .iter()
            .filter(|b| !unavailable.contains(&b.board_id))
            .map(MockBoardSpec::descriptor)
            .collect())
    }

    fn open(&self, board_id: u32) -> AppResult<Box<dyn BoardHandle>> {
        let spec = self
            .inner
            .boards
            .iter()
            .find(|b| b.board_id == board_id)
            .ok_or_else(|| DaqError::unavailable(board_id, "no such board"))?;

        if self.inner.unavailable.lock().contains(&board_id) {
            return Err(DaqError::unavailable(board_id, "board not reachable"));
        }

        if !self.inner.open.lock().insert(board_id) {
            return Err(DaqError::unavailable(board_id, "board already open"));
        }
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        let rng = match self.inner.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed ^ u64::from(board_id)),
            None => ChaCha8Rng::from_entropy(),
        };

        info!(board_id, product = %spec.product_name, "MockDriver: board opened");

        Ok(Box::new(MockHandle {
            inner: Arc::clone(&self.inner),
            board_id,
            n_channels: spec.n_channels,
            rng,
            epoch: Instant::now(),
            released: false,
        }))
    }
}

/// Builder for [`MockDriver`].
#[derive(Debug, Default)]
pub struct MockDriverBuilder {
    boards: Vec<MockBoardSpec>,
    unavailable: HashSet<u32>,
    waveform: Waveform,
    seed: Option<u64>,
    fail_reads_after: Option<u64>,
    fail_close: bool,
    read_latency: Duration,
}

impl MockDriverBuilder {
    /// Add a board.
    pub fn board(mut self, spec: MockBoardSpec) -> Self {
        self.boards.push(spec);
        self
    }

    /// Start with the board present in the inventory but unreachable.
    pub fn unavailable(mut self, board_id: u32) -> Self {
        self.unavailable.insert(board_id);
        self
    }

    /// Signal produced on every channel.
    pub fn waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    /// Seed for the noise generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fail every read after `n` successful reads (counted across handles).
    pub fn fail_reads_after(mut self, n: u64) -> Self {
        self.fail_reads_after = Some(n);
        self
    }

    /// Make every `close` fail. The board is still released.
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Delay every channel read by `latency`.
    pub fn read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Build the driver.
    pub fn build(self) -> MockDriver {
        MockDriver {
            inner: Arc::new(MockInner {
                boards: self.boards,
                unavailable: Mutex::new(self.unavailable),
                open: Mutex::new(HashSet::new()),
                waveform: self.waveform,
                seed: self.seed,
                fail_reads_after: self.fail_reads_after,
                fail_close: self.fail_close,
                read_latency: self.read_latency,
                opens: AtomicU64::new(0),
                closes: AtomicU64::new(0),
                reads: AtomicU64::new(0),
            }),
        }
    }
}

/// Open simulated board.
struct MockHandle {
    inner: Arc<MockInner>,
    board_id: u32,
    n_channels: u32,
    rng: ChaCha8Rng,
    epoch: Instant,
    released: bool,
}

impl BoardHandle for MockHandle {
    fn board_id(&self) -> u32 {
        self.board_id
    }

    fn read_channel(&mut self, channel: u32) -> AppResult<f64> {
        if channel >= self.n_channels {
            return Err(DaqError::Driver(format!(
                "channel {channel} out of range: board {} has {} channels",
                self.board_id, self.n_channels
            )));
        }

        let count = self.inner.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.inner.fail_reads_after {
            if count >= limit {
                return Err(DaqError::Driver(format!(
                    "injected read failure on board {} after {limit} reads",
                    self.board_id
                )));
            }
        }

        if !self.inner.read_latency.is_zero() {
            thread::sleep(self.inner.read_latency);
        }

        let t = self.epoch.elapsed().as_secs_f64();
        let noise: f64 = self.rng.gen_range(-1.0..=1.0);
        Ok(self.inner.waveform.sample(t, channel, noise))
    }

    fn close(mut self: Box<Self>) -> AppResult<()> {
        self.released = true;
        self.inner.release(self.board_id);
        if self.inner.fail_close {
            return Err(DaqError::Driver(format!(
                "injected close failure on board {}",
                self.board_id
            )));
        }
        Ok(())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if !self.released {
            self.inner.release(self.board_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> MockDriver {
        MockDriver::builder()
            .board(MockBoardSpec::e1608(0))
            .board(MockBoardSpec::new(1, "USB-1208FS", 4))
            .seed(42)
            .build()
    }

    #[test]
    fn open_is_exclusive_until_closed() {
        let driver = driver();
        let handle = driver.open(0).unwrap();
        assert!(driver.is_open(0));

        let second = driver.open(0);
        assert!(matches!(second, Err(DaqError::DeviceUnavailable { board_id: 0, .. })));

        handle.close().unwrap();
        assert!(!driver.is_open(0));
        assert!(driver.open(0).is_ok());
    }

    #[test]
    fn dropped_handle_releases_board() {
        let driver = driver();
        {
            let _handle = driver.open(1).unwrap();
            assert!(driver.is_open(1));
        }
        assert!(!driver.is_open(1));
        assert_eq!(driver.opens(), 1);
        assert_eq!(driver.closes(), 1);
    }

    #[test]
    fn unknown_and_unreachable_boards_are_unavailable() {
        let driver = driver();
        assert!(matches!(driver.open(9), Err(DaqError::DeviceUnavailable { .. })));

        driver.set_available(1, false);
        assert!(matches!(driver.open(1), Err(DaqError::DeviceUnavailable { .. })));
        assert_eq!(driver.inventory().unwrap().len(), 1);

        driver.set_available(1, true);
        assert!(driver.open(1).is_ok());
    }

    #[test]
    fn reads_stay_in_range_and_reject_bad_channels() {
        let driver = MockDriver::builder()
            .board(MockBoardSpec::new(0, "sim", 2))
            .waveform(Waveform {
                offset: 9.5,
                amplitude: 2.0,
                frequency_hz: 50.0,
                noise: 0.5,
            })
            .seed(1)
            .build();
        let mut handle = driver.open(0).unwrap();
        for _ in 0..100 {
            let v = handle.read_channel(1).unwrap();
            assert!((-INPUT_RANGE_VOLTS..=INPUT_RANGE_VOLTS).contains(&v));
        }
        assert!(matches!(handle.read_channel(2), Err(DaqError::Driver(_))));
    }

    #[test]
    fn constant_waveform_reads_exact_value() {
        let driver = MockDriver::builder()
            .board(MockBoardSpec::new(0, "sim", 3))
            .waveform(Waveform::constant(1.25))
            .build();
        let mut handle = driver.open(0).unwrap();
        assert_eq!(handle.read_scan(&[0, 1, 2]).unwrap(), vec![1.25; 3]);
    }

    #[test]
    fn injected_read_failure() {
        let driver = MockDriver::builder()
            .board(MockBoardSpec::new(0, "sim", 1))
            .fail_reads_after(3)
            .build();
        let mut handle = driver.open(0).unwrap();
        for _ in 0..3 {
            assert!(handle.read_channel(0).is_ok());
        }
        assert!(matches!(handle.read_channel(0), Err(DaqError::Driver(_))));
    }

    #[test]
    fn failed_close_still_releases_board() {
        let driver = MockDriver::builder()
            .board(MockBoardSpec::new(0, "sim", 1))
            .fail_close()
            .build();
        let handle = driver.open(0).unwrap();
        assert!(matches!(handle.close(), Err(DaqError::Driver(_))));
        assert!(!driver.is_open(0));
        assert_eq!(driver.closes(), 1);
    }

    #[test]
    fn read_latency_delays_reads() {
        let driver = MockDriver::builder()
            .board(MockBoardSpec::new(0, "sim", 2))
            .read_latency(Duration::from_millis(5))
            .build();
        let mut handle = driver.open(0).unwrap();
        let started = Instant::now();
        handle.read_scan(&[0, 1]).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn find_board_by_product_name() {
        let driver = driver();
        assert_eq!(driver.find_board("USB-1208FS").unwrap(), 1);
        assert_eq!(driver.find_board(" E-1608-394C95 ").unwrap(), 0);
        let err = driver.find_board("E-1608-000000").unwrap_err();
        assert!(matches!(err, DaqError::DeviceNotFound(_)));
        assert_eq!(err.to_string(), "Device lookup failed: device E-1608-000000 not found");

        let empty = MockDriver::builder().build();
        let err = empty.find_board("anything").unwrap_err();
        assert!(matches!(err, DaqError::DeviceNotFound(msg) if msg == "no DAQ devices detected"));
    }
}
