//! # MCC DAQ Acquisition Library
//!
//! Continuous, multi-channel analog sampling from a data-acquisition board into
//! an in-memory table that can be snapshotted while acquisition is running and
//! exported to CSV afterwards.
//!
//! ## Crate Structure
//!
//! - **`session`**: The `AcquisitionSession` state machine. Owns a board id and
//!   a channel-name mapping, runs a background sampling worker between `start`
//!   and `stop`, and hands out `Table` snapshots.
//! - **`hardware`**: The `BoardDriver` / `BoardHandle` traits that vendor
//!   bindings implement, plus a simulated driver in `hardware::mock`.
//! - **`data`**: The `Table` snapshot type and CSV export.
//! - **`config`**: Layered TOML + environment configuration via `figment`.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: The crate-wide `DaqError` enum.

pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod session;

pub use config::DaqConfig;
pub use data::{Row, Table};
pub use error::{AppResult, DaqError};
pub use hardware::{BoardDriver, BoardHandle, DeviceDescriptor};
pub use session::{AcquisitionSession, SessionState, SessionStats, SnapshotReader};
