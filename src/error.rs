//! Custom error types for the crate.
//!
//! This module defines the primary error type, `DaqError`. Using the `thiserror`
//! crate, it provides one consistent way to report what can go wrong while
//! building a session, talking to a board, or exporting data.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidChannelMap`**: Bad construction input (empty map or duplicate
//!   channel names). Fatal to construction.
//! - **`DeviceUnavailable`**: The board could not be opened. The session
//!   keeps its previous state so the caller may retry.
//! - **`DeviceNotFound`**: No attached device has the requested product name.
//! - **`InvalidState`**: API misuse, such as `start` while running or `stop`
//!   while not running. No state change happens.
//! - **`Driver`**: A failure reported by an open board (e.g. a channel read).
//! - **`Config`** / **`Configuration`**: Parse failures from `figment` and
//!   semantic validation failures respectively.
//! - **`Io`**, **`Storage`**, **`FeatureNotEnabled`**: Export-side failures.
//!
//! By using `#[from]`, `DaqError` can be created from the underlying error
//! types with the `?` operator.

use thiserror::Error;

use crate::session::SessionState;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors produced by sessions, drivers, configuration and storage.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Channel map is empty or has duplicate names.
    #[error("Invalid channel map: {0}")]
    InvalidChannelMap(String),

    /// Board could not be opened or found.
    #[error("Board {board_id} unavailable: {reason}")]
    DeviceUnavailable {
        /// Board that was requested
        board_id: u32,
        /// Why the board could not be used
        reason: String,
    },

    /// No attached device matches a product-name lookup.
    #[error("Device lookup failed: {0}")]
    DeviceNotFound(String),

    /// Operation not permitted in the current session state.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Rejected operation ("start" or "stop")
        operation: &'static str,
        /// State the session was in
        state: SessionState,
    },

    /// Failure reported by an open board.
    #[error("Driver error: {0}")]
    Driver(String),

    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Functionality compiled out via cargo features.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

#[cfg(feature = "storage_csv")]
impl From<csv::Error> for DaqError {
    fn from(err: csv::Error) -> Self {
        DaqError::Storage(err.to_string())
    }
}

impl DaqError {
    /// Shorthand for a [`DaqError::DeviceUnavailable`].
    pub fn unavailable(board_id: u32, reason: impl Into<String>) -> Self {
        DaqError::DeviceUnavailable {
            board_id,
            reason: reason.into(),
        }
    }

    /// Whether the caller may reasonably retry the failed call.
    ///
    /// Only hardware availability is transient; everything else needs the
    /// input or the call order fixed first.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DaqError::DeviceUnavailable { .. } | DaqError::DeviceNotFound(_)
        )
    }
}
