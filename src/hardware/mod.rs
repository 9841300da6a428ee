//! Hardware driver contract.
//!
//! A data-acquisition board is reached only through two traits:
//!
//! - [`BoardDriver`] - process-wide entry point. Lists attached devices and
//!   opens a board by its numeric id. The driver owns the board registry, so
//!   every successful [`BoardDriver::open`] must be paired with a
//!   [`BoardHandle::close`].
//! - [`BoardHandle`] - an exclusively owned, open board. Reads one analog
//!   input channel at a time.
//!
//! Vendor SDK bindings implement these traits outside this crate. The
//! [`mock`] module provides a simulated driver for tests and the CLI.

pub mod mock;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DaqError};

/// One device reported by a driver's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Board number used with [`BoardDriver::open`]
    pub board_id: u32,
    /// Product name, e.g. "E-1608-394C95"
    pub product_name: String,
    /// Serial number or MAC-derived unique id
    pub unique_id: String,
    /// Vendor product id
    pub product_id: u32,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - Device ID = {}",
            self.product_name, self.unique_id, self.product_id
        )
    }
}

/// Process-wide access to a family of boards.
pub trait BoardDriver: Send + Sync {
    /// Short driver name for logs.
    fn name(&self) -> &str;

    /// Devices currently attached.
    fn inventory(&self) -> AppResult<Vec<DeviceDescriptor>>;

    /// Open a board for exclusive use.
    ///
    /// # Errors
    ///
    /// [`DaqError::DeviceUnavailable`] if the board does not exist, is not
    /// reachable, or is already open.
    fn open(&self, board_id: u32) -> AppResult<Box<dyn BoardHandle>>;

    /// Resolve a product name to a board id using [`BoardDriver::inventory`].
    ///
    /// # Errors
    ///
    /// [`DaqError::DeviceNotFound`] if nothing is attached or no product name
    /// matches.
    fn find_board(&self, product_name: &str) -> AppResult<u32> {
        let devices = self.inventory()?;
        if devices.is_empty() {
            return Err(DaqError::DeviceNotFound("no DAQ devices detected".to_string()));
        }
        devices
            .iter()
            .find(|d| d.product_name.trim() == product_name.trim())
            .map(|d| d.board_id)
            .ok_or_else(|| DaqError::DeviceNotFound(format!("device {product_name} not found")))
    }
}

/// An open board.
pub trait BoardHandle: Send {
    /// Board number this handle was opened for.
    fn board_id(&self) -> u32;

    /// Read the current value of one analog input channel, in volts.
    fn read_channel(&mut self, channel: u32) -> AppResult<f64>;

    /// Read every channel in `channels`, in order.
    fn read_scan(&mut self, channels: &[u32]) -> AppResult<Vec<f64>> {
        channels.iter().map(|&ch| self.read_channel(ch)).collect()
    }

    /// Release the board back to the driver.
    fn close(self: Box<Self>) -> AppResult<()>;
}
