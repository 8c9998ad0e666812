//! Error taxonomy for the SDK.
//!
//! The vendor driver signals failure as a bare non-zero status code. At
//! this layer every public operation returns one specific failure kind
//! instead, keeping "bad input", "driver fault" and "not-yet-available
//! data" apart. Nothing is retried automatically: whether a failed driver
//! call is safe to reissue is a property of the vendor firmware, so retry
//! policy belongs to the caller.

/// Failures surfaced at the vendor driver boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// A driver call returned a non-zero status code.
    #[error("driver call returned status {0}")]
    Status(i32),

    /// The driver listed the same board id twice during enumeration.
    #[error("driver reported duplicate board id {0:#06x}")]
    DuplicateId(u16),

    /// The driver reported a calibration code outside the known range.
    #[error("unknown calibration status code {0}")]
    UnknownStatus(i32),

    /// The vendor library is not loaded or the transport is gone.
    #[error("vendor driver unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the public SDK surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Board enumeration or another driver-boundary read failed.
    #[error("driver failure: {0}")]
    Driver(#[from] DriverError),

    /// The device index is outside the registry's current range.
    ///
    /// Detected locally, before any driver call is made.
    #[error("device index {index} out of range, registry holds {count} boards")]
    BadIndex { index: usize, count: usize },

    /// The random-word fetch was rejected by the driver. No partial data
    /// is ever returned alongside this.
    #[error("acquisition failed on device {index}: {source}")]
    Acquisition { index: usize, source: DriverError },

    /// The calibration command was rejected by the driver.
    #[error("calibration failed on device {index}: {source}")]
    Calibration { index: usize, source: DriverError },

    /// No connected board carries the requested id.
    #[error("no board with id {0:#06x}")]
    NotFound(u16),

    /// Quality metrics were requested before the device had a successful
    /// calibration on record.
    #[error("device {index} has no successful calibration yet")]
    NotCalibrated { index: usize },

    /// The handle predates the most recent re-discovery and no longer
    /// addresses anything.
    #[error("stale device handle: issued at generation {issued}, registry at {current}")]
    StaleHandle { issued: u64, current: u64 },
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
