//! Vendor driver surface.
//!
//! The SDK reaches hardware through the narrow [`QrngDriver`] trait, which
//! mirrors the vendor library call for call. Everything above this seam
//! thinks in 32-bit words and registry indices; transport details stay
//! below it.

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// Calibration state of a board, as reported by the driver.
///
/// Raw driver codes are `0..=4` in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationStatus {
    /// Power-on state, before any calibration command.
    Default,
    /// A calibration command is in flight.
    Calibrating,
    /// The last calibration completed; quality metrics are valid.
    CalibrationSucceeded,
    /// The last calibration ran to completion and failed.
    CalibrationFailed,
    /// The board stopped answering on the management bus.
    CommunicationError,
}

impl CalibrationStatus {
    /// Decode a raw driver status code.
    pub fn from_code(code: i32) -> Result<Self, DriverError> {
        match code {
            0 => Ok(Self::Default),
            1 => Ok(Self::Calibrating),
            2 => Ok(Self::CalibrationSucceeded),
            3 => Ok(Self::CalibrationFailed),
            4 => Ok(Self::CommunicationError),
            other => Err(DriverError::UnknownStatus(other)),
        }
    }

    /// Raw driver status code for this state.
    pub fn code(self) -> i32 {
        match self {
            Self::Default => 0,
            Self::Calibrating => 1,
            Self::CalibrationSucceeded => 2,
            Self::CalibrationFailed => 3,
            Self::CommunicationError => 4,
        }
    }

    /// Whether quality metrics are meaningful in this state.
    pub fn is_calibrated(self) -> bool {
        matches!(self, Self::CalibrationSucceeded)
    }
}

impl std::fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Calibrating => write!(f, "calibrating"),
            Self::CalibrationSucceeded => write!(f, "succeeded"),
            Self::CalibrationFailed => write!(f, "failed"),
            Self::CommunicationError => write!(f, "comm_error"),
        }
    }
}

/// Quality metrics computed by a board during calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReading {
    /// Statistical quantum-quality estimate from the board's correlators.
    pub q_factor: f32,
    /// Minimum entropy of the extractor output. Only changes after a
    /// calibration.
    pub min_entropy: f32,
}

/// Trait every board driver implements.
///
/// All calls block; [`QrngDriver::calibrate`] blocks for the entire
/// hardware calibration procedure and cannot be aborted. Implementations
/// must tolerate concurrent calls addressing *different* indices. Calls on
/// the same index are never issued concurrently — the registry's per-slot
/// locks serialize them.
pub trait QrngDriver: Send + Sync {
    /// Scan the transport for connected boards and rebuild the driver's
    /// internal descriptor list. Returns the number of boards found; zero
    /// is a valid answer.
    fn enumerate(&self) -> Result<u16, DriverError>;

    /// Ids of the connected boards, in driver list order.
    fn board_ids(&self) -> Result<Vec<u16>, DriverError>;

    /// Fill `words` with extracted random output from board `index`.
    ///
    /// All-or-nothing: on error the buffer contents are unspecified and
    /// must not be used.
    fn fill_random(&self, index: u16, words: &mut [u32]) -> Result<(), DriverError>;

    /// Q-factor computed at the board's last calibration.
    fn q_factor(&self, index: u16) -> Result<f32, DriverError>;

    /// Minimum-entropy estimate from the board's last calibration.
    fn min_entropy(&self, index: u16) -> Result<f32, DriverError>;

    /// Current calibration state of board `index`.
    fn calibration_status(&self, index: u16) -> Result<CalibrationStatus, DriverError>;

    /// Run a full calibration cycle on board `index`. Blocks until the
    /// hardware finishes.
    fn calibrate(&self, index: u16) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for code in 0..=4 {
            let status = CalibrationStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn unknown_status_code_is_an_error() {
        assert_eq!(
            CalibrationStatus::from_code(5),
            Err(DriverError::UnknownStatus(5))
        );
        assert_eq!(
            CalibrationStatus::from_code(-1),
            Err(DriverError::UnknownStatus(-1))
        );
    }

    #[test]
    fn only_success_counts_as_calibrated() {
        assert!(CalibrationStatus::CalibrationSucceeded.is_calibrated());
        assert!(!CalibrationStatus::Default.is_calibrated());
        assert!(!CalibrationStatus::Calibrating.is_calibrated());
        assert!(!CalibrationStatus::CalibrationFailed.is_calibrated());
        assert!(!CalibrationStatus::CommunicationError.is_calibrated());
    }

    #[test]
    fn status_display_labels() {
        assert_eq!(CalibrationStatus::CalibrationSucceeded.to_string(), "succeeded");
        assert_eq!(CalibrationStatus::CommunicationError.to_string(), "comm_error");
    }
}
