//! Calibration control and quality metrics.
//!
//! [`CalibrationController::calibrate`] blocks the calling thread for the
//! full hardware procedure while holding the board's slot lock. There is
//! no timeout and no cancellation at this layer: the vendor command cannot
//! be aborted once issued. A caller that needs to give up must bound its
//! own wait and abandon the thread, accepting that the board stays
//! mid-calibration.

use std::sync::Arc;

use log::{debug, warn};

use crate::driver::{CalibrationStatus, QualityReading};
use crate::error::{Error, Result};
use crate::registry::{DeviceHandle, DeviceRegistry};

/// Calibration commands and status/quality reads over a
/// [`DeviceRegistry`].
#[derive(Clone)]
pub struct CalibrationController {
    registry: Arc<DeviceRegistry>,
}

impl CalibrationController {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Registry this controller addresses.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Run a full calibration cycle on board `index` and return the
    /// resulting status. Blocks until the hardware finishes.
    ///
    /// Re-entering calibration from any state restarts the cycle: the
    /// cached quality reading is dropped up front and only restored when
    /// the new cycle succeeds.
    pub fn calibrate(&self, index: usize) -> Result<CalibrationStatus> {
        let driver = Arc::clone(self.registry.driver());
        self.registry.with_slot(index, |slot| {
            slot.calibration = CalibrationStatus::Calibrating;
            slot.quality = None;
            debug!("calibrating board {index} (id {:#06x})", slot.external_id);

            if let Err(source) = driver.calibrate(index as u16) {
                // The command was rejected; learn what state the board is
                // actually in, if it still answers.
                slot.calibration = match driver.calibration_status(index as u16) {
                    Ok(status) => status,
                    Err(_) => CalibrationStatus::CommunicationError,
                };
                return Err(Error::Calibration { index, source });
            }

            let status = match driver.calibration_status(index as u16) {
                Ok(status) => status,
                Err(err) => {
                    warn!("board {index} stopped answering after calibration: {err}");
                    CalibrationStatus::CommunicationError
                }
            };
            slot.calibration = status;

            if status.is_calibrated() {
                match (driver.q_factor(index as u16), driver.min_entropy(index as u16)) {
                    (Ok(q_factor), Ok(min_entropy)) => {
                        slot.quality = Some(QualityReading {
                            q_factor,
                            min_entropy,
                        });
                    }
                    (Err(err), _) | (_, Err(err)) => {
                        warn!("board {index} calibrated but quality read failed: {err}");
                    }
                }
            }
            debug!("board {index} calibration finished: {status}");
            Ok(status)
        })
    }

    /// Current calibration status of board `index`.
    ///
    /// Prompt driver read; never starts a calibration. The cached
    /// descriptor is refreshed, so a later
    /// [`CalibrationController::quality`] call gates on what the hardware
    /// actually reported.
    pub fn status(&self, index: usize) -> Result<CalibrationStatus> {
        let driver = Arc::clone(self.registry.driver());
        self.registry.with_slot(index, |slot| {
            let status = driver
                .calibration_status(index as u16)
                .map_err(Error::Driver)?;
            slot.calibration = status;
            Ok(status)
        })
    }

    /// Quality metrics from the last successful calibration of board
    /// `index`.
    ///
    /// Only meaningful after [`CalibrationController::status`] reports
    /// `CalibrationSucceeded`; otherwise this is
    /// [`Error::NotCalibrated`], never a numeric default. Boards that
    /// arrive already calibrated are read through the driver once and the
    /// reading cached.
    pub fn quality(&self, index: usize) -> Result<QualityReading> {
        let driver = Arc::clone(self.registry.driver());
        self.registry.with_slot(index, |slot| {
            if !slot.calibration.is_calibrated() {
                return Err(Error::NotCalibrated { index });
            }
            if let Some(reading) = slot.quality {
                return Ok(reading);
            }
            let q_factor = driver.q_factor(index as u16).map_err(Error::Driver)?;
            let min_entropy = driver.min_entropy(index as u16).map_err(Error::Driver)?;
            let reading = QualityReading {
                q_factor,
                min_entropy,
            };
            slot.quality = Some(reading);
            Ok(reading)
        })
    }

    /// Handle-checked variant of [`CalibrationController::calibrate`].
    pub fn calibrate_at(&self, handle: &DeviceHandle) -> Result<CalibrationStatus> {
        let index = self.registry.resolve(handle)?;
        self.calibrate(index)
    }

    /// Handle-checked variant of [`CalibrationController::status`].
    pub fn status_at(&self, handle: &DeviceHandle) -> Result<CalibrationStatus> {
        let index = self.registry.resolve(handle)?;
        self.status(index)
    }

    /// Handle-checked variant of [`CalibrationController::quality`].
    pub fn quality_at(&self, handle: &DeviceHandle) -> Result<QualityReading> {
        let index = self.registry.resolve(handle)?;
        self.quality(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::QrngDriver;
    use crate::stub::{CalibrationOutcome, StubDriver};

    fn controller_with(ids: &[u16]) -> (Arc<StubDriver>, CalibrationController) {
        let stub = Arc::new(StubDriver::with_boards(ids));
        let registry = Arc::new(DeviceRegistry::new(
            Arc::clone(&stub) as Arc<dyn QrngDriver>
        ));
        registry.discover().unwrap();
        (stub, CalibrationController::new(registry))
    }

    #[test]
    fn successful_calibration_reports_status_and_quality() {
        let (stub, controller) = controller_with(&[0x11]);
        stub.set_quality(0, 0.97, 7.82);

        let status = controller.calibrate(0).unwrap();
        assert_eq!(status, CalibrationStatus::CalibrationSucceeded);
        assert_eq!(
            controller.status(0).unwrap(),
            CalibrationStatus::CalibrationSucceeded
        );

        let quality = controller.quality(0).unwrap();
        assert_eq!(quality.q_factor, 0.97);
        assert_eq!(quality.min_entropy, 7.82);
    }

    #[test]
    fn failed_calibration_reports_failed_status() {
        let (stub, controller) = controller_with(&[0x11]);
        stub.set_outcome(0, CalibrationOutcome::Fail);

        let status = controller.calibrate(0).unwrap();
        assert_eq!(status, CalibrationStatus::CalibrationFailed);
        assert_eq!(
            controller.quality(0),
            Err(Error::NotCalibrated { index: 0 })
        );
    }

    #[test]
    fn bus_fault_surfaces_as_communication_error() {
        let (stub, controller) = controller_with(&[0x11]);
        stub.set_outcome(0, CalibrationOutcome::BusFault);

        let status = controller.calibrate(0).unwrap();
        assert_eq!(status, CalibrationStatus::CommunicationError);
    }

    #[test]
    fn rejected_command_is_a_calibration_error() {
        let (stub, controller) = controller_with(&[0x11]);
        stub.set_outcome(0, CalibrationOutcome::Reject);

        assert!(matches!(
            controller.calibrate(0),
            Err(Error::Calibration { index: 0, .. })
        ));
    }

    #[test]
    fn failure_clears_quality_from_a_prior_success() {
        let (stub, controller) = controller_with(&[0x11]);
        stub.set_quality(0, 0.95, 7.5);
        controller.calibrate(0).unwrap();
        assert!(controller.quality(0).is_ok());

        stub.set_outcome(0, CalibrationOutcome::Fail);
        controller.calibrate(0).unwrap();
        assert_eq!(
            controller.quality(0),
            Err(Error::NotCalibrated { index: 0 }),
            "a failed cycle must not leak the previous reading"
        );
    }

    #[test]
    fn recalibration_restarts_the_cycle_from_terminal_states() {
        let (stub, controller) = controller_with(&[0x11]);
        stub.set_outcome(0, CalibrationOutcome::Fail);
        controller.calibrate(0).unwrap();

        stub.set_outcome(0, CalibrationOutcome::Succeed);
        stub.set_quality(0, 0.99, 7.9);
        let status = controller.calibrate(0).unwrap();
        assert_eq!(status, CalibrationStatus::CalibrationSucceeded);
        assert_eq!(controller.quality(0).unwrap().q_factor, 0.99);
    }

    #[test]
    fn quality_before_any_calibration_is_not_calibrated() {
        let (_stub, controller) = controller_with(&[0x11]);
        assert_eq!(
            controller.quality(0),
            Err(Error::NotCalibrated { index: 0 })
        );
    }

    #[test]
    fn precalibrated_board_reads_quality_through_the_driver() {
        let (stub, controller) = controller_with(&[0x11]);
        // Board reports success without this process ever calibrating.
        stub.set_status(0, CalibrationStatus::CalibrationSucceeded);
        stub.set_quality(0, 0.91, 7.1);

        assert_eq!(
            controller.status(0).unwrap(),
            CalibrationStatus::CalibrationSucceeded
        );
        let quality = controller.quality(0).unwrap();
        assert_eq!(quality.q_factor, 0.91);
        assert_eq!(quality.min_entropy, 7.1);
    }

    #[test]
    fn status_read_failure_is_a_driver_error() {
        let (stub, controller) = controller_with(&[0x11]);
        stub.set_status_failure(0, true);
        assert!(matches!(controller.status(0), Err(Error::Driver(_))));
    }

    #[test]
    fn bad_index_fails_locally() {
        let (stub, controller) = controller_with(&[0x11]);
        assert!(matches!(
            controller.calibrate(7),
            Err(Error::BadIndex { index: 7, count: 1 })
        ));
        assert!(matches!(
            controller.status(7),
            Err(Error::BadIndex { .. })
        ));
        assert_eq!(stub.requests(), vec![]);
    }

    #[test]
    fn handle_checked_calls_reject_stale_handles() {
        let (stub, controller) = controller_with(&[0x11]);
        let handle = controller.registry().handle(0).unwrap();
        controller.calibrate_at(&handle).unwrap();

        stub.set_boards(&[0x22]);
        controller.registry().discover().unwrap();
        assert!(matches!(
            controller.status_at(&handle),
            Err(Error::StaleHandle { .. })
        ));
        assert!(matches!(
            controller.quality_at(&handle),
            Err(Error::StaleHandle { .. })
        ));
    }
}
