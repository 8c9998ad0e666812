//! Raw vendor library binding.
//!
//! Thin adapter over the closed-source board driver: direct
//! transcriptions of the vendor entry points, with [`VendorDriver`] as the
//! only thing the rest of the crate sees. Enabled with the `vendor`
//! feature and links `libQusideQRNG` at build time, so the default build
//! works on machines without the hardware stack.
//!
//! One transport quirk lives here and nowhere else: the vendor fill call
//! sizes the transfer in **bytes**, while the whole SDK thinks in 32-bit
//! words.

use libc::{c_int, size_t};

use crate::driver::{CalibrationStatus, QrngDriver};
use crate::error::DriverError;

#[link(name = "QusideQRNG")]
unsafe extern "C" {
    fn find_boards() -> u16;
    fn get_boards(dev_ids: *mut *mut u16, num_devs: *mut u16);
    fn get_random(mem_slot: *mut u32, n_bytes: size_t, dev_ind: u16) -> c_int;
    #[link_name = "quality_Qfactor"]
    fn quality_q_factor(dev_ind: u16, q_factor: *mut f32) -> c_int;
    fn get_hmin(dev_ind: u16, h_min: *mut f32) -> c_int;
    fn get_calibration_status(dev_ind: u16, status: *mut c_int) -> c_int;
    fn set_calibration(dev_ind: u16) -> c_int;
}

fn check(ret: c_int) -> Result<(), DriverError> {
    if ret == 0 {
        Ok(())
    } else {
        Err(DriverError::Status(ret))
    }
}

/// Driver backed by the vendor PCIe library.
#[derive(Debug, Default)]
pub struct VendorDriver;

impl VendorDriver {
    /// Adapter over the linked vendor library.
    pub fn new() -> Self {
        Self
    }
}

impl QrngDriver for VendorDriver {
    fn enumerate(&self) -> Result<u16, DriverError> {
        // SAFETY: find_boards takes no arguments and only touches the
        // vendor library's internal descriptor lists.
        Ok(unsafe { find_boards() })
    }

    fn board_ids(&self) -> Result<Vec<u16>, DriverError> {
        let mut ids_ptr: *mut u16 = std::ptr::null_mut();
        let mut count: u16 = 0;
        // SAFETY: get_boards writes a pointer to a vendor-owned id list
        // and its length into the two out-parameters.
        unsafe { get_boards(&mut ids_ptr, &mut count) };
        if ids_ptr.is_null() || count == 0 {
            return Ok(Vec::new());
        }
        // SAFETY: the vendor library owns the list and keeps it alive
        // until the next enumeration; copy it out instead of taking
        // ownership.
        let ids = unsafe { std::slice::from_raw_parts(ids_ptr, count as usize) }.to_vec();
        Ok(ids)
    }

    fn fill_random(&self, index: u16, words: &mut [u32]) -> Result<(), DriverError> {
        // The vendor call sizes the transfer in bytes.
        // SAFETY: mem_slot points at words.len() writable u32 slots,
        // exactly the byte count passed.
        check(unsafe { get_random(words.as_mut_ptr(), words.len() * 4, index) })
    }

    fn q_factor(&self, index: u16) -> Result<f32, DriverError> {
        let mut value: f32 = 0.0;
        // SAFETY: the out-parameter points at a valid f32.
        check(unsafe { quality_q_factor(index, &mut value) })?;
        Ok(value)
    }

    fn min_entropy(&self, index: u16) -> Result<f32, DriverError> {
        let mut value: f32 = 0.0;
        // SAFETY: the out-parameter points at a valid f32.
        check(unsafe { get_hmin(index, &mut value) })?;
        Ok(value)
    }

    fn calibration_status(&self, index: u16) -> Result<CalibrationStatus, DriverError> {
        let mut code: c_int = 0;
        // SAFETY: the out-parameter points at a valid c_int.
        check(unsafe { get_calibration_status(index, &mut code) })?;
        CalibrationStatus::from_code(code)
    }

    fn calibrate(&self, index: u16) -> Result<(), DriverError> {
        // Blocks for the entire hardware calibration procedure; the
        // command cannot be aborted once issued.
        check(unsafe { set_calibration(index) })
    }
}
