//! `rand_core` integration.
//!
//! Two generators over one board: [`DeviceRng`] hands out raw board
//! output and refuses to run uncalibrated; [`ConditionedRng`] layers
//! chained SHA-256 conditioning with OS-entropy mixing on top, for
//! callers that want a hedged stream instead of the bare hardware
//! signal.

use std::sync::Arc;

use rand_core::{TryCryptoRng, TryRngCore};

use crate::acquire::AcquisitionFacade;
use crate::calibration::CalibrationController;
use crate::conditioning::sha256_block;
use crate::error::{Error, Result};
use crate::registry::DeviceRegistry;

/// Raw random stream from one board.
///
/// Every draw re-reads the board's calibration status and fails with
/// [`Error::NotCalibrated`] unless it is `CalibrationSucceeded`. Words
/// are packed little-endian.
pub struct DeviceRng {
    facade: AcquisitionFacade,
    controller: CalibrationController,
    index: usize,
}

impl DeviceRng {
    /// Raw generator for board `index`.
    pub fn new(registry: Arc<DeviceRegistry>, index: usize) -> Self {
        Self::with_facade(AcquisitionFacade::new(registry), index)
    }

    /// Raw generator reusing an existing façade, e.g. one configured with
    /// a non-stock transfer granularity.
    pub fn with_facade(facade: AcquisitionFacade, index: usize) -> Self {
        let controller = CalibrationController::new(Arc::clone(facade.registry()));
        Self {
            facade,
            controller,
            index,
        }
    }

    /// Board index this generator draws from.
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn draw_words(&self, word_count: usize) -> Result<Vec<u32>> {
        let status = self.controller.status(self.index)?;
        if !status.is_calibrated() {
            return Err(Error::NotCalibrated { index: self.index });
        }
        self.facade.acquire(self.index, word_count)
    }

    pub(crate) fn draw_bytes(&self, n_bytes: usize) -> Result<Vec<u8>> {
        let status = self.controller.status(self.index)?;
        if !status.is_calibrated() {
            return Err(Error::NotCalibrated { index: self.index });
        }
        self.facade.acquire_bytes(self.index, n_bytes)
    }
}

impl TryRngCore for DeviceRng {
    type Error = Error;

    fn try_next_u32(&mut self) -> Result<u32> {
        let words = self.draw_words(1)?;
        Ok(words[0])
    }

    fn try_next_u64(&mut self) -> Result<u64> {
        let words = self.draw_words(2)?;
        Ok(u64::from(words[0]) | (u64::from(words[1]) << 32))
    }

    fn try_fill_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        let bytes = self.draw_bytes(dst.len())?;
        dst.copy_from_slice(&bytes);
        Ok(())
    }
}

impl TryCryptoRng for DeviceRng {}

/// Conditioned random stream from one board.
///
/// Each 32-byte output block is `H(state || sample || counter || os)`
/// and becomes the next state: the stream stays keyed to live board
/// output (a fresh device sample per block) without ever exposing it
/// directly, and OS entropy is mixed in as a hedge against a misbehaving
/// board.
pub struct ConditionedRng {
    inner: DeviceRng,
    state: [u8; 32],
    counter: u64,
    buffer: Vec<u8>,
}

impl ConditionedRng {
    /// Conditioned generator for board `index`.
    pub fn new(registry: Arc<DeviceRegistry>, index: usize) -> Self {
        Self::from_device(DeviceRng::new(registry, index))
    }

    /// Wrap an existing raw generator.
    pub fn from_device(inner: DeviceRng) -> Self {
        let mut seed = [0u8; 32];
        os_entropy(&mut seed);
        Self {
            inner,
            state: seed,
            counter: 0,
            buffer: Vec::new(),
        }
    }

    /// Board index this generator draws from.
    pub fn index(&self) -> usize {
        self.inner.index()
    }

    fn refill(&mut self) -> Result<()> {
        let sample = self.inner.draw_bytes(32)?;
        self.counter += 1;
        let mut os_random = [0u8; 8];
        os_entropy(&mut os_random);
        self.state = sha256_block(&self.state, &sample, self.counter, &os_random);
        self.buffer.extend_from_slice(&self.state);
        Ok(())
    }
}

impl TryRngCore for ConditionedRng {
    type Error = Error;

    fn try_next_u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.try_fill_bytes(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn try_next_u64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        self.try_fill_bytes(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn try_fill_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < dst.len() {
            if self.buffer.is_empty() {
                self.refill()?;
            }
            let take = self.buffer.len().min(dst.len() - filled);
            dst[filled..filled + take].copy_from_slice(&self.buffer[..take]);
            self.buffer.drain(..take);
            filled += take;
        }
        Ok(())
    }
}

impl TryCryptoRng for ConditionedRng {}

/// Fill `buf` from the OS CSPRNG.
///
/// # Panics
/// Panics if the OS CSPRNG fails — a fatal platform issue.
fn os_entropy(buf: &mut [u8]) {
    getrandom::fill(buf).expect("OS CSPRNG failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::QrngDriver;
    use crate::stub::{CalibrationOutcome, StubDriver};

    fn rng_setup(ids: &[u16]) -> (Arc<StubDriver>, Arc<DeviceRegistry>) {
        let stub = Arc::new(StubDriver::with_boards(ids));
        let registry = Arc::new(DeviceRegistry::new(
            Arc::clone(&stub) as Arc<dyn QrngDriver>
        ));
        registry.discover().unwrap();
        (stub, registry)
    }

    #[test]
    fn raw_generator_refuses_uncalibrated_board() {
        let (_stub, registry) = rng_setup(&[0x11]);
        let mut rng = DeviceRng::new(registry, 0);
        assert_eq!(
            rng.try_next_u32(),
            Err(Error::NotCalibrated { index: 0 })
        );
    }

    #[test]
    fn raw_generator_draws_after_calibration() {
        let (stub, registry) = rng_setup(&[0x11]);
        stub.set_words(0, vec![0xAABB_CCDD, 0x1122_3344]);
        CalibrationController::new(Arc::clone(&registry))
            .calibrate(0)
            .unwrap();

        let mut rng = DeviceRng::new(registry, 0);
        assert_eq!(rng.try_next_u32().unwrap(), 0xAABB_CCDD);

        let mut bytes = [0u8; 8];
        rng.try_fill_bytes(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn raw_generator_combines_u64_little_endian_first() {
        let (stub, registry) = rng_setup(&[0x11]);
        stub.set_words(0, vec![0x0000_0001, 0x0000_0002]);
        CalibrationController::new(Arc::clone(&registry))
            .calibrate(0)
            .unwrap();

        let mut rng = DeviceRng::new(registry, 0);
        assert_eq!(rng.try_next_u64().unwrap(), 0x0000_0002_0000_0001);
    }

    #[test]
    fn raw_generator_notices_a_board_going_bad() {
        let (stub, registry) = rng_setup(&[0x11]);
        CalibrationController::new(Arc::clone(&registry))
            .calibrate(0)
            .unwrap();
        let mut rng = DeviceRng::new(registry, 0);
        assert!(rng.try_next_u32().is_ok());

        // Hardware drops back to a failed state between draws.
        stub.set_outcome(0, CalibrationOutcome::Fail);
        stub.set_status(0, crate::driver::CalibrationStatus::CalibrationFailed);
        assert_eq!(
            rng.try_next_u32(),
            Err(Error::NotCalibrated { index: 0 })
        );
    }

    #[test]
    fn conditioned_generator_fills_any_length() {
        let (_stub, registry) = rng_setup(&[0x11]);
        CalibrationController::new(Arc::clone(&registry))
            .calibrate(0)
            .unwrap();

        let mut rng = ConditionedRng::new(registry, 0);
        for size in [1usize, 4, 31, 32, 33, 100] {
            let mut buf = vec![0u8; size];
            rng.try_fill_bytes(&mut buf).unwrap();
            assert_eq!(buf.len(), size);
        }
    }

    #[test]
    fn conditioned_generator_output_varies_between_draws() {
        let (_stub, registry) = rng_setup(&[0x11]);
        CalibrationController::new(Arc::clone(&registry))
            .calibrate(0)
            .unwrap();

        let mut rng = ConditionedRng::new(registry, 0);
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        rng.try_fill_bytes(&mut a).unwrap();
        rng.try_fill_bytes(&mut b).unwrap();
        assert_ne!(a, b, "consecutive conditioned blocks must differ");
    }

    #[test]
    fn conditioned_generator_propagates_device_failures() {
        let (stub, registry) = rng_setup(&[0x11]);
        CalibrationController::new(Arc::clone(&registry))
            .calibrate(0)
            .unwrap();
        stub.set_fill_failure(0, true);

        let mut rng = ConditionedRng::new(registry, 0);
        let mut buf = [0u8; 16];
        assert!(matches!(
            rng.try_fill_bytes(&mut buf),
            Err(Error::Acquisition { index: 0, .. })
        ));
    }
}
