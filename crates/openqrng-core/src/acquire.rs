//! Random-word acquisition façade.
//!
//! The vendor transport has a minimum efficient request size. Requests
//! below the façade's `min_words` are padded: exactly `min_words` words
//! are fetched into a scratch buffer and the caller receives only the
//! words it asked for, with the remainder discarded rather than cached.
//! Requests at or above the minimum go to the driver at their exact size.
//! Either way the caller never sees a result wider than its request.

use std::sync::Arc;

use log::trace;

use crate::error::{Error, Result};
use crate::registry::{DeviceHandle, DeviceRegistry};

/// Minimum efficient transfer size of the stock vendor driver, in 32-bit
/// words.
pub const DEFAULT_MIN_WORDS: usize = 128;

/// Word acquisition over a [`DeviceRegistry`].
#[derive(Clone)]
pub struct AcquisitionFacade {
    registry: Arc<DeviceRegistry>,
    min_words: usize,
}

impl AcquisitionFacade {
    /// Façade with the stock transfer granularity of
    /// [`DEFAULT_MIN_WORDS`].
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self::with_min_words(registry, DEFAULT_MIN_WORDS)
    }

    /// Façade with an explicit minimum transfer granularity.
    ///
    /// The granularity is a property of the attached vendor driver, not of
    /// this façade; pass what the driver datasheet specifies. Values below
    /// one word are clamped to one.
    pub fn with_min_words(registry: Arc<DeviceRegistry>, min_words: usize) -> Self {
        Self {
            registry,
            min_words: min_words.max(1),
        }
    }

    /// Configured minimum transfer granularity in words.
    pub fn min_words(&self) -> usize {
        self.min_words
    }

    /// Registry this façade addresses.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Fetch exactly `word_count` random 32-bit words from board `index`.
    ///
    /// All-or-nothing: on failure no partial data is returned. A
    /// `word_count` of zero returns an empty vector without touching the
    /// driver.
    pub fn acquire(&self, index: usize, word_count: usize) -> Result<Vec<u32>> {
        if word_count == 0 {
            return Ok(Vec::new());
        }
        let driver = Arc::clone(self.registry.driver());
        self.registry.with_slot(index, |_slot| {
            if word_count < self.min_words {
                trace!(
                    "padding {word_count}-word request on board {index} to {}",
                    self.min_words
                );
                let mut scratch = vec![0u32; self.min_words];
                driver
                    .fill_random(index as u16, &mut scratch)
                    .map_err(|source| Error::Acquisition { index, source })?;
                Ok(scratch[..word_count].to_vec())
            } else {
                let mut words = vec![0u32; word_count];
                driver
                    .fill_random(index as u16, &mut words)
                    .map_err(|source| Error::Acquisition { index, source })?;
                Ok(words)
            }
        })
    }

    /// Fetch `n_bytes` of random output from board `index`, packing words
    /// little-endian. The word count is rounded up and the result
    /// truncated, so byte counts that are not a multiple of four work.
    pub fn acquire_bytes(&self, index: usize, n_bytes: usize) -> Result<Vec<u8>> {
        let words = self.acquire(index, n_bytes.div_ceil(4))?;
        let mut bytes = words_to_bytes(&words);
        bytes.truncate(n_bytes);
        Ok(bytes)
    }

    /// Handle-checked variant of [`AcquisitionFacade::acquire`].
    pub fn acquire_at(&self, handle: &DeviceHandle, word_count: usize) -> Result<Vec<u32>> {
        let index = self.registry.resolve(handle)?;
        self.acquire(index, word_count)
    }
}

/// Pack 32-bit words into little-endian bytes.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::QrngDriver;
    use crate::stub::StubDriver;

    fn facade_with(ids: &[u16], min_words: usize) -> (Arc<StubDriver>, AcquisitionFacade) {
        let stub = Arc::new(StubDriver::with_boards(ids));
        let registry = Arc::new(DeviceRegistry::new(
            Arc::clone(&stub) as Arc<dyn QrngDriver>
        ));
        registry.discover().unwrap();
        (stub, AcquisitionFacade::with_min_words(registry, min_words))
    }

    #[test]
    fn short_request_is_padded_to_min_words() {
        let (stub, facade) = facade_with(&[0x11], 128);
        let pattern: Vec<u32> = (100..300).collect();
        stub.set_words(0, pattern.clone());

        let words = facade.acquire(0, 10).unwrap();
        assert_eq!(words.len(), 10);
        assert_eq!(&words[..], &pattern[..10]);
        // The driver saw one request of exactly the minimum size.
        assert_eq!(stub.requests_for(0), vec![128]);
    }

    #[test]
    fn large_request_passes_through_exactly() {
        let (stub, facade) = facade_with(&[0x11], 128);
        let words = facade.acquire(0, 500).unwrap();
        assert_eq!(words.len(), 500);
        assert_eq!(stub.requests_for(0), vec![500]);
    }

    #[test]
    fn request_at_the_boundary_is_not_padded() {
        let (stub, facade) = facade_with(&[0x11], 128);
        let words = facade.acquire(0, 128).unwrap();
        assert_eq!(words.len(), 128);
        assert_eq!(stub.requests_for(0), vec![128]);
    }

    #[test]
    fn zero_words_never_reaches_the_driver() {
        let (stub, facade) = facade_with(&[0x11], 128);
        assert!(facade.acquire(0, 0).unwrap().is_empty());
        assert!(stub.requests_for(0).is_empty());
    }

    #[test]
    fn bad_index_fails_before_any_driver_call() {
        let (stub, facade) = facade_with(&[0x11], 128);
        assert!(matches!(
            facade.acquire(3, 16),
            Err(Error::BadIndex { index: 3, count: 1 })
        ));
        assert!(stub.requests().is_empty());
    }

    #[test]
    fn driver_failure_returns_no_partial_data() {
        let (stub, facade) = facade_with(&[0x11], 128);
        stub.set_fill_failure(0, true);
        assert!(matches!(
            facade.acquire(0, 16),
            Err(Error::Acquisition { index: 0, .. })
        ));
    }

    #[test]
    fn acquire_bytes_packs_words_little_endian() {
        let (stub, facade) = facade_with(&[0x11], 1);
        stub.set_words(0, vec![0x4433_2211, 0x8877_6655]);

        let bytes = facade.acquire_bytes(0, 8).unwrap();
        assert_eq!(bytes, vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
    }

    #[test]
    fn acquire_bytes_handles_odd_lengths() {
        let (stub, facade) = facade_with(&[0x11], 1);
        stub.set_words(0, vec![0x4433_2211, 0x8877_6655]);

        let bytes = facade.acquire_bytes(0, 6).unwrap();
        assert_eq!(bytes, vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        // Two words were still needed to cover six bytes.
        assert_eq!(stub.requests_for(0), vec![2]);
    }

    #[test]
    fn injected_granularity_is_honored() {
        let (stub, facade) = facade_with(&[0x11], 32);
        facade.acquire(0, 10).unwrap();
        facade.acquire(0, 32).unwrap();
        facade.acquire(0, 33).unwrap();
        assert_eq!(stub.requests_for(0), vec![32, 32, 33]);
    }

    #[test]
    fn handle_checked_acquire_rejects_stale_handles() {
        let (stub, facade) = facade_with(&[0x11], 8);
        let handle = facade.registry().handle(0).unwrap();
        assert_eq!(facade.acquire_at(&handle, 4).unwrap().len(), 4);

        stub.set_boards(&[0x22]);
        facade.registry().discover().unwrap();
        assert!(matches!(
            facade.acquire_at(&handle, 4),
            Err(Error::StaleHandle { .. })
        ));
    }

    #[test]
    fn words_to_bytes_is_little_endian() {
        assert_eq!(
            words_to_bytes(&[0x0102_0304]),
            vec![0x04, 0x03, 0x02, 0x01]
        );
        assert!(words_to_bytes(&[]).is_empty());
    }
}
