//! Centralized conditioning for device output.
//!
//! Raw board words pass through the rest of the crate untouched; any
//! whitening lives here and only [`crate::rng::ConditionedRng`] applies
//! it. The board's extractor already owns debiasing and quality
//! estimation, so this module stays small: one chained SHA-256 block
//! step.

use sha2::{Digest, Sha256};

/// One conditioning step: digest `state || sample || counter || extra`
/// into the next 32-byte state/output block.
pub fn sha256_block(state: &[u8; 32], sample: &[u8], counter: u64, extra: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(state);
    h.update(sample);
    h.update(counter.to_le_bytes());
    h.update(extra);
    h.finalize().into()
}
