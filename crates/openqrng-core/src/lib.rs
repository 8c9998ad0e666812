//! # openqrng-core
//!
//! Device registry and random-word acquisition SDK for PCIe QRNG boards.
//!
//! The boards extract quantum randomness and estimate its quality on
//! their own silicon; this crate is the host-side layer that makes a pool
//! of them usable — enumeration with stable indexing, word acquisition
//! that hides the transport's minimum transfer granularity, and blocking
//! calibration control with cached quality metrics.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use openqrng_core::{
//!     AcquisitionFacade, CalibrationController, DeviceRegistry, StubDriver,
//! };
//!
//! // StubDriver stands in for the vendor library; enable the `vendor`
//! // feature and swap in `VendorDriver` on a machine with boards.
//! let driver = Arc::new(StubDriver::with_boards(&[0x11]));
//! let registry = Arc::new(DeviceRegistry::new(driver));
//! registry.discover()?;
//!
//! let controller = CalibrationController::new(Arc::clone(&registry));
//! controller.calibrate(0)?;
//! let quality = controller.quality(0)?;
//! println!("q-factor {:.3}, h_min {:.3}", quality.q_factor, quality.min_entropy);
//!
//! let facade = AcquisitionFacade::new(Arc::clone(&registry));
//! let words = facade.acquire(0, 16)?;
//! assert_eq!(words.len(), 16);
//! # Ok::<(), openqrng_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Registry (discovery, indexing, per-slot locks)
//! → Façade (word acquisition, granularity padding)
//! → Controller (blocking calibration, status, quality)
//! → Driver (the [`QrngDriver`] seam; vendor library or [`StubDriver`])
//!
//! Indices are dense `[0, count)` and valid until the next discovery;
//! generation-tagged [`DeviceHandle`]s make stale-index use detectable.
//! Calls addressing the same board are serialized on its slot lock;
//! different boards proceed in parallel.

pub use rand_core;

pub mod acquire;
pub mod calibration;
pub mod conditioning;
pub mod driver;
pub mod error;
#[cfg(feature = "vendor")]
pub mod ffi;
pub mod registry;
pub mod rng;
pub mod stub;

pub use acquire::{AcquisitionFacade, DEFAULT_MIN_WORDS, words_to_bytes};
pub use calibration::CalibrationController;
pub use driver::{CalibrationStatus, QrngDriver, QualityReading};
pub use error::{DriverError, Error, Result};
#[cfg(feature = "vendor")]
pub use ffi::VendorDriver;
pub use registry::{DeviceDescriptor, DeviceHandle, DeviceRegistry};
pub use rng::{ConditionedRng, DeviceRng};
pub use stub::{AcquireRequest, CalibrationOutcome, StubDriver};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
