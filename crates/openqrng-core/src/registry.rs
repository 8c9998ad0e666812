//! Board registry: discovery, indexing and per-slot state.
//!
//! The registry owns the ordered descriptor list exclusively. Indices are
//! dense `[0, count)` and stay valid until the next
//! [`DeviceRegistry::discover`] call, which replaces the list wholesale and
//! bumps the registry generation. Per-board state sits behind one mutex per
//! slot; any driver call addressing a board holds that slot's lock for the
//! whole call, so calls on the same board never interleave while different
//! boards proceed in parallel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::driver::{CalibrationStatus, QrngDriver, QualityReading};
use crate::error::{DriverError, Error, Result};

/// Snapshot of one registry slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Driver-assigned board id, stable for the session.
    pub external_id: u16,
    /// Dense registry index; valid until the next discovery.
    pub index: usize,
    /// Last known calibration state.
    pub calibration: CalibrationStatus,
    /// Metrics captured at the last successful calibration.
    pub quality: Option<QualityReading>,
}

/// Generation-tagged index.
///
/// Resolving a handle issued before the most recent re-discovery fails
/// with [`Error::StaleHandle`] instead of silently addressing whichever
/// board now occupies the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle {
    index: usize,
    generation: u64,
}

impl DeviceHandle {
    /// Registry index this handle was issued for.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Registry generation at issue time.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub(crate) struct DeviceSlot {
    pub(crate) external_id: u16,
    pub(crate) calibration: CalibrationStatus,
    pub(crate) quality: Option<QualityReading>,
}

/// Thread-safe board registry over a [`QrngDriver`].
pub struct DeviceRegistry {
    driver: Arc<dyn QrngDriver>,
    slots: RwLock<Vec<Mutex<DeviceSlot>>>,
    generation: AtomicU64,
}

impl DeviceRegistry {
    /// Empty registry over `driver`. Call [`DeviceRegistry::discover`] to
    /// populate it.
    pub fn new(driver: Arc<dyn QrngDriver>) -> Self {
        Self {
            driver,
            slots: RwLock::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Scan for connected boards and rebuild the slot list.
    ///
    /// Replaces every descriptor and bumps the generation: indices and
    /// handles issued before this call no longer address anything. Zero
    /// boards is a valid result, not an error.
    pub fn discover(&self) -> Result<usize> {
        let count = self.driver.enumerate()?;
        let ids = self.driver.board_ids()?;
        if ids.len() != count as usize {
            warn!(
                "driver enumerated {count} boards but listed {} ids; trusting the id list",
                ids.len()
            );
        }
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(Error::Driver(DriverError::DuplicateId(*id)));
            }
        }

        let slots: Vec<Mutex<DeviceSlot>> = ids
            .iter()
            .map(|&external_id| {
                Mutex::new(DeviceSlot {
                    external_id,
                    calibration: CalibrationStatus::Default,
                    quality: None,
                })
            })
            .collect();
        let n = slots.len();

        *self.slots.write().unwrap() = slots;
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!("discovery found {n} boards (generation {})", self.generation());
        Ok(n)
    }

    /// Number of boards currently registered.
    pub fn len(&self) -> usize {
        self.slots.read().unwrap().len()
    }

    /// True when no boards are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current registry generation. Bumped by every discovery.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Board ids in registry order.
    pub fn list(&self) -> Vec<u16> {
        self.slots
            .read()
            .unwrap()
            .iter()
            .map(|slot| slot.lock().unwrap().external_id)
            .collect()
    }

    /// Translate a board id to its current registry index.
    pub fn find(&self, external_id: u16) -> Result<usize> {
        self.slots
            .read()
            .unwrap()
            .iter()
            .position(|slot| slot.lock().unwrap().external_id == external_id)
            .ok_or(Error::NotFound(external_id))
    }

    /// Issue a generation-tagged handle for `index`.
    pub fn handle(&self, index: usize) -> Result<DeviceHandle> {
        let count = self.len();
        if index >= count {
            return Err(Error::BadIndex { index, count });
        }
        Ok(DeviceHandle {
            index,
            generation: self.generation(),
        })
    }

    /// Resolve a handle back to a plain index, rejecting stale generations.
    pub fn resolve(&self, handle: &DeviceHandle) -> Result<usize> {
        let current = self.generation();
        if handle.generation != current {
            return Err(Error::StaleHandle {
                issued: handle.generation,
                current,
            });
        }
        let count = self.len();
        if handle.index >= count {
            return Err(Error::BadIndex {
                index: handle.index,
                count,
            });
        }
        Ok(handle.index)
    }

    /// Snapshot of every slot, in registry order.
    pub fn descriptors(&self) -> Vec<DeviceDescriptor> {
        self.slots
            .read()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let slot = slot.lock().unwrap();
                DeviceDescriptor {
                    external_id: slot.external_id,
                    index,
                    calibration: slot.calibration,
                    quality: slot.quality,
                }
            })
            .collect()
    }

    /// Driver this registry talks to.
    pub(crate) fn driver(&self) -> &Arc<dyn QrngDriver> {
        &self.driver
    }

    /// Run `f` with the slot lock held for `index`.
    ///
    /// The lock spans the whole closure, including any driver call made
    /// inside it: calls addressing the same board are serialized here,
    /// while calls on other slots only share the read lock and proceed
    /// concurrently. Out-of-range indices fail before any driver call.
    pub(crate) fn with_slot<T>(
        &self,
        index: usize,
        f: impl FnOnce(&mut DeviceSlot) -> Result<T>,
    ) -> Result<T> {
        let slots = self.slots.read().unwrap();
        let slot = slots.get(index).ok_or(Error::BadIndex {
            index,
            count: slots.len(),
        })?;
        let mut slot = slot.lock().unwrap();
        f(&mut slot)
    }
}
