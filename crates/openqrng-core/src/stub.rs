//! Deterministic in-memory driver.
//!
//! [`StubDriver`] stands in for the vendor library when no hardware is
//! attached: tests script it, the examples run against it, and downstream
//! crates can develop against it before boards arrive. Every board is
//! scriptable — id list, word pattern, calibration outcome, quality
//! metrics, per-call failure injection — and the stub records every
//! random-word request so tests can assert on exact transfer sizes.
//!
//! `fill_random` and `calibrate` flag overlapping calls on the same board
//! as reentrancy violations; the registry's per-slot serialization is
//! observable through [`StubDriver::violations`].

use std::sync::Mutex;
use std::time::Duration;

use crate::driver::{CalibrationStatus, QrngDriver};
use crate::error::DriverError;

/// What a scripted calibration command does to a stub board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOutcome {
    /// Command completes; board reports success and metrics become valid.
    Succeed,
    /// Command completes; board reports failure.
    Fail,
    /// Command completes; board reports a bus fault.
    BusFault,
    /// The command itself is rejected with a non-zero status.
    Reject,
}

impl CalibrationOutcome {
    fn final_status(self) -> Option<CalibrationStatus> {
        match self {
            Self::Succeed => Some(CalibrationStatus::CalibrationSucceeded),
            Self::Fail => Some(CalibrationStatus::CalibrationFailed),
            Self::BusFault => Some(CalibrationStatus::CommunicationError),
            Self::Reject => None,
        }
    }
}

/// One recorded `fill_random` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireRequest {
    /// Driver index the request addressed.
    pub board: u16,
    /// Requested transfer size in 32-bit words.
    pub words: usize,
}

struct BoardState {
    id: u16,
    words: Vec<u32>,
    cursor: usize,
    status: CalibrationStatus,
    outcome: CalibrationOutcome,
    q_factor: f32,
    min_entropy: f32,
    fail_fill: bool,
    fail_status: bool,
    fail_quality: bool,
    in_call: bool,
}

impl BoardState {
    fn new(id: u16) -> Self {
        Self {
            id,
            // Deterministic per-board pattern so tests can predict output.
            words: (0..512).map(|i| (u32::from(id) << 16) ^ i).collect(),
            cursor: 0,
            status: CalibrationStatus::Default,
            outcome: CalibrationOutcome::Succeed,
            q_factor: 0.0,
            min_entropy: 0.0,
            fail_fill: false,
            fail_status: false,
            fail_quality: false,
            in_call: false,
        }
    }
}

struct Inner {
    boards: Vec<BoardState>,
    requests: Vec<AcquireRequest>,
    violations: u64,
    call_delay: Duration,
    enumeration_fault: bool,
}

/// Scriptable in-memory [`QrngDriver`].
pub struct StubDriver {
    inner: Mutex<Inner>,
}

impl StubDriver {
    /// Stub with no boards attached.
    pub fn new() -> Self {
        Self::with_boards(&[])
    }

    /// Stub with one board per id, in the given enumeration order.
    pub fn with_boards(ids: &[u16]) -> Self {
        Self {
            inner: Mutex::new(Inner {
                boards: ids.iter().map(|&id| BoardState::new(id)).collect(),
                requests: Vec::new(),
                violations: 0,
                call_delay: Duration::ZERO,
                enumeration_fault: false,
            }),
        }
    }

    /// Replace the attached board list, as a plug/unplug event would.
    pub fn set_boards(&self, ids: &[u16]) {
        let mut inner = self.inner.lock().unwrap();
        inner.boards = ids.iter().map(|&id| BoardState::new(id)).collect();
    }

    /// Override the word pattern board `index` cycles through.
    pub fn set_words(&self, index: u16, words: Vec<u32>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(board) = inner.boards.get_mut(index as usize) {
            board.words = words;
            board.cursor = 0;
        }
    }

    /// Set the status the board currently reports, e.g. to model a board
    /// that arrives pre-calibrated.
    pub fn set_status(&self, index: u16, status: CalibrationStatus) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(board) = inner.boards.get_mut(index as usize) {
            board.status = status;
        }
    }

    /// Script what the next calibration commands do to board `index`.
    pub fn set_outcome(&self, index: u16, outcome: CalibrationOutcome) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(board) = inner.boards.get_mut(index as usize) {
            board.outcome = outcome;
        }
    }

    /// Set the quality metrics the board reports once calibrated.
    pub fn set_quality(&self, index: u16, q_factor: f32, min_entropy: f32) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(board) = inner.boards.get_mut(index as usize) {
            board.q_factor = q_factor;
            board.min_entropy = min_entropy;
        }
    }

    /// Make `fill_random` on board `index` return a non-zero status.
    pub fn set_fill_failure(&self, index: u16, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(board) = inner.boards.get_mut(index as usize) {
            board.fail_fill = fail;
        }
    }

    /// Make status reads on board `index` return a non-zero status.
    pub fn set_status_failure(&self, index: u16, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(board) = inner.boards.get_mut(index as usize) {
            board.fail_status = fail;
        }
    }

    /// Make quality-metric reads on board `index` return a non-zero status.
    pub fn set_quality_failure(&self, index: u16, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(board) = inner.boards.get_mut(index as usize) {
            board.fail_quality = fail;
        }
    }

    /// Make enumeration calls fail, as a missing vendor library would.
    pub fn set_enumeration_fault(&self, fault: bool) {
        self.inner.lock().unwrap().enumeration_fault = fault;
    }

    /// Hold `fill_random` and `calibrate` for `delay`, so tests can
    /// observe which calls overlap.
    pub fn set_call_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().call_delay = delay;
    }

    /// Every recorded `fill_random` request, oldest first.
    pub fn requests(&self) -> Vec<AcquireRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Recorded transfer sizes for one board, oldest first.
    pub fn requests_for(&self, index: u16) -> Vec<usize> {
        self.inner
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.board == index)
            .map(|r| r.words)
            .collect()
    }

    /// Forget the recorded requests.
    pub fn clear_requests(&self) {
        self.inner.lock().unwrap().requests.clear();
    }

    /// Number of overlapping same-board calls observed so far.
    pub fn violations(&self) -> u64 {
        self.inner.lock().unwrap().violations
    }

    fn check_index(inner: &Inner, index: u16) -> Result<usize, DriverError> {
        let i = index as usize;
        if i < inner.boards.len() {
            Ok(i)
        } else {
            Err(DriverError::Status(-1))
        }
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl QrngDriver for StubDriver {
    fn enumerate(&self) -> Result<u16, DriverError> {
        let inner = self.inner.lock().unwrap();
        if inner.enumeration_fault {
            return Err(DriverError::Unavailable("enumeration fault".into()));
        }
        Ok(inner.boards.len() as u16)
    }

    fn board_ids(&self) -> Result<Vec<u16>, DriverError> {
        let inner = self.inner.lock().unwrap();
        if inner.enumeration_fault {
            return Err(DriverError::Unavailable("enumeration fault".into()));
        }
        Ok(inner.boards.iter().map(|b| b.id).collect())
    }

    fn fill_random(&self, index: u16, words: &mut [u32]) -> Result<(), DriverError> {
        let (pattern, delay) = {
            let mut inner = self.inner.lock().unwrap();
            let delay = inner.call_delay;
            let i = Self::check_index(&inner, index)?;
            if inner.boards[i].in_call {
                inner.violations += 1;
            }
            inner.boards[i].in_call = true;
            inner.requests.push(AcquireRequest {
                board: index,
                words: words.len(),
            });
            if inner.boards[i].fail_fill {
                inner.boards[i].in_call = false;
                return Err(DriverError::Status(-1));
            }
            let board = &mut inner.boards[i];
            let pattern: Vec<u32> = (0..words.len())
                .map(|_| {
                    if board.words.is_empty() {
                        return 0;
                    }
                    let w = board.words[board.cursor % board.words.len()];
                    board.cursor += 1;
                    w
                })
                .collect();
            (pattern, delay)
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        words.copy_from_slice(&pattern);

        let mut inner = self.inner.lock().unwrap();
        if let Some(board) = inner.boards.get_mut(index as usize) {
            board.in_call = false;
        }
        Ok(())
    }

    fn q_factor(&self, index: u16) -> Result<f32, DriverError> {
        let inner = self.inner.lock().unwrap();
        let i = Self::check_index(&inner, index)?;
        if inner.boards[i].fail_quality {
            return Err(DriverError::Status(-1));
        }
        Ok(inner.boards[i].q_factor)
    }

    fn min_entropy(&self, index: u16) -> Result<f32, DriverError> {
        let inner = self.inner.lock().unwrap();
        let i = Self::check_index(&inner, index)?;
        if inner.boards[i].fail_quality {
            return Err(DriverError::Status(-1));
        }
        Ok(inner.boards[i].min_entropy)
    }

    fn calibration_status(&self, index: u16) -> Result<CalibrationStatus, DriverError> {
        let inner = self.inner.lock().unwrap();
        let i = Self::check_index(&inner, index)?;
        if inner.boards[i].fail_status {
            return Err(DriverError::Status(-1));
        }
        Ok(inner.boards[i].status)
    }

    fn calibrate(&self, index: u16) -> Result<(), DriverError> {
        let (outcome, delay) = {
            let mut inner = self.inner.lock().unwrap();
            let delay = inner.call_delay;
            let i = Self::check_index(&inner, index)?;
            if inner.boards[i].in_call {
                inner.violations += 1;
            }
            inner.boards[i].in_call = true;
            let outcome = inner.boards[i].outcome;
            match outcome.final_status() {
                Some(_) => inner.boards[i].status = CalibrationStatus::Calibrating,
                None => {
                    inner.boards[i].in_call = false;
                    return Err(DriverError::Status(-1));
                }
            }
            (outcome, delay)
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(board) = inner.boards.get_mut(index as usize) {
            if let Some(status) = outcome.final_status() {
                board.status = status;
            }
            board.in_call = false;
        }
        Ok(())
    }
}
