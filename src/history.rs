use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{LinkError, LinkResult};
use crate::types::SensorSnapshot;

pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

/// Bounded FIFO of recent telemetry shared by every session.
///
/// All access goes through one lock, so an append and the
/// (latest, previous) read that follows it can be taken as a single unit
/// with [`TelemetryHistory::append_and_window`].
pub struct TelemetryHistory {
    /// Maximum number of retained snapshots
    capacity: usize,
    window: Mutex<VecDeque<SensorSnapshot>>,
}

impl TelemetryHistory {
    /// Create an empty history. A capacity of 0 is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a snapshot, evicting the oldest entry when full.
    pub fn append(&self, snapshot: SensorSnapshot) {
        let mut window = self.window.lock();
        Self::push_bounded(&mut window, self.capacity, snapshot);
    }

    /// Append and return the resulting `(latest, previous_or_latest)` pair
    /// under the same lock acquisition.
    pub fn append_and_window(&self, snapshot: SensorSnapshot) -> (SensorSnapshot, SensorSnapshot) {
        let mut window = self.window.lock();
        Self::push_bounded(&mut window, self.capacity, snapshot);
        // non-empty: we just pushed
        let latest = window[window.len() - 1];
        let previous = Self::previous_in(&window).unwrap_or(latest);
        (latest, previous)
    }

    pub fn latest(&self) -> LinkResult<SensorSnapshot> {
        self.window.lock().back().copied().ok_or(LinkError::HistoryEmpty)
    }

    /// Second most recent snapshot, or the latest one when fewer than two
    /// are retained. On the first sample every delta is therefore zero.
    pub fn previous_or_latest(&self) -> LinkResult<SensorSnapshot> {
        let window = self.window.lock();
        let latest = window.back().copied().ok_or(LinkError::HistoryEmpty)?;
        Ok(Self::previous_in(&window).unwrap_or(latest))
    }

    /// Copy of the retained snapshots, oldest first.
    pub fn snapshot(&self) -> Vec<SensorSnapshot> {
        self.window.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.window.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn push_bounded(window: &mut VecDeque<SensorSnapshot>, capacity: usize, snapshot: SensorSnapshot) {
        if window.len() >= capacity {
            window.pop_front();
        }
        window.push_back(snapshot);
    }

    fn previous_in(window: &VecDeque<SensorSnapshot>) -> Option<SensorSnapshot> {
        if window.len() >= 2 {
            Some(window[window.len() - 2])
        } else {
            None
        }
    }
}

impl Default for TelemetryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
