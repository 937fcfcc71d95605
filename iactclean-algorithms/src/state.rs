//! Reusable per-event working buffers.

use iactclean_core::{CameraGeometry, EventSignal};

/// Working buffers of one cleaning worker.
///
/// Buffers are sized to the pixel count on first use and only reset for
/// later events. A state must not be shared between threads; create one per
/// worker with [`crate::ImageCleaner::create_state`].
#[derive(Debug, Default)]
pub struct CleaningState {
    /// Pixel is analysis-valid and alive in the current event.
    pub(crate) valid: Vec<bool>,
    /// Generic visited flags.
    pub(crate) visited: Vec<bool>,
    /// Snapshot of a selection taken before an in-place pass.
    pub(crate) snapshot: Vec<bool>,
    /// Per-pixel integer scratch (ring distance, cluster slot, ...).
    pub(crate) slot: Vec<u32>,
    /// Times used by the current pass.
    pub(crate) work_time: Vec<Option<f64>>,
    /// Traversal stack.
    pub(crate) stack: Vec<usize>,
    /// Index scratch.
    pub(crate) scratch: Vec<usize>,
    n_pixels: usize,
    events_processed: usize,
}

impl CleaningState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state with buffers sized for `n_pixels`.
    #[must_use]
    pub fn with_capacity(n_pixels: usize) -> Self {
        Self {
            valid: Vec::with_capacity(n_pixels),
            visited: Vec::with_capacity(n_pixels),
            snapshot: Vec::with_capacity(n_pixels),
            slot: Vec::with_capacity(n_pixels),
            work_time: Vec::with_capacity(n_pixels),
            stack: Vec::with_capacity(64),
            scratch: Vec::with_capacity(64),
            n_pixels: 0,
            events_processed: 0,
        }
    }

    /// Resets the buffers for a new event.
    pub(crate) fn prepare(&mut self, geometry: &CameraGeometry, event: &EventSignal) {
        let n = geometry.len();
        self.n_pixels = n;

        self.valid.clear();
        self.valid
            .extend((0..n).map(|i| geometry.is_analysis_valid(i) && event.is_alive(i)));
        self.clear_visited();
        self.snapshot.clear();
        self.snapshot.resize(n, false);
        self.slot.clear();
        self.slot.resize(n, 0);
        self.work_time.clear();
        self.work_time.resize(n, None);
        self.stack.clear();
        self.scratch.clear();

        self.events_processed += 1;
    }

    /// Clears the visited flags.
    pub(crate) fn clear_visited(&mut self) {
        self.visited.clear();
        self.visited.resize(self.n_pixels, false);
    }

    /// Number of valid pixels in the current event.
    #[must_use]
    pub fn live_pixels(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Events prepared with this state so far.
    #[must_use]
    pub fn events_processed(&self) -> usize {
        self.events_processed
    }

    /// Pixel count of the current event.
    #[must_use]
    pub fn n_pixels(&self) -> usize {
        self.n_pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_marks_valid_pixels() {
        let geometry = CameraGeometry::hexagonal(1, 1, 1.0).with_invalid_pixels(&[0]);
        let event = EventSignal::new(geometry.len()).with_dead_pixels(&[1]);
        let mut state = CleaningState::with_capacity(geometry.len());
        state.prepare(&geometry, &event);

        assert_eq!(state.n_pixels(), 7);
        assert_eq!(state.live_pixels(), 5);
        assert!(!state.valid[0]);
        assert!(!state.valid[1]);
        assert_eq!(state.events_processed(), 1);
    }

    #[test]
    fn test_prepare_resets_scratch() {
        let geometry = CameraGeometry::hexagonal(1, 1, 1.0);
        let event = EventSignal::new(geometry.len());
        let mut state = CleaningState::new();
        state.prepare(&geometry, &event);
        state.visited[3] = true;
        state.slot[2] = 9;
        state.prepare(&geometry, &event);
        assert!(state.visited.iter().all(|&v| !v));
        assert!(state.slot.iter().all(|&s| s == 0));
        assert_eq!(state.events_processed(), 2);
    }
}
