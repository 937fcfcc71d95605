//! Batch helpers that clean many independent events.

use iactclean_core::{CameraGeometry, CleaningResult, CleaningStatistics, EventSignal, Result};
use rayon::prelude::*;

use crate::engine::ImageCleaner;

/// Cleans events of one camera in parallel, one state per worker.
///
/// Results keep the order of `events`.
///
/// # Errors
/// Returns the first error of any event.
pub fn clean_events(
    cleaner: &ImageCleaner,
    geometry: &CameraGeometry,
    events: &[EventSignal],
) -> Result<Vec<CleaningResult>> {
    events
        .par_iter()
        .map_init(
            || cleaner.create_state(),
            |state, event| cleaner.clean(geometry, event, state),
        )
        .collect()
}

/// Cleans events one after another with a single state.
///
/// # Errors
/// Returns the first error of any event.
pub fn clean_events_sequential(
    cleaner: &ImageCleaner,
    geometry: &CameraGeometry,
    events: &[EventSignal],
) -> Result<Vec<CleaningResult>> {
    let mut state = cleaner.create_state();
    events
        .iter()
        .map(|event| cleaner.clean(geometry, event, &mut state))
        .collect()
}

/// Cleans events in parallel and summarizes the results.
///
/// # Errors
/// Returns the first error of any event.
pub fn clean_and_summarize(
    cleaner: &ImageCleaner,
    geometry: &CameraGeometry,
    events: &[EventSignal],
) -> Result<(Vec<CleaningResult>, CleaningStatistics)> {
    let results = clean_events(cleaner, geometry, events)?;
    let stats = results.iter().collect();
    Ok((results, stats))
}
