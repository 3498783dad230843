//! Clip cached per-location series to the window the caller is viewing.

use crate::model::{LocationSeries, TimeWindow};

/// Copy of `series` keeping samples with `start <= ts <= end`.
/// Locations without visible samples are kept (empty) so callers still see
/// every selected location.
pub fn filter_to_window(series: &[LocationSeries], window: &TimeWindow) -> Vec<LocationSeries> {
    series
        .iter()
        .map(|loc| LocationSeries {
            id: loc.id.clone(),
            name: loc.name.clone(),
            samples: loc
                .samples
                .iter()
                .filter(|s| window.contains_inclusive(s.timestamp))
                .cloned()
                .collect(),
        })
        .collect()
}
