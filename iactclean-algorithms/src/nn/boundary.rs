//! Boundary search in rings around the accepted core.

use iactclean_core::{CameraGeometry, CleaningResult, EventSignal};

use super::calibration::NnCalibration;
use crate::state::CleaningState;

const CORE_RING: u32 = 1;

/// Promotes ring pixels whose time matches an accepted neighbor closely
/// enough for their charge.
///
/// Rings are visited outward; a pixel may only lean on core pixels and on
/// boundary pixels of an inner ring. Returns the number of promoted pixels.
pub(crate) fn promote_boundary(
    calibration: &NnCalibration,
    rings: usize,
    geometry: &CameraGeometry,
    event: &EventSignal,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) -> usize {
    let CleaningState {
        valid,
        slot: ring,
        work_time,
        stack: order,
        ..
    } = state;

    // breadth-first ring numbering through every pixel, core = 1
    order.clear();
    for i in 0..geometry.len() {
        ring[i] = 0;
        if result.core[i] {
            ring[i] = CORE_RING;
            order.push(i);
        }
    }
    let n_core = order.len();
    let max_ring = u32::try_from(rings).unwrap_or(u32::MAX - 1);
    let mut head = 0;
    while head < order.len() {
        let p = order[head];
        head += 1;
        if ring[p] > max_ring {
            continue;
        }
        for &j in geometry.neighbors(p) {
            if ring[j] == 0 {
                ring[j] = ring[p] + 1;
                order.push(j);
            }
        }
    }

    let search_pixels = order[n_core..].iter().filter(|&&p| valid[p]).count();
    let mut promoted = 0;
    for &p in &order[n_core..] {
        if !valid[p] {
            continue;
        }
        let Some(t) = event.ring_or_arrival_time(p) else {
            continue;
        };
        let dt = geometry
            .neighbors(p)
            .iter()
            .filter(|&&j| result.core[j] || (result.border[j] && ring[j] < ring[p]))
            .filter_map(|&j| work_time[j])
            .map(|tj| (t - tj).abs())
            .fold(f64::INFINITY, f64::min);
        if !dt.is_finite() {
            continue;
        }
        let promote = calibration
            .min_boundary_charge(dt, search_pixels)
            .is_some_and(|q_min| event.charge[p] >= q_min);
        if promote {
            result.border[p] = true;
            work_time[p] = Some(t);
            promoted += 1;
        }
    }
    promoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use iactclean_core::{IprCurve, NnParams};

    fn setup(boundary_probability: f64) -> (CameraGeometry, NnCalibration) {
        let geometry = CameraGeometry::hexagonal(1, 4, 1.0);
        let curve = IprCurve::new(
            vec![0.0, 5.0, 10.0, 15.0, 20.0],
            vec![1e8, 1e6, 1e4, 1e2, 1.0],
        )
        .unwrap();
        let params = NnParams::default().with_boundary_probability(boundary_probability);
        let calibration = NnCalibration::build(&geometry, curve, &params).unwrap();
        (geometry, calibration)
    }

    fn run(
        calibration: &NnCalibration,
        geometry: &CameraGeometry,
        event: &EventSignal,
        core: &[usize],
    ) -> CleaningResult {
        let mut state = CleaningState::new();
        state.prepare(geometry, event);
        let mut result = CleaningResult::new(geometry.len());
        for &c in core {
            result.core[c] = true;
            state.work_time[c] = event.time[c];
        }
        promote_boundary(calibration, 2, geometry, event, &mut state, &mut result);
        result
    }

    #[test]
    fn test_in_time_neighbor_promoted() {
        let (geometry, calibration) = setup(0.5);
        let core = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let side = geometry.nearest_pixel(1.0, 0.0).unwrap();
        let mut event = EventSignal::new(geometry.len());
        event.set_pixel(core, 40.0, Some(10.0));
        event.set_pixel(side, 4.0, Some(10.5));

        let result = run(&calibration, &geometry, &event, &[core]);
        assert!(result.border[side]);

        event.set_pixel(side, 4.0, Some(20.0));
        let result = run(&calibration, &geometry, &event, &[core]);
        assert!(!result.border[side]);
    }

    #[test]
    fn test_second_ring_leans_on_first() {
        let (geometry, calibration) = setup(0.5);
        let core = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let inner = geometry.nearest_pixel(1.0, 0.0).unwrap();
        let outer = geometry.nearest_pixel(2.0, 0.0).unwrap();
        let beyond = geometry.nearest_pixel(3.0, 0.0).unwrap();
        let mut event = EventSignal::new(geometry.len());
        event.set_pixel(core, 40.0, Some(10.0));
        event.set_pixel(inner, 4.0, Some(10.5));
        event.set_pixel(outer, 4.0, Some(11.0));
        event.set_pixel(beyond, 4.0, Some(11.0));

        let result = run(&calibration, &geometry, &event, &[core]);
        assert!(result.border[inner] && result.border[outer]);
        assert!(!result.border[beyond], "only two rings are searched");
    }

    #[test]
    fn test_ring_time_preferred() {
        let (geometry, calibration) = setup(0.5);
        let core = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let side = geometry.nearest_pixel(1.0, 0.0).unwrap();
        let mut event = EventSignal::new(geometry.len());
        event.set_pixel(core, 40.0, Some(10.0));
        event.set_pixel(side, 4.0, Some(30.0));
        let mut ring_time = vec![None; geometry.len()];
        ring_time[side] = Some(10.2);
        event.ring_time = Some(ring_time);

        let result = run(&calibration, &geometry, &event, &[core]);
        assert!(result.border[side]);
    }
}
