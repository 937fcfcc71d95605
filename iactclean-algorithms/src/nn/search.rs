//! Candidate selection and group search.
//!
//! Candidates are valid pixels with a known arrival time and charge at or
//! above the pre-threshold. Groups of two to four connected candidates are
//! accepted when their time spread fits the class window at the charge of
//! their faintest pixel.

use iactclean_core::{CameraGeometry, CleaningResult, EventSignal, NnClass};

use super::calibration::NnCalibration;
use crate::state::CleaningState;

/// Time spread and lowest charge of a group; `None` if a time is missing.
fn spread_and_min_charge(
    time: &[Option<f64>],
    charge: &[f64],
    pixels: &[usize],
) -> Option<(f64, f64)> {
    let mut t_min = f64::INFINITY;
    let mut t_max = f64::NEG_INFINITY;
    let mut q_min = f64::INFINITY;
    for &p in pixels {
        let t = time[p]?;
        t_min = t_min.min(t);
        t_max = t_max.max(t);
        q_min = q_min.min(charge[p]);
    }
    Some((t_max - t_min, q_min))
}

/// Tags accepted pixels with the strictest class seen so far.
fn tag(result: &mut CleaningResult, pixels: &[usize], class: NnClass) {
    for &p in pixels {
        result.core[p] = true;
        result.nn_class[p] = Some(result.nn_class[p].map_or(class, |c| c.min(class)));
    }
}

/// Pixels adjacent to the pair's first ring, excluding the pair and that
/// ring. Written into `second` (cleared first).
fn pair_second_ring(
    geometry: &CameraGeometry,
    a: usize,
    b: usize,
    first: &mut Vec<usize>,
    second: &mut Vec<usize>,
) {
    first.clear();
    for &p in geometry.neighbors(a).iter().chain(geometry.neighbors(b)) {
        if p != a && p != b && !first.contains(&p) {
            first.push(p);
        }
    }
    second.clear();
    for &r in first.iter() {
        for &m in geometry.neighbors(r) {
            if m != a && m != b && !first.contains(&m) && !second.contains(&m) {
                second.push(m);
            }
        }
    }
}

/// Selects candidates and marks every pixel of an accepted group as core.
///
/// Candidate times are left in `state.work_time`. Returns the number of
/// core pixels.
pub(crate) fn accept_groups(
    calibration: &NnCalibration,
    geometry: &CameraGeometry,
    event: &EventSignal,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) -> usize {
    let n = geometry.len();
    let live = state.live_pixels();
    let pre_threshold = calibration.pre_threshold();
    let classes = calibration.classes();
    let cap = calibration.max_window_ns();
    let CleaningState {
        valid,
        visited: candidate,
        work_time,
        stack: first_ring,
        scratch: second_ring,
        ..
    } = state;

    for i in 0..n {
        let time = if valid[i] && event.charge[i] >= pre_threshold {
            event.time[i]
        } else {
            None
        };
        candidate[i] = time.is_some();
        work_time[i] = time;
    }
    let candidate: &[bool] = candidate;
    let work_time: &[Option<f64>] = work_time;

    let accepts = |class: NnClass, pixels: &[usize]| {
        spread_and_min_charge(work_time, &event.charge, pixels).is_some_and(|(spread, q_min)| {
            spread < calibration.group_window(class, q_min, live)
        })
    };

    for i in 0..n {
        if !candidate[i] {
            continue;
        }
        let neighbors = geometry.neighbors(i);

        for &j in neighbors {
            if j <= i || !candidate[j] {
                continue;
            }
            if classes.contains(NnClass::TwoNn) && accepts(NnClass::TwoNn, &[i, j]) {
                tag(result, &[i, j], NnClass::TwoNn);
            }
            if classes.contains(NnClass::TwoPlusOne) {
                pair_second_ring(geometry, i, j, first_ring, second_ring);
                for &m in second_ring.iter() {
                    let group = [i, j, m];
                    if candidate[m] && accepts(NnClass::TwoPlusOne, &group) {
                        tag(result, &group, NnClass::TwoPlusOne);
                    }
                }
            }
        }

        if !(classes.contains(NnClass::ThreeNn) || classes.contains(NnClass::FourNn)) {
            continue;
        }
        for (pos, &a) in neighbors.iter().enumerate() {
            if !candidate[a] {
                continue;
            }
            for &b in &neighbors[pos + 1..] {
                if !candidate[b] {
                    continue;
                }
                let triple = [i, a, b];
                let Some((spread, _)) = spread_and_min_charge(work_time, &event.charge, &triple)
                else {
                    continue;
                };
                if spread >= cap {
                    continue;
                }
                if classes.contains(NnClass::ThreeNn) && accepts(NnClass::ThreeNn, &triple) {
                    tag(result, &triple, NnClass::ThreeNn);
                }
                if !classes.contains(NnClass::FourNn) {
                    continue;
                }
                for &p in &triple {
                    for &d in geometry.neighbors(p) {
                        let quad = [i, a, b, d];
                        if candidate[d] && !triple.contains(&d) && accepts(NnClass::FourNn, &quad) {
                            tag(result, &quad, NnClass::FourNn);
                        }
                    }
                }
            }
        }
    }

    result.n_core()
}

#[cfg(test)]
mod tests {
    use super::*;
    use iactclean_core::{IprCurve, NnClassSet, NnParams};

    fn calibration(geometry: &CameraGeometry, classes: &[NnClass]) -> NnCalibration {
        let curve = IprCurve::new(
            vec![0.0, 5.0, 10.0, 15.0, 20.0],
            vec![1e8, 1e6, 1e4, 1e2, 1.0],
        )
        .unwrap();
        let params = NnParams::default().with_classes(NnClassSet::only(classes));
        NnCalibration::build(geometry, curve, &params).unwrap()
    }

    fn run(
        calibration: &NnCalibration,
        geometry: &CameraGeometry,
        event: &EventSignal,
    ) -> CleaningResult {
        let mut state = CleaningState::new();
        state.prepare(geometry, event);
        let mut result = CleaningResult::new(geometry.len());
        accept_groups(calibration, geometry, event, &mut state, &mut result);
        result
    }

    #[test]
    fn test_pair_second_ring_excludes_first_ring() {
        let geometry = CameraGeometry::hexagonal(1, 3, 1.0);
        let a = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let b = geometry.nearest_pixel(1.0, 0.0).unwrap();
        let (mut first, mut second) = (Vec::new(), Vec::new());
        pair_second_ring(&geometry, a, b, &mut first, &mut second);

        assert_eq!(first.len(), 8);
        assert!(!second.is_empty());
        for &m in &second {
            assert!(!geometry.are_neighbors(a, m) && !geometry.are_neighbors(b, m));
        }
        assert!(second.contains(&geometry.nearest_pixel(3.0, 0.0).unwrap()));
    }

    #[test]
    fn test_bright_pair_accepted() {
        let geometry = CameraGeometry::hexagonal(1, 4, 1.0);
        let calibration = calibration(&geometry, &[NnClass::TwoNn]);
        let a = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let b = geometry.nearest_pixel(1.0, 0.0).unwrap();
        let mut event = EventSignal::new(geometry.len());
        event.set_pixel(a, 30.0, Some(10.0));
        event.set_pixel(b, 30.0, Some(11.0));

        let result = run(&calibration, &geometry, &event);
        assert!(result.core[a] && result.core[b]);
        assert_eq!(result.nn_class[a], Some(NnClass::TwoNn));
        assert_eq!(result.n_core(), 2);
    }

    #[test]
    fn test_faint_pair_needs_tight_timing() {
        let geometry = CameraGeometry::hexagonal(1, 4, 1.0);
        let calibration = calibration(&geometry, &[NnClass::TwoNn]);
        let a = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let b = geometry.nearest_pixel(1.0, 0.0).unwrap();
        let mut event = EventSignal::new(geometry.len());
        // window at q = 6 is roughly 2.5 ns
        event.set_pixel(a, 6.0, Some(10.0));
        event.set_pixel(b, 6.0, Some(15.0));
        assert!(run(&calibration, &geometry, &event).has_no_image());

        event.set_pixel(b, 6.0, Some(10.5));
        assert_eq!(run(&calibration, &geometry, &event).n_core(), 2);
    }

    #[test]
    fn test_strictest_class_wins() {
        let geometry = CameraGeometry::hexagonal(1, 4, 1.0);
        let calibration = calibration(&geometry, &NnClass::ALL);
        let a = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let b = geometry.nearest_pixel(1.0, 0.0).unwrap();
        let c = geometry.nearest_pixel(-1.0, 0.0).unwrap();
        let mut event = EventSignal::new(geometry.len());
        event.set_pixel(a, 30.0, Some(10.0));
        event.set_pixel(b, 30.0, Some(10.0));
        event.set_pixel(c, 30.0, Some(10.0));

        let result = run(&calibration, &geometry, &event);
        for p in [a, b, c] {
            assert_eq!(result.nn_class[p], Some(NnClass::TwoNn));
        }
    }

    #[test]
    fn test_isolated_candidates_not_accepted() {
        let geometry = CameraGeometry::hexagonal(1, 4, 1.0);
        let calibration = calibration(&geometry, &NnClass::ALL);
        let a = geometry.nearest_pixel(-3.0, 0.0).unwrap();
        let b = geometry.nearest_pixel(3.0, 0.0).unwrap();
        let mut event = EventSignal::new(geometry.len());
        event.set_pixel(a, 50.0, Some(10.0));
        event.set_pixel(b, 50.0, Some(10.0));
        assert!(run(&calibration, &geometry, &event).has_no_image());
    }
}
