//! Time-cluster cleaning.
//!
//! Pixels above the core threshold are grouped into clusters of
//! time-coincident neighbors. Clusters whose mean time does not match the
//! brightest cluster (allowing for the shower time gradient) are rejected,
//! border pixels are grown around the survivors, touching clusters merged
//! and small clusters pruned.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use iactclean_core::{
    CameraGeometry, CleaningResult, EventSignal, TimeClusterParams, TimeGradientHint,
    REJECTED_CLUSTER,
};
use log::debug;

use crate::cluster::{collect_stats, largest_cluster, ClusterStats};
use crate::state::CleaningState;
use crate::tailcut::{mark_bright, pixel_threshold};
use crate::union_find::UnionFind;

/// Whether a cluster's time offset from the main cluster is acceptable.
fn time_offset_allowed(
    params: &TimeClusterParams,
    hint: Option<TimeGradientHint>,
    cluster: &ClusterStats,
    main: &ClusterStats,
) -> bool {
    let (Some(t), Some(t_main)) = (cluster.mean_time(), main.mean_time()) else {
        return true;
    };
    let (x, y) = cluster.centroid();
    let (x_main, y_main) = main.centroid();
    let (dx, dy) = (x - x_main, y - y_main);
    let dt = t - t_main;

    match hint {
        Some(hint) => {
            let along_axis = dx * hint.axis_angle.cos() + dy * hint.axis_angle.sin();
            (dt - hint.gradient * along_axis).abs() <= params.cluster_time_cut
        }
        None => dt.abs() <= params.cluster_time_cut + params.default_time_gradient * dx.hypot(dy),
    }
}

fn reject_cluster(result: &mut CleaningResult, id: i32) {
    for i in 0..result.len() {
        if result.cluster_id[i] == id {
            result.clear_pixel(i);
            result.cluster_id[i] = REJECTED_CLUSTER;
        }
    }
}

/// Time-cluster cleaning.
#[allow(clippy::too_many_lines)]
pub(crate) fn clean_time_cluster(
    params: &TimeClusterParams,
    geometry: &CameraGeometry,
    event: &EventSignal,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) {
    let levels = &params.levels;
    let n = geometry.len();
    let CleaningState {
        valid,
        snapshot,
        stack,
        scratch,
        ..
    } = state;

    let seed_level = |i: usize| {
        valid[i]
            && event.time[i].is_some()
            && event.charge[i] > pixel_threshold(levels, levels.core_threshold, event, i)
    };

    // seeds, brightest first
    scratch.clear();
    scratch.extend((0..n).filter(|&i| seed_level(i)));
    scratch.sort_by(|&a, &b| event.charge[b].total_cmp(&event.charge[a]).then(a.cmp(&b)));

    let mut n_clusters = 0usize;
    for &seed in scratch.iter() {
        if result.cluster_id[seed] != 0 {
            continue;
        }
        let Some(t_seed) = event.time[seed] else {
            continue;
        };
        n_clusters += 1;
        let id = n_clusters as i32;

        result.cluster_id[seed] = id;
        result.core[seed] = true;
        stack.clear();
        stack.push(seed);
        while let Some(i) = stack.pop() {
            for &j in geometry.neighbors(i) {
                if result.cluster_id[j] == 0
                    && seed_level(j)
                    && event.time[j].is_some_and(|t| (t - t_seed).abs() < params.pixel_time_cut)
                {
                    result.cluster_id[j] = id;
                    result.core[j] = true;
                    stack.push(j);
                }
            }
        }
    }

    if n_clusters == 0 {
        mark_bright(levels, event, valid, result);
        return;
    }

    // time consistency with the main cluster
    let stats = collect_stats(geometry, event, result, n_clusters);
    if let Some(main) = largest_cluster(&stats) {
        let mut rejected = 0;
        for (k, cluster) in stats.iter().enumerate() {
            if k != main
                && !time_offset_allowed(params, event.time_gradient, cluster, &stats[main])
            {
                reject_cluster(result, k as i32 + 1);
                rejected += 1;
            }
        }
        if rejected > 0 {
            debug!("time-cluster: rejected {rejected} of {n_clusters} clusters by time offset");
        }
    }

    // border passes, each against the image of the previous pass
    for _ in 0..params.border_loops {
        for i in 0..n {
            snapshot[i] = result.is_image(i);
        }
        let mut added = 0;
        for i in 0..n {
            if !valid[i]
                || snapshot[i]
                || result.cluster_id[i] == REJECTED_CLUSTER
                || event.charge[i] <= pixel_threshold(levels, levels.border_threshold, event, i)
            {
                continue;
            }
            let Some(t) = event.time[i] else {
                continue;
            };
            let mut best: Option<(f64, usize)> = None;
            for &j in geometry.neighbors(i) {
                if !snapshot[j] || result.cluster_id[j] <= 0 {
                    continue;
                }
                if let Some(tj) = event.time[j] {
                    let dt = (t - tj).abs();
                    if dt < params.pixel_time_cut && best.is_none_or(|(b, _)| dt < b) {
                        best = Some((dt, j));
                    }
                }
            }
            if let Some((_, j)) = best {
                result.border[i] = true;
                result.cluster_id[i] = result.cluster_id[j];
                added += 1;
            }
        }
        if added == 0 {
            break;
        }
    }

    // merge touching clusters
    let mut uf = UnionFind::new(n_clusters + 1);
    for i in 0..n {
        let a = result.cluster_id[i];
        if a <= 0 || !result.is_image(i) {
            continue;
        }
        for &j in geometry.neighbors(i) {
            let b = result.cluster_id[j];
            if b > 0 && b != a && result.is_image(j) {
                uf.union(a as usize, b as usize);
            }
        }
    }
    for i in 0..n {
        let id = result.cluster_id[i];
        if id > 0 {
            result.cluster_id[i] = uf.find(id as usize) as i32;
        }
    }

    // prune small clusters
    let stats = collect_stats(geometry, event, result, n_clusters);
    for (k, cluster) in stats.iter().enumerate() {
        if cluster.n_pixels > 0 && cluster.n_pixels < params.min_cluster_pixels {
            reject_cluster(result, k as i32 + 1);
        }
    }

    // demote isolated core pixels lacking support
    for i in 0..n {
        snapshot[i] = result.is_image(i);
    }
    for i in 0..n {
        if !result.core[i] || geometry.neighbors(i).iter().any(|&j| result.core[j]) {
            continue;
        }
        let support = geometry
            .neighbors(i)
            .iter()
            .filter(|&&j| {
                result.border[j]
                    || (!event.is_alive(j)
                        && geometry
                            .neighbors(j)
                            .iter()
                            .any(|&k| k != i && snapshot[k]))
            })
            .count();
        if support < 2 {
            result.core[i] = false;
            result.cluster_id[i] = REJECTED_CLUSTER;
        }
    }
    let stats = collect_stats(geometry, event, result, n_clusters);
    for (k, cluster) in stats.iter().enumerate() {
        if cluster.n_pixels > 0 && cluster.n_core == 0 {
            reject_cluster(result, k as i32 + 1);
        }
    }

    mark_bright(levels, event, valid, result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use iactclean_core::TwoLevelParams;

    fn params() -> TimeClusterParams {
        TimeClusterParams {
            levels: TwoLevelParams::fixed(10.0, 4.0),
            pixel_time_cut: 2.0,
            cluster_time_cut: 5.0,
            min_cluster_pixels: 1,
            border_loops: 2,
            default_time_gradient: 10.0,
        }
    }

    fn run(
        params: &TimeClusterParams,
        geometry: &CameraGeometry,
        event: &EventSignal,
    ) -> CleaningResult {
        let mut state = CleaningState::new();
        state.prepare(geometry, event);
        let mut result = CleaningResult::new(geometry.len());
        clean_time_cluster(params, geometry, event, &mut state, &mut result);
        result
    }

    /// Center pixel and its six neighbors lit at `time`.
    fn light_flower(geometry: &CameraGeometry, event: &mut EventSignal, x: f64, y: f64, time: f64) {
        let center = geometry.nearest_pixel(x, y).unwrap();
        event.set_pixel(center, 50.0, Some(time));
        for &j in geometry.neighbors(center) {
            event.set_pixel(j, 30.0, Some(time));
        }
    }

    #[test]
    fn test_out_of_time_cluster_rejected() {
        let geometry = CameraGeometry::hexagonal(1, 5, 1.0);
        let mut event = EventSignal::new(geometry.len());
        light_flower(&geometry, &mut event, 0.0, 0.0, 10.0);
        let stray = geometry.nearest_pixel(4.0, 0.0).unwrap();
        event.set_pixel(stray, 20.0, Some(80.0));

        let result = run(&params(), &geometry, &event);
        assert_eq!(result.n_core(), 7);
        assert_eq!(result.cluster_id[stray], REJECTED_CLUSTER);
        assert!(!result.is_image(stray));
    }

    #[test]
    fn test_in_time_cluster_kept() {
        let geometry = CameraGeometry::hexagonal(1, 5, 1.0);
        let mut event = EventSignal::new(geometry.len());
        light_flower(&geometry, &mut event, 0.0, 0.0, 10.0);
        let stray = geometry.nearest_pixel(4.0, 0.0).unwrap();
        let partner = geometry.nearest_pixel(5.0, 0.0).unwrap();
        // 4.5 units away: allowed offset 5 + 10 * 4.5
        event.set_pixel(stray, 20.0, Some(40.0));
        event.set_pixel(partner, 20.0, Some(40.0));

        let result = run(&params(), &geometry, &event);
        assert!(result.core[stray] && result.core[partner]);
        let center = geometry.nearest_pixel(0.0, 0.0).unwrap();
        assert_ne!(result.cluster_id[stray], result.cluster_id[center]);
    }

    #[test]
    fn test_time_gradient_hint() {
        let geometry = CameraGeometry::hexagonal(1, 5, 1.0);
        let mut early = EventSignal::new(geometry.len());
        light_flower(&geometry, &mut early, 0.0, 0.0, 10.0);
        let stray = geometry.nearest_pixel(3.0, 0.0).unwrap();
        let partner = geometry.nearest_pixel(4.0, 0.0).unwrap();
        early.time_gradient = Some(TimeGradientHint {
            gradient: 5.0,
            axis_angle: 0.0,
        });
        let mut late = early.clone();

        // expected offset 5 * 3.5 = 17.5 after the main cluster
        for pixel in [stray, partner] {
            early.set_pixel(pixel, 20.0, Some(27.0));
            late.set_pixel(pixel, 20.0, Some(-7.0));
        }

        assert!(run(&params(), &geometry, &early).core[stray]);
        assert!(!run(&params(), &geometry, &late).core[stray]);
    }

    #[test]
    fn test_border_loops_grow_one_ring_per_pass() {
        let geometry = CameraGeometry::hexagonal(1, 5, 1.0);
        let mut event = EventSignal::new(geometry.len());
        light_flower(&geometry, &mut event, 0.0, 0.0, 10.0);
        let ring2 = geometry.nearest_pixel(2.0, 0.0).unwrap();
        let ring3 = geometry.nearest_pixel(3.0, 0.0).unwrap();
        event.set_pixel(ring2, 6.0, Some(10.5));
        event.set_pixel(ring3, 6.0, Some(11.0));

        let one = run(&params().with_border_loops(1), &geometry, &event);
        assert!(one.border[ring2]);
        assert!(!one.border[ring3]);

        let two = run(&params().with_border_loops(2), &geometry, &event);
        assert!(two.border[ring3]);
        assert_eq!(two.cluster_id[ring3], two.cluster_id[ring2]);
    }

    #[test]
    fn test_touching_clusters_merge_before_pruning() {
        let geometry = CameraGeometry::hexagonal(1, 3, 1.0);
        let a = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let b = geometry.neighbors(a)[0];
        let mut event = EventSignal::new(geometry.len());
        // too far apart in time to grow into one cluster, close enough to
        // pass the cluster time cut
        event.set_pixel(a, 40.0, Some(10.0));
        event.set_pixel(b, 30.0, Some(13.0));
        for &j in geometry.neighbors(a).iter().chain(geometry.neighbors(b)) {
            if j != a && j != b {
                event.set_pixel(j, 5.0, Some(11.5));
            }
        }

        let params = params().with_min_cluster_pixels(2);
        let result = run(&params, &geometry, &event);
        assert!(result.core[a] && result.core[b]);
        assert_eq!(result.cluster_id[a], result.cluster_id[b]);
    }

    #[test]
    fn test_isolated_core_needs_two_supporting_borders() {
        let geometry = CameraGeometry::hexagonal(1, 3, 1.0);
        let center = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let neighbors = geometry.neighbors(center).to_vec();

        let mut event = EventSignal::new(geometry.len());
        event.set_pixel(center, 40.0, Some(10.0));
        event.set_pixel(neighbors[0], 6.0, Some(10.0));
        let params = params().with_min_cluster_pixels(2);
        assert!(run(&params, &geometry, &event).has_no_image());

        event.set_pixel(neighbors[3], 6.0, Some(10.0));
        let result = run(&params, &geometry, &event);
        assert!(result.core[center]);
        assert_eq!(result.n_border(), 2);
    }

    #[test]
    fn test_two_pixel_island_pruned() {
        let geometry = CameraGeometry::hexagonal(1, 3, 1.0);
        let a = geometry.nearest_pixel(0.0, 0.0).unwrap();
        let b = geometry.neighbors(a)[0];
        let mut event = EventSignal::new(geometry.len());
        event.set_pixel(a, 100.0, Some(10.0));
        event.set_pixel(b, 100.0, Some(10.0));

        let result = run(&params().with_min_cluster_pixels(3), &geometry, &event);
        assert!(result.has_no_image());
        assert_eq!(result.cluster_id[a], REJECTED_CLUSTER);
    }
}
