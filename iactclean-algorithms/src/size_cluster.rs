//! Size-based cluster cleaning.
//!
//! Connected groups of pixels above the core threshold are kept when they
//! are large enough in charge and pixel count; only the brightest
//! `max_clusters` survive. No timing is used.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use iactclean_core::{
    CameraGeometry, CleaningResult, EventSignal, SizeClusterParams, REJECTED_CLUSTER,
};
use log::debug;

use crate::cluster::collect_stats;
use crate::state::CleaningState;
use crate::tailcut::{mark_bright, pixel_threshold};

/// Size-based cluster cleaning.
pub(crate) fn clean_size_cluster(
    params: &SizeClusterParams,
    geometry: &CameraGeometry,
    event: &EventSignal,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) {
    let levels = &params.levels;
    let n = geometry.len();
    let CleaningState { valid, stack, .. } = state;

    let seed_level = |i: usize| {
        valid[i] && event.charge[i] > pixel_threshold(levels, levels.core_threshold, event, i)
    };

    let mut n_clusters = 0usize;
    for seed in 0..n {
        if result.cluster_id[seed] != 0 || !seed_level(seed) {
            continue;
        }
        n_clusters += 1;
        let id = n_clusters as i32;
        result.cluster_id[seed] = id;
        result.core[seed] = true;
        stack.clear();
        stack.push(seed);
        while let Some(i) = stack.pop() {
            for &j in geometry.neighbors(i) {
                if result.cluster_id[j] == 0 && seed_level(j) {
                    result.cluster_id[j] = id;
                    result.core[j] = true;
                    stack.push(j);
                }
            }
        }
    }

    let stats = collect_stats(geometry, event, result, n_clusters);
    let mut survivors: Vec<usize> = (0..n_clusters)
        .filter(|&k| {
            stats[k].charge >= params.min_cluster_charge
                && stats[k].n_pixels >= params.min_cluster_pixels
        })
        .collect();
    survivors.sort_by(|&a, &b| stats[b].charge.total_cmp(&stats[a].charge).then(a.cmp(&b)));
    if survivors.len() > params.max_clusters {
        debug!(
            "size-cluster: keeping {} of {} clusters",
            params.max_clusters,
            survivors.len()
        );
        survivors.truncate(params.max_clusters);
    }

    let mut keep = vec![false; n_clusters];
    for &k in &survivors {
        keep[k] = true;
    }
    for i in 0..n {
        let id = result.cluster_id[i];
        if id > 0 && !keep[id as usize - 1] {
            result.clear_pixel(i);
            result.cluster_id[i] = REJECTED_CLUSTER;
        }
    }

    for i in 0..n {
        if !result.core[i] {
            continue;
        }
        let id = result.cluster_id[i];
        for &j in geometry.neighbors(i) {
            if valid[j]
                && !result.is_image(j)
                && result.cluster_id[j] != REJECTED_CLUSTER
                && event.charge[j] > pixel_threshold(levels, levels.border_threshold, event, j)
            {
                result.border[j] = true;
                result.cluster_id[j] = id;
            }
        }
    }

    mark_bright(levels, event, valid, result);
}
