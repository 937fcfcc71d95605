//! Per-event cluster bookkeeping shared by the cluster-based methods.
#![allow(clippy::cast_sign_loss, clippy::cast_precision_loss)]

use iactclean_core::{CameraGeometry, CleaningResult, EventSignal};

/// Aggregate of one cluster within a single event.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ClusterStats {
    /// Summed charge.
    pub charge: f64,
    /// Pixel count.
    pub n_pixels: usize,
    /// Number of core pixels.
    pub n_core: usize,
    weight: f64,
    weighted_x: f64,
    weighted_y: f64,
    sum_x: f64,
    sum_y: f64,
    time_weight: f64,
    weighted_time: f64,
    sum_time: f64,
    n_timed: usize,
}

impl ClusterStats {
    fn add(&mut self, charge: f64, time: Option<f64>, (x, y): (f64, f64), is_core: bool) {
        let w = charge.max(0.0);
        self.charge += charge;
        self.n_pixels += 1;
        self.n_core += usize::from(is_core);
        self.weight += w;
        self.weighted_x += w * x;
        self.weighted_y += w * y;
        self.sum_x += x;
        self.sum_y += y;
        if let Some(t) = time {
            self.time_weight += w;
            self.weighted_time += w * t;
            self.sum_time += t;
            self.n_timed += 1;
        }
    }

    /// Charge-weighted mean arrival time.
    pub fn mean_time(&self) -> Option<f64> {
        if self.time_weight > 0.0 {
            Some(self.weighted_time / self.time_weight)
        } else if self.n_timed > 0 {
            Some(self.sum_time / self.n_timed as f64)
        } else {
            None
        }
    }

    /// Charge-weighted centroid.
    pub fn centroid(&self) -> (f64, f64) {
        if self.weight > 0.0 {
            (self.weighted_x / self.weight, self.weighted_y / self.weight)
        } else if self.n_pixels > 0 {
            let n = self.n_pixels as f64;
            (self.sum_x / n, self.sum_y / n)
        } else {
            (0.0, 0.0)
        }
    }
}

/// Statistics of clusters `1..=n_clusters`, indexed by `id - 1`.
pub(crate) fn collect_stats(
    geometry: &CameraGeometry,
    event: &EventSignal,
    result: &CleaningResult,
    n_clusters: usize,
) -> Vec<ClusterStats> {
    let mut stats = vec![ClusterStats::default(); n_clusters];
    for i in 0..result.len() {
        let id = result.cluster_id[i];
        if id > 0 && result.is_image(i) {
            stats[id as usize - 1].add(
                event.charge[i],
                event.time[i],
                geometry.position(i),
                result.core[i],
            );
        }
    }
    stats
}

/// Index of the cluster with the largest charge (first one on ties).
pub(crate) fn largest_cluster(stats: &[ClusterStats]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (k, s) in stats.iter().enumerate() {
        if s.n_pixels == 0 {
            continue;
        }
        if best.is_none_or(|b| s.charge > stats[b].charge) {
            best = Some(k);
        }
    }
    best
}
