//! Cleaning output: per-pixel masks and cluster labels.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use crate::config::NnClass;
use crate::geometry::CameraGeometry;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cluster id of a pixel that belongs to no cluster.
pub const UNASSIGNED_CLUSTER: i32 = 0;

/// Cluster id of a pixel that was explicitly rejected.
pub const REJECTED_CLUSTER: i32 = -99;

/// Per-pixel result of one cleaning call.
///
/// `core` and `border` are mutually exclusive; together they form the image.
/// Positive cluster ids mark exactly the image pixels.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CleaningResult {
    /// Core (image) pixels.
    pub core: Vec<bool>,
    /// Border pixels.
    pub border: Vec<bool>,
    /// Pixels above the bright threshold, independent of the image.
    pub bright_non_image: Vec<bool>,
    /// Image pixels and their direct neighbors.
    pub neighbor_of_image: Vec<bool>,
    /// Connected-component label (see [`UNASSIGNED_CLUSTER`],
    /// [`REJECTED_CLUSTER`]).
    pub cluster_id: Vec<i32>,
    /// NN class of accepted core pixels (NN cleaning only).
    pub nn_class: Vec<Option<NnClass>>,
}

impl CleaningResult {
    /// Empty result for `n_pixels` pixels.
    #[must_use]
    pub fn new(n_pixels: usize) -> Self {
        Self {
            core: vec![false; n_pixels],
            border: vec![false; n_pixels],
            bright_non_image: vec![false; n_pixels],
            neighbor_of_image: vec![false; n_pixels],
            cluster_id: vec![UNASSIGNED_CLUSTER; n_pixels],
            nn_class: vec![None; n_pixels],
        }
    }

    /// Number of pixels covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns true if the result covers no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// Whether the pixel is core or border.
    #[inline]
    #[must_use]
    pub fn is_image(&self, i: usize) -> bool {
        self.core[i] || self.border[i]
    }

    /// Number of core pixels.
    #[must_use]
    pub fn n_core(&self) -> usize {
        self.core.iter().filter(|&&c| c).count()
    }

    /// Number of border pixels.
    #[must_use]
    pub fn n_border(&self) -> usize {
        self.border.iter().filter(|&&b| b).count()
    }

    /// Number of image pixels.
    #[must_use]
    pub fn n_image(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_image(i)).count()
    }

    /// Returns true when no pixel was accepted.
    #[must_use]
    pub fn has_no_image(&self) -> bool {
        !(0..self.len()).any(|i| self.is_image(i))
    }

    /// Indices of image pixels.
    pub fn image_pixels(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&i| self.is_image(i))
    }

    /// Number of distinct positive cluster ids.
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.cluster_id
            .iter()
            .copied()
            .max()
            .map_or(0, |m| m.max(0) as usize)
    }

    /// Removes a pixel from the image.
    pub fn clear_pixel(&mut self, i: usize) {
        self.core[i] = false;
        self.border[i] = false;
        self.nn_class[i] = None;
    }

    /// Removes every pixel from the image.
    pub fn clear_image(&mut self) {
        self.core.iter_mut().for_each(|c| *c = false);
        self.border.iter_mut().for_each(|b| *b = false);
        self.nn_class.iter_mut().for_each(|c| *c = None);
    }

    /// Labels connected image components `1..=n` in order of their lowest
    /// pixel index.
    ///
    /// Non-image pixels keep [`REJECTED_CLUSTER`] if they were rejected and
    /// become [`UNASSIGNED_CLUSTER`] otherwise.
    pub fn assign_cluster_ids(&mut self, geometry: &CameraGeometry) {
        let n = self.len();
        for i in 0..n {
            if self.is_image(i) || self.cluster_id[i] != REJECTED_CLUSTER {
                self.cluster_id[i] = UNASSIGNED_CLUSTER;
            }
        }

        let mut next_id = 1;
        let mut stack = Vec::new();
        for start in 0..n {
            if !self.is_image(start) || self.cluster_id[start] > 0 {
                continue;
            }
            self.cluster_id[start] = next_id;
            stack.push(start);
            while let Some(i) = stack.pop() {
                for &j in geometry.neighbors(i) {
                    if self.is_image(j) && self.cluster_id[j] <= 0 {
                        self.cluster_id[j] = next_id;
                        stack.push(j);
                    }
                }
            }
            next_id += 1;
        }
    }

    /// Builds the dilation mask: image pixels and all their neighbors.
    pub fn compute_neighbor_closure(&mut self, geometry: &CameraGeometry) {
        self.neighbor_of_image.iter_mut().for_each(|m| *m = false);
        for i in 0..self.len() {
            if !self.is_image(i) {
                continue;
            }
            self.neighbor_of_image[i] = true;
            for &j in geometry.neighbors(i) {
                self.neighbor_of_image[j] = true;
            }
        }
    }
}

/// Summary of many cleaning results.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CleaningStatistics {
    /// Events processed.
    pub events: usize,
    /// Events without any image pixel.
    pub empty_images: usize,
    /// Total core pixels.
    pub core_pixels: usize,
    /// Total border pixels.
    pub border_pixels: usize,
    /// Total clusters.
    pub clusters: usize,
}

impl CleaningStatistics {
    /// Adds one result.
    pub fn record(&mut self, result: &CleaningResult) {
        self.events += 1;
        if result.has_no_image() {
            self.empty_images += 1;
        }
        self.core_pixels += result.n_core();
        self.border_pixels += result.n_border();
        self.clusters += result.n_clusters();
    }

    /// Mean image size over non-empty events.
    #[must_use]
    pub fn mean_image_pixels(&self) -> f64 {
        let non_empty = self.events - self.empty_images;
        if non_empty == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = (self.core_pixels + self.border_pixels) as f64 / non_empty as f64;
        mean
    }
}

impl<'a> FromIterator<&'a CleaningResult> for CleaningStatistics {
    fn from_iter<I: IntoIterator<Item = &'a CleaningResult>>(iter: I) -> Self {
        let mut stats = Self::default();
        for result in iter {
            stats.record(result);
        }
        stats
    }
}
