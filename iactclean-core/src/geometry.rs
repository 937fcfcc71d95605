//! Camera geometry: pixel positions and the neighbor graph.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Telescope type identifier (one calibration set per type).
pub type TelescopeType = u64;

#[cfg(feature = "serde")]
fn default_true() -> bool {
    true
}

/// Description of a single camera pixel.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelGeometry {
    /// X position of the pixel center (camera coordinates).
    pub x: f64,
    /// Y position of the pixel center (camera coordinates).
    pub y: f64,
    /// Tube radius, same units as the position.
    pub radius: f64,
    /// Indices of adjacent pixels.
    pub neighbors: Vec<usize>,
    /// Whether the pixel takes part in the analysis.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub analysis_valid: bool,
}

impl PixelGeometry {
    /// Creates an analysis-valid pixel.
    pub fn new(x: f64, y: f64, radius: f64, neighbors: Vec<usize>) -> Self {
        Self {
            x,
            y,
            radius,
            neighbors,
            analysis_valid: true,
        }
    }
}

/// Serializable camera description, validated into a [`CameraGeometry`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraDescription {
    /// Telescope type of this camera.
    pub telescope_type: TelescopeType,
    /// Pixels in index order.
    pub pixels: Vec<PixelGeometry>,
}

/// Immutable camera geometry.
///
/// Pixel data is stored column-wise and the neighbor graph as adjacency
/// lists. The graph is guaranteed symmetric and free of self loops.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraGeometry {
    telescope_type: TelescopeType,
    x: Vec<f64>,
    y: Vec<f64>,
    radius: Vec<f64>,
    neighbors: Vec<Vec<usize>>,
    analysis_valid: Vec<bool>,
}

impl CameraGeometry {
    /// Builds a geometry from pixel descriptions, validating the adjacency.
    ///
    /// # Errors
    /// Returns [`Error::Geometry`] if the camera has no pixels, a neighbor
    /// index is out of range, a pixel lists itself or a neighbor twice, or
    /// the adjacency is not symmetric.
    pub fn new(telescope_type: TelescopeType, pixels: Vec<PixelGeometry>) -> Result<Self> {
        let n = pixels.len();
        if n == 0 {
            return Err(Error::Geometry("camera has no pixels".into()));
        }

        let mut geometry = Self {
            telescope_type,
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            radius: Vec::with_capacity(n),
            neighbors: Vec::with_capacity(n),
            analysis_valid: Vec::with_capacity(n),
        };

        for (i, pixel) in pixels.into_iter().enumerate() {
            if !(pixel.x.is_finite() && pixel.y.is_finite()) {
                return Err(Error::Geometry(format!("pixel {i} has a non-finite position")));
            }
            let mut seen = pixel.neighbors.clone();
            seen.sort_unstable();
            seen.dedup();
            if seen.len() != pixel.neighbors.len() {
                return Err(Error::Geometry(format!("pixel {i} lists a neighbor twice")));
            }
            if let Some(&bad) = pixel.neighbors.iter().find(|&&j| j >= n) {
                return Err(Error::Geometry(format!(
                    "pixel {i} has neighbor {bad} outside 0..{n}"
                )));
            }
            if pixel.neighbors.contains(&i) {
                return Err(Error::Geometry(format!("pixel {i} lists itself as neighbor")));
            }
            geometry.x.push(pixel.x);
            geometry.y.push(pixel.y);
            geometry.radius.push(pixel.radius);
            geometry.neighbors.push(pixel.neighbors);
            geometry.analysis_valid.push(pixel.analysis_valid);
        }

        for i in 0..n {
            for &j in &geometry.neighbors[i] {
                if !geometry.neighbors[j].contains(&i) {
                    return Err(Error::Geometry(format!(
                        "adjacency is not symmetric: {i} -> {j} has no reverse edge"
                    )));
                }
            }
        }

        Ok(geometry)
    }

    /// Builds a geometry from its serializable description.
    ///
    /// # Errors
    /// See [`CameraGeometry::new`].
    pub fn from_description(description: CameraDescription) -> Result<Self> {
        Self::new(description.telescope_type, description.pixels)
    }

    /// Converts back into the serializable description.
    #[must_use]
    pub fn to_description(&self) -> CameraDescription {
        CameraDescription {
            telescope_type: self.telescope_type,
            pixels: (0..self.len())
                .map(|i| PixelGeometry {
                    x: self.x[i],
                    y: self.y[i],
                    radius: self.radius[i],
                    neighbors: self.neighbors[i].clone(),
                    analysis_valid: self.analysis_valid[i],
                })
                .collect(),
        }
    }

    /// Hexagonal camera with `rings` rings of pixels around a central one.
    ///
    /// Pixel centers are `spacing` apart and the tube radius is half the
    /// spacing. The camera has `3 * rings * (rings + 1) + 1` pixels.
    #[must_use]
    pub fn hexagonal(telescope_type: TelescopeType, rings: usize, spacing: f64) -> Self {
        const DIRECTIONS: [(i64, i64); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

        let r = rings as i64;
        let mut axial = Vec::new();
        for row in -r..=r {
            let q_min = (-r).max(-row - r);
            let q_max = r.min(-row + r);
            for q in q_min..=q_max {
                axial.push((q, row));
            }
        }

        let index_of = |q: i64, row: i64| axial.iter().position(|&c| c == (q, row));
        let half_sqrt3 = 3f64.sqrt() / 2.0;

        let mut geometry = Self {
            telescope_type,
            x: Vec::with_capacity(axial.len()),
            y: Vec::with_capacity(axial.len()),
            radius: vec![spacing / 2.0; axial.len()],
            neighbors: Vec::with_capacity(axial.len()),
            analysis_valid: vec![true; axial.len()],
        };
        for &(q, row) in &axial {
            geometry.x.push(spacing * (q as f64 + row as f64 / 2.0));
            geometry.y.push(spacing * half_sqrt3 * row as f64);
            geometry.neighbors.push(
                DIRECTIONS
                    .iter()
                    .filter_map(|&(dq, dr)| index_of(q + dq, row + dr))
                    .collect(),
            );
        }
        geometry
    }

    /// Returns a copy with the given pixels flagged as analysis-invalid.
    #[must_use]
    pub fn with_invalid_pixels(mut self, pixels: &[usize]) -> Self {
        for &i in pixels {
            if let Some(flag) = self.analysis_valid.get_mut(i) {
                *flag = false;
            }
        }
        self
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the camera has no pixels (never true once built).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Telescope type of this camera.
    #[must_use]
    pub fn telescope_type(&self) -> TelescopeType {
        self.telescope_type
    }

    /// Pixel center.
    #[inline]
    #[must_use]
    pub fn position(&self, i: usize) -> (f64, f64) {
        (self.x[i], self.y[i])
    }

    /// Tube radius.
    #[inline]
    #[must_use]
    pub fn radius(&self, i: usize) -> f64 {
        self.radius[i]
    }

    /// Adjacent pixels.
    #[inline]
    #[must_use]
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    /// Returns true when `j` is adjacent to `i`.
    #[inline]
    #[must_use]
    pub fn are_neighbors(&self, i: usize, j: usize) -> bool {
        self.neighbors[i].contains(&j)
    }

    /// Whether the pixel takes part in the analysis.
    #[inline]
    #[must_use]
    pub fn is_analysis_valid(&self, i: usize) -> bool {
        self.analysis_valid[i]
    }

    /// Euclidean distance between two pixel centers.
    #[must_use]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        (self.x[i] - self.x[j]).hypot(self.y[i] - self.y[j])
    }

    /// Index of the pixel whose center is closest to `(x, y)`.
    #[must_use]
    pub fn nearest_pixel(&self, x: f64, y: f64) -> Option<usize> {
        (0..self.len()).min_by(|&a, &b| {
            let da = (self.x[a] - x).hypot(self.y[a] - y);
            let db = (self.x[b] - x).hypot(self.y[b] - y);
            da.total_cmp(&db)
        })
    }

    /// Pixels two hops away from `i`: neighbors of neighbors that are
    /// neither `i` nor adjacent to `i`. Written into `out` (cleared first).
    pub fn second_ring_into(&self, i: usize, out: &mut Vec<usize>) {
        out.clear();
        for &n in &self.neighbors[i] {
            for &m in &self.neighbors[n] {
                if m != i && !self.are_neighbors(i, m) && !out.contains(&m) {
                    out.push(m);
                }
            }
        }
    }

    /// Mean number of neighbors per pixel.
    #[must_use]
    pub fn mean_neighbor_count(&self) -> f64 {
        let edges: usize = self.neighbors.iter().map(Vec::len).sum();
        edges as f64 / self.len() as f64
    }

    /// Mean size of the second neighbor ring per pixel.
    #[must_use]
    pub fn mean_second_ring_size(&self) -> f64 {
        let mut ring = Vec::new();
        let total: usize = (0..self.len())
            .map(|i| {
                self.second_ring_into(i, &mut ring);
                ring.len()
            })
            .sum();
        total as f64 / self.len() as f64
    }
}
