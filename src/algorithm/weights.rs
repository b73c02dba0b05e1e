//! Queen contiguity spatial weights.
//!
//! Two polygons are neighbours when they share at least one vertex. Vertices
//! are matched on their exact coordinates, which holds for layers whose
//! adjacent polygons were digitised against each other.

use std::fmt;

use nalgebra::DMatrix;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use smallvec::SmallVec;

use crate::error::{AnalysisError, Result};
use crate::frame::{GeoFrame, to_multipolygon};
use crate::utils::arrow::{KeyValue, column_keys, get_column};

type Neighbours = SmallVec<[usize; 8]>;

/// Weight scheme applied to the neighbour lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transform {
    /// Every neighbour weighs 1
    Binary,
    /// Each row sums to 1
    Row,
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => f.write_str("B"),
            Self::Row => f.write_str("R"),
        }
    }
}

/// Sparse spatial weights over `n` observations
#[derive(Debug, Clone)]
pub struct SpatialWeights {
    ids: Vec<KeyValue>,
    neighbours: Vec<Neighbours>,
    weights: Vec<SmallVec<[f64; 8]>>,
    transform: Transform,
}

/// Headline figures for a weights object
#[derive(Debug, Clone, Serialize)]
pub struct WeightsSummary {
    pub n: usize,
    pub transform: String,
    pub mean_neighbors: f64,
    pub min_neighbors: usize,
    pub max_neighbors: usize,
    pub islands: Vec<String>,
}

fn vertex_key(x: f64, y: f64) -> (u64, u64) {
    // -0.0 and 0.0 must share a key
    ((x + 0.0).to_bits(), (y + 0.0).to_bits())
}

impl SpatialWeights {
    /// Build binary weights from neighbour lists
    pub fn from_neighbours(ids: Vec<KeyValue>, neighbours: Vec<Vec<usize>>) -> Result<Self> {
        if ids.len() != neighbours.len() {
            return Err(AnalysisError::statistics(format!(
                "{} ids for {} neighbour lists",
                ids.len(),
                neighbours.len()
            )));
        }
        let n = ids.len();
        let mut lists = Vec::with_capacity(n);
        for (i, mut list) in neighbours.into_iter().enumerate() {
            list.sort_unstable();
            list.dedup();
            if list.iter().any(|&j| j >= n || j == i) {
                return Err(AnalysisError::statistics(format!(
                    "neighbour list of {} refers to itself or past {n} observations",
                    ids[i]
                )));
            }
            lists.push(Neighbours::from_vec(list));
        }
        let weights = lists.iter().map(|l| l.iter().map(|_| 1.0).collect()).collect();
        Ok(Self {
            ids,
            neighbours: lists,
            weights,
            transform: Transform::Binary,
        })
    }

    /// Queen contiguity between the polygons of a layer
    ///
    /// `id_column` names the observations; row positions are used without it.
    pub fn queen(frame: &GeoFrame, id_column: Option<&str>) -> Result<Self> {
        let ids = match id_column {
            Some(name) => column_keys(get_column(frame.batch(), name)?)?
                .into_iter()
                .enumerate()
                .map(|(row, key)| key.unwrap_or(KeyValue::Int(row as i64)))
                .collect(),
            None => (0..frame.num_rows() as i64).map(KeyValue::Int).collect(),
        };

        let mut by_vertex: FxHashMap<(u64, u64), SmallVec<[usize; 4]>> = FxHashMap::default();
        for (idx, geometry) in frame.geometry().iter().enumerate() {
            let shape = to_multipolygon(geometry)?;
            let mut seen = FxHashSet::default();
            for polygon in &shape {
                let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
                for ring in rings {
                    for c in ring.coords() {
                        let key = vertex_key(c.x, c.y);
                        if seen.insert(key) {
                            by_vertex.entry(key).or_default().push(idx);
                        }
                    }
                }
            }
        }

        let mut neighbours: Vec<FxHashSet<usize>> = vec![FxHashSet::default(); frame.num_rows()];
        for sharing in by_vertex.values().filter(|s| s.len() > 1) {
            for &a in sharing {
                for &b in sharing {
                    if a != b {
                        neighbours[a].insert(b);
                    }
                }
            }
        }

        let weights = Self::from_neighbours(
            ids,
            neighbours.into_iter().map(|s| s.into_iter().collect()).collect(),
        )?;
        let islands = weights.islands();
        if !islands.is_empty() {
            log::warn!(
                "{} observations have no neighbours: {}",
                islands.len(),
                islands
                    .iter()
                    .map(|&i| weights.ids[i].to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(weights)
    }

    #[must_use]
    pub fn n(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn ids(&self) -> &[KeyValue] {
        &self.ids
    }

    #[must_use]
    pub fn neighbours(&self, i: usize) -> &[usize] {
        &self.neighbours[i]
    }

    #[must_use]
    pub fn weights(&self, i: usize) -> &[f64] {
        &self.weights[i]
    }

    #[must_use]
    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Number of neighbours per observation
    #[must_use]
    pub fn cardinalities(&self) -> Vec<usize> {
        self.neighbours.iter().map(SmallVec::len).collect()
    }

    /// Observations without neighbours
    #[must_use]
    pub fn islands(&self) -> Vec<usize> {
        self.neighbours
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    #[must_use]
    pub fn mean_neighbors(&self) -> f64 {
        if self.n() == 0 {
            return 0.0;
        }
        self.cardinalities().iter().sum::<usize>() as f64 / self.n() as f64
    }

    /// Re-weight the neighbour lists; islands keep an empty row
    pub fn set_transform(&mut self, transform: Transform) {
        for (list, weights) in self.neighbours.iter().zip(self.weights.iter_mut()) {
            let value = match transform {
                Transform::Binary => 1.0,
                Transform::Row if list.is_empty() => continue,
                Transform::Row => 1.0 / list.len() as f64,
            };
            weights.iter_mut().for_each(|w| *w = value);
        }
        self.transform = transform;
    }

    /// Spatial lag `Wy`
    pub fn lag(&self, y: &[f64]) -> Result<Vec<f64>> {
        if y.len() != self.n() {
            return Err(AnalysisError::statistics(format!(
                "lag of {} values with weights over {}",
                y.len(),
                self.n()
            )));
        }
        Ok(self
            .neighbours
            .iter()
            .zip(&self.weights)
            .map(|(list, weights)| list.iter().zip(weights).map(|(&j, w)| w * y[j]).sum())
            .collect())
    }

    /// Sum of all weights
    #[must_use]
    pub fn s0(&self) -> f64 {
        self.weights.iter().flatten().sum()
    }

    fn lookup(&self) -> FxHashMap<(usize, usize), f64> {
        self.neighbours
            .iter()
            .zip(&self.weights)
            .enumerate()
            .flat_map(|(i, (list, weights))| list.iter().zip(weights).map(move |(&j, &w)| ((i, j), w)))
            .collect()
    }

    /// `½ Σᵢⱼ (wᵢⱼ + wⱼᵢ)²`
    #[must_use]
    pub fn s1(&self) -> f64 {
        let lookup = self.lookup();
        let mut total = 0.0;
        for (&(i, j), &w) in &lookup {
            let back = lookup.get(&(j, i)).copied().unwrap_or(0.0);
            total += (w + back).powi(2);
            if back == 0.0 {
                // (j, i) is absent, so its term is never visited
                total += w.powi(2);
            }
        }
        total / 2.0
    }

    /// `Σᵢ (wᵢ. + w.ᵢ)²`
    #[must_use]
    pub fn s2(&self) -> f64 {
        let mut row = vec![0.0; self.n()];
        let mut col = vec![0.0; self.n()];
        for (i, (list, weights)) in self.neighbours.iter().zip(&self.weights).enumerate() {
            for (&j, &w) in list.iter().zip(weights) {
                row[i] += w;
                col[j] += w;
            }
        }
        row.iter().zip(&col).map(|(r, c)| (r + c).powi(2)).sum()
    }

    /// Dense `n × n` matrix
    #[must_use]
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.n(), self.n());
        for (i, (list, weights)) in self.neighbours.iter().zip(&self.weights).enumerate() {
            for (&j, &w) in list.iter().zip(weights) {
                dense[(i, j)] = w;
            }
        }
        dense
    }

    #[must_use]
    pub fn summary(&self) -> WeightsSummary {
        let cardinalities = self.cardinalities();
        WeightsSummary {
            n: self.n(),
            transform: self.transform.to_string(),
            mean_neighbors: self.mean_neighbors(),
            min_neighbors: cardinalities.iter().copied().min().unwrap_or(0),
            max_neighbors: cardinalities.iter().copied().max().unwrap_or(0),
            islands: self
                .islands()
                .into_iter()
                .map(|i| self.ids[i].to_string())
                .collect(),
        }
    }
}

/// Spatial lag `Wy` of a series
pub fn lag_spatial(w: &SpatialWeights, y: &[f64]) -> Result<Vec<f64>> {
    w.lag(y)
}
