//! Exact nearest-neighbor index over fixed-dimension vectors.
//!
//! Vectors are stored row-major in one contiguous buffer. A search computes
//! the squared Euclidean distance from the query to every row, so results
//! are exact and reproducible. The index is immutable once built and can be
//! shared freely across threads.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::error::{Error, Result};

/// One search hit: a row position and its squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Ascending distance, ties broken by ascending position.
fn by_distance_then_position(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.position.cmp(&b.position))
}

/// Squared Euclidean distance, accumulated in `f64`.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>() as f32
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dimension: usize,
    len: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build an index from vectors that must all share one dimension.
    ///
    /// An empty input yields a valid empty index.
    ///
    /// # Examples
    ///
    /// ```
    /// use docrag::index::VectorIndex;
    ///
    /// let index = VectorIndex::build(&[vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();
    /// let hits = index.search(&[3.0, 3.0], 1).unwrap();
    /// assert_eq!(hits[0].position, 1);
    /// assert_eq!(hits[0].distance, 1.0);
    /// ```
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self> {
        let Some(first) = vectors.first() else {
            return Ok(Self::default());
        };

        let dimension = first.len();
        if dimension == 0 {
            return Err(Error::Config(
                "cannot index zero-dimension vectors".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for vector in vectors {
            if vector.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    found: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        Ok(Self {
            dimension,
            len: vectors.len(),
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Vector dimension, or 0 for an empty index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The indexed vector at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Find the `k` nearest vectors to `query`.
    ///
    /// Returns `min(k, len)` neighbors ordered by ascending distance, ties
    /// broken by ascending position. An empty index (or `k == 0`) returns
    /// no neighbors; otherwise a query of the wrong length is an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .par_chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_l2(row, query),
            })
            .collect();

        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, by_distance_then_position);
            neighbors.truncate(k);
        }
        neighbors.sort_unstable_by(by_distance_then_position);

        Ok(neighbors)
    }
}
