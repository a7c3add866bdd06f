//! Semantic vectors: integer accumulators and their frozen snapshots.
//!
//! A [`SemanticVector`] only ever grows by addition, so the final value does
//! not depend on the order in which contexts were added. Once a pass is over
//! the accumulators are turned into immutable [`Vector`]s, which is also the
//! type handed out by a finished space.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::SemanticEncoding;
use crate::vsa::IndexVector;

/// Mutable integer vector of fixed length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SemanticVector {
    Dense(Vec<i64>),
    /// Nonzero dimensions only; zeros are removed as soon as they appear.
    Sparse {
        length: usize,
        values: BTreeMap<usize, i64>,
    },
}

impl SemanticVector {
    /// All-zero vector with the requested backing store.
    pub fn new(length: usize, encoding: SemanticEncoding) -> Self {
        match encoding {
            SemanticEncoding::Dense => SemanticVector::Dense(vec![0; length]),
            SemanticEncoding::Sparse => SemanticVector::Sparse {
                length,
                values: BTreeMap::new(),
            },
        }
    }

    pub fn length(&self) -> usize {
        match self {
            SemanticVector::Dense(values) => values.len(),
            SemanticVector::Sparse { length, .. } => *length,
        }
    }

    pub fn get(&self, dim: usize) -> i64 {
        match self {
            SemanticVector::Dense(values) => values.get(dim).copied().unwrap_or(0),
            SemanticVector::Sparse { values, .. } => values.get(&dim).copied().unwrap_or(0),
        }
    }

    /// True when every dimension is zero.
    pub fn is_zero(&self) -> bool {
        match self {
            SemanticVector::Dense(values) => values.iter().all(|&v| v == 0),
            SemanticVector::Sparse { values, .. } => values.is_empty(),
        }
    }

    fn add_at(&mut self, dim: usize, delta: i64) {
        match self {
            SemanticVector::Dense(values) => values[dim] += delta,
            SemanticVector::Sparse { values, .. } => {
                let slot = values.entry(dim).or_insert(0);
                *slot += delta;
                if *slot == 0 {
                    values.remove(&dim);
                }
            }
        }
    }

    /// Add an index vector: +1 on its positive and -1 on its negative dimensions.
    pub fn add_index(&mut self, index: &IndexVector) {
        debug_assert_eq!(index.length(), self.length());
        for &p in index.positive() {
            self.add_at(p, 1);
        }
        for &n in index.negative() {
            self.add_at(n, -1);
        }
    }

    /// Elementwise add of a dense slice of the same length.
    pub fn add_dense(&mut self, other: &[i64]) {
        debug_assert_eq!(other.len(), self.length());
        match self {
            SemanticVector::Dense(values) => {
                for (v, &o) in values.iter_mut().zip(other) {
                    *v += o;
                }
            }
            SemanticVector::Sparse { .. } => {
                for (dim, &o) in other.iter().enumerate() {
                    if o != 0 {
                        self.add_at(dim, o);
                    }
                }
            }
        }
    }

    /// Elementwise add of this vector into a dense accumulator.
    pub fn add_to(&self, acc: &mut [i64]) {
        debug_assert_eq!(acc.len(), self.length());
        match self {
            SemanticVector::Dense(values) => {
                for (a, &v) in acc.iter_mut().zip(values) {
                    *a += v;
                }
            }
            SemanticVector::Sparse { values, .. } => {
                for (&dim, &v) in values {
                    acc[dim] += v;
                }
            }
        }
    }

    /// Immutable snapshot of the current value.
    pub fn freeze(&self) -> Vector {
        match self {
            SemanticVector::Dense(values) => Vector::Dense {
                values: values.clone(),
            },
            SemanticVector::Sparse { length, values } => Vector::Sparse {
                length: *length,
                entries: values.iter().map(|(&d, &v)| (d, v)).collect(),
            },
        }
    }
}

/// Per-term semantic vectors behind individual locks.
///
/// Each term owns its own mutex, so adds into different terms never contend.
/// The map shard lock is only held while looking up the handle.
pub struct SemanticStore {
    length: usize,
    encoding: SemanticEncoding,
    vectors: DashMap<i32, Arc<Mutex<SemanticVector>>>,
}

impl SemanticStore {
    pub fn new(length: usize, encoding: SemanticEncoding) -> Self {
        SemanticStore {
            length,
            encoding,
            vectors: DashMap::new(),
        }
    }

    /// Lock handle for a term's vector, created all-zero on first use.
    pub fn handle(&self, id: i32) -> Arc<Mutex<SemanticVector>> {
        if let Some(v) = self.vectors.get(&id) {
            return Arc::clone(v.value());
        }
        let entry = self
            .vectors
            .entry(id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(SemanticVector::new(self.length, self.encoding)))
            });
        Arc::clone(entry.value())
    }

    pub fn contains(&self, id: i32) -> bool {
        self.vectors.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Current value of one term's vector.
    pub fn snapshot(&self, id: i32) -> Option<Vector> {
        self.vectors.get(&id).map(|v| v.value().lock().freeze())
    }

    /// Ends accumulation and hands out the vectors keyed by term id.
    pub fn into_vectors(self) -> BTreeMap<i32, SemanticVector> {
        self.vectors
            .into_iter()
            .map(|(id, handle)| {
                let vector = Arc::try_unwrap(handle)
                    .map(Mutex::into_inner)
                    .unwrap_or_else(|shared| shared.lock().clone());
                (id, vector)
            })
            .collect()
    }
}

/// Immutable vector returned by a finished semantic space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "lowercase")]
pub enum Vector {
    /// Every dimension of an integer vector.
    Dense { values: Vec<i64> },
    /// Nonzero dimensions of an integer vector, ascending.
    Sparse { length: usize, entries: Vec<(usize, i64)> },
    /// Nonzero dimensions of a real-valued mean vector, ascending.
    Mean { length: usize, entries: Vec<(usize, f64)> },
}

impl Vector {
    pub fn length(&self) -> usize {
        match self {
            Vector::Dense { values } => values.len(),
            Vector::Sparse { length, .. } | Vector::Mean { length, .. } => *length,
        }
    }

    /// Value at a dimension as `f64`.
    pub fn get(&self, dim: usize) -> f64 {
        match self {
            Vector::Dense { values } => values.get(dim).map_or(0.0, |&v| v as f64),
            Vector::Sparse { entries, .. } => entries
                .binary_search_by_key(&dim, |&(d, _)| d)
                .map_or(0.0, |i| entries[i].1 as f64),
            Vector::Mean { entries, .. } => entries
                .binary_search_by_key(&dim, |&(d, _)| d)
                .map_or(0.0, |i| entries[i].1),
        }
    }

    /// Nonzero `(dimension, value)` pairs in ascending dimension order.
    pub fn nonzero(&self) -> Vec<(usize, f64)> {
        match self {
            Vector::Dense { values } => values
                .iter()
                .enumerate()
                .filter(|(_, &v)| v != 0)
                .map(|(d, &v)| (d, v as f64))
                .collect(),
            Vector::Sparse { entries, .. } => entries.iter().map(|&(d, v)| (d, v as f64)).collect(),
            Vector::Mean { entries, .. } => entries.clone(),
        }
    }

    /// True when every dimension is zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Vector::Dense { values } => values.iter().all(|&v| v == 0),
            Vector::Sparse { entries, .. } => entries.is_empty(),
            Vector::Mean { entries, .. } => entries.iter().all(|&(_, v)| v == 0.0),
        }
    }

    /// Every dimension as `f64`.
    pub fn to_dense(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.length()];
        for (d, v) in self.nonzero() {
            out[d] = v;
        }
        out
    }

    pub fn dot(&self, other: &Vector) -> f64 {
        self.nonzero().into_iter().map(|(d, v)| v * other.get(d)).sum()
    }

    pub fn norm(&self) -> f64 {
        self.nonzero().into_iter().map(|(_, v)| v * v).sum::<f64>().sqrt()
    }

    /// Cosine similarity; 0 when either vector is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use semvec::Vector;
    ///
    /// let a = Vector::Dense { values: vec![1, 0, -2] };
    /// let b = Vector::Sparse { length: 3, entries: vec![(0, 2), (2, -4)] };
    /// assert!((a.cosine(&b) - 1.0).abs() < 1e-12);
    /// ```
    pub fn cosine(&self, other: &Vector) -> f64 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        self.dot(other) / denom
    }
}
