//! Sparse ternary index vectors
//!
//! An index vector is a fixed-length vector whose only nonzero entries are a
//! handful of +1 and -1 dimensions:
//! - Disjoint positive and negative dimension sets, both kept sorted
//! - Immutable once created; permutations return new vectors
//! - Dot products and cosine similarity without densifying

use serde::{Deserialize, Serialize};

pub mod generator;
pub mod permutation;
pub mod semantic;

/// Sparse ternary vector with positive and negative indices
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexVector {
    length: usize,
    /// Indices with +1 value
    pos: Vec<usize>,
    /// Indices with -1 value
    neg: Vec<usize>,
}

impl IndexVector {
    /// Build an index vector from unsorted dimension lists.
    ///
    /// The lists are sorted here; callers must keep them disjoint and within
    /// `[0, length)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use semvec::IndexVector;
    ///
    /// let v = IndexVector::new(16, vec![9, 2], vec![4]);
    /// assert_eq!(v.positive(), &[2, 9]);
    /// assert_eq!(v.negative(), &[4]);
    /// assert_eq!(v.value(9), 1);
    /// assert_eq!(v.value(4), -1);
    /// assert_eq!(v.value(5), 0);
    /// ```
    pub fn new(length: usize, mut pos: Vec<usize>, mut neg: Vec<usize>) -> Self {
        pos.sort_unstable();
        neg.sort_unstable();
        debug_assert!(pos.iter().chain(&neg).all(|&d| d < length));
        debug_assert!(pos.iter().all(|d| neg.binary_search(d).is_err()));
        IndexVector { length, pos, neg }
    }

    /// An index vector with no nonzero dimensions.
    pub fn zero(length: usize) -> Self {
        IndexVector {
            length,
            pos: Vec::new(),
            neg: Vec::new(),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Sorted dimensions holding +1.
    pub fn positive(&self) -> &[usize] {
        &self.pos
    }

    /// Sorted dimensions holding -1.
    pub fn negative(&self) -> &[usize] {
        &self.neg
    }

    /// Number of nonzero dimensions.
    pub fn nnz(&self) -> usize {
        self.pos.len() + self.neg.len()
    }

    /// Value at a dimension, found by binary search.
    pub fn value(&self, dim: usize) -> i32 {
        if self.pos.binary_search(&dim).is_ok() {
            1
        } else if self.neg.binary_search(&dim).is_ok() {
            -1
        } else {
            0
        }
    }

    /// True when the positive and negative sets share no dimension.
    pub fn is_disjoint(&self) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.pos.len() && j < self.neg.len() {
            match self.pos[i].cmp(&self.neg[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return false,
            }
        }
        true
    }

    /// Dot product of two index vectors.
    pub fn dot(&self, other: &IndexVector) -> i64 {
        let mut dot = 0i64;
        for &idx in &other.pos {
            dot += self.value(idx) as i64;
        }
        for &idx in &other.neg {
            dot -= self.value(idx) as i64;
        }
        dot
    }

    /// Calculate cosine similarity between two index vectors
    /// Returns value in [-1, 1] where 1 is identical, 0 is orthogonal
    ///
    /// # Examples
    ///
    /// ```
    /// use semvec::IndexVector;
    ///
    /// let a = IndexVector::new(100, vec![1, 2, 3], vec![4, 5, 6]);
    /// let b = IndexVector::new(100, vec![10, 20], vec![40]);
    ///
    /// assert!((a.cosine(&a) - 1.0).abs() < 1e-12);
    /// assert_eq!(a.cosine(&b), 0.0);
    /// ```
    pub fn cosine(&self, other: &IndexVector) -> f64 {
        let self_norm = self.nnz() as f64;
        let other_norm = other.nnz() as f64;

        if self_norm == 0.0 || other_norm == 0.0 {
            return 0.0;
        }

        self.dot(other) as f64 / (self_norm.sqrt() * other_norm.sqrt())
    }

    /// Apply a cyclic shift to every dimension index.
    ///
    /// Negative shifts rotate the other way, so `rotate(k)` followed by
    /// `rotate(-k)` is the identity.
    ///
    /// # Examples
    ///
    /// ```
    /// use semvec::IndexVector;
    ///
    /// let v = IndexVector::new(10, vec![0, 9], vec![5]);
    /// let r = v.rotate(3);
    /// assert_eq!(r.positive(), &[2, 3]);
    /// assert_eq!(r.negative(), &[8]);
    /// assert_eq!(r.rotate(-3), v);
    /// ```
    pub fn rotate(&self, shift: isize) -> IndexVector {
        let len = self.length as isize;
        if len == 0 {
            return self.clone();
        }
        let shift = shift.rem_euclid(len) as usize;
        if shift == 0 {
            return self.clone();
        }
        let permute_index = |idx: &usize| (idx + shift) % self.length;

        // Indices must remain sorted for binary-search membership
        IndexVector::new(
            self.length,
            self.pos.iter().map(permute_index).collect(),
            self.neg.iter().map(permute_index).collect(),
        )
    }

    /// Move every dimension `d` to `mapping[d]`.
    ///
    /// `mapping` must be a bijection on `[0, length)` for the result to stay
    /// disjoint.
    pub fn remap(&self, mapping: &[usize]) -> IndexVector {
        debug_assert_eq!(mapping.len(), self.length);
        IndexVector::new(
            self.length,
            self.pos.iter().map(|&d| mapping[d]).collect(),
            self.neg.iter().map(|&d| mapping[d]).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_lookup() {
        let v = IndexVector::new(50, vec![3, 1, 40], vec![7, 2]);
        assert_eq!(v.positive(), &[1, 3, 40]);
        assert_eq!(v.negative(), &[2, 7]);
        assert_eq!(v.value(40), 1);
        assert_eq!(v.value(2), -1);
        assert_eq!(v.value(0), 0);
        assert_eq!(v.nnz(), 5);
    }

    #[test]
    fn test_disjointness_check() {
        let ok = IndexVector::new(10, vec![1, 2], vec![3, 4]);
        assert!(ok.is_disjoint());
        let bad = IndexVector {
            length: 10,
            pos: vec![1, 4],
            neg: vec![4],
        };
        assert!(!bad.is_disjoint());
    }

    #[test]
    fn test_rotation_wraps_around() {
        let v = IndexVector::new(8, vec![6, 7], vec![0]);
        let r = v.rotate(2);
        assert_eq!(r.positive(), &[0, 1]);
        assert_eq!(r.negative(), &[2]);
        assert_eq!(v.rotate(-1).negative(), &[7]);
        assert_eq!(v.rotate(8), v);
        assert_eq!(v.rotate(0), v);
    }

    #[test]
    fn test_remap_applies_mapping() {
        let v = IndexVector::new(4, vec![0], vec![3]);
        let r = v.remap(&[2, 3, 1, 0]);
        assert_eq!(r.positive(), &[2]);
        assert_eq!(r.negative(), &[0]);
    }

    #[test]
    fn test_dot_counts_agreements() {
        let a = IndexVector::new(20, vec![1, 2, 3], vec![4, 5]);
        let b = IndexVector::new(20, vec![1, 4], vec![5, 6]);
        // +1 (dim 1), -1 (dim 4), +1 (dim 5)
        assert_eq!(a.dot(&b), 1);
        assert_eq!(a.dot(&b), b.dot(&a));
    }
}
