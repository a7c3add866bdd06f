//! Row clustering for sense induction.
//!
//! Context rows are sparse, non-negative count vectors over the feature
//! space. A [`RowClusterer`] assigns each row to one of at most `k` groups,
//! or leaves it unclustered.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sparse row: `(dimension, value)` pairs in ascending dimension order.
pub type SparseRow = Vec<(usize, f64)>;

/// Partitions rows into at most `k` clusters.
pub trait RowClusterer: Send + Sync {
    /// One entry per row: `Some(cluster)` with `cluster < k`, or `None` for
    /// a row left unclustered.
    fn cluster(&self, rows: &[SparseRow], dims: usize, k: usize, seed: u64) -> Vec<Option<usize>>;
}

/// Squared Euclidean distance between a sparse row and a dense centroid,
/// given the centroid's squared norm.
pub fn squared_distance(row: &[(usize, f64)], centroid: &[f64], centroid_norm: f64) -> f64 {
    let mut row_norm = 0.0;
    let mut dot = 0.0;
    for &(d, v) in row {
        row_norm += v * v;
        dot += v * centroid[d];
    }
    (row_norm - 2.0 * dot + centroid_norm).max(0.0)
}

/// Index of the nearest centroid; ties go to the lowest index.
pub fn nearest(row: &[(usize, f64)], centroids: &[Vec<f64>], norms: &[f64]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, (c, &n)) in centroids.iter().zip(norms).enumerate() {
        let dist = squared_distance(row, c, n);
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

pub fn squared_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

/// Seeded k-means: k-means++ seeding followed by Lloyd iterations.
///
/// Seeding stops early once every row coincides with a chosen center, so
/// `k` is an upper bound; identical rows always land in one cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KMeans {
    pub iterations: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        KMeans { iterations: 100 }
    }
}

const EPSILON: f64 = 1e-12;

impl KMeans {
    pub fn new(iterations: usize) -> Self {
        KMeans { iterations }
    }

    fn dense(row: &[(usize, f64)], dims: usize) -> Vec<f64> {
        let mut out = vec![0.0; dims];
        for &(d, v) in row {
            out[d] = v;
        }
        out
    }

    fn seed_centers(rows: &[SparseRow], dims: usize, k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
        let first = rng.gen_range(0..rows.len());
        let mut centers = vec![Self::dense(&rows[first], dims)];
        let mut norms = vec![squared_norm(&centers[0])];

        // Distance from each row to its closest center so far
        let mut closest: Vec<f64> = rows
            .iter()
            .map(|r| squared_distance(r, &centers[0], norms[0]))
            .collect();

        while centers.len() < k {
            let total: f64 = closest.iter().sum();
            if total <= EPSILON {
                break;
            }
            // The last positive candidate absorbs rounding error in `target`
            let mut target = rng.gen::<f64>() * total;
            let mut pick = None;
            for (i, &d) in closest.iter().enumerate() {
                if d <= 0.0 {
                    continue;
                }
                pick = Some(i);
                if target < d {
                    break;
                }
                target -= d;
            }
            let Some(pick) = pick else { break };

            let center = Self::dense(&rows[pick], dims);
            let norm = squared_norm(&center);
            for (c, r) in closest.iter_mut().zip(rows) {
                *c = c.min(squared_distance(r, &center, norm));
            }
            centers.push(center);
            norms.push(norm);
        }
        centers
    }
}

impl RowClusterer for KMeans {
    fn cluster(&self, rows: &[SparseRow], dims: usize, k: usize, seed: u64) -> Vec<Option<usize>> {
        if rows.is_empty() || k == 0 {
            return vec![None; rows.len()];
        }
        let k = k.min(rows.len());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut centers = Self::seed_centers(rows, dims, k, &mut rng);
        let mut norms: Vec<f64> = centers.iter().map(|c| squared_norm(c)).collect();

        let mut assignment: Vec<usize> =
            rows.iter().map(|r| nearest(r, &centers, &norms)).collect();
        for _ in 0..self.iterations {
            // Recompute centroids; an empty cluster keeps its old center
            let mut sums = vec![vec![0.0; dims]; centers.len()];
            let mut sizes = vec![0usize; centers.len()];
            for (row, &c) in rows.iter().zip(&assignment) {
                sizes[c] += 1;
                for &(d, v) in row {
                    sums[c][d] += v;
                }
            }
            for (c, (sum, &size)) in sums.into_iter().zip(&sizes).enumerate() {
                if size > 0 {
                    centers[c] = sum.into_iter().map(|x| x / size as f64).collect();
                    norms[c] = squared_norm(&centers[c]);
                }
            }

            let next: Vec<usize> = rows.iter().map(|r| nearest(r, &centers, &norms)).collect();
            if next == assignment {
                break;
            }
            assignment = next;
        }
        assignment.into_iter().map(Some).collect()
    }
}
