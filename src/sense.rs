//! Sense induction by clustering the contexts of each term.
//!
//! The first pass counts, per term, how often it occurs and how often each
//! other term appears in its window. Those counts decide which co-occurring
//! terms are significant *features* of a term (a log-likelihood test on the
//! 2×2 contingency table). The replay then turns every occurrence of a term
//! into a sparse row counting its features in a wider window, the rows are
//! clustered, and each sufficiently large cluster becomes one sense: the
//! mean of its rows.
//!
//! Sense vectors live in feature space, one dimension per term id.

use std::collections::{BTreeMap, HashMap, HashSet};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::cluster::{nearest, squared_norm, RowClusterer, SparseRow};
use crate::config::SenseConfig;
use crate::corpus::{CompressedCorpus, CompressedDocument};
use crate::error::{Result, RiError};
use crate::pool::ReplayPool;
use crate::vsa::semantic::Vector;

/// Counts gathered from a single document before being merged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentCounts {
    occurrences: HashMap<i32, u64>,
    joint: HashMap<i32, HashMap<i32, u64>>,
}

impl DocumentCounts {
    pub fn occurrence(&mut self, id: i32) {
        *self.occurrences.entry(id).or_insert(0) += 1;
    }

    pub fn co_occurrence(&mut self, focus: i32, other: i32) {
        *self.joint.entry(focus).or_default().entry(other).or_insert(0) += 1;
    }
}

/// Corpus-wide occurrence and joint counts.
#[derive(Debug, Default)]
pub struct CooccurrenceCounts {
    occurrences: DashMap<i32, u64>,
    joint: DashMap<i32, HashMap<i32, u64>>,
}

impl CooccurrenceCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one document's counts in.
    pub fn merge(&self, counts: DocumentCounts) {
        for (id, n) in counts.occurrences {
            *self.occurrences.entry(id).or_insert(0) += n;
        }
        for (focus, others) in counts.joint {
            let mut row = self.joint.entry(focus).or_default();
            for (other, n) in others {
                *row.entry(other).or_insert(0) += n;
            }
        }
    }

    pub fn occurrences(&self, id: i32) -> u64 {
        self.occurrences.get(&id).map_or(0, |n| *n)
    }

    pub fn joint(&self, focus: i32, other: i32) -> u64 {
        self.joint
            .get(&focus)
            .and_then(|row| row.get(&other).copied())
            .unwrap_or(0)
    }

    /// Total token occurrences: the corpus size `N` of the contingency tables.
    pub fn total(&self) -> u64 {
        self.occurrences.iter().map(|e| *e.value()).sum()
    }

    /// Significant features per term.
    ///
    /// For focus `t` and co-occurring `f` the table is
    ///
    /// ```text
    /// a = joint(t, f)        b = count(f) - a
    /// c = count(t) - a       d = N - a - b - c
    /// ```
    ///
    /// with `b`, `c`, `d` clamped at zero; `f` is kept when
    /// `log_likelihood(a, b, c, d) > significance`.
    pub fn select_features(&self, significance: f64) -> HashMap<i32, HashSet<i32>> {
        let total = self.total() as f64;
        let mut features = HashMap::new();
        for entry in self.joint.iter() {
            let focus = *entry.key();
            let focus_count = self.occurrences(focus) as f64;
            let selected: HashSet<i32> = entry
                .value()
                .iter()
                .filter(|(_, &joint)| joint > 0)
                .filter(|(&other, &joint)| {
                    let a = joint as f64;
                    let b = (self.occurrences(other) as f64 - a).max(0.0);
                    let c = (focus_count - a).max(0.0);
                    let d = (total - a - b - c).max(0.0);
                    log_likelihood(a, b, c, d) > significance
                })
                .map(|(&other, _)| other)
                .collect();
            debug!(term = focus, features = selected.len(), "selected features");
            features.insert(focus, selected);
        }
        features
    }
}

/// Log-likelihood ratio (G²) of a 2×2 contingency table
///
/// ```text
/// a  b
/// c  d
/// ```
///
/// Zero cells contribute nothing.
///
/// # Examples
///
/// ```
/// use semvec::sense::log_likelihood;
///
/// // Perfect association
/// assert!((log_likelihood(10.0, 0.0, 0.0, 10.0) - 27.7259).abs() < 1e-3);
/// // Independence
/// assert!(log_likelihood(5.0, 5.0, 5.0, 5.0).abs() < 1e-12);
/// ```
pub fn log_likelihood(a: f64, b: f64, c: f64, d: f64) -> f64 {
    let row1 = a + b;
    let row2 = c + d;
    let col1 = a + c;
    let col2 = b + d;
    let sum = row1 + row2;
    if sum <= 0.0 {
        return 0.0;
    }

    let term = |observed: f64, expected: f64| {
        if observed == 0.0 || expected == 0.0 {
            0.0
        } else {
            observed * (observed / expected).ln()
        }
    };
    2.0 * (term(a, row1 * col1 / sum)
        + term(b, row1 * col2 / sum)
        + term(c, row2 * col1 / sum)
        + term(d, row2 * col2 / sum))
}

/// One occurrence of a term, as counts of its features around it.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextRow {
    pub document: usize,
    pub position: usize,
    pub features: SparseRow,
}

/// Collects context rows on replay and clusters them into senses.
pub struct SenseInducer {
    config: SenseConfig,
    dims: usize,
    features: HashMap<i32, HashSet<i32>>,
    contexts: DashMap<i32, Vec<ContextRow>>,
}

impl SenseInducer {
    /// `dims` is the vocabulary size: every term id is a feature dimension.
    pub fn new(config: SenseConfig, dims: usize, features: HashMap<i32, HashSet<i32>>) -> Self {
        SenseInducer {
            config,
            dims,
            features,
            contexts: DashMap::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn feature_count(&self, id: i32) -> usize {
        self.features.get(&id).map_or(0, HashSet::len)
    }

    /// Context rows for every non-sentinel position of one document.
    pub fn document_contexts(
        &self,
        index: usize,
        document: &CompressedDocument,
    ) -> Result<Vec<(i32, ContextRow)>> {
        let ids = document.ids();
        let window = self.config.context_window;
        let mut rows = Vec::with_capacity(document.unfiltered_count());

        for (i, &id) in ids.iter().enumerate() {
            if id < 0 {
                continue;
            }
            if id as usize >= self.dims {
                return Err(RiError::UnknownTermId { id });
            }

            let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
            if let Some(features) = self.features.get(&id) {
                let before = i.saturating_sub(window)..i;
                let after = (i + 1)..ids.len().min(i + window + 1);
                for j in before.chain(after) {
                    let other = ids[j];
                    if other >= 0 && features.contains(&other) {
                        *counts.entry(other as usize).or_insert(0.0) += 1.0;
                    }
                }
            }
            rows.push((
                id,
                ContextRow {
                    document: index,
                    position: i,
                    features: counts.into_iter().collect(),
                },
            ));
        }
        Ok(rows)
    }

    /// Replay the corpus on the pool, gathering every term's context rows.
    pub fn collect(&self, corpus: &CompressedCorpus, pool: &ReplayPool) -> Result<()> {
        pool.replay(corpus, |index, document| {
            for (id, row) in self.document_contexts(index, document)? {
                self.contexts.entry(id).or_default().push(row);
            }
            debug!(document = index, "collected contexts");
            Ok(())
        })?;
        Ok(())
    }

    pub fn context_count(&self, id: i32) -> usize {
        self.contexts.get(&id).map_or(0, |rows| rows.len())
    }

    /// Cluster each term's rows and build its sense vectors, largest sense
    /// first. Rows are put in corpus order first, so the result does not
    /// depend on replay scheduling.
    pub fn induce<C: RowClusterer + ?Sized>(
        self,
        clusterer: &C,
        seed: u64,
    ) -> BTreeMap<i32, Vec<Vector>> {
        let SenseInducer {
            config,
            dims,
            contexts,
            ..
        } = self;

        let mut senses = BTreeMap::new();
        let mut terms: Vec<(i32, Vec<ContextRow>)> = contexts.into_iter().collect();
        terms.sort_unstable_by_key(|(id, _)| *id);
        info!(terms = terms.len(), "clustering contexts");

        for (id, mut contexts) in terms {
            contexts.sort_unstable_by_key(|row| (row.document, row.position));
            let rows: Vec<SparseRow> = contexts.into_iter().map(|row| row.features).collect();
            let k = config.max_clusters.min(rows.len());
            let term_seed = seed.wrapping_add((id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let labels = clusterer.cluster(&rows, dims, k, term_seed);
            let vectors =
                senses_from_assignments(&rows, &labels, dims, config.min_cluster_fraction);
            debug!(term = id, contexts = rows.len(), senses = vectors.len(), "induced senses");
            senses.insert(id, vectors);
        }
        senses
    }
}

/// Turns cluster labels into mean sense vectors, largest group first.
///
/// Groups holding at least `min_fraction` of the rows are retained (the
/// largest one if none qualifies). Rows of discarded groups, and unclustered
/// rows, move to the retained group with the nearest centroid.
pub fn senses_from_assignments(
    rows: &[SparseRow],
    labels: &[Option<usize>],
    dims: usize,
    min_fraction: f64,
) -> Vec<Vector> {
    debug_assert_eq!(rows.len(), labels.len());
    if rows.is_empty() {
        return Vec::new();
    }

    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, label) in labels.iter().enumerate() {
        if let Some(cluster) = label {
            members.entry(*cluster).or_default().push(row);
        }
    }

    let n = rows.len() as f64;
    let mut retained: Vec<usize> = members
        .iter()
        .filter(|(_, m)| m.len() as f64 / n >= min_fraction)
        .map(|(&c, _)| c)
        .collect();
    if retained.is_empty() {
        let largest = members
            .iter()
            .max_by(|(ca, a), (cb, b)| a.len().cmp(&b.len()).then(cb.cmp(ca)))
            .map(|(&c, _)| c);
        match largest {
            Some(c) => retained.push(c),
            // Nothing was clustered: one sense over every row
            None => return vec![mean(rows, &(0..rows.len()).collect::<Vec<_>>(), dims)],
        }
    }

    let mut groups: Vec<(usize, Vec<usize>)> = retained
        .iter()
        .map(|c| (*c, members.get(c).cloned().unwrap_or_default()))
        .collect();
    let centroids: Vec<Vec<f64>> = groups
        .iter()
        .map(|(_, m)| mean(rows, m, dims).to_dense())
        .collect();
    let norms: Vec<f64> = centroids.iter().map(|c| squared_norm(c)).collect();

    for (row, label) in labels.iter().enumerate() {
        let kept = matches!(label, Some(c) if retained.contains(c));
        if !kept {
            let target = nearest(&rows[row], &centroids, &norms);
            groups[target].1.push(row);
        }
    }

    groups.sort_by(|(ca, a), (cb, b)| b.len().cmp(&a.len()).then(ca.cmp(cb)));
    groups.iter().map(|(_, m)| mean(rows, m, dims)).collect()
}

fn mean(rows: &[SparseRow], members: &[usize], dims: usize) -> Vector {
    let mut sum: BTreeMap<usize, f64> = BTreeMap::new();
    for &row in members {
        for &(d, v) in &rows[row] {
            *sum.entry(d).or_insert(0.0) += v;
        }
    }
    let size = members.len().max(1) as f64;
    Vector::Mean {
        length: dims,
        entries: sum
            .into_iter()
            .filter(|&(_, v)| v != 0.0)
            .map(|(d, v)| (d, v / size))
            .collect(),
    }
}

/// Sense names: the bare term for the first sense, then `term-1`, `term-2`, …
pub fn sense_name(term: &str, sense: usize) -> String {
    if sense == 0 {
        term.to_string()
    } else {
        format!("{}-{}", term, sense)
    }
}
