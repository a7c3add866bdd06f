//! Index vector generation and per-term memoization.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::config::RiConfig;
use crate::error::{ConfigError, Result, RiError};
use crate::vsa::IndexVector;

/// Draws random sparse ternary index vectors.
///
/// The generator holds no randomness of its own: every call takes the RNG to
/// draw from, so the caller decides how vectors are seeded and memoized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexVectorGenerator {
    bits: usize,
    variance: usize,
}

impl IndexVectorGenerator {
    /// Generator producing `bits ± variance` nonzero dimensions per vector.
    pub fn new(bits: usize, variance: usize) -> Self {
        IndexVectorGenerator { bits, variance }
    }

    pub fn from_config(config: &RiConfig) -> Self {
        Self::new(config.index_bits, config.index_variance)
    }

    /// Upper bound on the nonzero dimensions of a generated vector.
    pub fn max_bits(&self) -> usize {
        self.bits + self.variance
    }

    /// Create a fresh index vector of the given length.
    ///
    /// Picks `bits ± variance` distinct dimensions uniformly without
    /// replacement and splits them into a positive and a negative half.
    ///
    /// # Examples
    ///
    /// ```
    /// use rand::SeedableRng;
    /// use semvec::vsa::generator::IndexVectorGenerator;
    ///
    /// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    /// let v = IndexVectorGenerator::new(9, 3).create(4000, &mut rng).unwrap();
    /// assert!((6..=12).contains(&v.nnz()));
    /// assert!(v.is_disjoint());
    /// ```
    pub fn create<R: Rng + ?Sized>(&self, length: usize, rng: &mut R) -> Result<IndexVector> {
        if length < self.max_bits() {
            return Err(RiError::IndexVectorTooShort {
                length,
                bits: self.max_bits(),
            });
        }

        let count = if self.variance == 0 {
            self.bits
        } else {
            let delta = rng.gen_range(0..=self.variance);
            if rng.gen_bool(0.5) {
                self.bits + delta
            } else {
                self.bits.saturating_sub(delta)
            }
        };

        let mut drawn = rand::seq::index::sample(rng, length, count).into_vec();
        drawn.shuffle(rng);

        // Odd counts give the extra dimension to a random side
        let mut half = count / 2;
        if count % 2 == 1 && rng.gen_bool(0.5) {
            half += 1;
        }
        let neg = drawn.split_off(half);
        Ok(IndexVector::new(length, drawn, neg))
    }
}

/// Memoized term → index vector mapping.
///
/// A term's vector is drawn from an RNG seeded with
/// `SHA-256(seed ‖ term)`, so it is the same no matter which thread asks first
/// or in which order terms arrive.
pub struct IndexVectorMap {
    length: usize,
    seed: u64,
    generator: IndexVectorGenerator,
    vectors: DashMap<String, Arc<IndexVector>>,
}

impl IndexVectorMap {
    pub fn new(length: usize, seed: u64, generator: IndexVectorGenerator) -> Self {
        IndexVectorMap {
            length,
            seed,
            generator,
            vectors: DashMap::new(),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.vectors.contains_key(term)
    }

    /// Returns the term's index vector, creating it on first use.
    pub fn get(&self, term: &str) -> Result<Arc<IndexVector>> {
        if let Some(v) = self.vectors.get(term) {
            return Ok(Arc::clone(v.value()));
        }

        // Generate outside the shard lock; a racing thread draws the same vector.
        let mut rng = self.term_rng(term);
        let fresh = Arc::new(self.generator.create(self.length, &mut rng)?);
        let entry = self.vectors.entry(term.to_string()).or_insert(fresh);
        Ok(Arc::clone(entry.value()))
    }

    fn term_rng(&self, term: &str) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(term.as_bytes());
        let hash = hasher.finalize();

        // SHA256 always produces 32 bytes
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&hash);
        StdRng::from_seed(seed)
    }

    /// Copy of every vector created or imported so far.
    pub fn snapshot(&self) -> HashMap<String, IndexVector> {
        self.vectors
            .iter()
            .map(|e| (e.key().clone(), e.value().as_ref().clone()))
            .collect()
    }

    /// Replace the whole mapping with externally supplied vectors.
    pub fn replace_all(
        &self,
        vectors: HashMap<String, IndexVector>,
    ) -> std::result::Result<(), ConfigError> {
        if let Some((term, v)) = vectors.iter().find(|(_, v)| v.length() != self.length) {
            return Err(ConfigError::IndexVectorLength {
                term: term.clone(),
                actual: v.length(),
                expected: self.length,
            });
        }
        self.vectors.clear();
        for (term, v) in vectors {
            self.vectors.insert(term, Arc::new(v));
        }
        Ok(())
    }

    /// Write the mapping with bincode, terms in sorted order.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let ordered: BTreeMap<String, IndexVector> = self.snapshot().into_iter().collect();
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, &ordered)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a mapping written by [`IndexVectorMap::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<HashMap<String, IndexVector>> {
        let reader = BufReader::new(File::open(path)?);
        let ordered: BTreeMap<String, IndexVector> = bincode::deserialize_from(reader)?;
        Ok(ordered.into_iter().collect())
    }
}
