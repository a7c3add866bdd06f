//! Engine configuration.
//!
//! Every option has a documented default; invalid values are rejected by
//! [`RiConfig::validate`] before an engine is built, never silently replaced.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default index and semantic vector length.
pub const DEFAULT_VECTOR_LENGTH: usize = 4000;

/// Default window size (+2/-2 words around the focus).
pub const DEFAULT_WINDOW_SIZE: usize = 2;

/// Nominal number of nonzero dimensions in an index vector.
pub const DEFAULT_INDEX_BITS: usize = 9;

/// Maximum deviation from [`DEFAULT_INDEX_BITS`].
pub const DEFAULT_INDEX_VARIANCE: usize = 3;

/// Chi-squared critical value for p = 0.05 with one degree of freedom.
pub const DEFAULT_SIGNIFICANCE: f64 = 3.841;

/// Selects how context index vectors are permuted by relative position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PermutationKind {
    /// Cyclic shift of dimension indices by the offset.
    #[default]
    Rotation,
    /// Powers of a single seeded random bijection on the dimensions.
    Shuffle,
}

impl FromStr for PermutationKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rotation" | "rotate" | "cyclic" => Ok(PermutationKind::Rotation),
            "shuffle" | "random" => Ok(PermutationKind::Shuffle),
            _ => Err(ConfigError::UnknownPermutation { name: s.to_string() }),
        }
    }
}

impl fmt::Display for PermutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermutationKind::Rotation => write!(f, "rotation"),
            PermutationKind::Shuffle => write!(f, "shuffle"),
        }
    }
}

/// Backing store for semantic vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SemanticEncoding {
    /// Only nonzero dimensions are stored.
    #[default]
    Sparse,
    /// One `i64` per dimension.
    Dense,
}

impl FromStr for SemanticEncoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sparse" => Ok(SemanticEncoding::Sparse),
            "dense" => Ok(SemanticEncoding::Dense),
            _ => Err(ConfigError::UnknownEncoding { name: s.to_string() }),
        }
    }
}

/// Parameters of the clustering (sense induction) mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenseConfig {
    /// Half-width of the window used to build context rows on replay.
    pub context_window: usize,
    /// Upper bound `K` on the clusters per term.
    pub max_clusters: usize,
    /// Clusters holding a smaller share of a term's contexts are discarded.
    pub min_cluster_fraction: f64,
    /// Log-likelihood threshold for a co-occurring term to count as a feature.
    pub significance: f64,
    /// Lloyd iterations for the built-in k-means clusterer.
    pub kmeans_iterations: usize,
}

impl Default for SenseConfig {
    fn default() -> Self {
        SenseConfig {
            context_window: 20,
            max_clusters: 7,
            min_cluster_fraction: 0.10,
            significance: DEFAULT_SIGNIFICANCE,
            kmeans_iterations: 100,
        }
    }
}

/// What happens after the first pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RefinementMode {
    /// Plain random indexing: the pass-1 vectors are the result.
    #[default]
    Plain,
    /// Reflective random indexing: a second pass sums document vectors.
    Reflective,
    /// Sense induction by clustering each term's contexts.
    Senses(SenseConfig),
}

impl RefinementMode {
    /// Whether this mode replays the compressed corpus.
    pub fn needs_replay(&self) -> bool {
        !matches!(self, RefinementMode::Plain)
    }
}

/// Configuration for a [`RandomIndexing`](crate::RandomIndexing) engine.
///
/// # Examples
///
/// ```
/// use semvec::RiConfig;
///
/// let config = RiConfig::default();
/// assert_eq!(config.vector_length, 4000);
/// assert_eq!(config.window_size, 2);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiConfig {
    pub vector_length: usize,
    pub window_size: usize,
    pub use_permutations: bool,
    pub permutation: PermutationKind,
    pub encoding: SemanticEncoding,
    pub index_bits: usize,
    pub index_variance: usize,
    /// Seed for every random draw the engine makes; `None` picks one from entropy.
    pub seed: Option<u64>,
    pub mode: RefinementMode,
    /// Worker threads used to replay the corpus.
    pub workers: usize,
    /// Bound on queued replay tasks.
    pub queue_capacity: usize,
    /// Directory for the compressed corpus file; the system temp dir if unset.
    pub corpus_dir: Option<PathBuf>,
}

impl Default for RiConfig {
    fn default() -> Self {
        RiConfig {
            vector_length: DEFAULT_VECTOR_LENGTH,
            window_size: DEFAULT_WINDOW_SIZE,
            use_permutations: false,
            permutation: PermutationKind::default(),
            encoding: SemanticEncoding::default(),
            index_bits: DEFAULT_INDEX_BITS,
            index_variance: DEFAULT_INDEX_VARIANCE,
            seed: None,
            mode: RefinementMode::Plain,
            workers: default_workers(),
            queue_capacity: 1024,
            corpus_dir: None,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RiConfig {
    /// Config for reflective random indexing with otherwise default values.
    pub fn reflective() -> Self {
        RiConfig {
            mode: RefinementMode::Reflective,
            ..Default::default()
        }
    }

    /// Config for sense induction with default clustering parameters.
    pub fn senses() -> Self {
        RiConfig {
            mode: RefinementMode::Senses(SenseConfig::default()),
            ..Default::default()
        }
    }

    /// Order-sensitive config using the given permutation strategy.
    pub fn with_permutations(mut self, kind: PermutationKind) -> Self {
        self.use_permutations = true;
        self.permutation = kind;
        self
    }

    /// Fixes the engine seed so runs are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Largest number of nonzero dimensions an index vector can receive.
    pub fn max_index_bits(&self) -> usize {
        self.index_bits + self.index_variance
    }

    /// Checks every option, failing on the first invalid one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vector_length == 0 {
            return Err(ConfigError::ZeroVectorLength);
        }
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindowSize);
        }
        if self.index_bits == 0 {
            return Err(ConfigError::ZeroIndexBits);
        }
        if self.index_variance >= self.index_bits {
            return Err(ConfigError::VarianceTooLarge {
                bits: self.index_bits,
                variance: self.index_variance,
            });
        }
        if self.max_index_bits() > self.vector_length {
            return Err(ConfigError::VectorTooShort {
                length: self.vector_length,
                bits: self.max_index_bits(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if let RefinementMode::Senses(senses) = &self.mode {
            if senses.max_clusters == 0 {
                return Err(ConfigError::ZeroClusters);
            }
            if senses.context_window == 0 {
                return Err(ConfigError::ZeroContextWindow);
            }
            if !(0.0..=1.0).contains(&senses.min_cluster_fraction) {
                return Err(ConfigError::ClusterFractionOutOfRange {
                    value: senses.min_cluster_fraction,
                });
            }
        }
        Ok(())
    }

    /// Parses a JSON config; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RiConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RiConfig::default();
        assert_eq!(config.vector_length, DEFAULT_VECTOR_LENGTH);
        assert_eq!(config.encoding, SemanticEncoding::Sparse);
        assert!(!config.use_permutations);
        assert!(config.validate().is_ok());
        assert!(RiConfig::reflective().validate().is_ok());
        assert!(RiConfig::senses().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_window() {
        let config = RiConfig {
            window_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroWindowSize)));
    }

    #[test]
    fn test_rejects_short_vectors() {
        let config = RiConfig {
            vector_length: 8,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VectorTooShort { length: 8, bits: 12 })
        ));
    }

    #[test]
    fn test_rejects_bad_cluster_fraction() {
        let mut senses = SenseConfig::default();
        senses.min_cluster_fraction = 1.5;
        let config = RiConfig {
            mode: RefinementMode::Senses(senses),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ClusterFractionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_permutation_selector_parsing() {
        assert_eq!("rotation".parse::<PermutationKind>().unwrap(), PermutationKind::Rotation);
        assert_eq!("Shuffle".parse::<PermutationKind>().unwrap(), PermutationKind::Shuffle);
        let err = "edu.Whatever".parse::<PermutationKind>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPermutation { .. }));
    }

    #[test]
    fn test_json_partial_config() {
        let json = r#"{
            "vector_length": 512,
            "use_permutations": true,
            "permutation": "shuffle",
            "mode": "reflective"
        }"#;
        let config = RiConfig::from_json_str(json).unwrap();
        assert_eq!(config.vector_length, 512);
        assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
        assert_eq!(config.permutation, PermutationKind::Shuffle);
        assert_eq!(config.mode, RefinementMode::Reflective);
    }

    #[test]
    fn test_json_sense_config() {
        let config = RiConfig::from_json_str(
            r#"{ "mode": { "senses": { "max_clusters": 3 } } }"#,
        )
        .unwrap();
        match config.mode {
            RefinementMode::Senses(s) => {
                assert_eq!(s.max_clusters, 3);
                assert_eq!(s.context_window, 20);
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn test_json_rejects_invalid_values() {
        assert!(RiConfig::from_json_str(r#"{ "vector_length": 0 }"#).is_err());
        assert!(RiConfig::from_json_str(r#"{ "permutation": "bogus" }"#).is_err());
    }
}
