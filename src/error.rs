//! Error types for semvec.
//!
//! Configuration problems are rejected before an engine exists; everything
//! else surfaces from document processing or from finalization. No error is
//! retried: a failed corpus write or replay leaves no usable partial space.

use std::io;

use thiserror::Error;

/// Invalid engine configuration, reported at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("vector length must be positive")]
    ZeroVectorLength,

    #[error("window size must be positive")]
    ZeroWindowSize,

    #[error("index vectors need up to {bits} nonzero dimensions but the vector length is {length}")]
    VectorTooShort {
        length: usize,
        bits: usize,
    },

    #[error("index vector bit count must be positive")]
    ZeroIndexBits,

    #[error("index vector variance {variance} must be smaller than the bit count {bits}")]
    VarianceTooLarge {
        bits: usize,
        variance: usize,
    },

    #[error("unknown permutation function '{name}' (expected 'rotation' or 'shuffle')")]
    UnknownPermutation {
        name: String,
    },

    #[error("unknown semantic vector encoding '{name}' (expected 'sparse' or 'dense')")]
    UnknownEncoding {
        name: String,
    },

    #[error("sense induction needs at least one cluster")]
    ZeroClusters,

    #[error("sense context window must be positive")]
    ZeroContextWindow,

    #[error("minimum cluster fraction {value} is outside [0, 1]")]
    ClusterFractionOutOfRange {
        value: f64,
    },

    #[error("worker count must be positive")]
    ZeroWorkers,

    #[error("index vector for '{term}' has length {actual}, expected {expected}")]
    IndexVectorLength {
        term: String,
        actual: usize,
        expected: usize,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Read(#[from] io::Error),
}

/// Errors raised while building or finalizing a semantic space.
#[derive(Debug, Error)]
pub enum RiError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("compressed corpus I/O failed: {0}")]
    CorpusIo(#[from] io::Error),

    #[error("malformed compressed corpus record for document {document}: {reason}")]
    MalformedCorpus {
        document: usize,
        reason: String,
    },

    #[error("compressed corpus writer failed earlier; the corpus is in an unknown state")]
    CorpusPoisoned,

    #[error("term id {id} is not present in the term table")]
    UnknownTermId {
        id: i32,
    },

    #[error("cannot draw {bits} distinct dimensions from a vector of length {length}")]
    IndexVectorTooShort {
        length: usize,
        bits: usize,
    },

    #[error("the second pass did not complete")]
    ReplayIncomplete,

    #[error("worker pool disconnected after {completed} of {expected} documents")]
    WorkerDisconnected {
        expected: usize,
        completed: usize,
    },

    #[error("index vector codec error: {0}")]
    IndexVectorCodec(#[from] bincode::Error),

    #[error("semantic space codec error: {0}")]
    SpaceCodec(#[from] serde_json::Error),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, RiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts_into_ri_error() {
        let err: RiError = ConfigError::ZeroWindowSize.into();
        assert!(matches!(err, RiError::Config(ConfigError::ZeroWindowSize)));
        assert!(err.to_string().contains("window size"));
    }

    #[test]
    fn test_io_error_is_corpus_error() {
        let err: RiError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(err.to_string().starts_with("compressed corpus I/O failed"));
    }
}
