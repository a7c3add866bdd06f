//! semvec - Random Indexing semantic spaces
//!
//! Copyright (c) 2025 semvec Contributors
//! Licensed under MIT License
//!
//! Builds word vectors incrementally from a stream of tokenized documents.
//! Every term gets a fixed sparse ternary index vector; a term's semantic
//! vector is the sum of the index vectors of the words seen around it.
//! Two refinements run over a compressed replay of the corpus:
//! reflective random indexing and sense induction by context clustering.
//!
//! # Examples
//!
//! ```
//! use semvec::{RandomIndexing, RiConfig, SemanticSpace};
//!
//! let engine = RandomIndexing::new(RiConfig::reflective().with_seed(7)).unwrap();
//! engine.process_document(["cats", "chase", "mice"]).unwrap();
//! engine.process_document(["dogs", "chase", "cats"]).unwrap();
//!
//! let space = engine.finalize().unwrap();
//! let near = space.nearest("cats", 3).unwrap();
//! assert_eq!(near.len(), 3);
//! ```

pub mod cli;
pub mod cluster;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod pool;
pub mod reflective;
pub mod sense;
pub mod space;
pub mod term_index;
pub mod vsa;
pub mod window;

// Re-export main types for convenience
pub use cluster::{KMeans, RowClusterer};
pub use config::{PermutationKind, RefinementMode, RiConfig, SemanticEncoding, SenseConfig};
pub use engine::RandomIndexing;
pub use error::{ConfigError, Result, RiError};
pub use space::{SemanticSpace, Space};
pub use term_index::{TermIndex, TermTable};
pub use vsa::generator::{IndexVectorGenerator, IndexVectorMap};
pub use vsa::permutation::{Permutation, PermutationFunction};
pub use vsa::semantic::{SemanticVector, Vector};
pub use vsa::IndexVector;
