//! The random indexing engine.
//!
//! An engine moves through two phases:
//! - **Accumulating**: [`RandomIndexing::process_document`] may be called
//!   from any number of threads, one document per call.
//! - **Finalized**: [`RandomIndexing::finalize`] consumes the engine, seals
//!   the compressed corpus, runs the configured second pass and returns an
//!   immutable [`Space`].
//!
//! Consuming the engine on finalization means no document can arrive after
//! the corpus is sealed.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use crate::cluster::{KMeans, RowClusterer};
use crate::config::{RefinementMode, RiConfig, SenseConfig};
use crate::corpus::{CompressedCorpus, CorpusWriter};
use crate::error::{Result, RiError};
use crate::pool::ReplayPool;
use crate::reflective::ReflectiveRefiner;
use crate::sense::{sense_name, CooccurrenceCounts, SenseInducer};
use crate::space::{SemanticSpace, Space};
use crate::term_index::{TermIndex, TermTable};
use crate::vsa::generator::{IndexVectorGenerator, IndexVectorMap};
use crate::vsa::permutation::{Permutation, PermutationFunction};
use crate::vsa::semantic::{SemanticStore, SemanticVector};
use crate::vsa::IndexVector;
use crate::window::WindowedAccumulator;

/// Concurrent random indexing engine.
///
/// # Examples
///
/// ```
/// use semvec::{RandomIndexing, RiConfig, SemanticSpace};
///
/// let config = RiConfig { vector_length: 512, ..RiConfig::default() }.with_seed(1);
/// let engine = RandomIndexing::new(config).unwrap();
/// engine.process_document("the cat sat on the mat".split(' ')).unwrap();
/// engine.process_document("the dog sat on the rug".split(' ')).unwrap();
///
/// let space = engine.finalize().unwrap();
/// assert_eq!(space.vector_length(), 512);
/// assert!(space.vector("cat").is_some());
/// assert!(space.vector("bird").is_none());
/// assert_eq!(space.space_name(), "random-indexing-512v-2w-noPermutations");
/// ```
pub struct RandomIndexing {
    config: RiConfig,
    seed: u64,
    index_vectors: IndexVectorMap,
    permutation: Option<Permutation>,
    terms: TermIndex,
    semantics: SemanticStore,
    filter: HashSet<String>,
    cooccurrence: Option<CooccurrenceCounts>,
    corpus: Option<CorpusWriter>,
    documents: AtomicUsize,
}

impl RandomIndexing {
    /// Validates `config` and sets up an empty engine.
    ///
    /// A compressed corpus file is only opened when the mode has a second
    /// pass.
    pub fn new(config: RiConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);

        let generator = IndexVectorGenerator::from_config(&config);
        let permutation = config
            .use_permutations
            .then(|| Permutation::from_kind(config.permutation, config.vector_length, seed));
        let corpus = if config.mode.needs_replay() {
            Some(CorpusWriter::create(config.corpus_dir.as_deref())?)
        } else {
            None
        };
        let cooccurrence =
            matches!(config.mode, RefinementMode::Senses(_)).then(CooccurrenceCounts::new);

        debug!(
            seed,
            vector_length = config.vector_length,
            window_size = config.window_size,
            permutations = config.use_permutations,
            "created random indexing engine"
        );
        Ok(RandomIndexing {
            index_vectors: IndexVectorMap::new(config.vector_length, seed, generator),
            semantics: SemanticStore::new(config.vector_length, config.encoding),
            terms: TermIndex::new(),
            filter: HashSet::new(),
            documents: AtomicUsize::new(0),
            config,
            seed,
            permutation,
            cooccurrence,
            corpus,
        })
    }

    pub fn config(&self) -> &RiConfig {
        &self.config
    }

    /// The seed in effect, drawn from entropy when the config left it unset.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Restrict which terms get semantic vectors. Terms outside a non-empty
    /// filter still contribute their index vectors as context. An empty
    /// filter keeps every term.
    pub fn set_semantic_filter<I, S>(&mut self, terms: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = terms.into_iter().map(Into::into).collect();
    }

    /// Replace the term → index vector mapping, e.g. to share one random
    /// basis between engines. Every vector must have the engine's length.
    pub fn set_index_vectors(&mut self, vectors: HashMap<String, IndexVector>) -> Result<()> {
        self.index_vectors.replace_all(vectors)?;
        Ok(())
    }

    /// Copy of every index vector assigned so far.
    pub fn index_vectors(&self) -> HashMap<String, IndexVector> {
        self.index_vectors.snapshot()
    }

    pub fn save_index_vectors<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.index_vectors.save(path)
    }

    /// Accumulate one tokenized document. Empty tokens mark filtered
    /// positions.
    ///
    /// A corpus write failure is fatal to the engine: later calls and
    /// [`finalize`](Self::finalize) fail too.
    pub fn process_document<I, S>(&self, tokens: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accumulator = WindowedAccumulator {
            window_size: self.config.window_size,
            index_vectors: &self.index_vectors,
            permutation: self.permutation.as_ref(),
            terms: &self.terms,
            semantics: &self.semantics,
            filter: &self.filter,
            cooccurrence: self.cooccurrence.as_ref(),
        };
        let document = accumulator.accumulate(tokens)?;
        if let Some(corpus) = &self.corpus {
            corpus.append(&document)?;
        }
        let n = self.documents.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(document = n, tokens = document.token_count(), "processed document");
        Ok(())
    }

    /// Documents processed so far.
    pub fn document_count(&self) -> usize {
        self.documents.load(Ordering::Acquire)
    }

    /// Distinct terms seen so far.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Identifier of the space this engine will produce.
    pub fn space_name(&self) -> String {
        let order = match &self.permutation {
            Some(p) => p.name(),
            None => "noPermutations",
        };
        let base = format!(
            "random-indexing-{}v-{}w-{}",
            self.config.vector_length, self.config.window_size, order
        );
        match &self.config.mode {
            RefinementMode::Plain => base,
            RefinementMode::Reflective => format!("reflective-{}", base),
            RefinementMode::Senses(_) => format!("sense-induction-{}", base),
        }
    }

    /// Finalize with the built-in k-means clusterer.
    pub fn finalize(self) -> Result<Space> {
        let iterations = match &self.config.mode {
            RefinementMode::Senses(senses) => senses.kmeans_iterations,
            _ => KMeans::default().iterations,
        };
        self.finalize_with(&KMeans::new(iterations))
    }

    /// Seal the first pass, run the second pass if any, and build the space.
    /// `clusterer` is only used for sense induction.
    pub fn finalize_with<C: RowClusterer + ?Sized>(self, clusterer: &C) -> Result<Space> {
        let name = self.space_name();
        let RandomIndexing {
            config,
            seed,
            terms,
            semantics,
            cooccurrence,
            corpus,
            documents,
            ..
        } = self;

        let table = terms.table();
        let corpus = corpus.map(CorpusWriter::seal).transpose()?;
        let vectors = semantics.into_vectors();
        info!(
            documents = documents.into_inner(),
            terms = table.len(),
            "first pass sealed"
        );

        let pool = ReplayPool::from_config(&config);
        let space = match &config.mode {
            RefinementMode::Plain => plain_space(name, &config, &table, vectors)?,
            RefinementMode::Reflective => {
                let corpus = corpus.ok_or(RiError::ReplayIncomplete)?;
                reflective_space(name, &config, &table, vectors, &corpus, &pool)?
            }
            RefinementMode::Senses(senses) => {
                let corpus = corpus.ok_or(RiError::ReplayIncomplete)?;
                let counts = cooccurrence.unwrap_or_default();
                sense_space(name, senses, &table, &counts, &corpus, &pool, clusterer, seed)?
            }
        };
        info!(space = %space.space_name(), words = space.len(), "semantic space ready");
        Ok(space)
    }
}

fn plain_space(
    name: String,
    config: &RiConfig,
    table: &TermTable,
    vectors: BTreeMap<i32, SemanticVector>,
) -> Result<Space> {
    let mut words = BTreeMap::new();
    for (id, vector) in vectors {
        words.insert(table.term_of(id)?.to_string(), vector.freeze());
    }
    Ok(Space::new(name, config.vector_length, words))
}

fn reflective_space(
    name: String,
    config: &RiConfig,
    table: &TermTable,
    mut vectors: BTreeMap<i32, SemanticVector>,
    corpus: &CompressedCorpus,
    pool: &ReplayPool,
) -> Result<Space> {
    // Freeze the first pass; ids without semantics contribute zero
    let observed: Vec<i32> = vectors.keys().copied().collect();
    let frozen: Vec<SemanticVector> = (0..table.len() as i32)
        .map(|id| {
            vectors
                .remove(&id)
                .unwrap_or_else(|| SemanticVector::new(config.vector_length, config.encoding))
        })
        .collect();

    let mut refiner = ReflectiveRefiner::new(frozen, config.vector_length, config.encoding);
    refiner.replay(corpus, pool)?;
    let reflected = refiner.into_vectors().ok_or(RiError::ReplayIncomplete)?;

    let mut words = BTreeMap::new();
    for id in observed {
        let vector = reflected
            .get(id as usize)
            .cloned()
            .ok_or(RiError::UnknownTermId { id })?;
        words.insert(table.term_of(id)?.to_string(), vector);
    }
    Ok(Space::new(name, config.vector_length, words))
}

#[allow(clippy::too_many_arguments)]
fn sense_space<C: RowClusterer + ?Sized>(
    name: String,
    config: &SenseConfig,
    table: &TermTable,
    counts: &CooccurrenceCounts,
    corpus: &CompressedCorpus,
    pool: &ReplayPool,
    clusterer: &C,
    seed: u64,
) -> Result<Space> {
    let features = counts.select_features(config.significance);
    let with_features = features.values().filter(|f| !f.is_empty()).count();
    info!(
        terms = features.len(),
        with_features,
        corpus_size = counts.total(),
        "selected context features"
    );

    let dims = table.len();
    let inducer = SenseInducer::new(config.clone(), dims, features);
    inducer.collect(corpus, pool)?;
    let senses = inducer.induce(clusterer, seed);

    // Bare terms first, so a derived name like `bank-1` never replaces the
    // vectors of a vocabulary term spelled the same way.
    let mut words = BTreeMap::new();
    let mut derived = Vec::new();
    for (id, vectors) in senses {
        let term = table.term_of(id)?;
        for (i, vector) in vectors.into_iter().enumerate() {
            if i == 0 {
                words.insert(term.to_string(), vector);
            } else {
                derived.push((sense_name(term, i), vector));
            }
        }
    }
    for (sense, vector) in derived {
        match words.entry(sense) {
            Entry::Vacant(slot) => {
                slot.insert(vector);
            }
            Entry::Occupied(slot) => {
                warn!(
                    name = %slot.key(),
                    "sense name collides with a vocabulary term; sense dropped"
                );
            }
        }
    }
    info!(senses = words.len(), "sense induction finished");
    Ok(Space::new(name, dims, words))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PermutationKind;

    fn small(mode: RefinementMode) -> RiConfig {
        RiConfig {
            vector_length: 256,
            window_size: 1,
            mode,
            workers: 2,
            ..RiConfig::default()
        }
        .with_seed(17)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RiConfig {
            window_size: 0,
            ..RiConfig::default()
        };
        assert!(matches!(
            RandomIndexing::new(config),
            Err(RiError::Config(crate::error::ConfigError::ZeroWindowSize))
        ));
    }

    #[test]
    fn test_space_names() {
        let engine = RandomIndexing::new(small(RefinementMode::Plain)).unwrap();
        assert_eq!(engine.space_name(), "random-indexing-256v-1w-noPermutations");

        let reflective =
            small(RefinementMode::Reflective).with_permutations(PermutationKind::Shuffle);
        let engine = RandomIndexing::new(reflective).unwrap();
        assert_eq!(engine.space_name(), "reflective-random-indexing-256v-1w-shuffle");

        let engine = RandomIndexing::new(RiConfig::senses().with_seed(1)).unwrap();
        assert_eq!(engine.space_name(), "sense-induction-random-indexing-4000v-2w-noPermutations");
    }

    #[test]
    fn test_counts_and_empty_documents() {
        let engine = RandomIndexing::new(small(RefinementMode::Reflective)).unwrap();
        engine.process_document(Vec::<&str>::new()).unwrap();
        engine.process_document(["x", "y", "x"]).unwrap();
        assert_eq!(engine.document_count(), 2);
        assert_eq!(engine.term_count(), 2);
        let space = engine.finalize().unwrap();
        assert_eq!(space.words().len(), 2);
    }

    #[test]
    fn test_filter_limits_the_vocabulary() {
        let mut engine = RandomIndexing::new(small(RefinementMode::Plain)).unwrap();
        engine.set_semantic_filter(["cat"]);
        engine.process_document(["the", "cat", "sat"]).unwrap();
        let index = engine.index_vectors();
        let space = engine.finalize().unwrap();

        assert_eq!(space.words().into_iter().collect::<Vec<_>>(), vec!["cat"]);
        let mut expected = SemanticVector::new(256, Default::default());
        expected.add_index(&index["the"]);
        expected.add_index(&index["sat"]);
        assert_eq!(space.vector("cat").unwrap(), expected.freeze());
    }

    #[test]
    fn test_shared_index_vectors() {
        let first = RandomIndexing::new(small(RefinementMode::Plain)).unwrap();
        first.process_document(["a", "b"]).unwrap();

        let mut second = RandomIndexing::new(small(RefinementMode::Plain).with_seed(99)).unwrap();
        second.set_index_vectors(first.index_vectors()).unwrap();
        second.process_document(["a", "b"]).unwrap();

        assert_eq!(first.finalize().unwrap().vector("a"), second.finalize().unwrap().vector("a"));
    }

    #[test]
    fn test_mismatched_index_vectors_are_rejected() {
        let mut engine = RandomIndexing::new(small(RefinementMode::Plain)).unwrap();
        let mut vectors = HashMap::new();
        vectors.insert("a".to_string(), IndexVector::zero(8));
        assert!(engine.set_index_vectors(vectors).is_err());
    }

    #[test]
    fn test_sense_space_is_in_feature_space() {
        let engine = RandomIndexing::new(RiConfig {
            workers: 2,
            ..RiConfig::senses()
        }
        .with_seed(3))
        .unwrap();
        for _ in 0..10 {
            engine.process_document(["red", "apple"]).unwrap();
        }
        let vocabulary = engine.term_count();
        let space = engine.finalize().unwrap();
        assert_eq!(space.vector_length(), vocabulary);
        assert!(space.vector("red").is_some());
        assert!(space.vector("red-1").is_none());
    }

    #[test]
    fn test_vocabulary_term_wins_over_a_derived_sense_name() {
        let engine = RandomIndexing::new(RiConfig {
            window_size: 2,
            workers: 2,
            mode: RefinementMode::Senses(SenseConfig {
                context_window: 2,
                max_clusters: 2,
                min_cluster_fraction: 0.1,
                ..SenseConfig::default()
            }),
            ..RiConfig::default()
        }
        .with_seed(9))
        .unwrap();
        for _ in 0..20 {
            engine.process_document(["bank", "money", "loan"]).unwrap();
            engine.process_document(["bank", "river", "water"]).unwrap();
        }
        engine.process_document(["bank-1", "alone"]).unwrap();
        let space = engine.finalize().unwrap();
        assert_eq!(space.vector_length(), 7);

        // Ids follow first appearance: bank-1 is 5, alone is 6
        let own = space.vector("bank-1").unwrap();
        assert!(own.nonzero().iter().all(|&(d, _)| d == 6));
        assert_eq!(space.vector("bank").unwrap().nonzero().len(), 2);
        assert!(space.vector("bank-2").is_none());
        assert!(space.vector("alone").is_some());
    }
}
