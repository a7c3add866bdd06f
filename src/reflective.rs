//! Reflective random indexing: the second pass.
//!
//! Every document is replayed once. Its document vector is the sum of the
//! frozen first-pass vectors of the terms in it, and that vector is then
//! added into the reflective vector of each distinct term of the document.
//! First-pass vectors are owned by the refiner and never locked or written
//! during the replay.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::SemanticEncoding;
use crate::corpus::{CompressedCorpus, CompressedDocument};
use crate::error::{Result, RiError};
use crate::pool::ReplayPool;
use crate::vsa::semantic::{SemanticVector, Vector};

/// Lifecycle of a refiner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefinerState {
    Created,
    Replaying,
    Done,
}

pub struct ReflectiveRefiner {
    state: RefinerState,
    length: usize,
    /// Frozen first-pass vectors, indexed by term id.
    cooccurrence: Vec<SemanticVector>,
    reflective: Vec<Mutex<SemanticVector>>,
}

impl ReflectiveRefiner {
    /// `cooccurrence[id]` is the finished first-pass vector of term `id`.
    pub fn new(
        cooccurrence: Vec<SemanticVector>,
        length: usize,
        encoding: SemanticEncoding,
    ) -> Self {
        let reflective = (0..cooccurrence.len())
            .map(|_| Mutex::new(SemanticVector::new(length, encoding)))
            .collect();
        ReflectiveRefiner {
            state: RefinerState::Created,
            length,
            cooccurrence,
            reflective,
        }
    }

    pub fn state(&self) -> RefinerState {
        self.state
    }

    fn check(&self, id: i32) -> Result<usize> {
        usize::try_from(id)
            .ok()
            .filter(|&i| i < self.cooccurrence.len())
            .ok_or(RiError::UnknownTermId { id })
    }

    /// Sum of the first-pass vectors of every non-sentinel token.
    pub fn document_vector(&self, document: &CompressedDocument) -> Result<Vec<i64>> {
        let mut sum = vec![0i64; self.length];
        for id in document.terms() {
            self.cooccurrence[self.check(id)?].add_to(&mut sum);
        }
        Ok(sum)
    }

    fn refine(&self, document: &CompressedDocument) -> Result<()> {
        let document_vector = self.document_vector(document)?;
        let distinct: BTreeSet<usize> = document
            .terms()
            .map(|id| self.check(id))
            .collect::<Result<_>>()?;
        for id in distinct {
            self.reflective[id].lock().add_dense(&document_vector);
        }
        Ok(())
    }

    /// Replay the corpus. Moves to `Done` only after every document has
    /// been folded in.
    pub fn replay(&mut self, corpus: &CompressedCorpus, pool: &ReplayPool) -> Result<()> {
        self.state = RefinerState::Replaying;
        info!(documents = corpus.len(), workers = pool.workers(), "reflective replay started");

        let this: &Self = self;
        let replayed = pool.replay(corpus, |index, document| {
            this.refine(document)?;
            debug!(document = index, tokens = document.token_count(), "reflected document");
            Ok(())
        })?;

        self.state = RefinerState::Done;
        info!(documents = replayed, "reflective replay finished");
        Ok(())
    }

    /// Reflective vector of a term, available once the replay is done.
    pub fn vector(&self, id: i32) -> Option<Vector> {
        if self.state != RefinerState::Done {
            return None;
        }
        let id = self.check(id).ok()?;
        Some(self.reflective[id].lock().freeze())
    }

    /// All reflective vectors by term id, once the replay is done.
    pub fn into_vectors(self) -> Option<Vec<Vector>> {
        if self.state != RefinerState::Done {
            return None;
        }
        Some(
            self.reflective
                .into_iter()
                .map(|v| v.into_inner().freeze())
                .collect(),
        )
    }
}
