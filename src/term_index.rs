//! Term ↔ id bijection.
//!
//! Ids are dense `i32`s handed out from 0 in first-seen order and never
//! reused. They are written straight into the compressed corpus, where `-1`
//! is reserved for filtered tokens.

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{Result, RiError};

/// Concurrent, growing term → id map used during the first pass.
#[derive(Debug, Default)]
pub struct TermIndex {
    ids: DashMap<String, i32>,
    next_id: Mutex<i32>,
}

impl TermIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `term`, assigning the next free id on first sight.
    ///
    /// The common case is a lock-free read; only a miss takes the insertion
    /// mutex, and the lookup is repeated under it so two threads racing on a
    /// new term agree on one id.
    ///
    /// # Examples
    ///
    /// ```
    /// use semvec::TermIndex;
    ///
    /// let index = TermIndex::new();
    /// assert_eq!(index.id_of("cat"), 0);
    /// assert_eq!(index.id_of("dog"), 1);
    /// assert_eq!(index.id_of("cat"), 0);
    /// ```
    pub fn id_of(&self, term: &str) -> i32 {
        if let Some(id) = self.ids.get(term) {
            return *id;
        }

        let mut next = self.next_id.lock();
        if let Some(id) = self.ids.get(term) {
            return *id;
        }
        let id = *next;
        self.ids.insert(term.to_string(), id);
        *next += 1;
        id
    }

    /// Id of `term` if it has been seen.
    pub fn get(&self, term: &str) -> Option<i32> {
        self.ids.get(term).map(|id| *id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Builds the id → term table. Only meaningful once insertion has stopped.
    pub fn table(&self) -> TermTable {
        let mut terms = vec![String::new(); self.ids.len()];
        for entry in self.ids.iter() {
            let id = *entry.value() as usize;
            if id < terms.len() {
                terms[id] = entry.key().clone();
            }
        }
        TermTable { terms }
    }
}

/// Frozen id → term table built at finalization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TermTable {
    terms: Vec<String>,
}

impl TermTable {
    pub fn term_of(&self, id: i32) -> Result<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.terms.get(i))
            .map(String::as_str)
            .ok_or(RiError::UnknownTermId { id })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// `(id, term)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.terms
            .iter()
            .enumerate()
            .map(|(i, t)| (i as i32, t.as_str()))
    }
}
