//! First-pass sliding-window accumulation.
//!
//! A document is streamed once, in token order, through a window holding up
//! to `W` already-seen tokens and up to `W` upcoming ones. Every context
//! token's index vector, permuted by its signed distance to the focus when
//! order-sensitivity is on, is added into the focus term's semantic vector.
//! The document's term-id sequence is recorded along the way for replay.
//!
//! Empty tokens are the filtered-token sentinel: they occupy a position (and
//! so an offset) but contribute nothing.

use std::collections::{HashSet, VecDeque};

use crate::corpus::CompressedDocument;
use crate::error::Result;
use crate::sense::{CooccurrenceCounts, DocumentCounts};
use crate::term_index::TermIndex;
use crate::vsa::generator::IndexVectorMap;
use crate::vsa::permutation::{Permutation, PermutationFunction};
use crate::vsa::semantic::SemanticStore;

/// Look-behind and look-ahead queues around the current focus token.
#[derive(Clone, Debug)]
pub struct Window<T> {
    size: usize,
    prev: VecDeque<T>,
    next: VecDeque<T>,
}

impl<T> Window<T> {
    pub fn new(size: usize) -> Self {
        Window {
            size,
            prev: VecDeque::with_capacity(size + 1),
            next: VecDeque::with_capacity(size + 1),
        }
    }

    /// Fill the look-ahead with up to `size` tokens.
    pub fn prefetch<I: Iterator<Item = T>>(&mut self, tokens: &mut I) {
        while self.next.len() < self.size {
            match tokens.next() {
                Some(token) => self.next.push_back(token),
                None => break,
            }
        }
    }

    /// Take the next focus and slide one more token into the look-ahead.
    pub fn advance<I: Iterator<Item = T>>(&mut self, tokens: &mut I) -> Option<T> {
        let focus = self.next.pop_front()?;
        if let Some(token) = tokens.next() {
            self.next.push_back(token);
        }
        Some(focus)
    }

    /// Context tokens with their offsets from the focus: look-behind as
    /// `-len..=-1` (oldest first), then look-ahead as `1..=len`.
    pub fn context(&self) -> impl Iterator<Item = (isize, &T)> {
        let behind = self.prev.len() as isize;
        let before = self
            .prev
            .iter()
            .enumerate()
            .map(move |(i, t)| (i as isize - behind, t));
        let after = self.next.iter().enumerate().map(|(i, t)| (i as isize + 1, t));
        before.chain(after)
    }

    /// Move the finished focus into the look-behind, dropping the oldest.
    pub fn retire(&mut self, focus: T) {
        self.prev.push_back(focus);
        if self.prev.len() > self.size {
            self.prev.pop_front();
        }
    }
}

/// Shared first-pass state one document is accumulated into.
pub struct WindowedAccumulator<'a> {
    pub window_size: usize,
    pub index_vectors: &'a IndexVectorMap,
    /// `None` disables order sensitivity.
    pub permutation: Option<&'a Permutation>,
    pub terms: &'a TermIndex,
    pub semantics: &'a SemanticStore,
    /// Empty means every term keeps semantics.
    pub filter: &'a HashSet<String>,
    /// Occurrence and joint counts, kept only for sense induction.
    pub cooccurrence: Option<&'a CooccurrenceCounts>,
}

impl<'a> WindowedAccumulator<'a> {
    fn keeps_semantics(&self, term: &str) -> bool {
        !term.is_empty() && (self.filter.is_empty() || self.filter.contains(term))
    }

    /// Accumulate one document and return its compressed form.
    ///
    /// Co-occurrence never crosses the document boundary: the window starts
    /// empty and is dropped at the end.
    pub fn accumulate<I, S>(&self, tokens: I) -> Result<CompressedDocument>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokens = tokens.into_iter();
        let mut window = Window::new(self.window_size);
        let mut document = CompressedDocument::new();
        let mut counts = self.cooccurrence.map(|_| DocumentCounts::default());

        window.prefetch(&mut tokens);
        while let Some(focus) = window.advance(&mut tokens) {
            let word = focus.as_ref();
            if let Some(counts) = counts.as_mut() {
                if !word.is_empty() {
                    counts.occurrence(self.terms.id_of(word));
                }
            }

            if !self.keeps_semantics(word) {
                document.push_filtered();
                window.retire(focus);
                continue;
            }

            let focus_id = self.terms.id_of(word);
            document.push(focus_id);
            let meaning = self.semantics.handle(focus_id);

            for (offset, context) in window.context() {
                let context = context.as_ref();
                if context.is_empty() {
                    continue;
                }
                let index = self.index_vectors.get(context)?;
                if let Some(counts) = counts.as_mut() {
                    counts.co_occurrence(focus_id, self.terms.id_of(context));
                }
                match self.permutation {
                    Some(permutation) => {
                        let permuted = permutation.permute(&index, offset);
                        meaning.lock().add_index(&permuted);
                    }
                    None => meaning.lock().add_index(&index),
                }
            }
            window.retire(focus);
        }

        if let (Some(total), Some(counts)) = (self.cooccurrence, counts) {
            total.merge(counts);
        }
        Ok(document)
    }
}
