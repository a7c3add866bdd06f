//! Finished semantic spaces and their query surface.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::vsa::semantic::Vector;

/// Read access to a word → vector mapping.
pub trait SemanticSpace {
    /// The word's vector, or `None` if it was never observed.
    fn vector(&self, word: &str) -> Option<Vector>;

    /// Snapshot of the vocabulary.
    fn words(&self) -> BTreeSet<String>;

    fn vector_length(&self) -> usize;

    /// Identifier encoding the configuration that built the space.
    fn space_name(&self) -> String;
}

/// Immutable result of a finalized engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Space {
    name: String,
    vector_length: usize,
    vectors: BTreeMap<String, Vector>,
}

impl Space {
    pub fn new(
        name: impl Into<String>,
        vector_length: usize,
        vectors: BTreeMap<String, Vector>,
    ) -> Self {
        Space {
            name: name.into(),
            vector_length,
            vectors,
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Borrowing lookup; [`SemanticSpace::vector`] clones.
    pub fn get(&self, word: &str) -> Option<&Vector> {
        self.vectors.get(word)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Vector)> {
        self.vectors.iter().map(|(w, v)| (w.as_str(), v))
    }

    /// The `k` words most cosine-similar to `target`, best first.
    pub fn nearest_to(
        &self,
        target: &Vector,
        k: usize,
        exclude: Option<&str>,
    ) -> Vec<(String, f64)> {
        let mut scored: Vec<(String, f64)> = self
            .vectors
            .iter()
            .filter(|(w, _)| Some(w.as_str()) != exclude)
            .map(|(w, v)| (w.clone(), target.cosine(v)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    /// Nearest neighbours of a word in the space, excluding the word itself.
    pub fn nearest(&self, word: &str, k: usize) -> Option<Vec<(String, f64)>> {
        let target = self.vectors.get(word)?;
        Some(self.nearest_to(target, k, Some(word)))
    }

    /// Write the space as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl SemanticSpace for Space {
    fn vector(&self, word: &str) -> Option<Vector> {
        self.vectors.get(word).cloned()
    }

    fn words(&self) -> BTreeSet<String> {
        self.vectors.keys().cloned().collect()
    }

    fn vector_length(&self) -> usize {
        self.vector_length
    }

    fn space_name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> Space {
        let mut vectors = BTreeMap::new();
        vectors.insert("cat".to_string(), Vector::Dense { values: vec![3, 1, 0] });
        vectors.insert("dog".to_string(), Vector::Dense { values: vec![2, 1, 0] });
        vectors.insert("car".to_string(), Vector::Dense { values: vec![0, 0, 5] });
        Space::new("test-space", 3, vectors)
    }

    #[test]
    fn test_query_surface() {
        let s = space();
        assert_eq!(s.len(), 3);
        assert_eq!(s.vector_length(), 3);
        assert_eq!(s.space_name(), "test-space");
        assert!(s.vector("bird").is_none());
        assert_eq!(s.words().into_iter().collect::<Vec<_>>(), vec!["car", "cat", "dog"]);
    }

    #[test]
    fn test_nearest_neighbours() {
        let s = space();
        let near = s.nearest("cat", 2).unwrap();
        assert_eq!(near[0].0, "dog");
        assert_eq!(near[1].0, "car");
        assert!(near[0].1 > 0.9);
        assert_eq!(near[1].1, 0.0);
        assert!(s.nearest("bird", 2).is_none());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("space.json");
        let s = space();
        s.save_json(&path).unwrap();
        assert_eq!(Space::load_json(&path).unwrap(), s);
    }
}
