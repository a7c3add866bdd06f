//! Order-encoding permutations of index vectors.
//!
//! A permutation function maps an index vector and a signed relative
//! position to a new index vector. Every strategy here satisfies
//!
//! ```text
//! permute(v, 0)             == v
//! permute(permute(v, a), b) == permute(v, a + b)
//! ```
//!
//! because each one is the `offset`-th power of a single bijection on the
//! dimensions (negative offsets use its inverse).

use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::PermutationKind;
use crate::vsa::IndexVector;

/// A bijective, offset-parameterized transform on index vectors.
pub trait PermutationFunction: Send + Sync {
    /// Permute `vector` for a context word `offset` positions from the focus.
    fn permute(&self, vector: &IndexVector, offset: isize) -> IndexVector;

    /// Short identifier used in space names.
    fn name(&self) -> &'static str;
}

/// Cyclic shift of the dimensions: `π^k(d) = (d + k) mod L`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rotation;

impl PermutationFunction for Rotation {
    fn permute(&self, vector: &IndexVector, offset: isize) -> IndexVector {
        vector.rotate(offset)
    }

    fn name(&self) -> &'static str {
        "rotation"
    }
}

/// Powers of one random bijection on `[0, L)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shuffle {
    forward: Vec<usize>,
    backward: Vec<usize>,
}

impl Shuffle {
    /// Draw a random bijection on `[0, length)`.
    pub fn new<R: Rng + ?Sized>(length: usize, rng: &mut R) -> Self {
        let mut forward: Vec<usize> = (0..length).collect();
        forward.shuffle(rng);

        let mut backward = vec![0usize; length];
        for (i, &target) in forward.iter().enumerate() {
            backward[target] = i;
        }
        Shuffle { forward, backward }
    }

    pub fn length(&self) -> usize {
        self.forward.len()
    }
}

impl PermutationFunction for Shuffle {
    fn permute(&self, vector: &IndexVector, offset: isize) -> IndexVector {
        debug_assert_eq!(vector.length(), self.length());
        let table = if offset >= 0 { &self.forward } else { &self.backward };
        let mut out = vector.clone();
        for _ in 0..offset.unsigned_abs() {
            out = out.remap(table);
        }
        out
    }

    fn name(&self) -> &'static str {
        "shuffle"
    }
}

/// The permutation strategy selected by configuration.
#[derive(Clone, Debug)]
pub enum Permutation {
    Rotation(Rotation),
    Shuffle(Shuffle),
}

impl Permutation {
    /// Resolve a configured strategy. `seed` only matters for `Shuffle`.
    pub fn from_kind(kind: PermutationKind, length: usize, seed: u64) -> Self {
        match kind {
            PermutationKind::Rotation => Permutation::Rotation(Rotation),
            PermutationKind::Shuffle => {
                let mut rng = StdRng::seed_from_u64(seed);
                Permutation::Shuffle(Shuffle::new(length, &mut rng))
            }
        }
    }
}

impl PermutationFunction for Permutation {
    fn permute(&self, vector: &IndexVector, offset: isize) -> IndexVector {
        match self {
            Permutation::Rotation(p) => p.permute(vector, offset),
            Permutation::Shuffle(p) => p.permute(vector, offset),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Permutation::Rotation(p) => p.name(),
            Permutation::Shuffle(p) => p.name(),
        }
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
