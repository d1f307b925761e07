//! Per-epoch shuffling and batch partitioning.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Shuffle RNG: seeded when `seed` is set, otherwise drawn from the thread RNG.
pub fn shuffle_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// Working index set for one training call, shuffled with a borrowed RNG so the
/// permutation stream continues across calls.
#[derive(Debug)]
pub struct EpochSchedule<'a> {
    indices: Vec<usize>,
    batch_size: usize,
    rng: &'a mut StdRng,
}

impl<'a> EpochSchedule<'a> {
    pub fn new(indices: Vec<usize>, batch_size: usize, rng: &'a mut StdRng) -> Self {
        Self {
            indices,
            batch_size: batch_size.max(1),
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Batches per epoch: `ceil(len / batch_size)`.
    pub fn batches_per_epoch(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    /// Reshuffle the working set in place and split it into consecutive batches;
    /// only the last batch may be short.
    pub fn next_epoch(&mut self) -> Vec<Vec<usize>> {
        self.indices.shuffle(self.rng);
        self.indices
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }
}
