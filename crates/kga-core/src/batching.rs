//! Epoch minibatching.

use rand::seq::{index, SliceRandom};
use rand::Rng;

/// One pass over a dataset in consecutive chunks.
///
/// Produced by [`minibatches`]. The last chunk may be short; nothing is
/// padded or dropped. Once exhausted it stays exhausted.
#[derive(Debug, Clone)]
pub struct Minibatches<T> {
    rows: Vec<T>,
    batch_size: usize,
    cursor: usize,
}

impl<T: Clone> Iterator for Minibatches<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.rows.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.rows.len());
        let batch = self.rows[self.cursor..end].to_vec();
        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.rows.len() - self.cursor;
        let n = left.div_ceil(self.batch_size);
        (n, Some(n))
    }
}

impl<T: Clone> ExactSizeIterator for Minibatches<T> {}

/// Split `rows` into batches of `batch_size`, optionally after a fresh shuffle.
///
/// The permutation comes from `rng`, so consecutive calls with the same
/// generator see different orderings. A `batch_size` of zero is treated as one.
pub fn minibatches<T: Clone, R: Rng + ?Sized>(
    rows: &[T],
    batch_size: usize,
    shuffle: bool,
    rng: &mut R,
) -> Minibatches<T> {
    let mut rows = rows.to_vec();
    if shuffle {
        rows.shuffle(rng);
    }
    Minibatches {
        rows,
        batch_size: batch_size.max(1),
        cursor: 0,
    }
}

/// A single minibatch drawn without replacement.
///
/// Asking for more rows than exist returns every row (in random order).
pub fn random_minibatch<T: Clone, R: Rng + ?Sized>(
    rows: &[T],
    size: usize,
    rng: &mut R,
) -> Vec<T> {
    let amount = size.min(rows.len());
    index::sample(rng, rows.len(), amount)
        .into_iter()
        .map(|i| rows[i].clone())
        .collect()
}
