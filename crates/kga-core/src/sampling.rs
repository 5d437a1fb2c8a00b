//! Negative sampling by triplet corruption.
//!
//! Each sampler returns a fresh `Vec`; the input batch is never touched.
//!
//! | Sampler | Rows out | Distinct from source |
//! |---------|----------|----------------------|
//! | [`sample_negatives`] | `m` | not checked (with replacement) |
//! | [`sample_negatives_both`] | `2m` | always |
//! | [`sample_negatives_decoupled`] | `m` | not checked |
//! | [`sample_negatives_relation`] | `m` | always |
//!
//! # Preconditions
//!
//! Indices are not validated. Vocabulary sizes must be non-zero, and the
//! rejection samplers need at least two candidates to choose from or they
//! never terminate.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::triplet::{Slot, Triplet};

fn random_side<R: Rng + ?Sized>(rng: &mut R) -> Slot {
    if rng.random_bool(0.5) {
        Slot::Subject
    } else {
        Slot::Object
    }
}

/// Redraw from `[0, n)` until the value differs from `original`.
fn draw_other<R: Rng + ?Sized>(rng: &mut R, n: usize, original: usize) -> usize {
    loop {
        let candidate = rng.random_range(0..n);
        if candidate != original {
            return candidate;
        }
    }
}

/// Corrupt one uniformly chosen entity slot per row with a uniform entity.
///
/// The replacement may coincide with the original value.
pub fn sample_negatives<R: Rng + ?Sized>(
    batch: &[Triplet],
    n_entities: usize,
    rng: &mut R,
) -> Vec<Triplet> {
    batch
        .iter()
        .map(|t| {
            let side = random_side(rng);
            t.with(side, rng.random_range(0..n_entities))
        })
        .collect()
}

/// Corrupt both entity slots of every row, emitting two rows per input.
///
/// Output is interleaved: row `2i` has a new subject, row `2i + 1` a new
/// object, each guaranteed to differ from the value it replaced.
pub fn sample_negatives_both<R: Rng + ?Sized>(
    batch: &[Triplet],
    n_entities: usize,
    rng: &mut R,
) -> Vec<Triplet> {
    let mut out = Vec::with_capacity(batch.len() * 2);
    for t in batch {
        let subject = draw_other(rng, n_entities, t.subject);
        let object = draw_other(rng, n_entities, t.object);
        out.push(t.with(Slot::Subject, subject));
        out.push(t.with(Slot::Object, object));
    }
    out
}

/// Like [`sample_negatives`] for disjoint subject and object vocabularies.
pub fn sample_negatives_decoupled<R: Rng + ?Sized>(
    batch: &[Triplet],
    n_subjects: usize,
    n_objects: usize,
    rng: &mut R,
) -> Vec<Triplet> {
    batch
        .iter()
        .map(|t| match random_side(rng) {
            Slot::Subject => t.with(Slot::Subject, rng.random_range(0..n_subjects)),
            _ => t.with(Slot::Object, rng.random_range(0..n_objects)),
        })
        .collect()
}

/// Replace the relation of every row with a different relation.
pub fn sample_negatives_relation<R: Rng + ?Sized>(
    batch: &[Triplet],
    n_relations: usize,
    rng: &mut R,
) -> Vec<Triplet> {
    batch
        .iter()
        .map(|t| t.with(Slot::Relation, draw_other(rng, n_relations, t.relation)))
        .collect()
}

/// Corruption strategy used by the training loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeSampling {
    /// [`sample_negatives`].
    #[default]
    Uniform,
    /// [`sample_negatives_both`], split into a subject block and an object block.
    Both,
    /// [`sample_negatives_relation`].
    Relation,
}

impl NegativeSampling {
    /// Number of negative blocks one [`Self::blocks`] call produces.
    pub const fn blocks_per_draw(self) -> usize {
        match self {
            Self::Both => 2,
            Self::Uniform | Self::Relation => 1,
        }
    }

    /// Draw negatives as blocks aligned row-for-row with `batch`.
    pub fn blocks<R: Rng + ?Sized>(
        self,
        batch: &[Triplet],
        n_entities: usize,
        n_relations: usize,
        rng: &mut R,
    ) -> Vec<Vec<Triplet>> {
        match self {
            Self::Uniform => vec![sample_negatives(batch, n_entities, rng)],
            Self::Relation => vec![sample_negatives_relation(batch, n_relations, rng)],
            Self::Both => {
                let both = sample_negatives_both(batch, n_entities, rng);
                let (subjects, objects): (Vec<_>, Vec<_>) =
                    both.chunks_exact(2).map(|pair| (pair[0], pair[1])).unzip();
                vec![subjects, objects]
            }
        }
    }
}

impl std::str::FromStr for NegativeSampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "both" => Ok(Self::Both),
            "relation" | "rel" => Ok(Self::Relation),
            other => Err(format!("unknown negative sampling strategy: {other}")),
        }
    }
}
