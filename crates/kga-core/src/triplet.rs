//! The `(subject, relation, object)` index triple every other module works on.

use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A knowledge-graph fact as indices into the entity and relation vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triplet {
    pub subject: usize,
    pub relation: usize,
    pub object: usize,
}

/// One of the three positions of a triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Subject,
    Relation,
    Object,
}

impl Triplet {
    pub const fn new(subject: usize, relation: usize, object: usize) -> Self {
        Self {
            subject,
            relation,
            object,
        }
    }

    /// Value stored in `slot`.
    pub const fn get(&self, slot: Slot) -> usize {
        match slot {
            Slot::Subject => self.subject,
            Slot::Relation => self.relation,
            Slot::Object => self.object,
        }
    }

    /// Copy of `self` with `slot` overwritten by `value`.
    #[must_use]
    pub const fn with(self, slot: Slot, value: usize) -> Self {
        match slot {
            Slot::Subject => Self {
                subject: value,
                ..self
            },
            Slot::Relation => Self {
                relation: value,
                ..self
            },
            Slot::Object => Self {
                object: value,
                ..self
            },
        }
    }
}

impl From<(usize, usize, usize)> for Triplet {
    fn from((subject, relation, object): (usize, usize, usize)) -> Self {
        Self::new(subject, relation, object)
    }
}

/// Parse an `M x 3` integer tensor into triplets.
///
/// Negative entries are rejected; everything else is trusted.
pub fn triplets_from_tensor(tensor: &Tensor) -> Result<Vec<Triplet>> {
    let dims = tensor.dims();
    if dims.len() != 2 || dims[1] != 3 {
        return Err(Error::InvalidDataset(format!(
            "expected an M x 3 triplet array, got shape {dims:?}"
        )));
    }
    let rows = tensor.to_dtype(DType::I64)?.to_vec2::<i64>()?;
    rows.into_iter()
        .map(|row| match row[..] {
            [s, r, o] if s >= 0 && r >= 0 && o >= 0 => {
                Ok(Triplet::new(s as usize, r as usize, o as usize))
            }
            _ => Err(Error::InvalidDataset(format!(
                "negative index in triplet row {row:?}"
            ))),
        })
        .collect()
}

/// Column of indices at `slot` as a `u32` tensor, ready for an embedding lookup.
pub fn slot_ids(triplets: &[Triplet], slot: Slot, device: &Device) -> Result<Tensor> {
    let ids: Vec<u32> = triplets.iter().map(|t| t.get(slot) as u32).collect();
    Ok(Tensor::from_vec(ids, (triplets.len(),), device)?)
}

/// Largest entity and relation index seen, if any.
pub fn max_indices(triplets: &[Triplet]) -> Option<(usize, usize)> {
    triplets.iter().fold(None, |acc, t| {
        let entity = t.subject.max(t.object);
        Some(match acc {
            None => (entity, t.relation),
            Some((e, r)) => (e.max(entity), r.max(t.relation)),
        })
    })
}
