//! Known-true lookups for filtered ranking.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use candle_core::{DType, Tensor};
use tracing::debug;

use crate::error::{Error, Result};
use crate::triplet::Triplet;

/// Known-true objects per `(subject, relation)` and subjects per `(relation, object)`.
///
/// A candidate that appears here is skipped when ranking, except for the
/// triplet actually under test.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    objects: HashMap<(usize, usize), HashSet<usize>>,
    subjects: HashMap<(usize, usize), HashSet<usize>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every triplet of the given splits.
    pub fn from_triplets<'a>(triplets: impl IntoIterator<Item = &'a Triplet>) -> Self {
        let mut filter = Self::new();
        for t in triplets {
            filter.insert(*t);
        }
        filter
    }

    pub fn insert(&mut self, t: Triplet) {
        self.objects
            .entry((t.subject, t.relation))
            .or_default()
            .insert(t.object);
        self.subjects
            .entry((t.relation, t.object))
            .or_default()
            .insert(t.subject);
    }

    /// Is `object` known to complete `(subject, relation, ?)`.
    pub fn is_known_object(&self, subject: usize, relation: usize, object: usize) -> bool {
        self.objects
            .get(&(subject, relation))
            .is_some_and(|set| set.contains(&object))
    }

    /// Is `subject` known to complete `(?, relation, object)`.
    pub fn is_known_subject(&self, subject: usize, relation: usize, object: usize) -> bool {
        self.subjects
            .get(&(relation, object))
            .is_some_and(|set| set.contains(&subject))
    }

    /// Number of distinct known triplets.
    pub fn len(&self) -> usize {
        self.objects.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Build from per-row filter arrays aligned with `triplets`.
    ///
    /// Row `i` of `subjects` lists entities known to complete
    /// `(?, r_i, o_i)` and row `i` of `objects` those completing
    /// `(s_i, r_i, ?)`. Rows are padded with negative values.
    pub fn from_row_arrays(triplets: &[Triplet], subjects: &Tensor, objects: &Tensor) -> Result<Self> {
        let subjects = filter_rows(subjects, triplets.len())?;
        let objects = filter_rows(objects, triplets.len())?;

        let mut filter = Self::new();
        for ((t, subs), objs) in triplets.iter().zip(subjects).zip(objects) {
            let known_s = filter.subjects.entry((t.relation, t.object)).or_default();
            known_s.extend(subs.into_iter().filter(|&v| v >= 0).map(|v| v as usize));
            let known_o = filter.objects.entry((t.subject, t.relation)).or_default();
            known_o.extend(objs.into_iter().filter(|&v| v >= 0).map(|v| v as usize));
        }
        Ok(filter)
    }

    /// Load `filter_s_{split}.npy` and `filter_o_{split}.npy` from `dir`.
    ///
    /// Returns `Ok(None)` when either file is absent so that callers fall
    /// back to unfiltered ranking.
    pub fn load(dir: impl AsRef<Path>, split: &str, triplets: &[Triplet]) -> Result<Option<Self>> {
        let dir = dir.as_ref();
        let s_path = dir.join(format!("filter_s_{split}.npy"));
        let o_path = dir.join(format!("filter_o_{split}.npy"));
        if !s_path.exists() || !o_path.exists() {
            debug!(dir = %dir.display(), split, "filter arrays not found, ranking unfiltered");
            return Ok(None);
        }
        let subjects = Tensor::read_npy(&s_path)?;
        let objects = Tensor::read_npy(&o_path)?;
        let filter = Self::from_row_arrays(triplets, &subjects, &objects)?;
        debug!(split, known = filter.len(), "loaded filter arrays");
        Ok(Some(filter))
    }
}

fn filter_rows(array: &Tensor, expected: usize) -> Result<Vec<Vec<i64>>> {
    let rows = match array.rank() {
        1 => array.unsqueeze(1)?,
        2 => array.clone(),
        _ => {
            return Err(Error::InvalidDataset(format!(
                "filter array must be 2-D, got shape {:?}",
                array.dims()
            )))
        }
    };
    if rows.dim(0)? != expected {
        return Err(Error::InvalidDataset(format!(
            "filter array has {} rows but the split has {expected} triplets",
            rows.dim(0)?
        )));
    }
    Ok(rows.to_dtype(DType::I64)?.to_vec2::<i64>()?)
}
