//! Dataset directories of `.npy` triplet splits.
//!
//! Layout:
//!
//! ```text
//! <dir>/train.npy        M x 3 integer triplets
//! <dir>/val.npy          M x 3, optional labels in y_val.npy
//! <dir>/test.npy         M x 3, optional labels in y_test.npy
//! <dir>/idx2ent.npy      optional entity names (.txt with one per line also read)
//! <dir>/idx2rel.npy      optional relation names (.txt likewise)
//! ```
//!
//! Without vocabulary files the sizes are `max index + 1` over all splits.

use std::path::{Path, PathBuf};

use candle_core::{DType, Tensor};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::triplet::{max_indices, triplets_from_tensor, Triplet};
use crate::vocab::load_vocabulary;

/// One split, optionally labelled for classification.
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub triplets: Vec<Triplet>,
    pub labels: Option<Vec<f32>>,
}

impl Split {
    pub fn new(triplets: Vec<Triplet>) -> Self {
        Self {
            triplets,
            labels: None,
        }
    }

    /// Attach labels; there must be exactly one per triplet.
    pub fn with_labels(mut self, labels: Vec<f32>) -> Result<Self> {
        if labels.len() != self.triplets.len() {
            return Err(Error::InvalidDataset(format!(
                "{} labels for {} triplets",
                labels.len(),
                self.triplets.len()
            )));
        }
        self.labels = Some(labels);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    /// Triplets labelled positive, or all of them for an unlabelled split.
    pub fn positives(&self) -> Vec<Triplet> {
        match &self.labels {
            None => self.triplets.clone(),
            Some(labels) => self
                .triplets
                .iter()
                .zip(labels)
                .filter(|(_, y)| **y > 0.5)
                .map(|(t, _)| *t)
                .collect(),
        }
    }
}

/// Train, validation and test splits sharing one index space.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub root: PathBuf,
    pub train: Split,
    pub val: Split,
    pub test: Split,
    pub n_entities: usize,
    pub n_relations: usize,
    pub entity_names: Option<Vec<String>>,
    pub relation_names: Option<Vec<String>>,
}

impl Dataset {
    /// Load every split from `dir`. `train.npy` is required, the rest optional.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let name = root
            .file_name()
            .map_or_else(|| "dataset".to_string(), |n| n.to_string_lossy().into_owned());

        let train_path = root.join("train.npy");
        if !train_path.exists() {
            return Err(Error::NotFound(train_path.display().to_string()));
        }
        let train = Split::new(load_triplets(&train_path)?);
        let val = load_split(&root, "val")?;
        let test = load_split(&root, "test")?;

        let entities = load_vocabulary(&root, "idx2ent")?;
        let relations = load_vocabulary(&root, "idx2rel")?;

        let all = train
            .triplets
            .iter()
            .chain(&val.triplets)
            .chain(&test.triplets)
            .copied()
            .collect::<Vec<_>>();
        let (max_e, max_r) = max_indices(&all).unwrap_or((0, 0));
        let n_entities = entities.as_ref().map_or(max_e + 1, |v| v.len);
        let n_relations = relations.as_ref().map_or(max_r + 1, |v| v.len);
        if max_e >= n_entities || max_r >= n_relations {
            return Err(Error::InvalidDataset(format!(
                "indices exceed vocabulary: entity {max_e} / {n_entities}, relation {max_r} / {n_relations}"
            )));
        }

        info!(
            dataset = %name,
            train = train.len(),
            val = val.len(),
            test = test.len(),
            n_entities,
            n_relations,
            "loaded dataset"
        );

        Ok(Self {
            name,
            root,
            train,
            val,
            test,
            n_entities,
            n_relations,
            entity_names: entities.and_then(|v| v.names),
            relation_names: relations.and_then(|v| v.names),
        })
    }

    /// Every triplet of every split.
    pub fn known_triplets(&self) -> impl Iterator<Item = &Triplet> {
        self.train
            .triplets
            .iter()
            .chain(&self.val.triplets)
            .chain(&self.test.triplets)
    }

    pub fn entity_name(&self, index: usize) -> Option<&str> {
        self.entity_names.as_ref()?.get(index).map(String::as_str)
    }

    pub fn relation_name(&self, index: usize) -> Option<&str> {
        self.relation_names.as_ref()?.get(index).map(String::as_str)
    }
}

/// Read an `M x 3` integer array.
pub fn load_triplets(path: impl AsRef<Path>) -> Result<Vec<Triplet>> {
    let tensor = Tensor::read_npy(path.as_ref())?;
    triplets_from_tensor(&tensor)
}

/// Read a label vector of any numeric dtype as `f32`.
pub fn load_labels(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    let tensor = Tensor::read_npy(path.as_ref())?;
    Ok(tensor.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
}

fn load_split(root: &Path, name: &str) -> Result<Split> {
    let path = root.join(format!("{name}.npy"));
    if !path.exists() {
        debug!(split = name, "split not present");
        return Ok(Split::default());
    }
    let split = Split::new(load_triplets(&path)?);
    let labels_path = root.join(format!("y_{name}.npy"));
    if labels_path.exists() {
        split.with_labels(load_labels(&labels_path)?)
    } else {
        Ok(split)
    }
}
