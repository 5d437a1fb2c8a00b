//! The `ScoringModel` capability shared by every embedding model.
//!
//! A model maps a batch of triplets to one plausibility score per row
//! (higher = more plausible) and owns its parameters in a [`ParamStore`].
//! Losses, prediction, renormalisation and persistence are provided on top
//! of that single `score` method.
//!
//! # Models
//!
//! | Kind | Score | Literals |
//! |------|-------|----------|
//! | `rescal` | `hᵀ W_r t` | no |
//! | `distmult` | `Σ h ⊙ r ⊙ t` | no |
//! | `ermlp` | `MLP([h; t; r])` | no |
//! | `transe` | `-‖h + r - t‖` | no |
//! | `ntn` | `u_rᵀ f(hᵀ W_r t + V_r [h; t] + b_r)` | no |
//! | `distmult-literal` | DistMult over literal-fused entities | yes |
//! | `ermlp-literal` | `MLP([h; r; t; l_h; l_t])` | yes |
//!
//! Selection happens once through [`build_model`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use candle_core::{Device, Tensor};
use kga_core::{slot_ids, LiteralTable, Slot, Triplet};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::loss;
use crate::models::{DistMult, DistMultLiteral, ErMlp, ErMlpLiteral, Ntn, Rescal, TransE};
use crate::params::{EmbeddingTable, ParamStore};

/// Triplets to score plus, for literal models, one literal row per side.
#[derive(Debug, Clone)]
pub struct ScoreBatch<'a> {
    pub triplets: &'a [Triplet],
    pub subject_literals: Option<Tensor>,
    pub object_literals: Option<Tensor>,
}

impl<'a> ScoreBatch<'a> {
    pub fn new(triplets: &'a [Triplet]) -> Self {
        Self {
            triplets,
            subject_literals: None,
            object_literals: None,
        }
    }

    #[must_use]
    pub fn with_literals(mut self, subject: Tensor, object: Tensor) -> Self {
        self.subject_literals = Some(subject);
        self.object_literals = Some(object);
        self
    }

    /// Batch with literal rows gathered from `table` for both entity slots.
    pub fn resolve(triplets: &'a [Triplet], table: Option<&LiteralTable>) -> Result<Self> {
        let batch = Self::new(triplets);
        let Some(table) = table else {
            return Ok(batch);
        };
        let subjects: Vec<usize> = triplets.iter().map(|t| t.subject).collect();
        let objects: Vec<usize> = triplets.iter().map(|t| t.object).collect();
        Ok(batch.with_literals(table.gather(&subjects)?, table.gather(&objects)?))
    }

    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    /// Subject, relation and object index vectors on `device`.
    pub fn ids(&self, device: &Device) -> Result<(Tensor, Tensor, Tensor)> {
        Ok((
            slot_ids(self.triplets, Slot::Subject, device)?,
            slot_ids(self.triplets, Slot::Relation, device)?,
            slot_ids(self.triplets, Slot::Object, device)?,
        ))
    }

    /// Both literal blocks, or an error for a batch built without them.
    pub fn literals(&self) -> Result<(&Tensor, &Tensor)> {
        match (&self.subject_literals, &self.object_literals) {
            (Some(s), Some(o)) => Ok((s, o)),
            _ => Err(Error::Validation(
                "this model needs subject and object literal rows".into(),
            )),
        }
    }
}

/// The closed set of available models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    Rescal,
    #[serde(rename = "distmult")]
    DistMult,
    #[serde(rename = "ermlp")]
    ErMlp,
    #[serde(rename = "transe")]
    TransE,
    Ntn,
    #[serde(rename = "distmult-literal")]
    DistMultLiteral,
    #[serde(rename = "ermlp-literal")]
    ErMlpLiteral,
}

impl ModelKind {
    pub const ALL: [ModelKind; 7] = [
        Self::Rescal,
        Self::DistMult,
        Self::ErMlp,
        Self::TransE,
        Self::Ntn,
        Self::DistMultLiteral,
        Self::ErMlpLiteral,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Rescal => "rescal",
            Self::DistMult => "distmult",
            Self::ErMlp => "ermlp",
            Self::TransE => "transe",
            Self::Ntn => "ntn",
            Self::DistMultLiteral => "distmult-literal",
            Self::ErMlpLiteral => "ermlp-literal",
        }
    }

    /// Whether scoring needs per-entity literal rows.
    pub const fn requires_literals(self) -> bool {
        matches!(self, Self::DistMultLiteral | Self::ErMlpLiteral)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.to_ascii_lowercase().replace('_', "-");
        match key.as_str() {
            "rescal" => Ok(Self::Rescal),
            "distmult" => Ok(Self::DistMult),
            "ermlp" | "er-mlp" => Ok(Self::ErMlp),
            "transe" => Ok(Self::TransE),
            "ntn" => Ok(Self::Ntn),
            "distmult-literal" | "distmult-lit" => Ok(Self::DistMultLiteral),
            "ermlp-literal" | "ermlp-lit" | "erlmlp" => Ok(Self::ErMlpLiteral),
            other => Err(Error::Config(format!(
                "unknown model {other}, expected one of: {}",
                Self::ALL.map(Self::name).join(", ")
            ))),
        }
    }
}

/// Distance used by TransE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    L1,
    #[default]
    L2,
}

impl FromStr for Distance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l1" => Ok(Self::L1),
            "l2" => Ok(Self::L2),
            other => Err(Error::Config(format!("unknown distance {other}"))),
        }
    }
}

/// Architecture hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Embedding dimension `k` (default: 50).
    pub embedding_dim: usize,
    /// Hidden width of the MLP models (default: 100).
    pub hidden_dim: usize,
    /// Dropout before the MLP output layer (default: 0.0).
    pub dropout: f32,
    /// Number of NTN tensor slices (default: 4).
    pub ntn_slices: usize,
    /// TransE distance (default: L2).
    pub distance: Distance,
    /// Weight of the embedding-norm penalty in the log loss (default: 0.01).
    pub embeddings_lambda: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 50,
            hidden_dim: 100,
            dropout: 0.0,
            ntn_slices: 4,
            distance: Distance::L2,
            embeddings_lambda: 1e-2,
        }
    }
}

impl ModelConfig {
    pub fn with_embedding_dim(mut self, k: usize) -> Self {
        self.embedding_dim = k;
        self
    }

    pub fn with_hidden_dim(mut self, h: usize) -> Self {
        self.hidden_dim = h;
        self
    }

    pub fn with_dropout(mut self, p: f32) -> Self {
        self.dropout = p;
        self
    }

    pub fn with_ntn_slices(mut self, slices: usize) -> Self {
        self.ntn_slices = slices;
        self
    }

    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_embeddings_lambda(mut self, lambda: f64) -> Self {
        self.embeddings_lambda = lambda;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 || self.hidden_dim == 0 || self.ntn_slices == 0 {
            return Err(Error::Config(
                "embedding_dim, hidden_dim and ntn_slices must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.embeddings_lambda < 0.0 {
            return Err(Error::Config("embeddings_lambda must be non-negative".into()));
        }
        Ok(())
    }
}

/// Vocabulary sizes a model is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub n_entities: usize,
    pub n_relations: usize,
    /// Literal columns per entity; zero for models without literals.
    pub n_literals: usize,
}

/// A trainable triplet scorer.
pub trait ScoringModel {
    fn kind(&self) -> ModelKind;

    fn params(&self) -> &ParamStore;

    fn params_mut(&mut self) -> &mut ParamStore;

    /// One plausibility score per row, attached to the autograd graph.
    ///
    /// `train` toggles dropout.
    fn score(&self, batch: &ScoreBatch<'_>, train: bool) -> Result<Tensor>;

    /// Entity and relation tables subject to the log-loss norm penalty.
    fn embedding_tables(&self) -> Vec<&EmbeddingTable>;

    /// Tables rescaled by [`ScoringModel::normalize_embeddings`].
    fn normalized_tables(&self) -> Vec<&EmbeddingTable> {
        self.embedding_tables()
    }

    /// Weight of the norm penalty in [`ScoringModel::log_loss`].
    fn embeddings_lambda(&self) -> f64;

    fn device(&self) -> &Device {
        self.params().device()
    }

    fn forward(&self, batch: &ScoreBatch<'_>) -> Result<Tensor> {
        self.score(batch, true)
    }

    /// Detached scores in evaluation mode, optionally through a sigmoid.
    fn predict(&self, batch: &ScoreBatch<'_>, sigmoid: bool) -> Result<Vec<f32>> {
        let scores = self.score(batch, false)?.detach();
        let scores = if sigmoid {
            candle_nn::ops::sigmoid(&scores)?
        } else {
            scores
        };
        Ok(scores.to_vec1::<f32>()?)
    }

    /// Hinge loss of positives against `c` stacked negative blocks.
    fn ranking_loss(
        &self,
        positives: &Tensor,
        negatives: &Tensor,
        margin: f64,
        c: usize,
        average: bool,
    ) -> Result<Tensor> {
        loss::margin_ranking(positives, negatives, margin, c, average)
    }

    /// Binary cross-entropy on logits plus the embedding-norm penalty.
    fn log_loss(&self, scores: &Tensor, labels: &[f32], average: bool) -> Result<Tensor> {
        let nll = loss::bce_with_logits(scores, labels, average)?;
        let mut penalty = Tensor::zeros((), nll.dtype(), nll.device())?;
        for table in self.embedding_tables() {
            penalty = penalty.add(&table.norm_penalty(average)?)?;
        }
        Ok(nll.add(&penalty.affine(self.embeddings_lambda(), 0.0)?)?)
    }

    fn normalize_embeddings(&self) -> Result<()> {
        for table in self.normalized_tables() {
            table.renormalize()?;
        }
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.params().save(path)
    }

    /// Replace every parameter from `path`; any mismatch is an error.
    fn load(&mut self, path: &Path) -> Result<()> {
        self.params_mut().load(path)
    }
}

/// Instantiate `kind` with freshly initialised parameters.
pub fn build_model<R: Rng + ?Sized>(
    kind: ModelKind,
    config: &ModelConfig,
    dims: Dimensions,
    device: &Device,
    rng: &mut R,
) -> Result<Box<dyn ScoringModel>> {
    config.validate()?;
    if kind.requires_literals() && dims.n_literals == 0 {
        return Err(Error::Validation(format!(
            "{kind} needs a literal table with at least one column"
        )));
    }
    let params = ParamStore::new(device.clone());
    let model: Box<dyn ScoringModel> = match kind {
        ModelKind::Rescal => Box::new(Rescal::new(params, config, dims, rng)?),
        ModelKind::DistMult => Box::new(DistMult::new(params, config, dims, rng)?),
        ModelKind::ErMlp => Box::new(ErMlp::new(params, config, dims, rng)?),
        ModelKind::TransE => Box::new(TransE::new(params, config, dims, rng)?),
        ModelKind::Ntn => Box::new(Ntn::new(params, config, dims, rng)?),
        ModelKind::DistMultLiteral => Box::new(DistMultLiteral::new(params, config, dims, rng)?),
        ModelKind::ErMlpLiteral => Box::new(ErMlpLiteral::new(params, config, dims, rng)?),
    };
    Ok(model)
}
