//! Literal-augmented models: entity embeddings combined with per-entity
//! numeric attributes.
//!
//! Both read `subject_literals` and `object_literals` from the
//! [`ScoreBatch`]; building a batch without them is a validation error.

use candle_core::Tensor;
use candle_nn::{Dropout, Linear, Module};
use rand::Rng;

use super::distmult::trilinear;
use super::dropout_layer;
use super::ermlp::mlp_head;
use crate::error::Result;
use crate::model::{Dimensions, ModelConfig, ModelKind, ScoreBatch, ScoringModel};
use crate::params::{EmbeddingTable, ParamStore};

/// DistMult over entity vectors fused with their projected literals.
///
/// Each side's literal row is projected to `k` dims, concatenated with the
/// entity embedding and passed through a shared `Linear(2k, k) + ReLU`
/// before the trilinear product.
pub struct DistMultLiteral {
    params: ParamStore,
    entities: EmbeddingTable,
    relations: EmbeddingTable,
    subject_proj: Linear,
    object_proj: Linear,
    fuse: Linear,
    lambda: f64,
}

impl DistMultLiteral {
    pub fn new<R: Rng + ?Sized>(
        params: ParamStore,
        config: &ModelConfig,
        dims: Dimensions,
        rng: &mut R,
    ) -> Result<Self> {
        let k = config.embedding_dim;
        let entities = params.embedding("entity", dims.n_entities, k, rng)?;
        let relations = params.embedding("relation", dims.n_relations, k, rng)?;
        let subject_proj = params.linear("literal.subject", dims.n_literals, k, rng)?;
        let object_proj = params.linear("literal.object", dims.n_literals, k, rng)?;
        let fuse = params.linear("literal.fuse", 2 * k, k, rng)?;
        Ok(Self {
            params,
            entities,
            relations,
            subject_proj,
            object_proj,
            fuse,
            lambda: config.embeddings_lambda,
        })
    }

    fn fused(&self, embedding: &Tensor, literals: &Tensor, proj: &Linear) -> Result<Tensor> {
        let projected = proj.forward(literals)?;
        let joint = Tensor::cat(&[embedding, &projected], 1)?;
        Ok(self.fuse.forward(&joint)?.relu()?)
    }
}

impl ScoringModel for DistMultLiteral {
    fn kind(&self) -> ModelKind {
        ModelKind::DistMultLiteral
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn score(&self, batch: &ScoreBatch<'_>, _train: bool) -> Result<Tensor> {
        let (lit_s, lit_o) = batch.literals()?;
        let (s, r, o) = batch.ids(self.device())?;
        let h = self.fused(&self.entities.forward(&s)?, lit_s, &self.subject_proj)?;
        let t = self.fused(&self.entities.forward(&o)?, lit_o, &self.object_proj)?;
        trilinear(&h, &self.relations.forward(&r)?, &t)
    }

    fn embedding_tables(&self) -> Vec<&EmbeddingTable> {
        vec![&self.entities, &self.relations]
    }

    fn embeddings_lambda(&self) -> f64 {
        self.lambda
    }
}

/// ER-MLP whose input also carries both literal rows: `[h; r; t; l_h; l_t]`.
pub struct ErMlpLiteral {
    params: ParamStore,
    entities: EmbeddingTable,
    relations: EmbeddingTable,
    hidden: Linear,
    output: Linear,
    dropout: Option<Dropout>,
    lambda: f64,
}

impl ErMlpLiteral {
    pub fn new<R: Rng + ?Sized>(
        params: ParamStore,
        config: &ModelConfig,
        dims: Dimensions,
        rng: &mut R,
    ) -> Result<Self> {
        let k = config.embedding_dim;
        let entities = params.embedding("entity", dims.n_entities, k, rng)?;
        let relations = params.embedding("relation", dims.n_relations, k, rng)?;
        let in_dim = 3 * k + 2 * dims.n_literals;
        let hidden = params.linear("mlp.hidden", in_dim, config.hidden_dim, rng)?;
        let output = params.linear("mlp.output", config.hidden_dim, 1, rng)?;
        Ok(Self {
            params,
            entities,
            relations,
            hidden,
            output,
            dropout: dropout_layer(config.dropout),
            lambda: config.embeddings_lambda,
        })
    }
}

impl ScoringModel for ErMlpLiteral {
    fn kind(&self) -> ModelKind {
        ModelKind::ErMlpLiteral
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn score(&self, batch: &ScoreBatch<'_>, train: bool) -> Result<Tensor> {
        let (lit_s, lit_o) = batch.literals()?;
        let (s, r, o) = batch.ids(self.device())?;
        let h = self.entities.forward(&s)?;
        let rel = self.relations.forward(&r)?;
        let t = self.entities.forward(&o)?;
        let phi = Tensor::cat(&[&h, &rel, &t, lit_s, lit_o], 1)?;
        mlp_head(&phi, &self.hidden, &self.output, self.dropout.as_ref(), train)
    }

    fn embedding_tables(&self) -> Vec<&EmbeddingTable> {
        vec![&self.entities, &self.relations]
    }

    fn embeddings_lambda(&self) -> f64 {
        self.lambda
    }
}
