//! ER-MLP (Dong et al., 2014): an MLP over concatenated embeddings.

use candle_core::Tensor;
use candle_nn::{Dropout, Linear, Module};
use rand::Rng;

use super::{dropout_layer, maybe_dropout};
use crate::error::Result;
use crate::model::{Dimensions, ModelConfig, ModelKind, ScoreBatch, ScoringModel};
use crate::params::{EmbeddingTable, ParamStore};

pub struct ErMlp {
    params: ParamStore,
    entities: EmbeddingTable,
    relations: EmbeddingTable,
    hidden: Linear,
    output: Linear,
    dropout: Option<Dropout>,
    lambda: f64,
}

impl ErMlp {
    pub fn new<R: Rng + ?Sized>(
        params: ParamStore,
        config: &ModelConfig,
        dims: Dimensions,
        rng: &mut R,
    ) -> Result<Self> {
        let k = config.embedding_dim;
        let entities = params.embedding("entity", dims.n_entities, k, rng)?;
        let relations = params.embedding("relation", dims.n_relations, k, rng)?;
        let hidden = params.linear("mlp.hidden", 3 * k, config.hidden_dim, rng)?;
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

/// `Linear -> ReLU -> dropout -> Linear`, squeezed to one score per row.
pub(crate) fn mlp_head(
    features: &Tensor,
    hidden: &Linear,
    output: &Linear,
    dropout: Option<&Dropout>,
    train: bool,
) -> Result<Tensor> {
    let x = hidden.forward(features)?.relu()?;
    let x = maybe_dropout(dropout, &x, train)?;
    Ok(output.forward(&x)?.squeeze(1)?)
}

impl ScoringModel for ErMlp {
    fn kind(&self) -> ModelKind {
        ModelKind::ErMlp
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn score(&self, batch: &ScoreBatch<'_>, train: bool) -> Result<Tensor> {
        let (s, r, o) = batch.ids(self.device())?;
        let h = self.entities.forward(&s)?;
        let t = self.entities.forward(&o)?;
        let rel = self.relations.forward(&r)?;
        let phi = Tensor::cat(&[&h, &t, &rel], 1)?;
        mlp_head(&phi, &self.hidden, &self.output, self.dropout.as_ref(), train)
    }

    fn embedding_tables(&self) -> Vec<&EmbeddingTable> {
        vec![&self.entities, &self.relations]
    }

    fn embeddings_lambda(&self) -> f64 {
        self.lambda
    }
}
