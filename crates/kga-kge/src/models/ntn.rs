//! Neural Tensor Network (Socher et al., 2013).
//!
//! ```text
//! g(h, r, t) = u_rᵀ leaky_relu(hᵀ W_r^{[1..s]} t + V_r [h; t] + b_r)
//! ```
//!
//! with `s` bilinear slices per relation. All relation parameters are stored
//! as flat per-relation rows and reshaped after lookup.

use candle_core::Tensor;
use rand::Rng;

use crate::error::Result;
use crate::model::{Dimensions, ModelConfig, ModelKind, ScoreBatch, ScoringModel};
use crate::params::{EmbeddingTable, ParamStore};

const NEGATIVE_SLOPE: f64 = 0.01;

pub struct Ntn {
    params: ParamStore,
    entities: EmbeddingTable,
    /// `s * k * k` per relation.
    bilinear: EmbeddingTable,
    /// `s * 2k` per relation.
    linear: EmbeddingTable,
    bias: EmbeddingTable,
    output: EmbeddingTable,
    dim: usize,
    slices: usize,
    lambda: f64,
}

impl Ntn {
    pub fn new<R: Rng + ?Sized>(
        params: ParamStore,
        config: &ModelConfig,
        dims: Dimensions,
        rng: &mut R,
    ) -> Result<Self> {
        let k = config.embedding_dim;
        let s = config.ntn_slices;
        let n_r = dims.n_relations;
        let aux = 1.0 / ((2 * k) as f64).sqrt();

        let entities = params.embedding("entity", dims.n_entities, k, rng)?;
        let bilinear = params.embedding("relation", n_r, s * k * k, rng)?;
        let linear = params.table("ntn.linear", n_r, s * 2 * k, aux, rng)?;
        let bias = params.table("ntn.bias", n_r, s, aux, rng)?;
        let output = params.table("ntn.output", n_r, s, aux, rng)?;
        Ok(Self {
            params,
            entities,
            bilinear,
            linear,
            bias,
            output,
            dim: k,
            slices: s,
            lambda: config.embeddings_lambda,
        })
    }
}

impl ScoringModel for Ntn {
    fn kind(&self) -> ModelKind {
        ModelKind::Ntn
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn score(&self, batch: &ScoreBatch<'_>, _train: bool) -> Result<Tensor> {
        let (s, r, o) = batch.ids(self.device())?;
        let (m, k, slices) = (batch.len(), self.dim, self.slices);
        let h = self.entities.forward(&s)?;
        let t = self.entities.forward(&o)?;

        // (m, s, k, k) · t -> (m, s, k) · h -> (m, s)
        let w = self.bilinear.forward(&r)?.reshape((m, slices, k, k))?;
        let wt = w.broadcast_mul(&t.reshape((m, 1, 1, k))?)?.sum(3)?;
        let quad = wt.broadcast_mul(&h.reshape((m, 1, k))?)?.sum(2)?;

        let ht = Tensor::cat(&[&h, &t], 1)?;
        let v = self.linear.forward(&r)?.reshape((m, slices, 2 * k))?;
        let affine = v
            .broadcast_mul(&ht.reshape((m, 1, 2 * k))?)?
            .sum(2)?
            .add(&self.bias.forward(&r)?)?;

        let act = candle_nn::ops::leaky_relu(&quad.add(&affine)?, NEGATIVE_SLOPE)?;
        Ok(self.output.forward(&r)?.mul(&act)?.sum(1)?)
    }

    fn embedding_tables(&self) -> Vec<&EmbeddingTable> {
        vec![&self.entities, &self.bilinear]
    }

    fn embeddings_lambda(&self) -> f64 {
        self.lambda
    }
}
