//! RESCAL (Nickel et al., 2011): a full `k x k` matrix per relation.

use candle_core::Tensor;
use rand::Rng;

use crate::error::Result;
use crate::model::{Dimensions, ModelConfig, ModelKind, ScoreBatch, ScoringModel};
use crate::params::{EmbeddingTable, ParamStore};

pub struct Rescal {
    params: ParamStore,
    entities: EmbeddingTable,
    relations: EmbeddingTable,
    dim: usize,
    lambda: f64,
}

impl Rescal {
    pub fn new<R: Rng + ?Sized>(
        params: ParamStore,
        config: &ModelConfig,
        dims: Dimensions,
        rng: &mut R,
    ) -> Result<Self> {
        let k = config.embedding_dim;
        let entities = params.embedding("entity", dims.n_entities, k, rng)?;
        let relations = params.embedding("relation", dims.n_relations, k * k, rng)?;
        Ok(Self {
            params,
            entities,
            relations,
            dim: k,
            lambda: config.embeddings_lambda,
        })
    }
}

impl ScoringModel for Rescal {
    fn kind(&self) -> ModelKind {
        ModelKind::Rescal
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn score(&self, batch: &ScoreBatch<'_>, _train: bool) -> Result<Tensor> {
        let (s, r, o) = batch.ids(self.device())?;
        let m = batch.len();
        let h = self.entities.forward(&s)?;
        let t = self.entities.forward(&o)?;
        let w = self.relations.forward(&r)?.reshape((m, self.dim, self.dim))?;
        // W t, row by row
        let wt = w.broadcast_mul(&t.unsqueeze(1)?)?.sum(2)?;
        Ok(h.mul(&wt)?.sum(1)?)
    }

    fn embedding_tables(&self) -> Vec<&EmbeddingTable> {
        vec![&self.entities, &self.relations]
    }

    fn embeddings_lambda(&self) -> f64 {
        self.lambda
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support;

    #[test]
    fn scores_one_value_per_row() {
        test_support::scores(ModelKind::Rescal);
    }

    #[test]
    fn matches_bilinear_form() {
        let m = test_support::model(ModelKind::Rescal);
        let triplets = test_support::triplets();
        let scores = m.predict(&ScoreBatch::new(&triplets), false).unwrap();

        let e = m.embedding_tables()[0].weights().to_vec2::<f32>().unwrap();
        let w = m.embedding_tables()[1].weights().to_vec2::<f32>().unwrap();
        let t = triplets[1];
        let k = 4;
        let mut expected = 0.0f32;
        for i in 0..k {
            for j in 0..k {
                expected += e[t.subject][i] * w[t.relation][i * k + j] * e[t.object][j];
            }
        }
        assert!((scores[1] - expected).abs() < 1e-5);
    }
}
