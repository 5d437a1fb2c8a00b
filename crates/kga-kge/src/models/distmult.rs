//! DistMult (Yang et al., 2015): diagonal bilinear scoring.

use candle_core::Tensor;
use rand::Rng;

use crate::error::Result;
use crate::model::{Dimensions, ModelConfig, ModelKind, ScoreBatch, ScoringModel};
use crate::params::{EmbeddingTable, ParamStore};

pub struct DistMult {
    params: ParamStore,
    entities: EmbeddingTable,
    relations: EmbeddingTable,
    lambda: f64,
}

impl DistMult {
    pub fn new<R: Rng + ?Sized>(
        params: ParamStore,
        config: &ModelConfig,
        dims: Dimensions,
        rng: &mut R,
    ) -> Result<Self> {
        let k = config.embedding_dim;
        let entities = params.embedding("entity", dims.n_entities, k, rng)?;
        let relations = params.embedding("relation", dims.n_relations, k, rng)?;
        Ok(Self {
            params,
            entities,
            relations,
            lambda: config.embeddings_lambda,
        })
    }
}

/// `Σ h ⊙ r ⊙ t` per row.
pub(crate) fn trilinear(h: &Tensor, r: &Tensor, t: &Tensor) -> Result<Tensor> {
    Ok(h.mul(r)?.mul(t)?.sum(1)?)
}

impl ScoringModel for DistMult {
    fn kind(&self) -> ModelKind {
        ModelKind::DistMult
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn score(&self, batch: &ScoreBatch<'_>, _train: bool) -> Result<Tensor> {
        let (s, r, o) = batch.ids(self.device())?;
        trilinear(
            &self.entities.forward(&s)?,
            &self.relations.forward(&r)?,
            &self.entities.forward(&o)?,
        )
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
    use kga_core::Triplet;

    #[test]
    fn symmetric_in_subject_and_object() {
        let m = test_support::model(ModelKind::DistMult);
        let forward = [Triplet::new(1, 2, 4)];
        let backward = [Triplet::new(4, 2, 1)];
        let a = m.predict(&ScoreBatch::new(&forward), false).unwrap();
        let b = m.predict(&ScoreBatch::new(&backward), false).unwrap();
        assert!((a[0] - b[0]).abs() < 1e-6);
    }

    #[test]
    fn sigmoid_maps_into_unit_interval() {
        let m = test_support::model(ModelKind::DistMult);
        let triplets = test_support::triplets();
        let raw = m.predict(&ScoreBatch::new(&triplets), false).unwrap();
        let probs = m.predict(&ScoreBatch::new(&triplets), true).unwrap();
        for (x, p) in raw.iter().zip(&probs) {
            assert!((p - 1.0 / (1.0 + (-x).exp())).abs() < 1e-5);
        }
    }
}
