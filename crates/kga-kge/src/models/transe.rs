//! TransE: Relations as Translations.
//!
//! TransE ([Bordes et al. 2013](https://papers.nips.cc/paper/2013/hash/1cecc7a77928ca8133fa24680a88d2f9-Abstract.html))
//! interprets a relation as a translation in embedding space:
//!
//! ```text
//! h + r ≈ t  (if the triple is true)
//! ```
//!
//! # Scoring
//!
//! Score = -d(h + r, t) with d the L1 or L2 distance. Higher scores
//! indicate more plausible triples, so the margin ranking loss pushes
//! positives above corrupted triples.
//!
//! Only entity rows are pulled back into the unit ball by
//! `normalize_embeddings`; relation vectors are free.

use candle_core::Tensor;
use rand::Rng;

use crate::error::Result;
use crate::model::{Dimensions, Distance, ModelConfig, ModelKind, ScoreBatch, ScoringModel};
use crate::params::{EmbeddingTable, ParamStore};

/// TransE model: relations as translations in embedding space.
pub struct TransE {
    params: ParamStore,
    entities: EmbeddingTable,
    relations: EmbeddingTable,
    distance: Distance,
    lambda: f64,
}

impl TransE {
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
            distance: config.distance,
            lambda: config.embeddings_lambda,
        })
    }
}

impl ScoringModel for TransE {
    fn kind(&self) -> ModelKind {
        ModelKind::TransE
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn score(&self, batch: &ScoreBatch<'_>, _train: bool) -> Result<Tensor> {
        let (s, r, o) = batch.ids(self.device())?;
        let h = self.entities.forward(&s)?;
        let rel = self.relations.forward(&r)?;
        let t = self.entities.forward(&o)?;
        let diff = h.add(&rel)?.sub(&t)?;
        let dist = match self.distance {
            Distance::L1 => diff.abs()?.sum(1)?,
            Distance::L2 => diff.sqr()?.sum(1)?.sqrt()?,
        };
        Ok(dist.neg()?)
    }

    fn embedding_tables(&self) -> Vec<&EmbeddingTable> {
        vec![&self.entities, &self.relations]
    }

    fn normalized_tables(&self) -> Vec<&EmbeddingTable> {
        vec![&self.entities]
    }

    fn embeddings_lambda(&self) -> f64 {
        self.lambda
    }
}
