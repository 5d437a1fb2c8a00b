//! Knowledge graph embedding training and evaluation.
//!
//! Knowledge graphs store facts as (subject, relation, object) triplets:
//! `(Einstein, won, NobelPrize)`, `(Paris, capitalOf, France)`.
//! KGE models learn vector representations of entities and relations such
//! that **true triplets score higher than corrupted ones**.
//!
//! ## Models
//!
//! Every model returns a plausibility score, higher meaning more likely true.
//!
//! | Model | Score |
//! |-------|-------|
//! | RESCAL | hᵀ W_r t |
//! | DistMult | Σᵢ hᵢ rᵢ tᵢ |
//! | ER-MLP | MLP([h; t; r]) |
//! | TransE | -‖h + r - t‖ |
//! | NTN | u_rᵀ f(hᵀ W_r t + V_r [h; t] + b_r) |
//! | DistMult-Literal | DistMult over literal-fused entities |
//! | ER-MLP-Literal | MLP([h; r; t; l_h; l_t]) |
//!
//! ## Training
//!
//! Two objectives are supported:
//!
//! - **Margin ranking**: `relu(γ - f(pos) + f(neg))` against `C` corrupted
//!   blocks per minibatch.
//! - **Log loss**: binary cross-entropy with one corrupted negative per
//!   positive, plus a penalty on embedding rows outside the unit ball.
//!
//! ## Evaluation
//!
//! Link prediction ranks the true subject (and object) against a pool of
//! candidate entities, optionally skipping other known-true triplets
//! (filtered setting), and reports MR, MRR and Hits@k.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kga_kge::{build_model, Dimensions, ModelConfig, ModelKind, RankingEvaluator};
//!
//! let dims = Dimensions { n_entities: 40_943, n_relations: 18, n_literals: 0 };
//! let model = build_model(ModelKind::TransE, &ModelConfig::default(), dims, &device, &mut rng)?;
//!
//! let metrics = RankingEvaluator::new(dims.n_entities)
//!     .with_sample(Some(1000))
//!     .evaluate(model.as_ref(), &test, &mut rng)?;
//! println!("{metrics}");
//! ```
//!
//! ## References
//!
//! - Nickel et al. (2011). "A Three-Way Model for Collective Learning on
//!   Multi-Relational Data." ICML.
//! - Bordes et al. (2013). "Translating Embeddings for Modeling
//!   Multi-relational Data." NIPS.
//! - Socher et al. (2013). "Reasoning With Neural Tensor Networks for
//!   Knowledge Base Completion." NIPS.
//! - Yang et al. (2015). "Embedding Entities and Relations for Learning and
//!   Inference in Knowledge Bases." ICLR.

pub mod checkpoint;
pub mod classification;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod loss;
pub mod model;
pub mod models;
pub mod params;
pub mod training;

pub use checkpoint::{checkpoint_path, report_path};
pub use classification::{accuracy, auc, find_threshold};
pub use config::RunConfig;
pub use error::{Error, Result};
pub use evaluation::{candidate_pool, min_rank, FnScorer, RankMetrics, RankingEvaluator, Scorer};
pub use loss::{bce_with_logits, margin_ranking};
pub use model::{
    build_model, Dimensions, Distance, ModelConfig, ModelKind, ScoreBatch, ScoringModel,
};
pub use params::{EmbeddingTable, ParamStore};
pub use training::{
    EpochSummary, HealthCheck, LossMode, ProgressCallback, StepMetrics, Trainer, TrainingConfig,
    TrainingData, TrainingReport,
};
