//! `kga` trains knowledge graph embeddings and evaluates them by ranking.
//!
//! The workspace is split in two:
//!
//! - [`data`] (`kga-core`): triplets, dataset splits, filter sets, literal
//!   tables, negative sampling and minibatching.
//! - [`kge`] (`kga-kge`): scoring models, losses, the ranking evaluator and
//!   the training loop.
//!
//! ```
//! use kga::data::Triplet;
//! use kga::kge::{FnScorer, RankingEvaluator, ScoreBatch};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let scorer = FnScorer::new(|b: &ScoreBatch<'_>| vec![0.0; b.len()]);
//! let mut rng = StdRng::seed_from_u64(9999);
//! let metrics = RankingEvaluator::new(10)
//!     .evaluate(&scorer, &[Triplet::new(0, 0, 1)], &mut rng)
//!     .unwrap();
//! assert_eq!(metrics.mr, 1.0);
//! ```

pub use kga_core as data;
pub use kga_kge as kge;

pub use kga_core::{Dataset, Triplet};
pub use kga_kge::{build_model, ModelKind, RankingEvaluator, Trainer, TrainingConfig};
