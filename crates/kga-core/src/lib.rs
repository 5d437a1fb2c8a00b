//! # kga-core
//!
//! Data side of knowledge-graph embedding training: triplets, dataset
//! splits, filter sets for filtered ranking, per-entity literal tables,
//! negative sampling and epoch minibatching.
//!
//! Nothing here touches model parameters. Randomness is always passed in
//! as an explicit `&mut impl Rng`, so one seeded generator drives a whole run.
//!
//! ```
//! use kga_core::{minibatches, sample_negatives, Triplet};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(9999);
//! let train = vec![Triplet::new(0, 0, 1), Triplet::new(1, 0, 2), Triplet::new(2, 1, 0)];
//!
//! for batch in minibatches(&train, 2, true, &mut rng) {
//!     let negatives = sample_negatives(&batch, 3, &mut rng);
//!     assert_eq!(negatives.len(), batch.len());
//! }
//! ```

pub mod batching;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod literal;
pub mod sampling;
pub mod triplet;
pub mod vocab;

pub use batching::{minibatches, random_minibatch, Minibatches};
pub use dataset::{load_labels, load_triplets, Dataset, Split};
pub use error::{Error, Result};
pub use filter::FilterSet;
pub use literal::LiteralTable;
pub use sampling::{
    sample_negatives, sample_negatives_both, sample_negatives_decoupled,
    sample_negatives_relation, NegativeSampling,
};
pub use triplet::{max_indices, slot_ids, triplets_from_tensor, Slot, Triplet};
pub use vocab::{load_vocabulary, Vocabulary};
