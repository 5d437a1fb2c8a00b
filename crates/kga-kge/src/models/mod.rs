//! Concrete [`ScoringModel`](crate::ScoringModel) implementations.

mod distmult;
mod ermlp;
mod literal;
mod ntn;
mod rescal;
mod transe;

pub use distmult::DistMult;
pub use ermlp::ErMlp;
pub use literal::{DistMultLiteral, ErMlpLiteral};
pub use ntn::Ntn;
pub use rescal::Rescal;
pub use transe::TransE;

use candle_core::Tensor;
use candle_nn::Dropout;

use crate::error::Result;

/// Apply dropout only while training with a non-zero rate.
fn maybe_dropout(dropout: Option<&Dropout>, xs: &Tensor, train: bool) -> Result<Tensor> {
    match dropout {
        Some(d) if train => Ok(d.forward(xs, train)?),
        _ => Ok(xs.clone()),
    }
}

fn dropout_layer(p: f32) -> Option<Dropout> {
    (p > 0.0).then(|| Dropout::new(p))
}
