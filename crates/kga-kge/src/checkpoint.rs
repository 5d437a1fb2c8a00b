//! Checkpoint file naming.
//!
//! One safetensors file per (dataset, model, learning rate, weight decay),
//! with the JSON training report beside it.

use std::path::{Path, PathBuf};

use crate::model::ModelKind;

/// `{dir}/{dataset}/{model}_lr{lr}_wd{wd}.safetensors`
pub fn checkpoint_path(
    dir: impl AsRef<Path>,
    dataset: &str,
    model: ModelKind,
    learning_rate: f64,
    weight_decay: f64,
) -> PathBuf {
    dir.as_ref().join(dataset).join(format!(
        "{}_lr{learning_rate}_wd{weight_decay}.safetensors",
        model.name()
    ))
}

/// The training report written next to `checkpoint`.
pub fn report_path(checkpoint: &Path) -> PathBuf {
    checkpoint.with_extension("json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_encode_model_and_hyperparameters() {
        let path = checkpoint_path("models", "wordnet", ModelKind::TransE, 0.1, 0.0001);
        assert_eq!(
            path,
            PathBuf::from("models/wordnet/transe_lr0.1_wd0.0001.safetensors")
        );
        assert_eq!(
            report_path(&path),
            PathBuf::from("models/wordnet/transe_lr0.1_wd0.0001.json")
        );
    }
}
