//! TOML run configuration.
//!
//! ```toml
//! [model]
//! embedding_dim = 100
//! distance = "l1"
//!
//! [training]
//! loss = "margin"
//! learning_rate = 0.01
//! epochs = 20
//! ```
//!
//! Missing keys fall back to the defaults of [`ModelConfig`] and
//! [`TrainingConfig`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::ModelConfig;
use crate::training::TrainingConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

impl RunConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.training.validate()
    }
}
