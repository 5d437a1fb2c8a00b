//! Training loop for knowledge graph embeddings.
//!
//! One run is `epochs` passes over the training triplets:
//!
//! 1. At the start of each epoch the learning rate is annealed as
//!    `lr * 0.5^(epoch / lr_decay_every)` and the triplets are reshuffled.
//! 2. Every minibatch of `m` positives is extended with corrupted negatives:
//!    - **margin** loss: `negative_samples` draws, stacked as aligned
//!      blocks after the positives, `(1 + C) * m` rows in total;
//!    - **log** loss: one draw, labelled `0`, shuffled together with the
//!      positives, `2 * m` rows in total.
//! 3. The model scores the batch, the loss is backpropagated and one AdamW
//!    step is taken, optionally followed by renormalising the embeddings.
//! 4. Every `log_interval` iterations a health check runs: ranking metrics
//!    on a validation sample (margin) or train/validation accuracy (log).
//! 5. At the end of every epoch the parameters are checkpointed.
//!
//! There is no early stopping.
//!
//! # Example
//!
//! ```rust,ignore
//! use kga_kge::{Trainer, TrainingConfig, TrainingData, LossMode};
//!
//! let config = TrainingConfig::default()
//!     .with_loss(LossMode::Margin)
//!     .with_learning_rate(0.01)
//!     .with_epochs(10);
//!
//! let trainer = Trainer::new(config).with_checkpoint("models/wordnet/transe.safetensors");
//! let report = trainer.train(model.as_ref(), &data, &mut rng)?;
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use kga_core::{
    minibatches, random_minibatch, FilterSet, LiteralTable, NegativeSampling, Split, Triplet,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::classification::accuracy;
use crate::error::{Error, Result};
use crate::evaluation::{RankMetrics, RankingEvaluator};
use crate::model::{ScoreBatch, ScoringModel};

/// Which objective drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossMode {
    /// Hinge loss between positives and `C` negative blocks.
    Margin,
    /// Binary cross-entropy with one labelled negative per positive.
    #[default]
    Log,
}

impl FromStr for LossMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "margin" | "rank" | "rankloss" => Ok(Self::Margin),
            "log" | "logloss" => Ok(Self::Log),
            other => Err(Error::Config(format!("unknown loss {other}"))),
        }
    }
}

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of epochs (default: 5).
    pub epochs: usize,
    /// Positives per minibatch (default: 100).
    pub batch_size: usize,
    /// Base learning rate (default: 0.1).
    pub learning_rate: f64,
    /// Halve the learning rate every this many epochs; 0 disables (default: 10).
    pub lr_decay_every: usize,
    /// AdamW weight decay (default: 1e-4).
    pub weight_decay: f64,
    /// Objective (default: log).
    pub loss: LossMode,
    /// Negative draws per positive in margin mode (default: 10).
    pub negative_samples: usize,
    /// Hinge margin (default: 1.0).
    pub margin: f64,
    /// Mean instead of sum reduction (default: false).
    pub average_loss: bool,
    /// Renormalise embeddings after each step (default: false).
    pub normalize_embeddings: bool,
    /// Corruption strategy (default: uniform).
    pub sampler: NegativeSampling,
    /// Reshuffle every epoch (default: true).
    pub shuffle: bool,
    /// Health check cadence in iterations; `None` disables (default: 100).
    pub log_interval: Option<usize>,
    /// Validation positives ranked per health check; `None` for all (default: 1000).
    pub validation_rows: Option<usize>,
    /// Candidate pool for health-check ranking; `None` for exhaustive (default: 1000).
    pub eval_candidates: Option<usize>,
    /// Hits@k cutoffs (default: 1, 3, 10).
    pub hits_at: Vec<usize>,
    /// Seed for the run's generator (default: 9999).
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 5,
            batch_size: 100,
            learning_rate: 0.1,
            lr_decay_every: 10,
            weight_decay: 1e-4,
            loss: LossMode::Log,
            negative_samples: 10,
            margin: 1.0,
            average_loss: false,
            normalize_embeddings: false,
            sampler: NegativeSampling::Uniform,
            shuffle: true,
            log_interval: Some(100),
            validation_rows: Some(1000),
            eval_candidates: Some(1000),
            hits_at: vec![1, 3, 10],
            seed: 9999,
        }
    }
}

impl TrainingConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_lr_decay_every(mut self, epochs: usize) -> Self {
        self.lr_decay_every = epochs;
        self
    }

    pub fn with_weight_decay(mut self, wd: f64) -> Self {
        self.weight_decay = wd;
        self
    }

    pub fn with_loss(mut self, loss: LossMode) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_negative_samples(mut self, n: usize) -> Self {
        self.negative_samples = n;
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_average_loss(mut self, average: bool) -> Self {
        self.average_loss = average;
        self
    }

    pub fn with_normalize_embeddings(mut self, normalize: bool) -> Self {
        self.normalize_embeddings = normalize;
        self
    }

    pub fn with_sampler(mut self, sampler: NegativeSampling) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_log_interval(mut self, every: Option<usize>) -> Self {
        self.log_interval = every;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Step-decayed learning rate for a 0-based epoch.
    pub fn learning_rate_at(&self, epoch: usize) -> f64 {
        if self.lr_decay_every == 0 {
            return self.learning_rate;
        }
        let halvings = (epoch / self.lr_decay_every).min(i32::MAX as usize) as i32;
        self.learning_rate * 0.5f64.powi(halvings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(Error::Config("learning_rate must be positive".into()));
        }
        if self.weight_decay < 0.0 {
            return Err(Error::Config("weight_decay must be non-negative".into()));
        }
        if self.log_interval == Some(0) {
            return Err(Error::Config("log_interval must be positive".into()));
        }
        match self.loss {
            LossMode::Margin if self.negative_samples == 0 => Err(Error::Config(
                "margin loss needs at least one negative sample".into(),
            )),
            LossMode::Log if self.sampler.blocks_per_draw() != 1 => Err(Error::Config(format!(
                "log loss pairs one negative with each positive; {:?} sampling emits {}",
                self.sampler,
                self.sampler.blocks_per_draw()
            ))),
            _ => Ok(()),
        }
    }
}

/// Everything the loop reads besides the model.
#[derive(Debug, Clone, Copy)]
pub struct TrainingData<'a> {
    pub train: &'a [Triplet],
    /// Held-out split for health checks.
    pub validation: Option<&'a Split>,
    /// Known triplets skipped when ranking validation rows.
    pub validation_filter: Option<&'a FilterSet>,
    pub n_entities: usize,
    pub n_relations: usize,
    pub literals: Option<&'a LiteralTable>,
}

/// Result of a periodic health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HealthCheck {
    Ranking(RankMetrics),
    Classification {
        train_acc: f64,
        pos_acc: f64,
        neg_acc: f64,
        val_acc: Option<f64>,
        val_loss: Option<f32>,
    },
}

/// Reported to the progress callback after every optimizer step.
#[derive(Debug, Clone)]
pub struct StepMetrics {
    /// 0-based.
    pub epoch: usize,
    /// 0-based, restarts every epoch.
    pub iteration: usize,
    pub learning_rate: f64,
    /// Positives in the minibatch.
    pub positives: usize,
    /// Rows scored, positives and negatives together.
    pub batch_rows: usize,
    pub loss: f32,
    pub elapsed: Duration,
    pub health: Option<HealthCheck>,
}

/// Callback invoked after every optimizer step.
pub type ProgressCallback<'a> = Box<dyn FnMut(&StepMetrics) + 'a>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// 1-based.
    pub epoch: usize,
    pub learning_rate: f64,
    pub mean_loss: f32,
    pub steps: usize,
}

/// Per-epoch record of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: Vec<EpochSummary>,
    pub total_steps: usize,
    pub checkpoint: Option<PathBuf>,
}

impl TrainingReport {
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Knowledge graph embedding trainer.
pub struct Trainer {
    config: TrainingConfig,
    checkpoint: Option<PathBuf>,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            checkpoint: None,
        }
    }

    /// Save parameters to `path` at the end of every epoch.
    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn train<R: Rng + ?Sized>(
        &self,
        model: &dyn ScoringModel,
        data: &TrainingData<'_>,
        rng: &mut R,
    ) -> Result<TrainingReport> {
        self.train_with_callback(model, data, rng, Box::new(|_| {}))
    }

    pub fn train_with_callback<R: Rng + ?Sized>(
        &self,
        model: &dyn ScoringModel,
        data: &TrainingData<'_>,
        rng: &mut R,
        mut on_step: ProgressCallback<'_>,
    ) -> Result<TrainingReport> {
        let cfg = &self.config;
        cfg.validate()?;
        if model.kind().requires_literals() && data.literals.is_none() {
            return Err(Error::Validation(format!(
                "{} needs a literal table",
                model.kind()
            )));
        }

        let mut optimizer = AdamW::new(
            model.params().all_vars(),
            ParamsAdamW {
                lr: cfg.learning_rate,
                weight_decay: cfg.weight_decay,
                ..Default::default()
            },
        )?;
        let mut report = TrainingReport {
            checkpoint: self.checkpoint.clone(),
            ..TrainingReport::default()
        };

        for epoch in 0..cfg.epochs {
            let lr = cfg.learning_rate_at(epoch);
            optimizer.set_learning_rate(lr);
            info!(epoch = epoch + 1, of = cfg.epochs, lr, "epoch start");

            let mut loss_sum = 0.0f64;
            let mut steps = 0usize;
            for (iteration, positives) in
                minibatches(data.train, cfg.batch_size, cfg.shuffle, rng).enumerate()
            {
                let start = Instant::now();
                let (rows, labels) = self.assemble(&positives, data, rng);
                let batch = ScoreBatch::resolve(&rows, data.literals)?;
                let scores = model.forward(&batch)?;

                let loss = match cfg.loss {
                    LossMode::Margin => {
                        let m = positives.len();
                        let n_neg = rows.len() - m;
                        model.ranking_loss(
                            &scores.narrow(0, 0, m)?,
                            &scores.narrow(0, m, n_neg)?,
                            cfg.margin,
                            n_neg / m,
                            cfg.average_loss,
                        )?
                    }
                    LossMode::Log => model.log_loss(&scores, &labels, cfg.average_loss)?,
                };
                optimizer.backward_step(&loss)?;
                if cfg.normalize_embeddings {
                    model.normalize_embeddings()?;
                }
                let loss = loss.to_scalar::<f32>()?;
                let elapsed = start.elapsed();
                if !loss.is_finite() {
                    warn!(epoch = epoch + 1, iteration, loss, "non-finite loss");
                }

                let health = match cfg.log_interval {
                    Some(every) if iteration % every == 0 => {
                        let check = self.health_check(model, data, &batch, &labels, rng)?;
                        log_health(iteration, loss, &check, elapsed);
                        Some(check)
                    }
                    _ => None,
                };

                loss_sum += f64::from(loss);
                steps += 1;
                on_step(&StepMetrics {
                    epoch,
                    iteration,
                    learning_rate: lr,
                    positives: positives.len(),
                    batch_rows: rows.len(),
                    loss,
                    elapsed,
                    health,
                });
            }

            let summary = EpochSummary {
                epoch: epoch + 1,
                learning_rate: lr,
                mean_loss: if steps == 0 { 0.0 } else { (loss_sum / steps as f64) as f32 },
                steps,
            };
            info!(
                epoch = summary.epoch,
                mean_loss = summary.mean_loss,
                steps,
                "epoch done"
            );
            report.total_steps += steps;
            report.epochs.push(summary);

            if let Some(path) = &self.checkpoint {
                model.save(path)?;
                info!(path = %path.display(), "checkpoint saved");
            }
        }
        Ok(report)
    }

    /// Positives plus negatives, and the labels log loss needs.
    fn assemble<R: Rng + ?Sized>(
        &self,
        positives: &[Triplet],
        data: &TrainingData<'_>,
        rng: &mut R,
    ) -> (Vec<Triplet>, Vec<f32>) {
        let cfg = &self.config;
        let draws = match cfg.loss {
            LossMode::Margin => cfg.negative_samples,
            LossMode::Log => 1,
        };
        let mut rows = positives.to_vec();
        for _ in 0..draws {
            for block in cfg
                .sampler
                .blocks(positives, data.n_entities, data.n_relations, rng)
            {
                rows.extend(block);
            }
        }

        match cfg.loss {
            LossMode::Margin => (rows, Vec::new()),
            LossMode::Log => {
                let m = positives.len();
                let mut labelled: Vec<(Triplet, f32)> = rows
                    .into_iter()
                    .enumerate()
                    .map(|(i, t)| (t, if i < m { 1.0 } else { 0.0 }))
                    .collect();
                labelled.shuffle(rng);
                labelled.into_iter().unzip()
            }
        }
    }

    fn health_check<R: Rng + ?Sized>(
        &self,
        model: &dyn ScoringModel,
        data: &TrainingData<'_>,
        batch: &ScoreBatch<'_>,
        labels: &[f32],
        rng: &mut R,
    ) -> Result<HealthCheck> {
        let cfg = &self.config;
        match cfg.loss {
            LossMode::Margin => {
                let positives = data.validation.map(Split::positives).unwrap_or_default();
                let sample = match cfg.validation_rows {
                    Some(n) => random_minibatch(&positives, n, rng),
                    None => positives,
                };
                let metrics = RankingEvaluator::new(data.n_entities)
                    .with_hits_at(cfg.hits_at.clone())
                    .with_sample(cfg.eval_candidates)
                    .with_filter(data.validation_filter)
                    .with_literals(data.literals)
                    .evaluate(model, &sample, rng)?;
                Ok(HealthCheck::Ranking(metrics))
            }
            LossMode::Log => {
                let pred = model.predict(batch, true)?;
                let (pos, neg): (Vec<_>, Vec<_>) = pred
                    .iter()
                    .zip(labels)
                    .partition(|&(_, &y)| y > 0.5);
                let class_acc = |rows: Vec<(&f32, &f32)>| {
                    let (p, y): (Vec<f32>, Vec<f32>) = rows.into_iter().map(|(p, y)| (*p, *y)).unzip();
                    accuracy(&p, &y, 0.5, false)
                };

                let (val_acc, val_loss) = match data.validation {
                    Some(Split {
                        triplets,
                        labels: Some(val_labels),
                    }) if !triplets.is_empty() => {
                        let val_batch = ScoreBatch::resolve(triplets, data.literals)?;
                        let logits = model.score(&val_batch, false)?.detach();
                        let probs = candle_nn::ops::sigmoid(&logits)?.to_vec1::<f32>()?;
                        let loss = model.log_loss(&logits, val_labels, cfg.average_loss)?;
                        (
                            Some(accuracy(&probs, val_labels, 0.5, false)),
                            Some(loss.to_scalar::<f32>()?),
                        )
                    }
                    _ => (None, None),
                };

                Ok(HealthCheck::Classification {
                    train_acc: accuracy(&pred, labels, 0.5, false),
                    pos_acc: class_acc(pos),
                    neg_acc: class_acc(neg),
                    val_acc,
                    val_loss,
                })
            }
        }
    }
}

fn log_health(iteration: usize, loss: f32, check: &HealthCheck, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    match check {
        HealthCheck::Ranking(metrics) => info!(
            iteration,
            loss,
            val_mrr = metrics.mrr,
            val_hits10 = metrics.hits_at(10).unwrap_or_default(),
            secs,
            "training"
        ),
        HealthCheck::Classification {
            train_acc,
            pos_acc,
            neg_acc,
            val_acc,
            val_loss,
        } => info!(
            iteration,
            loss,
            train_acc,
            pos_acc,
            neg_acc,
            val_acc = val_acc.unwrap_or(f64::NAN),
            val_loss = val_loss.unwrap_or(f32::NAN),
            secs,
            "training"
        ),
    }
}
