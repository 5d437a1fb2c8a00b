//! Rank-based evaluation for knowledge graph embeddings.
//!
//! # The Link Prediction Task
//!
//! Given a test triplet (s, r, o), we evaluate by:
//! 1. **Subject corruption**: score every `(e, r, o)` candidate, rank the true `s`
//! 2. **Object corruption**: score every `(s, r, e)` candidate, rank the true `o`
//!
//! The two directions contribute equally to every metric.
//!
//! # Candidate Pool
//!
//! The pool is either the whole vocabulary (exhaustive) or `n_sample`
//! entities drawn without replacement once per direction and shared by
//! every test row. Candidates are looped over in the outer loop, each one
//! scored against all `M` rows in a single batched call; per-row ranks
//! accumulate as counts, so no `M x N` score matrix is ever held.
//!
//! # Ties
//!
//! Ranks follow the "min" convention: `rank = 1 + #{candidates scoring
//! strictly higher than the true triplet}`. A true triplet tied with every
//! candidate therefore has rank 1.
//!
//! # Filtered vs Raw Metrics
//!
//! | Setting | Description |
//! |---------|-------------|
//! | Raw | All pool entities compete |
//! | Filtered | Candidates forming another known-true triplet are skipped |
//!
//! # Standard Metrics
//!
//! | Metric | Range | Description |
//! |--------|-------|-------------|
//! | MR | [1, N] | Mean Rank |
//! | MRR | (0, 1] | Mean Reciprocal Rank: average of 1/rank |
//! | Hits@k | [0, 1] | Fraction with rank <= k |

use std::collections::BTreeMap;
use std::fmt;

use candle_core::Tensor;
use kga_core::{FilterSet, LiteralTable, Slot, Triplet};
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::{ScoreBatch, ScoringModel};

/// Rank-based evaluation results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankMetrics {
    /// Mean Rank: E\[rank\]
    pub mr: f64,
    /// Mean Reciprocal Rank: E\[1/rank\]
    pub mrr: f64,
    /// Hits@k for every requested cutoff k.
    pub hits: BTreeMap<usize, f64>,
    /// Number of test triplets evaluated
    pub num_triplets: usize,
}

impl RankMetrics {
    /// Compute metrics from a list of 1-based ranks.
    pub fn from_ranks(ranks: &[usize], hits_at: &[usize]) -> Self {
        let mut hits: BTreeMap<usize, f64> = hits_at.iter().map(|&k| (k, 0.0)).collect();
        if ranks.is_empty() {
            return Self {
                hits,
                ..Self::default()
            };
        }

        let n = ranks.len() as f64;
        let mr = ranks.iter().map(|&r| r as f64).sum::<f64>() / n;
        let mrr = ranks.iter().map(|&r| 1.0 / r as f64).sum::<f64>() / n;
        for (&k, value) in hits.iter_mut() {
            *value = ranks.iter().filter(|&&r| r <= k).count() as f64 / n;
        }

        Self {
            mr,
            mrr,
            hits,
            num_triplets: ranks.len(),
        }
    }

    /// Equal-weight mean of two directional results.
    pub fn average(a: &Self, b: &Self) -> Self {
        let mut hits = a.hits.clone();
        for (k, v) in &b.hits {
            *hits.entry(*k).or_insert(0.0) += v;
        }
        for v in hits.values_mut() {
            *v /= 2.0;
        }
        Self {
            mr: (a.mr + b.mr) / 2.0,
            mrr: (a.mrr + b.mrr) / 2.0,
            hits,
            num_triplets: a.num_triplets.max(b.num_triplets),
        }
    }

    pub fn hits_at(&self, k: usize) -> Option<f64> {
        self.hits.get(&k).copied()
    }

    /// Format as a one-line summary.
    pub fn summary(&self) -> String {
        let mut out = format!("MR: {:.2} | MRR: {:.4}", self.mr, self.mrr);
        for (k, v) in &self.hits {
            out.push_str(&format!(" | Hits@{k}: {v:.4}"));
        }
        out
    }
}

impl fmt::Display for RankMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Anything that can score a batch of triplets, higher = more plausible.
pub trait Scorer {
    fn score_batch(&self, batch: &ScoreBatch<'_>) -> Result<Vec<f32>>;
}

impl<M: ScoringModel + ?Sized> Scorer for M {
    fn score_batch(&self, batch: &ScoreBatch<'_>) -> Result<Vec<f32>> {
        self.predict(batch, false)
    }
}

/// A closure used as a [`Scorer`].
pub struct FnScorer<F>(F);

impl<F> FnScorer<F>
where
    F: Fn(&ScoreBatch<'_>) -> Vec<f32>,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Scorer for FnScorer<F>
where
    F: Fn(&ScoreBatch<'_>) -> Vec<f32>,
{
    fn score_batch(&self, batch: &ScoreBatch<'_>) -> Result<Vec<f32>> {
        Ok((self.0)(batch))
    }
}

/// `1 + #{competitors strictly above target}`.
pub fn min_rank(target: f32, competitors: impl IntoIterator<Item = f32>) -> usize {
    1 + competitors.into_iter().filter(|&s| outranks(s, target)).count()
}

/// Whether a competitor pushes the target down one place. Ties and NaN do not.
#[inline]
fn outranks(competitor: f32, target: f32) -> bool {
    competitor > target
}

/// Candidate entities for one direction.
///
/// Exhaustive when `n_sample` is `None` or not smaller than the vocabulary.
pub fn candidate_pool<R: Rng + ?Sized>(
    n_entities: usize,
    n_sample: Option<usize>,
    rng: &mut R,
) -> Vec<usize> {
    match n_sample {
        Some(n) if n < n_entities => index::sample(rng, n_entities, n).into_vec(),
        _ => (0..n_entities).collect(),
    }
}

/// Link-prediction evaluator.
///
/// ```
/// use kga_core::Triplet;
/// use kga_kge::{FnScorer, RankingEvaluator};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// // prefers the "true" triplet (s, 0, s + 1) over everything else
/// let scorer = FnScorer::new(|b: &kga_kge::ScoreBatch<'_>| {
///     b.triplets.iter().map(|t| if t.object == t.subject + 1 { 1.0 } else { 0.0 }).collect()
/// });
/// let test = [Triplet::new(0, 0, 1), Triplet::new(2, 0, 3)];
/// let mut rng = StdRng::seed_from_u64(0);
/// let metrics = RankingEvaluator::new(5).evaluate(&scorer, &test, &mut rng).unwrap();
/// assert_eq!(metrics.mrr, 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct RankingEvaluator<'a> {
    n_entities: usize,
    hits_at: Vec<usize>,
    n_sample: Option<usize>,
    filter: Option<&'a FilterSet>,
    literals: Option<&'a LiteralTable>,
}

impl<'a> RankingEvaluator<'a> {
    /// Exhaustive, unfiltered, Hits@{1, 3, 10}.
    pub fn new(n_entities: usize) -> Self {
        Self {
            n_entities,
            hits_at: vec![1, 3, 10],
            n_sample: None,
            filter: None,
            literals: None,
        }
    }

    pub fn with_hits_at(mut self, ks: Vec<usize>) -> Self {
        self.hits_at = ks;
        self
    }

    /// Cap the candidate pool at `n` sampled entities (plus the true one).
    pub fn with_sample(mut self, n: Option<usize>) -> Self {
        self.n_sample = n;
        self
    }

    pub fn with_filter(mut self, filter: Option<&'a FilterSet>) -> Self {
        self.filter = filter;
        self
    }

    /// Literal rows to pass alongside each candidate, for literal models.
    pub fn with_literals(mut self, literals: Option<&'a LiteralTable>) -> Self {
        self.literals = literals;
        self
    }

    /// MR, MRR and Hits@k averaged over subject and object corruption.
    pub fn evaluate<S, R>(&self, scorer: &S, test: &[Triplet], rng: &mut R) -> Result<RankMetrics>
    where
        S: Scorer + ?Sized,
        R: Rng + ?Sized,
    {
        if test.is_empty() {
            return Ok(RankMetrics::from_ranks(&[], &self.hits_at));
        }

        let original = self.original_literals(test)?;
        let base = Self::batch(test, original.clone());
        let true_scores = scorer.score_batch(&base)?;

        let mut directions = Vec::with_capacity(2);
        for slot in [Slot::Subject, Slot::Object] {
            let pool = candidate_pool(self.n_entities, self.n_sample, rng);
            let ranks = self.direction_ranks(scorer, test, slot, &pool, &true_scores, &original)?;
            let metrics = RankMetrics::from_ranks(&ranks, &self.hits_at);
            debug!(?slot, pool = pool.len(), %metrics, "direction ranked");
            directions.push(metrics);
        }
        Ok(RankMetrics::average(&directions[0], &directions[1]))
    }

    /// Rank each true relation among `candidates`, subject and object fixed.
    pub fn evaluate_relations<S>(
        &self,
        scorer: &S,
        test: &[Triplet],
        candidates: &[usize],
    ) -> Result<RankMetrics>
    where
        S: Scorer + ?Sized,
    {
        if test.is_empty() {
            return Ok(RankMetrics::from_ranks(&[], &self.hits_at));
        }
        let original = self.original_literals(test)?;
        let true_scores = scorer.score_batch(&Self::batch(test, original.clone()))?;

        let mut ranks = vec![1usize; test.len()];
        let mut corrupted = test.to_vec();
        for &rel in candidates {
            for (c, t) in corrupted.iter_mut().zip(test) {
                *c = t.with(Slot::Relation, rel);
            }
            let scores = scorer.score_batch(&Self::batch(&corrupted, original.clone()))?;
            for (i, t) in test.iter().enumerate() {
                if t.relation != rel && outranks(scores[i], true_scores[i]) {
                    ranks[i] += 1;
                }
            }
        }
        Ok(RankMetrics::from_ranks(&ranks, &self.hits_at))
    }

    fn direction_ranks<S: Scorer + ?Sized>(
        &self,
        scorer: &S,
        test: &[Triplet],
        slot: Slot,
        pool: &[usize],
        true_scores: &[f32],
        original: &Option<(Tensor, Tensor)>,
    ) -> Result<Vec<usize>> {
        let m = test.len();
        let mut ranks = vec![1usize; m];
        let mut corrupted = test.to_vec();

        for &entity in pool {
            for (c, t) in corrupted.iter_mut().zip(test) {
                *c = t.with(slot, entity);
            }
            let literals = match (self.literals, original) {
                (Some(table), Some((subjects, objects))) => {
                    let varying = table.repeat_row(entity, m)?;
                    Some(match slot {
                        Slot::Subject => (varying, objects.clone()),
                        _ => (subjects.clone(), varying),
                    })
                }
                _ => None,
            };
            let scores = scorer.score_batch(&Self::batch(&corrupted, literals))?;

            for (i, t) in test.iter().enumerate() {
                // the true entity already sits in slot zero
                if t.get(slot) == entity || self.is_filtered(t, slot, entity) {
                    continue;
                }
                if outranks(scores[i], true_scores[i]) {
                    ranks[i] += 1;
                }
            }
        }
        Ok(ranks)
    }

    fn is_filtered(&self, t: &Triplet, slot: Slot, entity: usize) -> bool {
        self.filter.is_some_and(|f| match slot {
            Slot::Subject => f.is_known_subject(entity, t.relation, t.object),
            _ => f.is_known_object(t.subject, t.relation, entity),
        })
    }

    fn original_literals(&self, test: &[Triplet]) -> Result<Option<(Tensor, Tensor)>> {
        let Some(table) = self.literals else {
            return Ok(None);
        };
        let subjects: Vec<usize> = test.iter().map(|t| t.subject).collect();
        let objects: Vec<usize> = test.iter().map(|t| t.object).collect();
        Ok(Some((table.gather(&subjects)?, table.gather(&objects)?)))
    }

    fn batch(triplets: &[Triplet], literals: Option<(Tensor, Tensor)>) -> ScoreBatch<'_> {
        let batch = ScoreBatch::new(triplets);
        match literals {
            Some((s, o)) => batch.with_literals(s, o),
            None => batch,
        }
    }
}
