//! Integration tests for ranking evaluation and training.
//!
//! Tests the full pipeline: build -> train -> checkpoint -> evaluate.

use std::cell::RefCell;

use candle_core::Device;
use kga_core::{FilterSet, LiteralTable, NegativeSampling, Slot, Split, Triplet};
use kga_kge::{
    build_model, Dimensions, Error, FnScorer, HealthCheck, LossMode, ModelConfig, ModelKind,
    RankingEvaluator, ScoreBatch, ScoringModel, StepMetrics, Trainer, TrainingConfig, TrainingData,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn rng() -> StdRng {
    StdRng::seed_from_u64(9999)
}

/// Small chain-shaped graph: `i --r--> i+1` for two relations.
fn chain() -> Vec<Triplet> {
    vec![
        Triplet::new(0, 0, 1),
        Triplet::new(1, 0, 2),
        Triplet::new(2, 0, 3),
        Triplet::new(3, 1, 4),
        Triplet::new(4, 1, 5),
    ]
}

fn dims() -> Dimensions {
    Dimensions {
        n_entities: 6,
        n_relations: 2,
        n_literals: 0,
    }
}

fn small_config() -> ModelConfig {
    ModelConfig::default()
        .with_embedding_dim(8)
        .with_hidden_dim(8)
        .with_ntn_slices(2)
}

fn data(train: &[Triplet]) -> TrainingData<'_> {
    TrainingData {
        train,
        validation: None,
        validation_filter: None,
        n_entities: 6,
        n_relations: 2,
        literals: None,
    }
}

/// `-(|s - target_s| + |o - target_o|)`
fn distance_scorer(
    target_s: usize,
    target_o: usize,
) -> FnScorer<impl Fn(&ScoreBatch<'_>) -> Vec<f32>> {
    FnScorer::new(move |b: &ScoreBatch<'_>| {
        b.triplets
            .iter()
            .map(|t| {
                -((t.subject.abs_diff(target_s) + t.object.abs_diff(target_o)) as f32)
            })
            .collect()
    })
}

mod evaluator {
    use super::*;

    #[test]
    fn perfect_scorer_ranks_everything_first() {
        let test = chain();
        let known = FilterSet::from_triplets(&test);
        let scorer = FnScorer::new(|b: &ScoreBatch<'_>| {
            b.triplets
                .iter()
                .map(|t| if known.is_known_object(t.subject, t.relation, t.object) { 1.0 } else { 0.0 })
                .collect()
        });
        // each true triplet must be the only positive for its (s, r) and (r, o)
        let metrics = RankingEvaluator::new(6)
            .with_hits_at(vec![1, 3, 10])
            .evaluate(&scorer, &test, &mut rng())
            .unwrap();
        assert_eq!(metrics.mr, 1.0);
        assert_eq!(metrics.mrr, 1.0);
        for k in [1, 3, 10] {
            assert_eq!(metrics.hits_at(k), Some(1.0));
        }
        assert_eq!(metrics.num_triplets, test.len());
    }

    #[test]
    fn constant_scores_tie_at_rank_one() {
        let scorer = FnScorer::new(|b: &ScoreBatch<'_>| vec![0.5; b.len()]);
        for n_sample in [None, Some(3)] {
            let metrics = RankingEvaluator::new(6)
                .with_sample(n_sample)
                .evaluate(&scorer, &chain(), &mut rng())
                .unwrap();
            assert_eq!(metrics.mr, 1.0);
            assert_eq!(metrics.mrr, 1.0);
            assert_eq!(metrics.hits_at(1), Some(1.0));
        }
    }

    #[test]
    fn distance_scorer_on_four_entities() {
        // subject candidates score [0, -1, -2, -3]; object candidates [-1, 0, -1, -2]
        let test = [Triplet::new(0, 0, 1)];
        let metrics = RankingEvaluator::new(4)
            .with_hits_at(vec![1])
            .evaluate(&distance_scorer(0, 1), &test, &mut rng())
            .unwrap();
        assert_eq!(metrics.mr, 1.0);
        assert_eq!(metrics.mrr, 1.0);
        assert_eq!(metrics.hits_at(1), Some(1.0));
    }

    #[test]
    fn ranks_average_over_both_directions() {
        // favouring entity 3 puts 1, 2, 3 above subject 0 (rank 4)
        // and 2, 3 above object 1 (rank 3)
        let test = [Triplet::new(0, 0, 1)];
        let metrics = RankingEvaluator::new(4)
            .with_hits_at(vec![1, 3, 10])
            .evaluate(&distance_scorer(3, 3), &test, &mut rng())
            .unwrap();
        assert!((metrics.mr - 3.5).abs() < 1e-12);
        assert!((metrics.mrr - (0.25 + 1.0 / 3.0) / 2.0).abs() < 1e-12);
        assert_eq!(metrics.hits_at(1), Some(0.0));
        assert_eq!(metrics.hits_at(3), Some(0.5));
        assert_eq!(metrics.hits_at(10), Some(1.0));
    }

    #[test]
    fn filtered_candidates_do_not_compete() {
        let test = [Triplet::new(0, 0, 1)];
        let known = FilterSet::from_triplets(&[
            Triplet::new(0, 0, 1),
            Triplet::new(2, 0, 1),
            Triplet::new(0, 0, 3),
        ]);
        let metrics = RankingEvaluator::new(4)
            .with_hits_at(vec![1])
            .with_filter(Some(&known))
            .evaluate(&distance_scorer(3, 3), &test, &mut rng())
            .unwrap();
        // subject rank 3 (2 filtered), object rank 2 (3 filtered)
        assert!((metrics.mr - 2.5).abs() < 1e-12);
    }

    #[test]
    fn sampled_pool_bounds_the_rank() {
        let test = [Triplet::new(0, 0, 1)];
        let metrics = RankingEvaluator::new(50)
            .with_sample(Some(5))
            .evaluate(&distance_scorer(40, 40), &test, &mut rng())
            .unwrap();
        assert!(metrics.mr >= 1.0 && metrics.mr <= 6.0);
    }

    #[test]
    fn literal_rows_follow_the_corrupted_side() {
        // literal value = 10 * entity, so every row is checkable
        let table = LiteralTable::from_rows(
            &(0..4).map(|e| vec![10.0 * e as f32]).collect::<Vec<_>>(),
            &Device::Cpu,
        )
        .unwrap();
        let calls = RefCell::new(0usize);
        let scorer = FnScorer::new(|b: &ScoreBatch<'_>| {
            *calls.borrow_mut() += 1;
            let (ls, lo) = b.literals().unwrap();
            let ls = ls.to_vec2::<f32>().unwrap();
            let lo = lo.to_vec2::<f32>().unwrap();
            for (i, t) in b.triplets.iter().enumerate() {
                assert_eq!(ls[i][0], 10.0 * t.subject as f32);
                assert_eq!(lo[i][0], 10.0 * t.object as f32);
            }
            vec![0.0; b.len()]
        });
        let test = [Triplet::new(0, 0, 1), Triplet::new(2, 1, 3)];
        RankingEvaluator::new(4)
            .with_literals(Some(&table))
            .evaluate(&scorer, &test, &mut rng())
            .unwrap();
        // slot zero plus four candidates per direction
        assert_eq!(*calls.borrow(), 1 + 4 + 4);
    }

    #[test]
    fn relation_ranking_is_single_direction() {
        let scorer = FnScorer::new(|b: &ScoreBatch<'_>| {
            b.triplets
                .iter()
                .map(|t| -(t.relation.abs_diff(3) as f32))
                .collect()
        });
        let test = [Triplet::new(0, 1, 2)];
        let candidates: Vec<usize> = (0..5).collect();
        let metrics = RankingEvaluator::new(3)
            .evaluate_relations(&scorer, &test, &candidates)
            .unwrap();
        // relations 2, 3, 4 outscore the true relation 1
        assert_eq!(metrics.mr, 4.0);
    }

    #[test]
    fn models_are_scorers() {
        let model = build_model(ModelKind::DistMult, &small_config(), dims(), &Device::Cpu, &mut rng())
            .unwrap();
        let metrics = RankingEvaluator::new(6)
            .evaluate(model.as_ref(), &chain(), &mut rng())
            .unwrap();
        assert!(metrics.mr >= 1.0 && metrics.mr <= 6.0);
        assert!(metrics.mrr > 0.0 && metrics.mrr <= 1.0);
    }
}

mod training {
    use super::*;

    fn one_full_batch(loss: LossMode, sampler: NegativeSampling, c: usize) -> Vec<StepMetrics> {
        let model = build_model(ModelKind::DistMult, &small_config(), dims(), &Device::Cpu, &mut rng())
            .unwrap();
        let train = chain();
        let config = TrainingConfig::default()
            .with_epochs(1)
            .with_batch_size(train.len())
            .with_shuffle(false)
            .with_loss(loss)
            .with_sampler(sampler)
            .with_negative_samples(c)
            .with_log_interval(None);
        let mut steps = Vec::new();
        Trainer::new(config)
            .train_with_callback(
                model.as_ref(),
                &data(&train),
                &mut rng(),
                Box::new(|m: &StepMetrics| steps.push(m.clone())),
            )
            .unwrap();
        steps
    }

    #[test]
    fn log_loss_epoch_is_one_step_of_twice_the_positives() {
        let steps = one_full_batch(LossMode::Log, NegativeSampling::Uniform, 10);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].positives, 5);
        assert_eq!(steps[0].batch_rows, 10);
        assert!(steps[0].loss.is_finite());
        assert!(steps[0].health.is_none());
    }

    #[test]
    fn margin_epoch_stacks_c_negative_blocks() {
        let steps = one_full_batch(LossMode::Margin, NegativeSampling::Uniform, 3);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].batch_rows, (1 + 3) * 5);

        // both-sides corruption yields two blocks per draw
        let steps = one_full_batch(LossMode::Margin, NegativeSampling::Both, 2);
        assert_eq!(steps[0].batch_rows, (1 + 4) * 5);
    }

    #[test]
    fn minibatches_cover_the_epoch() {
        let model = build_model(ModelKind::TransE, &small_config(), dims(), &Device::Cpu, &mut rng())
            .unwrap();
        let train = chain();
        let config = TrainingConfig::default()
            .with_epochs(3)
            .with_batch_size(2)
            .with_lr_decay_every(1)
            .with_learning_rate(0.1)
            .with_log_interval(None);
        let report = Trainer::new(config)
            .train(model.as_ref(), &data(&train), &mut rng())
            .unwrap();
        assert_eq!(report.total_steps, 9);
        let lrs: Vec<f64> = report.epochs.iter().map(|e| e.learning_rate).collect();
        assert_eq!(lrs, vec![0.1, 0.05, 0.025]);
        assert!(report.epochs.iter().all(|e| e.steps == 3));
    }

    #[test]
    fn normalized_training_keeps_entities_in_the_unit_ball() {
        let model = build_model(ModelKind::TransE, &small_config(), dims(), &Device::Cpu, &mut rng())
            .unwrap();
        let train = chain();
        let config = TrainingConfig::default()
            .with_epochs(2)
            .with_loss(LossMode::Margin)
            .with_learning_rate(0.5)
            .with_normalize_embeddings(true)
            .with_log_interval(None);
        Trainer::new(config)
            .train(model.as_ref(), &data(&train), &mut rng())
            .unwrap();
        for table in model.normalized_tables() {
            let norms = table.row_norms().unwrap().to_vec1::<f32>().unwrap();
            assert!(norms.iter().all(|&n| n <= 1.0 + 1e-4), "{norms:?}");
        }
    }

    #[test]
    fn health_checks_follow_the_loss_mode() {
        let train = chain();
        let validation = Split::new(vec![Triplet::new(0, 0, 2), Triplet::new(5, 1, 0)])
            .with_labels(vec![1.0, 0.0])
            .unwrap();
        let data = TrainingData {
            validation: Some(&validation),
            ..data(&train)
        };

        for loss in [LossMode::Margin, LossMode::Log] {
            let model = build_model(ModelKind::ErMlp, &small_config(), dims(), &Device::Cpu, &mut rng())
                .unwrap();
            let config = TrainingConfig::default()
                .with_epochs(1)
                .with_batch_size(2)
                .with_loss(loss)
                .with_negative_samples(2)
                .with_log_interval(Some(2));
            let mut health = Vec::new();
            Trainer::new(config)
                .train_with_callback(
                    model.as_ref(),
                    &data,
                    &mut rng(),
                    Box::new(|m: &StepMetrics| health.push(m.health.clone())),
                )
                .unwrap();
            // iterations 0 and 2 of 3
            assert_eq!(health.len(), 3);
            assert!(health[1].is_none());
            match (loss, health[0].as_ref().unwrap()) {
                (LossMode::Margin, HealthCheck::Ranking(metrics)) => {
                    // only the positive validation row is ranked
                    assert_eq!(metrics.num_triplets, 1);
                }
                (LossMode::Log, HealthCheck::Classification { val_acc, val_loss, .. }) => {
                    assert!(val_acc.is_some());
                    assert!(val_loss.unwrap().is_finite());
                }
                other => panic!("unexpected health check {other:?}"),
            }
        }
    }

    #[test]
    fn validation_ranking_uses_the_filter() {
        let train = chain();
        let target = Triplet::new(0, 0, 2);
        let validation = Split::new(vec![target]);
        // every other candidate is a known triplet, so the true one ranks first
        let mut known = FilterSet::new();
        for e in 0..6 {
            known.insert(target.with(Slot::Subject, e));
            known.insert(target.with(Slot::Object, e));
        }
        let data = TrainingData {
            validation: Some(&validation),
            validation_filter: Some(&known),
            ..data(&train)
        };

        let model = build_model(ModelKind::DistMult, &small_config(), dims(), &Device::Cpu, &mut rng())
            .unwrap();
        let config = TrainingConfig::default()
            .with_epochs(1)
            .with_loss(LossMode::Margin)
            .with_log_interval(Some(1));
        let mut health = Vec::new();
        Trainer::new(config)
            .train_with_callback(
                model.as_ref(),
                &data,
                &mut rng(),
                Box::new(|m: &StepMetrics| health.push(m.health.clone())),
            )
            .unwrap();
        match health[0].as_ref().unwrap() {
            HealthCheck::Ranking(metrics) => {
                assert_eq!(metrics.mr, 1.0);
                assert_eq!(metrics.mrr, 1.0);
            }
            other => panic!("unexpected health check {other:?}"),
        }
    }

    #[test]
    fn literal_models_train_with_literals_only() {
        let table = LiteralTable::from_rows(
            &(0..6).map(|e| vec![e as f32, 1.0]).collect::<Vec<_>>(),
            &Device::Cpu,
        )
        .unwrap();
        let dims = Dimensions {
            n_literals: 2,
            ..dims()
        };
        let model =
            build_model(ModelKind::DistMultLiteral, &small_config(), dims, &Device::Cpu, &mut rng())
                .unwrap();
        let train = chain();
        let trainer = Trainer::new(TrainingConfig::default().with_epochs(1).with_log_interval(None));

        let err = trainer.train(model.as_ref(), &data(&train), &mut rng());
        assert!(matches!(err, Err(Error::Validation(_))));

        let with_literals = TrainingData {
            literals: Some(&table),
            ..data(&train)
        };
        let report = trainer.train(model.as_ref(), &with_literals, &mut rng()).unwrap();
        assert_eq!(report.total_steps, 1);
    }
}

mod checkpoints {
    use super::*;

    #[test]
    fn train_checkpoint_then_evaluate() {
        let dir = tempfile::tempdir().unwrap();
        let path = kga_kge::checkpoint_path(dir.path(), "chain", ModelKind::TransE, 0.1, 0.0001);
        let train = chain();

        let model = build_model(ModelKind::TransE, &small_config(), dims(), &Device::Cpu, &mut rng())
            .unwrap();
        let config = TrainingConfig::default()
            .with_epochs(2)
            .with_loss(LossMode::Margin)
            .with_log_interval(None);
        let report = Trainer::new(config)
            .with_checkpoint(&path)
            .train(model.as_ref(), &data(&train), &mut rng())
            .unwrap();
        assert!(path.exists());
        assert_eq!(report.checkpoint.as_deref(), Some(path.as_path()));

        let mut restored =
            build_model(ModelKind::TransE, &small_config(), dims(), &Device::Cpu, &mut StdRng::seed_from_u64(1))
                .unwrap();
        restored.load(&path).unwrap();

        let batch = ScoreBatch::new(&train);
        assert_eq!(
            model.predict(&batch, false).unwrap(),
            restored.predict(&batch, false).unwrap()
        );

        let original = RankingEvaluator::new(6).evaluate(model.as_ref(), &train, &mut rng()).unwrap();
        let reloaded = RankingEvaluator::new(6)
            .evaluate(restored.as_ref(), &train, &mut rng())
            .unwrap();
        assert_eq!(original, reloaded);
    }

    #[test]
    fn mismatched_checkpoint_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distmult.safetensors");
        let model = build_model(ModelKind::DistMult, &small_config(), dims(), &Device::Cpu, &mut rng())
            .unwrap();
        model.save(&path).unwrap();

        let mut wider = build_model(
            ModelKind::DistMult,
            &small_config().with_embedding_dim(16),
            dims(),
            &Device::Cpu,
            &mut rng(),
        )
        .unwrap();
        assert!(matches!(wider.load(&path), Err(Error::Checkpoint(_))));

        let mut other = build_model(ModelKind::ErMlp, &small_config(), dims(), &Device::Cpu, &mut rng())
            .unwrap();
        assert!(matches!(other.load(&path), Err(Error::Checkpoint(_))));
    }
}
