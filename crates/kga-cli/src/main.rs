//! kga CLI - train and evaluate knowledge graph embeddings.
//!
//! # Usage
//!
//! ```bash
//! # Dataset summary
//! kga info --dataset data/wordnet
//!
//! # Margin-loss TransE, checkpointed under models/wordnet/
//! kga train --model transe --dataset data/wordnet --loss rankloss --lr 0.01 --nepoch 20
//!
//! # Log-loss ER-MLP with literals and a TOML config
//! kga train --model ermlp-literal --dataset data/yago --config run.toml --literal-norm min-max
//!
//! # Filtered link prediction on the test split
//! kga test --model transe --dataset data/wordnet \
//!     --checkpoint models/wordnet/transe_lr0.01_wd0.0001.safetensors
//! ```

use anyhow::{bail, Context, Result};
use candle_core::Device;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use kga_core::{Dataset, FilterSet, LiteralTable, NegativeSampling};
use kga_kge::{
    accuracy, auc, build_model, checkpoint_path, find_threshold, report_path, Dimensions, Distance,
    LossMode, ModelKind, RankingEvaluator, RunConfig, ScoreBatch, ScoringModel, StepMetrics,
    Trainer, TrainingData,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kga", version)]
#[command(about = "Knowledge graph embedding trainer and evaluator", long_about = None)]
struct Cli {
    /// Log filter, e.g. `info` or `kga_kge=debug` (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model, checkpointing at every epoch end
    Train(TrainArgs),

    /// Evaluate a checkpoint on the test split and exit
    Test(TestArgs),

    /// Show split and vocabulary sizes of a dataset
    Info {
        /// Dataset directory
        #[arg(long)]
        dataset: PathBuf,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Model kind (rescal, distmult, ermlp, transe, ntn, distmult-literal, ermlp-literal)
    #[arg(long)]
    model: ModelKind,

    /// Dataset directory holding train.npy and friends
    #[arg(long)]
    dataset: PathBuf,

    /// TOML file with [model] and [training] tables; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Embedding dimension
    #[arg(long)]
    k: Option<usize>,

    /// Hidden width of the MLP models
    #[arg(long = "mlp-h")]
    hidden: Option<usize>,

    /// Dropout before the MLP output layer
    #[arg(long)]
    dropout: Option<f32>,

    /// NTN tensor slices
    #[arg(long)]
    ntn_slice: Option<usize>,

    /// TransE distance (l1 or l2)
    #[arg(long)]
    distance: Option<Distance>,

    /// Weight of the embedding-norm penalty in the log loss
    #[arg(long)]
    embeddings_lambda: Option<f64>,

    /// Per-entity literal table (.npy); literal models default to numerical_literals.npy
    #[arg(long)]
    literals: Option<PathBuf>,

    /// Column normalisation applied to the literal table
    #[arg(long, value_enum, default_value_t = LiteralNorm::None)]
    literal_norm: LiteralNorm,

    /// Run on CUDA device 0
    #[arg(long)]
    gpu: bool,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct TrainArgs {
    #[command(flatten)]
    common: ModelArgs,

    /// Objective (logloss or rankloss)
    #[arg(long)]
    loss: Option<LossMode>,

    /// Hinge margin for rankloss
    #[arg(long)]
    margin: Option<f64>,

    /// Base learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Halve the learning rate every N epochs
    #[arg(long)]
    lr_decay_every: Option<usize>,

    /// AdamW weight decay
    #[arg(long)]
    weight_decay: Option<f64>,

    /// Positives per minibatch
    #[arg(long)]
    mbsize: Option<usize>,

    /// Negative draws per positive (rankloss)
    #[arg(long)]
    negative_samples: Option<usize>,

    /// Number of epochs
    #[arg(long)]
    nepoch: Option<usize>,

    /// Health-check cadence in iterations; -1 disables
    #[arg(long, allow_negative_numbers = true)]
    log_interval: Option<i64>,

    /// Mean instead of sum loss reduction
    #[arg(long)]
    average_loss: bool,

    /// Renormalise embeddings after every step
    #[arg(long)]
    normalize_embed: bool,

    /// Negative sampling strategy (uniform, both, relation)
    #[arg(long)]
    sampler: Option<NegativeSampling>,

    /// Root directory for checkpoints
    #[arg(long, default_value = "models")]
    checkpoint_dir: PathBuf,

    /// Continue from the existing checkpoint for this configuration
    #[arg(long)]
    resume: bool,

    /// Validation positives ranked per health check
    #[arg(long)]
    eval_sample: Option<usize>,

    /// Candidate entities per direction in health checks; 0 for all
    #[arg(long)]
    eval_candidates: Option<usize>,
}

#[derive(Args)]
struct TestArgs {
    #[command(flatten)]
    common: ModelArgs,

    /// Checkpoint to evaluate
    #[arg(long)]
    checkpoint: PathBuf,

    /// Candidate entities per direction; every entity when omitted
    #[arg(long)]
    eval_candidates: Option<usize>,

    /// Hits@k cutoffs
    #[arg(long, value_delimiter = ',', default_value = "1,3,10")]
    hits: Vec<usize>,

    /// Also rank each test relation among relation ids 0..N (0 disables)
    #[arg(long, default_value_t = 5)]
    relations: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum LiteralNorm {
    /// Raw values
    None,
    /// Every column rescaled to [0, 1]
    MinMax,
    /// Every column shifted to zero mean, unit variance
    Standardize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Commands::Train(args) => cmd_train(args),
        Commands::Test(args) => cmd_test(args),
        Commands::Info { dataset } => cmd_info(&dataset),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level {level}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();
    Ok(())
}

fn device(gpu: bool) -> Result<Device> {
    if gpu {
        Device::new_cuda(0).context("CUDA device 0 is not available")
    } else {
        Ok(Device::Cpu)
    }
}

/// Defaults, then the config file, then flags.
fn run_config(args: &ModelArgs) -> Result<RunConfig> {
    let mut cfg = match &args.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => RunConfig::default(),
    };
    let model = &mut cfg.model;
    if let Some(k) = args.k {
        model.embedding_dim = k;
    }
    if let Some(h) = args.hidden {
        model.hidden_dim = h;
    }
    if let Some(p) = args.dropout {
        model.dropout = p;
    }
    if let Some(s) = args.ntn_slice {
        model.ntn_slices = s;
    }
    if let Some(d) = args.distance {
        model.distance = d;
    }
    if let Some(lambda) = args.embeddings_lambda {
        model.embeddings_lambda = lambda;
    }
    if let Some(seed) = args.seed {
        cfg.training.seed = seed;
    }
    Ok(cfg)
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", path.display()));

    let dataset = Dataset::load(path)
        .with_context(|| format!("Failed to load dataset {}", path.display()))?;

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    Ok(dataset)
}

fn load_literals(
    args: &ModelArgs,
    dataset: &Dataset,
    device: &Device,
) -> Result<Option<LiteralTable>> {
    let path = match &args.literals {
        Some(path) => path.clone(),
        None if args.model.requires_literals() => dataset.root.join("numerical_literals.npy"),
        None => return Ok(None),
    };
    let table = LiteralTable::load(&path, device)
        .with_context(|| format!("Failed to load literals {}", path.display()))?;
    if table.num_entities() != dataset.n_entities {
        bail!(
            "{} has {} rows but the dataset has {} entities",
            path.display(),
            table.num_entities(),
            dataset.n_entities
        );
    }
    let table = match args.literal_norm {
        LiteralNorm::None => table,
        LiteralNorm::MinMax => table.min_max()?,
        LiteralNorm::Standardize => table.standardize()?,
    };
    info!(
        path = %path.display(),
        literals = table.num_literals(),
        "loaded literal table"
    );
    Ok(Some(table))
}

fn build(
    args: &ModelArgs,
    cfg: &RunConfig,
    dataset: &Dataset,
    literals: Option<&LiteralTable>,
    device: &Device,
    rng: &mut StdRng,
) -> Result<Box<dyn ScoringModel>> {
    let dims = Dimensions {
        n_entities: dataset.n_entities,
        n_relations: dataset.n_relations,
        n_literals: literals.map_or(0, LiteralTable::num_literals),
    };
    let model = build_model(args.model, &cfg.model, dims, device, rng)
        .with_context(|| format!("Failed to build {}", args.model))?;
    info!(
        model = %args.model,
        parameters = model.params().num_parameters(),
        "model built"
    );
    Ok(model)
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let mut cfg = run_config(&args.common)?;
    let training = &mut cfg.training;
    if let Some(loss) = args.loss {
        training.loss = loss;
    }
    if let Some(margin) = args.margin {
        training.margin = margin;
    }
    if let Some(lr) = args.lr {
        training.learning_rate = lr;
    }
    if let Some(every) = args.lr_decay_every {
        training.lr_decay_every = every;
    }
    if let Some(wd) = args.weight_decay {
        training.weight_decay = wd;
    }
    if let Some(mbsize) = args.mbsize {
        training.batch_size = mbsize;
    }
    if let Some(n) = args.negative_samples {
        training.negative_samples = n;
    }
    if let Some(n) = args.nepoch {
        training.epochs = n;
    }
    if let Some(every) = args.log_interval {
        training.log_interval = usize::try_from(every).ok();
    }
    if let Some(sampler) = args.sampler {
        training.sampler = sampler;
    }
    if let Some(n) = args.eval_sample {
        training.validation_rows = Some(n);
    }
    if let Some(n) = args.eval_candidates {
        training.eval_candidates = (n > 0).then_some(n);
    }
    training.average_loss |= args.average_loss;
    training.normalize_embeddings |= args.normalize_embed;
    cfg.validate().context("Invalid configuration")?;

    let device = device(args.common.gpu)?;
    let dataset = load_dataset(&args.common.dataset)?;
    let literals = load_literals(&args.common, &dataset, &device)?;
    let mut rng = StdRng::seed_from_u64(cfg.training.seed);
    let mut model = build(&args.common, &cfg, &dataset, literals.as_ref(), &device, &mut rng)?;

    let checkpoint = checkpoint_path(
        &args.checkpoint_dir,
        &dataset.name,
        args.common.model,
        cfg.training.learning_rate,
        cfg.training.weight_decay,
    );
    if args.resume {
        model
            .load(&checkpoint)
            .with_context(|| format!("Failed to resume from {}", checkpoint.display()))?;
        info!(path = %checkpoint.display(), "resumed");
    }

    let val_filter = FilterSet::load(&dataset.root, "val", &dataset.val.positives())
        .context("Failed to load validation filter")?;
    let data = TrainingData {
        train: &dataset.train.triplets,
        validation: (!dataset.val.is_empty()).then_some(&dataset.val),
        validation_filter: val_filter.as_ref(),
        n_entities: dataset.n_entities,
        n_relations: dataset.n_relations,
        literals: literals.as_ref(),
    };

    let steps = dataset.train.len().div_ceil(cfg.training.batch_size) * cfg.training.epochs;
    let pb = ProgressBar::new(steps as u64);
    pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);

    let start = Instant::now();
    let report = Trainer::new(cfg.training.clone())
        .with_checkpoint(&checkpoint)
        .train_with_callback(
            model.as_ref(),
            &data,
            &mut rng,
            Box::new(|m: &StepMetrics| {
                pb.set_message(format!("epoch {} loss {:.4}", m.epoch + 1, m.loss));
                pb.inc(1);
            }),
        )
        .context("Training failed")?;
    pb.finish_and_clear();

    let report_file = report_path(&checkpoint);
    report
        .save_json(&report_file)
        .with_context(|| format!("Failed to write {}", report_file.display()))?;

    println!("Trained {} in {:.2?}", args.common.model, start.elapsed());
    if let Some(last) = report.epochs.last() {
        println!("Final epoch loss: {:.4}", last.mean_loss);
    }
    println!("Checkpoint: {}", checkpoint.display());
    println!("Report:     {}", report_file.display());
    Ok(())
}

fn cmd_test(args: TestArgs) -> Result<()> {
    let cfg = run_config(&args.common)?;
    cfg.model.validate().context("Invalid model configuration")?;

    let device = device(args.common.gpu)?;
    let dataset = load_dataset(&args.common.dataset)?;
    let literals = load_literals(&args.common, &dataset, &device)?;
    let mut rng = StdRng::seed_from_u64(cfg.training.seed);
    let mut model = build(&args.common, &cfg, &dataset, literals.as_ref(), &device, &mut rng)?;
    model
        .load(&args.checkpoint)
        .with_context(|| format!("Failed to load checkpoint {}", args.checkpoint.display()))?;

    let test = dataset.test.positives();
    if test.is_empty() {
        bail!("{} has no test triplets", dataset.root.display());
    }
    let filter = FilterSet::load(&dataset.root, "test", &test)?;
    if filter.is_none() {
        info!("no filter arrays, ranking unfiltered");
    }

    let evaluator = RankingEvaluator::new(dataset.n_entities)
        .with_hits_at(args.hits.clone())
        .with_sample(args.eval_candidates)
        .with_filter(filter.as_ref())
        .with_literals(literals.as_ref());
    let metrics = evaluator.evaluate(model.as_ref(), &test, &mut rng)?;

    println!(
        "Test ({} triplets, {}): {metrics}",
        test.len(),
        if filter.is_some() { "filtered" } else { "raw" }
    );

    if args.relations > 0 {
        let candidates: Vec<usize> = (0..args.relations.min(dataset.n_relations)).collect();
        let relations = evaluator.evaluate_relations(model.as_ref(), &test, &candidates)?;
        println!("Relations ({} candidates): {relations}", candidates.len());
    }

    if let Some(labels) = &dataset.test.labels {
        let threshold = match &dataset.val.labels {
            Some(val_labels) => {
                let batch = ScoreBatch::resolve(&dataset.val.triplets, literals.as_ref())?;
                find_threshold(&model.predict(&batch, true)?, val_labels, 0.01, false)
            }
            None => 0.5,
        };
        let batch = ScoreBatch::resolve(&dataset.test.triplets, literals.as_ref())?;
        let pred = model.predict(&batch, true)?;
        let acc = accuracy(&pred, labels, threshold, false);
        match auc(&pred, labels) {
            Some(auc) => println!("Accuracy: {acc:.4} (threshold {threshold:.2}) | AUC: {auc:.4}"),
            None => println!("Accuracy: {acc:.4} (threshold {threshold:.2})"),
        }
    }

    Ok(())
}

fn cmd_info(path: &Path) -> Result<()> {
    let dataset = load_dataset(path)?;

    println!("Dataset Statistics");
    println!("==================");
    println!("Name:       {}", dataset.name);
    println!("Entities:   {}", dataset.n_entities);
    println!("Relations:  {}", dataset.n_relations);
    println!("Train:      {}", dataset.train.len());
    println!("Validation: {}", dataset.val.len());
    println!("Test:       {}", dataset.test.len());
    if dataset.test.labels.is_some() {
        println!("Test positives: {}", dataset.test.positives().len());
    }

    Ok(())
}
