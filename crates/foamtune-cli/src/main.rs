//! FoamTune CLI - OpenFOAM dataset preparation and fine-tuning job hand-off.

mod config;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use foamtune_core::{DatasetConfig, SecretString};
use foamtune_data::{
    format_all, load_parquet, load_records, shuffle, train_test_split, write_jsonl,
    ExampleTokenizer, PreparePipeline, Projection, PromptTemplate, Record, TokenizedExample,
    Tokenizer, PRESET_NAMES,
};
use foamtune_hub::{DatasetSource, HubClient};
use foamtune_trainer::{
    CheckpointManager, DryRunStrategy, MetricsJsonCallback, ProgressCallback, SftJob, TrainingLoop,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{Overrides, RunConfig};

#[derive(Parser)]
#[command(name = "foamtune")]
#[command(author, version, about = "Prepare OpenFOAM fine-tuning datasets for LoRA training", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the dataset commands.
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Path to run configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model ID (HuggingFace or local directory)
    #[arg(short, long)]
    model: Option<String>,

    /// Dataset file (.jsonl, .json, .parquet) or hub id (owner/name)
    #[arg(short, long)]
    dataset: Option<String>,

    /// Template preset name
    #[arg(short, long)]
    template: Option<String>,

    /// Keep only the first N records
    #[arg(long)]
    max_records: Option<usize>,
}

/// Tokenizer options for the commands that tokenize.
#[derive(Args, Debug, Clone)]
struct TokenizeArgs {
    /// Local tokenizer.json (downloaded from the model repo otherwise)
    #[arg(long)]
    tokenizer: Option<PathBuf>,

    /// Sequence length every example is padded or truncated to
    #[arg(long)]
    max_length: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render records into formatted prompt text
    Render {
        #[command(flatten)]
        run: RunArgs,

        /// Output JSONL file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Format, tokenize and mask a dataset
    Prepare {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        tokenize: TokenizeArgs,

        /// Output directory for train.jsonl / eval.jsonl
        #[arg(short, long, default_value = "./prepared")]
        output: PathBuf,
    },

    /// Prepare a dataset and write a trainer job manifest
    Job {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        tokenize: TokenizeArgs,

        /// Output directory for the job
        #[arg(short, long, default_value = "./job")]
        output: PathBuf,

        /// Rehearse the training schedule without a model
        #[arg(long)]
        dry_run: bool,
    },

    /// List built-in prompt templates
    Templates {
        /// Print one template as YAML
        #[arg(long)]
        show: Option<String>,
    },

    /// Write a sample configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "foamtune.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render { run, output } => {
            let config = resolve_config(&run, None)?;
            run_render(&config, output.as_deref()).await
        }
        Commands::Prepare {
            run,
            tokenize,
            output,
        } => {
            let config = resolve_config(&run, tokenize.max_length)?;
            run_prepare(&config, tokenize.tokenizer.as_deref(), &output).await
        }
        Commands::Job {
            run,
            tokenize,
            output,
            dry_run,
        } => {
            let config = resolve_config(&run, tokenize.max_length)?;
            run_job(&config, tokenize.tokenizer.as_deref(), &output, dry_run).await
        }
        Commands::Templates { show } => run_templates(show.as_deref()),
        Commands::Init { output } => generate_sample_config(&output),
    }
}

fn resolve_config(run: &RunArgs, max_length: Option<usize>) -> anyhow::Result<RunConfig> {
    let overrides = Overrides {
        model: run.model.clone(),
        dataset: run.dataset.clone(),
        template: run.template.clone(),
        max_length,
        max_records: run.max_records,
        output_dir: None,
    };
    let config = RunConfig::resolve(run.config.as_deref(), &overrides)?;
    config.validate()?;
    Ok(config)
}

fn hub_client(config: &RunConfig) -> anyhow::Result<HubClient> {
    let token = SecretString::from_env(&config.hub.token_env);
    if token.is_none() {
        tracing::debug!(env = %config.hub.token_env, "No hub token set, using anonymous access");
    }
    Ok(HubClient::new(token.as_ref(), config.hub.cache_dir.as_deref())?)
}

async fn load_hub_split(
    client: &HubClient,
    dataset_id: &str,
    split: &str,
    max_records: Option<usize>,
) -> anyhow::Result<Vec<Record>> {
    let shards = client
        .download_dataset_parquet(dataset_id, split, None)
        .await
        .with_context(|| format!("Failed to download split '{split}' of {dataset_id}"))?;

    let mut records = Vec::new();
    for shard in &shards {
        records.extend(
            load_parquet(shard).with_context(|| format!("Failed to read {}", shard.display()))?,
        );
        if max_records.is_some_and(|max| records.len() >= max) {
            break;
        }
    }
    if let Some(max) = max_records {
        records.truncate(max);
    }
    Ok(records)
}

/// Load the training records and, when configured, an evaluation set.
async fn load_dataset(config: &RunConfig) -> anyhow::Result<(Vec<Record>, Option<Vec<Record>>)> {
    let dataset: &DatasetConfig = &config.dataset;
    let (mut train, mut eval) = match DatasetSource::parse(&dataset.source) {
        DatasetSource::Local(path) => {
            if dataset.eval_split.is_some() {
                anyhow::bail!(
                    "dataset.eval_split needs a hub dataset; use dataset.test_ratio with local files"
                );
            }
            let records = load_records(&path, dataset.max_records)
                .with_context(|| format!("Failed to load dataset {}", path.display()))?;
            (records, None)
        }
        DatasetSource::Hub(id) => {
            let client = hub_client(config)?;
            let train = load_hub_split(&client, &id, &dataset.split, dataset.max_records).await?;
            let eval = match &dataset.eval_split {
                Some(split) => Some(load_hub_split(&client, &id, split, None).await?),
                None => None,
            };
            (train, eval)
        }
    };

    if dataset.shuffle {
        shuffle(&mut train, dataset.seed);
    }
    if let Some(ratio) = dataset.test_ratio.filter(|_| eval.is_none()) {
        let (kept, held_out) = train_test_split(train, ratio, dataset.seed)?;
        train = kept;
        eval = Some(held_out);
    }

    tracing::info!(
        source = %dataset.source,
        train = train.len(),
        eval = eval.as_ref().map_or(0, Vec::len),
        "Loaded dataset"
    );
    Ok((train, eval))
}

async fn load_tokenizer(config: &RunConfig, explicit: Option<&Path>) -> anyhow::Result<Tokenizer> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let model_id = config.model.model_id.as_str();
            if model_id.trim().is_empty() {
                anyhow::bail!("Model ID is required to find a tokenizer. Use --model or --tokenizer.");
            }
            let local = Path::new(model_id).join("tokenizer.json");
            if local.exists() {
                local
            } else {
                hub_client(config)?
                    .download_tokenizer(model_id, config.model.revision.as_deref())
                    .await?
            }
        }
    };
    Tokenizer::from_file(&path).with_context(|| format!("Failed to load tokenizer {}", path.display()))
}

fn progress_bar(len: usize, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar.set_message(label.to_string());
    bar
}

fn tokenize_split(
    pipeline: &PreparePipeline<Tokenizer>,
    records: &[Record],
    label: &str,
) -> anyhow::Result<Vec<TokenizedExample>> {
    let bar = progress_bar(records.len(), label);
    let examples = pipeline
        .run_with(records, || bar.inc(1))
        .with_context(|| format!("Failed to tokenize {label} split"))?;
    bar.finish();
    Ok(examples)
}

struct Prepared {
    train: Vec<TokenizedExample>,
    eval: Option<Vec<TokenizedExample>>,
    vocab_size: usize,
}

async fn prepare(config: &RunConfig, tokenizer_path: Option<&Path>) -> anyhow::Result<Prepared> {
    let template = config.template.resolve()?;
    let tokenizer = load_tokenizer(config, tokenizer_path).await?;
    let vocab_size = tokenizer.vocab_size();
    let (train_records, eval_records) = load_dataset(config).await?;

    let pipeline = PreparePipeline::new(
        template,
        ExampleTokenizer::new(tokenizer, config.tokenization.clone())?,
        Projection::from_config(&config.dataset),
    );

    let train = tokenize_split(&pipeline, &train_records, "train")?;
    let eval = match &eval_records {
        Some(records) => Some(tokenize_split(&pipeline, records, "eval")?),
        None => None,
    };
    Ok(Prepared {
        train,
        eval,
        vocab_size,
    })
}

async fn run_render(config: &RunConfig, output: Option<&Path>) -> anyhow::Result<()> {
    let template = config.template.resolve()?;
    let (records, _) = load_dataset(config).await?;
    let formatted = format_all(&template, &records)?;

    match output {
        Some(path) => {
            write_jsonl(path, &formatted)?;
            println!("Rendered {} examples to {}", formatted.len(), path.display());
        }
        None => {
            for example in &formatted {
                println!("{}", serde_json::to_string(example)?);
            }
        }
    }
    Ok(())
}

async fn run_prepare(
    config: &RunConfig,
    tokenizer_path: Option<&Path>,
    output: &Path,
) -> anyhow::Result<()> {
    let prepared = prepare(config, tokenizer_path).await?;

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    write_jsonl(output.join("train.jsonl"), &prepared.train)?;
    if let Some(eval) = &prepared.eval {
        write_jsonl(output.join("eval.jsonl"), eval)?;
    }

    println!("========================================");
    println!("  FoamTune Dataset Prepared");
    println!("========================================");
    println!("Train examples: {}", prepared.train.len());
    if let Some(eval) = &prepared.eval {
        println!("Eval examples:  {}", eval.len());
    }
    println!("Max length:     {}", config.tokenization.max_length);
    println!("Output:         {}", output.display());
    Ok(())
}

async fn run_job(
    config: &RunConfig,
    tokenizer_path: Option<&Path>,
    output: &Path,
    dry_run: bool,
) -> anyhow::Result<()> {
    let Prepared {
        train,
        eval,
        vocab_size,
    } = prepare(config, tokenizer_path).await?;

    let job = SftJob {
        model: config.model.clone(),
        lora: config.lora.clone(),
        training: config.training.clone(),
        train,
        eval,
        max_length: config.tokenization.max_length,
    };
    let manifest = job.write_manifest(output)?;

    println!("========================================");
    println!("  FoamTune SFT Job");
    println!("========================================");
    println!("Model:          {}", job.model.model_id);
    println!("LoRA rank:      {} (alpha {})", job.lora.r, job.lora.alpha);
    println!("Train examples: {}", job.train.len());
    println!("Eval examples:  {}", job.eval.as_ref().map_or(0, Vec::len));
    println!("Manifest:       {}", manifest.display());

    if !dry_run {
        return Ok(());
    }

    let dry_run_dir = output.join("dry-run");
    let mut training = TrainingLoop::new(job.training.clone())?;
    let planned = training.planned_steps(job.train.len());
    let metrics = MetricsJsonCallback::new(dry_run_dir.join("metrics.jsonl"))?
        .with_run_name(job.model.new_model.clone())
        .with_config(serde_json::to_value(&job.training)?);
    training = training
        .with_callback(Box::new(metrics))
        .with_callback(Box::new(ProgressCallback::new(planned)))
        .with_checkpoint_manager(CheckpointManager::new(&dry_run_dir)?.with_max_checkpoints(3));

    let mut strategy = DryRunStrategy::new(vocab_size);
    let summary = training.run(&mut strategy, job.train, job.eval.as_deref())?;

    println!("Dry run:        {} steps over {} epochs", summary.steps, summary.epochs);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_templates(show: Option<&str>) -> anyhow::Result<()> {
    match show {
        Some(name) => {
            let template = PromptTemplate::preset(name)?;
            print!("{}", serde_yaml::to_string(&template)?);
        }
        None => {
            println!("Available templates:");
            for name in PRESET_NAMES {
                let template = PromptTemplate::preset(name)?;
                println!("  {name:<16} fields: {}", template.referenced_fields().join(", "));
            }
        }
    }
    Ok(())
}

/// Generate a sample configuration file.
fn generate_sample_config(output: &Path) -> anyhow::Result<()> {
    let config = RunConfig::sample();
    let yaml = serde_yaml::to_string(&config)?;
    std::fs::write(output, yaml).with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Sample configuration written to: {}", output.display());
    println!("\nYou can edit this file and prepare a job with:");
    println!("  foamtune job --config {}", output.display());
    Ok(())
}
