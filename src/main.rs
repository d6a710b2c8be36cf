//! Command-line entry point: train, evaluate, tune and predict.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use burn::module::AutodiffModule;
use burn::optim::AdamConfig;
use clap::{Parser, Subcommand};
use colored::Colorize;

use lesionnet::dataset::{load_manifest, split_samples, LesionDataset, SplitConfig, Transform};
use lesionnet::eval::evaluate;
use lesionnet::hpo::{run_study, StudyConfig};
use lesionnet::inference::Predictor;
use lesionnet::model::default_config;
use lesionnet::training::{Trainer, TrainingConfig};
use lesionnet::utils::logging::{init_logging, LogConfig};
use lesionnet::{backend_name, default_device, DefaultBackend, TrainingBackend};

#[derive(Parser)]
#[command(name = "lesionnet", about = "Dermatoscopic lesion classifier pipeline")]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a classifier and save a checkpoint.
    Train {
        /// Ground-truth CSV manifest.
        #[arg(long)]
        manifest: PathBuf,

        /// Directory holding the lesion images.
        #[arg(long)]
        images: PathBuf,

        /// Checkpoint output path.
        #[arg(long, default_value = "model.mpk")]
        output: PathBuf,

        #[arg(long, default_value_t = 10)]
        epochs: usize,

        #[arg(long, default_value_t = 32)]
        batch_size: usize,

        #[arg(long, default_value_t = 1e-3)]
        learning_rate: f64,
    },

    /// Evaluate a checkpoint on the held-out split.
    Eval {
        #[arg(long)]
        manifest: PathBuf,

        #[arg(long)]
        images: PathBuf,

        /// Checkpoint to evaluate.
        #[arg(long)]
        model: PathBuf,

        #[arg(long, default_value_t = 32)]
        batch_size: usize,
    },

    /// Search hyperparameters with median pruning.
    Tune {
        #[arg(long)]
        manifest: PathBuf,

        #[arg(long)]
        images: PathBuf,

        #[arg(long, default_value_t = 50)]
        trials: usize,

        /// Wall-clock budget in seconds.
        #[arg(long, default_value_t = 3600)]
        timeout_secs: u64,

        #[arg(long, default_value_t = 5)]
        epochs_per_trial: usize,
    },

    /// Classify a single image with a trained checkpoint.
    Predict {
        #[arg(long)]
        model: PathBuf,

        /// Image file to classify.
        #[arg(long)]
        image: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&log_config).map_err(|e| anyhow::anyhow!(e))?;

    println!("{} {}", "backend:".dimmed(), backend_name());

    match cli.command {
        Command::Train {
            manifest,
            images,
            output,
            epochs,
            batch_size,
            learning_rate,
        } => train(manifest, images, output, epochs, batch_size, learning_rate),
        Command::Eval {
            manifest,
            images,
            model,
            batch_size,
        } => eval(manifest, images, model, batch_size),
        Command::Tune {
            manifest,
            images,
            trials,
            timeout_secs,
            epochs_per_trial,
        } => tune(manifest, images, trials, timeout_secs, epochs_per_trial),
        Command::Predict { model, image } => predict(model, image),
    }
}

fn train(
    manifest: PathBuf,
    images: PathBuf,
    output: PathBuf,
    epochs: usize,
    batch_size: usize,
    learning_rate: f64,
) -> anyhow::Result<()> {
    println!("{}", "=== Training ===".green().bold());

    let samples = load_manifest(&manifest, &images)?;
    let split = split_samples(&samples, &SplitConfig::default())?;

    let device = default_device();
    let model = default_config().init::<TrainingBackend>(&device);
    let config = TrainingConfig::new()
        .with_epochs(epochs)
        .with_batch_size(batch_size)
        .with_learning_rate(learning_rate);

    let mut trainer = Trainer::new(model, AdamConfig::new().init(), config, device.clone());
    let history = trainer.fit(LesionDataset::new(split.train, Transform::train()))?;

    for stats in &history {
        println!(
            "epoch {:>3}  loss {:.4}  accuracy {:.2}%",
            stats.epoch,
            stats.avg_loss,
            stats.accuracy * 100.0
        );
    }

    println!("{}", "=== Held-out evaluation ===".green().bold());
    let report = evaluate(
        &trainer.model().valid(),
        LesionDataset::new(split.test, Transform::eval()),
        batch_size,
        &device,
    )?;
    println!("{}", report);

    trainer.save(&output)?;
    println!("checkpoint saved to {}", output.display().to_string().cyan());
    Ok(())
}

fn eval(
    manifest: PathBuf,
    images: PathBuf,
    model_path: PathBuf,
    batch_size: usize,
) -> anyhow::Result<()> {
    println!("{}", "=== Evaluation ===".green().bold());

    let samples = load_manifest(&manifest, &images)?;
    let split = split_samples(&samples, &SplitConfig::default())?;

    let device = default_device();
    let model = lesionnet::training::load_classifier::<DefaultBackend>(&model_path, &device)?;

    let report = evaluate(
        &model,
        LesionDataset::new(split.test, Transform::eval()),
        batch_size,
        &device,
    )?;
    println!("{}", report);
    Ok(())
}

fn tune(
    manifest: PathBuf,
    images: PathBuf,
    trials: usize,
    timeout_secs: u64,
    epochs_per_trial: usize,
) -> anyhow::Result<()> {
    println!("{}", "=== Hyperparameter search ===".green().bold());

    let samples = load_manifest(&manifest, &images)?;
    let split = split_samples(&samples, &SplitConfig::default())?;

    let config = StudyConfig {
        trials,
        timeout: Some(Duration::from_secs(timeout_secs)),
        epochs_per_trial,
        ..StudyConfig::default()
    };

    // Both splits use the deterministic transform so trial scores are
    // comparable.
    let device = default_device();
    let report = run_study::<TrainingBackend>(
        LesionDataset::new(split.train, Transform::eval()),
        LesionDataset::new(split.test, Transform::eval()),
        &config,
        &device,
    )?;

    match report.best_trial() {
        Some(best) => {
            println!("{}", "=== Best trial ===".green().bold());
            println!(
                "trial {}  accuracy {:.2}%\n  lr {:.6}\n  batch size {}\n  optimizer {}",
                best.id,
                best.value.unwrap_or(0.0) * 100.0,
                best.params.learning_rate,
                best.params.batch_size,
                best.params.optimizer.as_str()
            );
        }
        None => println!("{}", "no trial completed".yellow()),
    }
    Ok(())
}

fn predict(model_path: PathBuf, image: PathBuf) -> anyhow::Result<()> {
    let device = default_device();
    let predictor = Predictor::<DefaultBackend>::from_file(&model_path, device)?;

    let bytes = std::fs::read(&image)
        .with_context(|| format!("failed to read image {}", image.display()))?;
    let prediction = predictor.predict_bytes(&bytes)?;
    let response = prediction.to_response();

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
