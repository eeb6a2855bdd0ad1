//! Spoof Detection CLI
//!
//! Downloads the spoof/real face dataset, fine-tunes the MobileNetV3-Small
//! classifier and exports the trained model.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use spoof_detection::backend::{backend_name, default_device, DefaultBackend};
use spoof_detection::config::PipelineConfig;
use spoof_detection::dataset::{acquire_dataset, build_manifest, split_manifest, ManifestStats};
use spoof_detection::run::{evaluate_saved_model, run_pipeline, run_training, RunReport};
use spoof_detection::training::TrainingOutcome;
use spoof_detection::utils::logging::{init_logging, LogConfig, LogLevel};

/// Spoof vs real face classification
///
/// Fine-tunes an ImageNet-pretrained MobileNetV3-Small on the spoof dataset
/// with the Burn framework and exports native and web model bundles.
#[derive(Parser, Debug)]
#[command(name = "spoof_detection")]
#[command(version)]
#[command(about = "Spoof detection classifier training with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Plain log output without ANSI colors, for log files and CI
    #[arg(long, default_value = "false")]
    plain: bool,

    /// JSON configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download and extract the dataset archive
    Download,

    /// Show per-label counts and the train/validation split
    Stats,

    /// Train, evaluate and export on an already extracted dataset
    Train {
        /// Override the number of epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Override the batch size
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Override the output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Download if needed, then train, evaluate and export
    Run {
        /// Override the output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Reload an exported saved model and evaluate it on the validation split
    Evaluate {
        /// Saved-model directory
        #[arg(short, long, default_value = "saved-model")]
        model: PathBuf,
    },

    /// Write the default configuration as JSON
    WriteConfig {
        /// Output path
        #[arg(short, long, default_value = "spoof-config.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging = log_config(&cli);
    let _ = init_logging(&logging);
    info!("Log level: {}", logging.level);

    print_banner();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Download => cmd_download(&config)?,

        Commands::Stats => cmd_stats(&config)?,

        Commands::Train {
            epochs,
            batch_size,
            output_dir,
        } => {
            let mut config = config;
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.preprocessing.batch_size = batch_size;
            }
            if let Some(dir) = output_dir {
                config.export.output_dir = dir;
            }
            cmd_train(&config, false)?;
        }

        Commands::Run { output_dir } => {
            let mut config = config;
            if let Some(dir) = output_dir {
                config.export.output_dir = dir;
            }
            cmd_train(&config, true)?;
        }

        Commands::Evaluate { model } => cmd_evaluate(&config, &model)?,

        Commands::WriteConfig { output } => cmd_write_config(&config, &output)?,
    }

    Ok(())
}

fn log_config(cli: &Cli) -> LogConfig {
    let mut config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.plain {
        LogConfig::production()
    } else {
        LogConfig::default()
    };
    if let Some(level) = &cli.log_level {
        config.level = LogLevel::parse(level);
    }
    config
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║   Spoof Detection                                            ║
 ║   MobileNetV3-Small fine-tuning with Burn + Rust             ║
 ╚══════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            PipelineConfig::load(path).with_context(|| format!("Invalid configuration {:?}", path))
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn cmd_download(config: &PipelineConfig) -> Result<()> {
    let data_dir = acquire_dataset(&config.dataset).context("Dataset download failed")?;
    println!("{} Dataset ready at {}", "✓".green(), data_dir.display());
    Ok(())
}

fn cmd_stats(config: &PipelineConfig) -> Result<()> {
    let data_dir = &config.dataset.data_dir;
    if !data_dir.exists() {
        println!("{} Dataset directory not found: {}", "Error:".red(), data_dir.display());
        println!();
        println!("Download it first:");
        println!("  spoof_detection download");
        return Ok(());
    }

    let samples = build_manifest(data_dir)?;
    let stats = ManifestStats::from_samples(&samples);
    stats.print();

    let split = split_manifest(samples, config.dataset.train_split, config.dataset.seed)?;
    println!();
    println!("{}", "Split:".cyan().bold());
    println!("  Training:   {}", split.train.len());
    println!("  Validation: {}", split.validation.len());
    Ok(())
}

fn cmd_train(config: &PipelineConfig, download: bool) -> Result<()> {
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Data dir:       {}", config.dataset.data_dir.display());
    println!("  Epochs:         {}", config.training.epochs);
    println!("  Batch size:     {}", config.preprocessing.batch_size);
    println!("  Image size:     {}", config.preprocessing.image_size);
    println!("  Learning rate:  {}", config.training.learning_rate);
    println!("  Patience:       {}", config.training.patience);
    println!("  Backend:        {}", backend_name());
    println!("  Output dir:     {}", config.export.output_dir.display());
    println!();

    let report = if download {
        run_pipeline(config)?
    } else {
        run_training(config)?
    };
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", "Training Complete!".green().bold());
    match report.outcome {
        TrainingOutcome::Completed => {
            println!("  Ran all {} epochs", report.history.len());
        }
        TrainingOutcome::EarlyStopped { epoch, best_epoch } => {
            println!(
                "  Early stopped after epoch {}, weights from epoch {}",
                epoch + 1,
                best_epoch + 1
            );
        }
    }
    println!("  Classes:        {:?}", report.classes);
    println!("  Class weights:  {}", report.class_weights);
    println!(
        "  Validation:     {:.2}% accuracy, loss {:.4}",
        report.evaluation.accuracy_percent(),
        report.evaluation.loss
    );
    println!("  Saved model:    {}", report.artifacts.saved_model_archive.display());
    println!("  Web model:      {}", report.artifacts.web_model_archive.display());
}

fn cmd_evaluate(config: &PipelineConfig, model_dir: &Path) -> Result<()> {
    let device = default_device();
    evaluate_saved_model::<DefaultBackend>(config, model_dir, &device)
        .with_context(|| format!("Evaluation of {:?} failed", model_dir))?;
    Ok(())
}

fn cmd_write_config(config: &PipelineConfig, output: &Path) -> Result<()> {
    config.save(output)?;
    println!("{} Wrote configuration to {}", "✓".green(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_flags_select_config() {
        let cli = Cli::try_parse_from(["spoof_detection", "--plain", "--log-level", "warn", "stats"]).unwrap();
        let config = log_config(&cli);
        assert_eq!(config.level, LogLevel::Warn);
        assert!(!config.ansi_colors);
        assert!(matches!(cli.command, Commands::Stats));

        let cli = Cli::try_parse_from(["spoof_detection", "--verbose", "download"]).unwrap();
        assert_eq!(log_config(&cli).level, LogLevel::Debug);
    }
}
