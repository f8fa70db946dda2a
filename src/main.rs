use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use student_analytics::{train, ModelStore, TrainingConfig};

#[derive(Parser)]
#[command(name = "student-analytics")]
#[command(about = "Train and inspect the student analytics models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate the synthetic corpus and retrain both models
    Train {
        #[arg(long, default_value_t = 2000)]
        samples: usize,
        #[arg(long, default_value = "ml")]
        dir: PathBuf,
    },
    /// Show metadata for the currently persisted models
    Info {
        #[arg(long, default_value = "ml")]
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Train { samples, dir } => {
            let store = ModelStore::open(&dir);
            let metadata = train(&store, &TrainingConfig::with_samples(samples))
                .context("training run failed")?;

            println!("Training completed with {} samples.", metadata.samples);
            println!("Risk model accuracy: {:.3}", metadata.risk_accuracy);
            println!(
                "Grade model R²: {:.3} (MSE {:.3})",
                metadata.grade_r2, metadata.grade_mse
            );
            println!("Artifacts written to {}.", store.paths().models_dir().display());
        }
        Commands::Info { dir } => {
            let store = ModelStore::open(&dir);
            match store.read_metadata() {
                Some(metadata) => {
                    println!("Trained at: {}", metadata.training_date);
                    println!("Samples: {}", metadata.samples);
                    println!("Risk model accuracy: {:.3}", metadata.risk_accuracy);
                    println!(
                        "Grade model R²: {:.3} (MSE {:.3})",
                        metadata.grade_r2, metadata.grade_mse
                    );
                    println!("Features: {}", metadata.features.join(", "));
                }
                None => println!("No trained models found in {}.", dir.display()),
            }
        }
    }

    Ok(())
}
