//! Tomato Leaf Disease Classification CLI
//!
//! Offline companion to the prediction server: classify image files with a
//! model artifact, inspect an artifact's layer stack and list the known
//! disease classes.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use walkdir::WalkDir;

use tomato_leaf::backend::{backend_name, default_device, DefaultBackend};
use tomato_leaf::inference::Predictor;
use tomato_leaf::knowledge::DiseaseCatalog;
use tomato_leaf::labels::{display_name, is_healthy_class, CLASS_NAMES};
use tomato_leaf::model::{default_registry, ClassifierConfig, TomatoClassifier, DEFAULT_MODEL_PATH};
use tomato_leaf::utils::logging::{init_logging, LogConfig};
use tomato_leaf::utils::format_millis;

/// File extensions picked up when the input is a directory
const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff"];

/// Tomato Leaf Disease Classification
///
/// Classifies tomato leaf images with a Dual ECA attention CNN running on Burn.
#[derive(Parser, Debug)]
#[command(name = "tomato_leaf")]
#[command(author = "Warre Snaet")]
#[command(version)]
#[command(about = "Tomato leaf disease classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a single image or every image in a directory
    Predict {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Path to the model artifact
        #[arg(short, long, env = "TOMATO_MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,

        /// Print one JSON object per image instead of a summary
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Load a model artifact and print its layer stack
    Inspect {
        /// Path to the model artifact
        #[arg(short, long, env = "TOMATO_MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,
    },

    /// List the disease classes and their guidance
    Classes,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Predict { input, model, json } => cmd_predict(&input, &model, json)?,
        Commands::Inspect { model } => cmd_inspect(&model)?,
        Commands::Classes => cmd_classes(),
    }

    Ok(())
}

/// Image files under `input`, or `input` itself when it is a file
fn collect_images(input: &Path) -> Vec<PathBuf> {
    if !input.is_dir() {
        return vec![input.to_path_buf()];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

fn cmd_predict(input: &Path, model: &Path, json: bool) -> Result<()> {
    info!("Running prediction");
    info!("  Input: {:?}", input);
    info!("  Model: {:?}", model);

    if !input.exists() {
        anyhow::bail!("Input path not found: {}", input.display());
    }

    if !json {
        println!("{}", "Prediction Configuration:".cyan().bold());
        println!("  Input:   {}", input.display());
        println!("  Model:   {}", model.display());
        println!("  Backend: {}", backend_name());
        println!();
    }

    let device = default_device();
    let predictor = Predictor::<DefaultBackend>::load(model, &device)?;

    let files = collect_images(input);
    if files.is_empty() {
        println!("{} No images found in {}", "Warning:".yellow(), input.display());
        return Ok(());
    }

    let pb = if json || files.len() == 1 {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(files.len() as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut results = Vec::with_capacity(files.len());
    for path in &files {
        results.push((path, predictor.classify_file(path)));
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mut failures = 0;
    for (path, outcome) in results {
        match outcome {
            Ok(prediction) => {
                let result = predictor.describe(&prediction);
                if json {
                    let line = serde_json::json!({
                        "path": path,
                        "disease": result.disease,
                        "confidence": result.confidence,
                        "cause": result.cause,
                        "recommendations": result.recommendations,
                    });
                    println!("{}", line);
                    continue;
                }

                let name = path.file_name().unwrap_or_default().to_string_lossy();
                let disease = if is_healthy_class(prediction.class_index) {
                    result.disease.green().bold()
                } else {
                    result.disease.red().bold()
                };
                println!("{}", name.to_string().cyan());
                println!("  Disease:    {}", disease);
                println!("  Confidence: {:.2}%", result.confidence);
                println!("  Time:       {}", format_millis(prediction.inference_time_ms));
                println!("  Top 3:");
                for (idx, label, prob) in prediction.top_k(3) {
                    println!("    {:>2}. {:<40} {:>6.2}%", idx, display_name(label), prob * 100.0);
                }
                println!("  Cause:      {}", result.cause);
                for rec in &result.recommendations {
                    println!("    - {}", rec);
                }
                println!();
            }
            Err(e) => {
                failures += 1;
                if json {
                    println!("{}", serde_json::json!({ "path": path, "error": e.to_string() }));
                } else {
                    println!("{} {}: {}", "Error:".red(), path.display(), e);
                }
            }
        }
    }

    if !json && files.len() > 1 {
        println!(
            "{} {} images, {} failed",
            "Done:".green().bold(),
            files.len(),
            failures
        );
    }

    Ok(())
}

fn cmd_inspect(model: &Path) -> Result<()> {
    info!("Inspecting model {:?}", model);

    let device = default_device();
    let classifier = TomatoClassifier::<DefaultBackend>::load(
        model,
        &default_registry(),
        ClassifierConfig::default(),
        &device,
    )?;

    println!("{}", "Model Summary:".cyan().bold());
    println!("  Name:       {}", classifier.name());
    println!("  Backend:    {}", backend_name());
    println!("  Input:      {:?}", classifier.config().input_shape());
    println!("  Parameters: {}", classifier.num_parameters());
    println!(
        "  Output:     {}",
        if classifier.emits_probabilities() {
            "softmax"
        } else {
            "logits (softmax applied)"
        }
    );
    println!();

    println!("  {:<4} {:<28} {:<24} {}", "#", "Layer", "Type", "Output shape");
    for (i, row) in classifier.summary().iter().enumerate() {
        println!(
            "  {:<4} {:<28} {:<24} {:?}",
            i, row.name, row.kind, row.output_shape
        );
    }

    Ok(())
}

fn cmd_classes() {
    let catalog = DiseaseCatalog::builtin();

    println!("{}", "Disease Classes:".cyan().bold());
    for (idx, label) in CLASS_NAMES.iter().enumerate() {
        let info = catalog.lookup(label);
        println!("  {:>2}. {} ({})", idx, display_name(label).bold(), label);
        println!("      {}", info.cause);
        for rec in &info.recommendations {
            println!("      - {}", rec);
        }
    }
}
