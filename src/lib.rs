//! Annoset: normalize computer-vision annotation datasets.
//!
//! Datasets in any registered format are read into one annotation model,
//! composed from several sources, transformed, and written back out in any
//! other registered format.
//!
//! # Modules
//!
//! - [`ir`]: the annotation model (items, annotations, categories, images)
//! - [`registry`]: format tags mapped to extractors, importers, converters
//!   and launchers
//! - [`project`]: source composition into a merged [`project::Dataset`]
//! - [`formats`]: the built-in formats
//! - [`launcher`]: model inference over a dataset
//! - [`transforms`]: subset splitting and label remapping
//! - [`validation`]: dataset validation and error reporting
//! - [`error`]: error types

pub mod converter;
pub mod error;
pub mod extractor;
pub mod formats;
pub mod image_cache;
pub mod importer;
pub mod ir;
pub mod launcher;
pub mod project;
pub mod registry;
pub mod source;
pub mod transforms;
pub mod validation;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

pub use error::{AnnosetError, Result};

use converter::ConvertOptions;
use project::{Dataset, Project};
use registry::Environment;

/// The annoset CLI application.
#[derive(Parser)]
#[command(name = "annoset")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a dataset from one format to another.
    Convert(ConvertArgs),
    /// List the formats whose layout matches a directory.
    Detect(DetectArgs),
    /// Validate a dataset for errors and warnings.
    Validate(ValidateArgs),
    /// Reassign items to new subsets at random, then export.
    Split(SplitArgs),
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Input format; detected from the directory layout when omitted.
    #[arg(long, short = 'i')]
    input_format: Option<String>,

    /// Output format.
    #[arg(long, short = 'o')]
    output_format: String,

    /// Copy or re-encode item images into the output.
    #[arg(long)]
    save_images: bool,

    /// Extension for written images (e.g. 'png').
    #[arg(long)]
    image_ext: Option<String>,

    /// Only keep items from these subsets.
    #[arg(long = "subset")]
    subsets: Vec<String>,

    input: PathBuf,
    output: PathBuf,
}

#[derive(clap::Args)]
struct DetectArgs {
    path: PathBuf,
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// Dataset format; detected when omitted.
    #[arg(long)]
    format: Option<String>,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,

    path: PathBuf,
}

#[derive(clap::Args)]
struct SplitArgs {
    #[arg(long, short = 'i')]
    input_format: Option<String>,

    #[arg(long, short = 'o')]
    output_format: String,

    /// Subset and ratio as NAME=RATIO; repeat for each subset.
    #[arg(long = "ratio", required = true, value_parser = parse_ratio)]
    ratios: Vec<(String, f64)>,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long)]
    save_images: bool,

    input: PathBuf,
    output: PathBuf,
}

fn parse_ratio(raw: &str) -> std::result::Result<(String, f64), String> {
    let (name, ratio) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=RATIO, got '{raw}'"))?;
    let ratio = ratio
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid ratio '{ratio}': {err}"))?;
    Ok((name.trim().to_string(), ratio))
}

/// Run the annoset CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let env = Environment::builtin()?;

    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args, &env),
        Some(Commands::Detect(args)) => run_detect(args, &env),
        Some(Commands::Validate(args)) => run_validate(args, &env),
        Some(Commands::Split(args)) => run_split(args, &env),
        None => {
            println!("annoset {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Normalize computer-vision annotation datasets.");
            println!();
            println!("Run 'annoset --help' for usage information.");
            Ok(())
        }
    }
}

/// Imports `input` into a fresh project and builds the merged dataset.
fn load_dataset(
    input: &Path,
    format: Option<&str>,
    subsets: &[String],
    env: &Environment,
) -> Result<Dataset> {
    let mut project = Project::new("cli");
    match format {
        Some(format) => {
            project.import(input, format, env)?;
        }
        None => {
            let (format, _) = project.import_auto(input, env)?;
            log::info!("detected format '{format}' at {}", input.display());
        }
    }
    if !subsets.is_empty() {
        project.set_subsets(Some(subsets.iter().cloned().collect()));
    }
    project.make_dataset(env)
}

fn run_convert(args: ConvertArgs, env: &Environment) -> Result<()> {
    let converter = env.converter(&args.output_format)?;
    let dataset = load_dataset(
        &args.input,
        args.input_format.as_deref(),
        &args.subsets,
        env,
    )?;

    let mut options = ConvertOptions {
        save_images: args.save_images,
        image_ext: None,
    };
    if let Some(ext) = args.image_ext {
        options = options.with_image_ext(ext);
    }

    std::fs::create_dir_all(&args.output)?;
    converter.convert(&dataset, &args.output, &options)?;
    println!(
        "Converted {} item(s) to {} at {}",
        dataset.len(),
        args.output_format,
        args.output.display()
    );
    Ok(())
}

fn run_detect(args: DetectArgs, env: &Environment) -> Result<()> {
    let formats = env.matching_formats(&args.path)?;
    if formats.is_empty() {
        return Err(AnnosetError::not_detected("supported", &args.path));
    }
    for format in formats {
        println!("{format}");
    }
    Ok(())
}

fn run_validate(args: ValidateArgs, env: &Environment) -> Result<()> {
    let dataset = load_dataset(&args.path, args.format.as_deref(), &[], env)?;
    let opts = validation::ValidateOptions {
        strict: args.strict,
    };
    let report = validation::validate_dataset(&dataset, &opts)?;

    match args.output.as_str() {
        "json" => {
            let issues: Vec<_> = report
                .issues
                .iter()
                .map(|issue| {
                    serde_json::json!({
                        "severity": format!("{:?}", issue.severity),
                        "code": format!("{:?}", issue.code),
                        "message": issue.message,
                        "context": issue.context.to_string(),
                    })
                })
                .collect();
            let body = serde_json::json!({
                "error_count": report.error_count(),
                "warning_count": report.warning_count(),
                "issues": issues,
            });
            let text =
                serde_json::to_string_pretty(&body).map_err(|source| AnnosetError::JsonWrite {
                    path: args.path.clone(),
                    source,
                })?;
            println!("{text}");
        }
        _ => print!("{}", report),
    }

    report.into_result(args.strict).map(|_| ())
}

fn run_split(args: SplitArgs, env: &Environment) -> Result<()> {
    let split = transforms::RandomSplit::new(args.ratios, args.seed)?;
    let converter = env.converter(&args.output_format)?;
    let dataset = load_dataset(&args.input, args.input_format.as_deref(), &[], env)?;
    let dataset = split.apply(&dataset)?;

    let options = ConvertOptions {
        save_images: args.save_images,
        image_ext: None,
    };
    std::fs::create_dir_all(&args.output)?;
    converter.convert(&dataset, &args.output, &options)?;
    println!(
        "Split {} item(s) into {}",
        dataset.len(),
        args.output.display()
    );
    Ok(())
}
