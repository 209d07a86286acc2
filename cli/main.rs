#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use ndarray::Array1;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use kexpfam::{BasisConfig, EstimatorConfig, TrainedModel, load_samples, train_model};

#[derive(Args)]
pub struct FitArgs {
    /// Path to a CSV file with a header row and one sample per row
    #[arg(value_name = "DATA_CSV")]
    pub data: PathBuf,

    /// Gaussian kernel bandwidth (overrides the config file)
    #[arg(long)]
    pub sigma: Option<f64>,

    /// Regularization weight (overrides the config file)
    #[arg(long)]
    pub lambda: Option<f64>,

    /// Number of randomly chosen Nystrom basis functions; fits the full estimator when omitted
    #[arg(long, value_name = "M")]
    pub basis_size: Option<usize>,

    /// Seed for the random basis selection (default 0); also overrides the seed of a
    /// random basis in the config file
    #[arg(long)]
    pub seed: Option<u64>,

    /// Estimator configuration in TOML format
    #[arg(long, value_name = "CONFIG_TOML")]
    pub config: Option<PathBuf>,

    /// Where to write the trained model
    #[arg(long, default_value = "model.toml")]
    pub output: PathBuf,

    /// Number of worker threads (defaults to all cores)
    #[arg(long, value_name = "T")]
    pub threads: Option<usize>,
}

#[derive(Args)]
pub struct EvalArgs {
    /// Path to a CSV file of query points, same columns as the training data
    #[arg(value_name = "QUERY_CSV")]
    pub queries: PathBuf,

    /// Path to trained model file (.toml)
    #[arg(long)]
    pub model: PathBuf,

    /// Where to write the scores
    #[arg(long, default_value = "scores.tsv")]
    pub output: PathBuf,

    /// Number of worker threads (defaults to all cores)
    #[arg(long, value_name = "T")]
    pub threads: Option<usize>,
}

#[derive(Parser)]
#[command(
    name = "kexpfam",
    about = "Score-matching kernel exponential family density estimation",
    long_about = "Fits an unnormalised Gaussian-kernel exponential family to samples by \
                  score matching, with an optional Nystrom approximation, and evaluates \
                  the fitted log-density at new points."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit an estimator to sample data
    #[command(about = "Fit a kernel exponential family (outputs: model.toml)")]
    Fit(FitArgs),

    /// Evaluate a trained model at query points
    #[command(about = "Evaluate log_pdf at query points (outputs: scores.tsv)")]
    Eval(EvalArgs),

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

fn resolve_config(args: &FitArgs) -> Result<EstimatorConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading configuration from: {}", path.display());
            EstimatorConfig::load(path)?
        }
        None => EstimatorConfig {
            sigma: args.sigma.ok_or("--sigma is required without --config")?,
            lambda: args.lambda.ok_or("--lambda is required without --config")?,
            basis: BasisConfig::Full,
        },
    };

    if let Some(sigma) = args.sigma {
        config.sigma = sigma;
    }
    if let Some(lambda) = args.lambda {
        config.lambda = lambda;
    }
    if let Some(size) = args.basis_size {
        config.basis = BasisConfig::Random {
            size,
            seed: args.seed.unwrap_or(0),
        };
    } else if let Some(override_seed) = args.seed {
        match &mut config.basis {
            BasisConfig::Random { seed, .. } => *seed = override_seed,
            _ => return Err("--seed requires --basis-size or a random basis in the config".into()),
        }
    }
    config.validate()?;
    Ok(config)
}

pub fn fit(args: FitArgs) -> Result<(), Box<dyn std::error::Error>> {
    configure_threads(args.threads)?;
    let config = resolve_config(&args)?;

    println!("Loading training data from: {}", args.data.display());
    let data = load_samples(&args.data)?;
    println!(
        "Loaded {} samples with {} dimensions",
        data.ncols(),
        data.nrows()
    );

    match &config.basis {
        BasisConfig::Full => println!(
            "Fitting full estimator (sigma={}, lambda={})",
            config.sigma, config.lambda
        ),
        BasisConfig::Random { size, seed } => println!(
            "Fitting Nystrom estimator with {size} random basis functions (seed={seed}, sigma={}, lambda={})",
            config.sigma, config.lambda
        ),
        BasisConfig::Explicit { indices } => println!(
            "Fitting Nystrom estimator with {} explicit basis functions (sigma={}, lambda={})",
            indices.len(),
            config.sigma,
            config.lambda
        ),
    }

    let model = train_model(data, &config)?;
    model.save(&args.output)?;
    println!("Model saved to: {}", args.output.display());
    Ok(())
}

pub fn eval(args: EvalArgs) -> Result<(), Box<dyn std::error::Error>> {
    configure_threads(args.threads)?;

    println!("Loading model from: {}", args.model.display());
    let model = TrainedModel::load(&args.model)?;
    println!(
        "Model expects {} dimensions ({} basis functions)",
        model.dimension(),
        model.num_basis()
    );

    println!("Loading query points from: {}", args.queries.display());
    let queries = load_samples(&args.queries)?;
    let scores = model.log_pdf_multiple(queries.view())?;

    save_scores(&scores, &args.output)?;
    println!("Scores saved to: {}", args.output.display());
    Ok(())
}

fn save_scores(scores: &Array1<f64>, path: &Path) -> Result<(), std::io::Error> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "index\tlog_pdf")?;
    for (idx, value) in scores.iter().enumerate() {
        writeln!(file, "{idx}\t{value}")?;
    }
    file.flush()
}

fn configure_threads(threads: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(num_threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()?;
        log::debug!("Using {num_threads} worker threads");
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Fit(args)) => fit(args),
        Some(Commands::Eval(args)) => eval(args),
        Some(Commands::Version) => {
            println!("kexpfam {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
