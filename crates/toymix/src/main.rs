//! toymix - recipe-driven machine-sound dataset mixer
//!
//! Mixes source recordings with environmental noise at a target SNR and
//! writes numbered PCM16 files into a destination dataset.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use toymix::batch_mix::{self, RunOptions};
use toymix::config;
use toymix::logging;
use toymix::recipe::Recipe;
use toymix_core::Snr;

#[derive(Parser)]
#[command(name = "toymix")]
#[command(about = "Mix machine-sound recordings with noise according to a recipe")]
#[command(version)]
#[command(allow_negative_numbers = true)]
struct Cli {
    /// Source root holding stat.csv, machine folders and env_noise folders
    src_folder: PathBuf,

    /// Destination root of the generated dataset
    dest_folder: PathBuf,

    /// Recipe file (YAML)
    recipe_file: PathBuf,

    /// Target SNR in dB, or "clean" for no noise
    snr_db: Snr,

    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for noise selection and shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Render the files of each request in parallel
    #[arg(long)]
    parallel: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = config::load_config(&config_path);
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.parallel {
        config.parallel_render = true;
    }

    std::fs::create_dir_all(&cli.dest_folder)
        .with_context(|| format!("Failed to create destination {:?}", cli.dest_folder))?;
    logging::init(&cli.dest_folder.join(&config.log_file_name))?;
    log::info!("toymix {} starting, config {:?}", env!("CARGO_PKG_VERSION"), config_path);

    let recipe = Recipe::load(&cli.recipe_file)?;
    let options = RunOptions {
        src_root: cli.src_folder,
        dest_root: cli.dest_folder,
        snr: cli.snr_db,
        config,
    };
    batch_mix::run_batch(&recipe, &options)?;
    Ok(())
}
