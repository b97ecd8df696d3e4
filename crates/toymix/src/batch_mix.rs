//! Batch mixing of a whole recipe
//!
//! Requests are processed strictly in recipe order. For each request the
//! allocator selects signal/noise pairs, the sequencer names the output
//! files and the mixer renders them. With `parallel_render` the names of a
//! request are assigned up front and its files are rendered on the rayon
//! pool; allocation itself always stays sequential.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use toymix_core::allocator::{Allocation, Allocator};
use toymix_core::catalog::Catalog;
use toymix_core::mixer::{self, MixJob, NoiseSource};
use toymix_core::sequencer::{FilePattern, SequenceCounter};
use toymix_core::shuffle::{self, ShuffleReport};
use toymix_core::{MixResult, Request, Snr};

use crate::config::MixConfig;
use crate::recipe::{PlannedRequest, Recipe};

/// Statistics table expected at the source root
pub const STAT_FILE: &str = "stat.csv";

/// Folder below each machine folder holding noise recordings
pub const NOISE_DIR: &str = "env_noise";

/// Inputs of one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub src_root: PathBuf,
    pub dest_root: PathBuf,
    pub snr: Snr,
    pub config: MixConfig,
}

/// What a run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub requests: usize,
    pub processed: usize,
    pub shuffle: Option<ShuffleReport>,
}

/// One file to render, with everything needed to log the decision
struct PlannedFile {
    signal_id: String,
    signal_path: PathBuf,
    noise_id: String,
    noise_path: PathBuf,
    noise_rms: f64,
}

/// Mix every request of `recipe`, then shuffle "normal" outputs if the
/// recipe asks for it.
pub fn run_batch(recipe: &Recipe, options: &RunOptions) -> Result<RunSummary> {
    let start_time = Instant::now();
    let config = &options.config;

    let catalog = Catalog::load_stat_csv(&options.src_root.join(STAT_FILE))
        .with_context(|| format!("Failed to load catalog from {:?}", options.src_root))?;

    let planned = recipe.plan(config.max_request_slots)?;
    // Catch bad destination patterns before anything is written
    let patterns = planned
        .iter()
        .map(|p| {
            FilePattern::parse(file_name_of(&p.request.destination_pattern))
                .with_context(|| format!("{}", p.at))
        })
        .collect::<Result<Vec<_>>>()?;

    log::info!(
        "run_batch: {} requests, snr {}, {} mode",
        planned.len(),
        options.snr,
        if config.parallel_render { "parallel" } else { "sequential" }
    );

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut allocator = Allocator::new(catalog, config.shortage_policy);
    let mut summary = RunSummary {
        requests: planned.len(),
        ..RunSummary::default()
    };

    for (planned_request, pattern) in planned.iter().zip(patterns) {
        summary.processed += process_request(&mut allocator, planned_request, pattern, options, &mut rng)?;
    }

    if recipe.shuffle_normal() {
        let groups = shuffle::collect_normal_groups(&options.dest_root)?;
        let mut total = ShuffleReport::default();
        for group in &groups {
            let report = shuffle::shuffle_contents(&group.dir, &group.files, &mut rng)?;
            total.swapped += report.swapped;
            total.skipped += report.skipped;
        }
        log::info!(
            "run_batch: shuffled {} groups ({} swapped, {} unchanged)",
            groups.len(),
            total.swapped,
            total.skipped
        );
        summary.shuffle = Some(total);
    }

    log::info!("run_batch: complete in {:.1}s", start_time.elapsed().as_secs_f64());
    log::info!("Processed {} files.", summary.processed);
    Ok(summary)
}

fn process_request(
    allocator: &mut Allocator,
    planned: &PlannedRequest,
    pattern: FilePattern,
    options: &RunOptions,
    rng: &mut StdRng,
) -> Result<usize> {
    let request = &planned.request;
    let allocation = allocator
        .allocate(request, rng)
        .with_context(|| format!("{}", planned.at))?;

    let dest_dir = destination_dir(&options.dest_root, &request.destination_pattern);
    std::fs::create_dir_all(&dest_dir)
        .with_context(|| format!("Failed to create destination {:?}", dest_dir))?;

    let files = plan_files(allocator.catalog(), request, &allocation, &options.src_root);
    let rate = options.config.sample_rate;

    if options.config.parallel_render {
        let mut counter = SequenceCounter::seed(&dest_dir, pattern)?;
        let named = files
            .into_iter()
            .map(|file| Ok((file, dest_dir.join(counter.next_name()?))))
            .collect::<MixResult<Vec<(PlannedFile, PathBuf)>>>()?;

        named
            .par_iter()
            .map(|(file, dest)| render_file(file, dest, allocation.signal_rms, options.snr, rate))
            .collect::<MixResult<Vec<_>>>()?;
        for (file, dest) in &named {
            log_decision(file, dest, allocation.signal_rms, options.snr);
        }
        Ok(named.len())
    } else {
        let count = files.len();
        for file in &files {
            let dest = dest_dir.join(pattern.render(pattern.next_number(&dest_dir)?)?);
            render_file(file, &dest, allocation.signal_rms, options.snr, rate)?;
            log_decision(file, &dest, allocation.signal_rms, options.snr);
        }
        Ok(count)
    }
}

fn plan_files(catalog: &Catalog, request: &Request, allocation: &Allocation, src_root: &Path) -> Vec<PlannedFile> {
    let signal_dir = src_root.join(&request.source_folder);
    let noise_dir = src_root.join(request.machine()).join(NOISE_DIR);

    allocation
        .pairs
        .iter()
        .map(|pair| {
            let signal = catalog.get(pair.signal);
            let noise = catalog.get(pair.noise);
            PlannedFile {
                signal_id: signal.id.clone(),
                signal_path: signal_dir.join(&signal.id),
                noise_id: noise.id.clone(),
                noise_path: noise_dir.join(noise_file_name(request.machine(), &noise.id)),
                noise_rms: noise.rms,
            }
        })
        .collect()
}

fn render_file(file: &PlannedFile, dest: &Path, signal_rms: f64, snr: Snr, rate: u32) -> MixResult<usize> {
    let job = MixJob {
        signal: &file.signal_path,
        signal_rms,
        noise: NoiseSource {
            id: &file.noise_id,
            path: &file.noise_path,
            rms: file.noise_rms,
        },
        snr,
        dest,
    };
    mixer::render(&job, rate)
}

fn log_decision(file: &PlannedFile, dest: &Path, signal_rms: f64, snr: Snr) {
    match snr {
        Snr::Clean => log::info!("{}|{:.4} (clean) -> {}", file.signal_id, signal_rms, dest.display()),
        Snr::Db(_) => log::info!(
            "{}|{:.4} + {}|{:.4} -> {} snr={}",
            file.signal_id,
            signal_rms,
            file.noise_id,
            file.noise_rms,
            dest.display(),
            snr
        ),
    }
}

/// Noise files are stored without the machine prefix of their catalog id
pub fn noise_file_name<'a>(machine: &str, noise_id: &'a str) -> &'a str {
    noise_id
        .strip_prefix(machine)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(noise_id)
}

/// Folder that receives the files of a destination pattern
pub fn destination_dir(dest_root: &Path, destination_pattern: &str) -> PathBuf {
    dest_root
        .join(destination_pattern)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dest_root.to_path_buf())
}

fn file_name_of(destination_pattern: &str) -> &str {
    destination_pattern
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(destination_pattern)
}
