//! # metro_index_cli
//!
//! Part of the metro_index crate family.
//!
//! This is the application to index Metro data from the command line.
//!
//! ## Use
//!
//! Make a template configuration with
//!
//! ```bash
//! metro_index_cli -p config.yml new
//! ```
//!
//! edit it, and then index the data with
//!
//! ```bash
//! metro_index_cli -p config.yml
//! ```
//!
//! Library messages are written to `metro_index.log` in the working directory.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use libmetro_index::config::Config;
use libmetro_index::error::ProcessorError;
use libmetro_index::process::{collect_runs, create_subsets, process_subset};
use libmetro_index::worker_status::WorkerStatus;

fn make_template_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

/// Send library (spdlog) messages to a log file
fn init_file_logger() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./metro_index.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn make_bar(pb_manager: &MultiProgress, worker_id: usize) -> ProgressBar {
    let pb = pb_manager.add(ProgressBar::new(100));
    if let Ok(style) =
        ProgressStyle::with_template("{prefix:>10} {msg:<12} [{bar:40.cyan/blue}] {pos:>3}%")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_prefix(format!("Worker {worker_id}"));
    pb
}

fn update_bar(bars: &[ProgressBar], status: &WorkerStatus) {
    if let Some(pb) = bars.get(status.worker_id) {
        pb.set_message(format!("{} {}", status.color.activity(), status.run_number));
        pb.set_position((status.progress * 100.0) as u64);
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("metro_index_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            log::error!("A configuration path is required");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("Could not write template config: {e}"),
        }
        return;
    }

    if let Err(e) = init_file_logger() {
        log::warn!("Could not create log file, library messages will be lost: {e}");
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if !config.is_n_threads_valid() {
        log::error!("n_threads must be at least 1, found {}", config.n_threads);
        return;
    }
    log::info!("Config successfully loaded.");
    log::info!("Glob Pattern: {}", config.glob_pattern);
    if let Some(base) = &config.base_path {
        log::info!("Base Path: {}", base.to_string_lossy());
    }
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!("Naming: {:?} Particles: {:?}", config.naming, config.particle);
    log::info!("Number of Workers: {}", config.n_threads);

    let runs = match collect_runs(&config) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Found {} runs.", runs.len());

    // Spawn the workers, one bar each
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut bars: Vec<ProgressBar> = Vec::new();
    let mut workers: Vec<std::thread::JoinHandle<Result<(), ProcessorError>>> = Vec::new();
    for subset in create_subsets(&config, runs) {
        // Dont make empty workers
        if subset.is_empty() {
            continue;
        }
        let worker_id = workers.len();
        bars.push(make_bar(&pb_manager, worker_id));
        let conf = config.clone();
        let worker_tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            process_subset(conf, worker_tx, worker_id, subset)
        }));
    }
    // Only the workers hold senders now, so the channel closes when they are all done
    drop(tx);

    for status in rx.iter() {
        update_bar(&bars, &status);
    }

    let mut n_failed = 0;
    for worker in workers {
        match worker.join() {
            Ok(Ok(())) => (),
            Ok(Err(e)) => {
                n_failed += 1;
                log::error!("Indexing failed with error: {e}");
            }
            Err(_) => {
                n_failed += 1;
                log::error!("Failed to join indexing task!");
            }
        }
    }

    for pb in bars.iter() {
        pb.finish();
    }

    if n_failed == 0 {
        log::info!("Successfully indexed data!");
    } else {
        log::warn!("{n_failed} workers failed, check metro_index.log for details.");
    }
    log::info!("Done.");
}
