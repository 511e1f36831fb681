use std::path::Path;
use std::sync::mpsc::Sender;

use super::ascii_index::index_ascii_file;
use super::composer::EventComposer;
use super::config::Config;
use super::error::ProcessorError;
use super::event::EventStore;
use super::index_writer::{ChannelEntry, ChannelIndex, IndexWriter, StepSummary, TdcSummary};
use super::run_grouper::{group_files_by_run, group_files_in};
use super::run_info::RunDescription;
use super::tdc_file::{TdcFile, TdcMode};
use super::worker_status::{BarColor, WorkerStatus};

const ASCII_EXTENSION: &str = "txt";
const TDC_EXTENSION: &str = "tdc";

/// Tracks the progress of a run and reports it to the UI
struct Progress<'a> {
    tx: &'a Sender<WorkerStatus>,
    run_number: &'a str,
    worker_id: usize,
    total_bytes: u64,
    done_bytes: u64,
}

impl Progress<'_> {
    fn send(&self, extra_bytes: u64, color: BarColor) -> Result<(), ProcessorError> {
        let progress = if self.total_bytes == 0 {
            1.0
        } else {
            (self.done_bytes + extra_bytes) as f32 / self.total_bytes as f32
        };
        self.tx.send(WorkerStatus::new(
            progress,
            self.run_number,
            self.worker_id,
            color,
        ))?;
        Ok(())
    }
}

fn file_size(path: &Path) -> u64 {
    path.metadata().map(|m| m.len()).unwrap_or(0)
}

/// Compose the events of every step of an HPTDC file
fn index_tdc_channel(
    config: &Config,
    path: &Path,
    progress: &Progress,
) -> Result<TdcSummary, ProcessorError> {
    let mut tdc = TdcFile::new(path, config.ignore_tdc_tables, config.tdc_chunk_size)?;
    for warning in tdc.warnings() {
        spdlog::warn!("{}: {warning}", path.display());
    }
    if tdc.tables_rebuilt() {
        spdlog::info!(
            "Rebuilt step tables of {} from data markers",
            path.display()
        );
    }

    let steps: Vec<(usize, usize, String, u64)> = tdc
        .scans()
        .iter()
        .enumerate()
        .flat_map(|(scan, steps)| {
            steps
                .iter()
                .enumerate()
                .map(move |(step, entry)| (scan, step, entry.value.clone(), entry.data_size))
        })
        .collect();

    let mut scans: Vec<Vec<StepSummary>> = vec![Vec::new(); tdc.scans().len()];
    let mut bytes_read = 0;
    for (scan, step, value, data_size) in steps {
        let summary = match tdc.mode() {
            TdcMode::Hits => StepSummary::from_hits(&value, tdc.step_record_count(scan, step)?),
            TdcMode::Groups => {
                // Bunches left open at the end of a step are dropped
                let mut composer = EventComposer::new();
                let mut store = EventStore::new();
                tdc.for_each_word_chunk(scan, step, |words| -> Result<(), ProcessorError> {
                    for word in words {
                        composer.process_word(word, &mut store)?;
                    }
                    Ok(())
                })?;
                spdlog::debug!(
                    "Scan {scan} step {value}: {} events from {} resets",
                    store.total(),
                    composer.n_resets()
                );
                StepSummary::from_events(&value, composer.n_resets(), &store, config.particle)
            }
        };
        scans[scan].push(summary);
        bytes_read += data_size;
        progress.send(bytes_read, BarColor::MAGENTA)?;
    }

    Ok(TdcSummary {
        mode: tdc.mode(),
        tables_rebuilt: tdc.tables_rebuilt(),
        parameters: tdc.parameters().clone(),
        warnings: tdc.warnings().to_vec(),
        scans,
    })
}

/// Index a single channel file, dispatching on its extension
fn index_channel(
    config: &Config,
    path: &Path,
    progress: &Progress,
) -> Result<ChannelIndex, ProcessorError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ASCII_EXTENSION) => {
            progress.send(0, BarColor::CYAN)?;
            Ok(ChannelIndex::Ascii(index_ascii_file(path)?))
        }
        Some(TDC_EXTENSION) => Ok(ChannelIndex::Tdc(index_tdc_channel(config, path, progress)?)),
        _ => Ok(ChannelIndex::Skipped(String::from("unsupported file type"))),
    }
}

/// The main loop of metro_index.
///
/// Indexes every channel of a run and writes the run index. A channel which fails to
/// index is recorded as failed; the rest of the run is still indexed.
pub fn process_run(
    config: &Config,
    run: &RunDescription,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    let index_path = config.get_output_file_name(&run.output_stem(config.naming))?;
    if config.should_skip(&index_path) {
        spdlog::info!(
            "Index {} already exists, skipping run {}",
            index_path.display(),
            run.number
        );
        return Ok(());
    }

    let total_bytes: u64 = run.channels.values().map(|path| file_size(path)).sum();
    spdlog::info!(
        "Run {} ({}) has {} channels with total size {}",
        run.number,
        run.name,
        run.channels.len(),
        human_bytes::human_bytes(total_bytes as f64)
    );
    let mut progress = Progress {
        tx,
        run_number: &run.number,
        worker_id: *worker_id,
        total_bytes,
        done_bytes: 0,
    };
    progress.send(0, BarColor::CYAN)?;

    let mut writer = IndexWriter::new(&index_path, run);
    for (channel, path) in run.channels.iter() {
        let size = file_size(path);
        let index = match index_channel(config, path, &progress) {
            Ok(index) => index,
            Err(ProcessorError::SendError(e)) => return Err(ProcessorError::SendError(e)),
            Err(e) => {
                spdlog::warn!("Could not index channel {channel} of run {}: {e}", run.number);
                progress.send(size, BarColor::RED)?;
                ChannelIndex::Failed(e.to_string())
            }
        };
        if let ChannelIndex::Skipped(reason) = &index {
            spdlog::info!("Skipping {}: {reason}", path.display());
        }
        writer.write_channel(channel, ChannelEntry::new(path, size, index));
        progress.done_bytes += size;
    }
    writer.close()?;

    progress.send(0, BarColor::GREEN)?;
    Ok(())
}

/// Find the runs matched by the configured glob pattern, ordered by run number
pub fn collect_runs(config: &Config) -> Result<Vec<RunDescription>, ProcessorError> {
    let groups = match &config.base_path {
        Some(base) => group_files_in(base, &config.glob_pattern)?,
        None => group_files_by_run(&config.glob_pattern)?,
    };
    if groups.is_empty() {
        return Err(ProcessorError::NoMatchingFiles);
    }
    Ok(groups
        .sorted()
        .into_iter()
        .map(|(number, files)| RunDescription::new(number, files))
        .collect())
}

/// The function to be called by a separate thread (typically the UI).
/// Indexes every matched run on a single worker
pub fn process(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<(), ProcessorError> {
    let runs = collect_runs(&config)?;
    process_subset(config, tx, worker_id, runs)
}

/// Process a subset of runs
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<RunDescription>,
) -> Result<(), ProcessorError> {
    for run in subset {
        if run.channels.is_empty() {
            spdlog::info!("Run {} has no readable files, skipping...", run.number);
            continue;
        }
        spdlog::info!("Processing run {}...", run.number);
        process_run(&config, &run, &tx, &worker_id)?;
        spdlog::info!("Finished processing run {}.", run.number);
    }
    Ok(())
}

/// Divide the runs in to a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config, runs: Vec<RunDescription>) -> Vec<Vec<RunDescription>> {
    let mut subsets: Vec<Vec<RunDescription>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, run) in runs.into_iter().enumerate() {
        subsets[idx % n_subsets].push(run)
    }

    subsets
}
