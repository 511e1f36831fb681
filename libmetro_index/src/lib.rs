//! # metro_index
//!
//! metro_index indexes the raw output of the Metro data acquisition, written in Rust. Metro
//! writes one file per channel for every run, named
//! `<number>_<name>[_<ddmmyyyy>_<hhmmss>]_<channel>.<ext>`. metro_index groups those
//! files by run, finds the scan/step structure of the ASCII logs, composes the TDC words
//! of HPTDC files into electron/photon events and writes a YAML index per run.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, you will
//! most likely need to install the Rust tool chain. See the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installation instructions.
//!
//! To build and install the CLI use `cargo install --path ./metro_index_cli` from the top
//! level repository. The binary will be installed to your cargo install location
//! (typically something like `~/.cargo/bin/`).
//!
//! ## Configuration
//!
//! The CLI is driven by a YAML configuration file. A template can be made with
//! `metro_index_cli -p config.yml new`. The format is as follows:
//!
//! ```yml
//! glob_pattern: '*'
//! base_path: null
//! output_path: None
//! naming: default
//! replace: false
//! particle: EP
//! ignore_tdc_tables: false
//! tdc_chunk_size: 10000
//! n_threads: 1
//! ```
//!
//! - `glob_pattern`: Pattern selecting the files to index. Relative to `base_path` if set.
//! - `output_path`: Directory to which index files are written. Must exist.
//! - `naming`: Index file names; `short` (number only), `default` (number and name) or
//! `full` (number, name, date and time).
//! - `replace`: Rebuild indexes which already exist.
//! - `particle`: `EP` for electron/photon events, `EI` to label photons as ions.
//! - `ignore_tdc_tables`: Always rebuild HPTDC step tables from the data markers.
//! - `tdc_chunk_size`: Number of records read from an HPTDC file at once.
//! - `n_threads`: Number of parallel workers the runs are divided amongst. Must be at
//! least 1.
//!
//! ## Channels
//!
//! - `.txt` files are ASCII logs. Lines starting with `#` carry attributes
//! (`# key: value`) and the `#Scan <integer>` / `#Step <float>` markers. The index
//! records the line span of every scan and step.
//! - `.tdc` files are HPTDC files. In group mode every step is composed into events
//! between reset markers; in hit mode only the hits per step are counted.
//! - Anything else is listed as skipped.
//!
//! ## Output
//!
//! metro_index writes one `<stem>.yml` index per run and a log file. If a channel cannot
//! be indexed it is marked as failed in the index and the log file will contain the
//! reason.
pub mod ascii_index;
pub mod composer;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod index_writer;
pub mod process;
pub mod run_grouper;
pub mod run_info;
pub mod tdc_file;
pub mod word;
pub mod worker_status;

/// String keyed map which keeps insertion order, used wherever the index lists entries
/// in the order they were found.
pub type OrderedMap<V> = indexmap::IndexMap<String, V, fxhash::FxBuildHasher>;
