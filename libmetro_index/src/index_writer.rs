use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::ascii_index::AsciiIndex;
use super::error::IndexWriterError;
use super::event::{EventCategory, EventStore, ParticleMode};
use super::run_info::RunDescription;
use super::tdc_file::TdcMode;
use crate::OrderedMap;

/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";

/// Summary of the composed events of one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub count: usize,
    pub shape: [usize; 2],
    /// Smallest and largest timestamp per column
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<[i32; 2]>,
}

impl CategorySummary {
    fn new(store: &EventStore, category: EventCategory) -> Option<Self> {
        let matrix = store.to_matrix(category)?;
        let (rows, cols) = matrix.dim();
        let ranges = matrix
            .columns()
            .into_iter()
            .filter_map(|col| Some([*col.iter().min()?, *col.iter().max()?]))
            .collect();
        Some(Self {
            count: rows,
            shape: [rows, cols],
            ranges,
        })
    }
}

/// Index of one step of an HPTDC file
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepSummary {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_resets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_hits: Option<u64>,
    #[serde(skip_serializing_if = "OrderedMap::is_empty")]
    pub events: OrderedMap<CategorySummary>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub other: String,
}

impl StepSummary {
    /// Summarize composed events, labelled for the particle mode
    pub fn from_events(value: &str, n_resets: u64, store: &EventStore, mode: ParticleMode) -> Self {
        let mut events = OrderedMap::default();
        for category in EventCategory::NAMED {
            if store.count(category) == 0 {
                continue;
            }
            if let Some(summary) = CategorySummary::new(store, category) {
                events.insert(category.label_for(mode), summary);
            }
        }
        Self {
            value: value.to_string(),
            n_resets: Some(n_resets),
            n_hits: None,
            events,
            other: store.other_text(mode),
        }
    }

    pub fn from_hits(value: &str, n_hits: u64) -> Self {
        Self {
            value: value.to_string(),
            n_hits: Some(n_hits),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TdcSummary {
    pub mode: TdcMode,
    pub tables_rebuilt: bool,
    #[serde(skip_serializing_if = "OrderedMap::is_empty")]
    pub parameters: OrderedMap<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub scans: Vec<Vec<StepSummary>>,
}

/// What was learned from one channel file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelIndex {
    Ascii(AsciiIndex),
    Tdc(TdcSummary),
    /// Unsupported file type
    Skipped(String),
    /// The file could not be indexed; holds the error message
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelEntry {
    pub file: PathBuf,
    pub size: String,
    /// Written as a one key map (`index: {failed: ...}`) rather than a YAML tag
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub index: ChannelIndex,
}

impl ChannelEntry {
    pub fn new(file: &Path, size_bytes: u64, index: ChannelIndex) -> Self {
        Self {
            file: file.to_path_buf(),
            size: human_bytes::human_bytes(size_bytes as f64),
            index,
        }
    }
}

#[derive(Debug, Serialize)]
struct RunIndex<'a> {
    version: String,
    number: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<String>,
    channels: &'a OrderedMap<ChannelEntry>,
}

/// Writes the index of a run as a YAML file.
///
/// Channel entries are collected in memory. Nothing touches the disk until close, which
/// writes a sibling `.tmp` file and renames it over the index path. A writer dropped
/// without closing leaves no index behind, so the run is not mistaken for a finished one.
#[derive(Debug)]
pub struct IndexWriter {
    path: PathBuf,
    number: String,
    name: String,
    date: Option<String>,
    time: Option<String>,
    channels: OrderedMap<ChannelEntry>,
}

impl IndexWriter {
    pub fn new(path: &Path, run: &RunDescription) -> Self {
        Self {
            path: path.to_path_buf(),
            number: run.number.clone(),
            name: run.name.clone(),
            date: run.date_string(),
            time: run.time_string(),
            channels: OrderedMap::default(),
        }
    }

    /// Where the index is staged before it is moved into place
    pub fn partial_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    pub fn write_channel(&mut self, channel: &str, entry: ChannelEntry) {
        self.channels.insert(channel.to_string(), entry);
    }

    /// Serialize everything collected, consume the writer
    pub fn close(self) -> Result<(), IndexWriterError> {
        let index = RunIndex {
            version: format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION),
            number: &self.number,
            name: &self.name,
            date: self.date.clone(),
            time: self.time.clone(),
            channels: &self.channels,
        };
        let yaml = serde_yaml::to_string(&index)?;
        let partial_path = self.partial_path();
        if let Err(e) = write_and_sync(&partial_path, yaml.as_bytes()) {
            let _ = std::fs::remove_file(&partial_path);
            return Err(e.into());
        }
        std::fs::rename(&partial_path, &self.path)?;
        spdlog::info!(
            "Wrote index of {} channels to {}",
            self.channels.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let mut file_handle = File::create(path)?;
    file_handle.write_all(bytes)?;
    file_handle.sync_all()
}
