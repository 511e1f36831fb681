use std::path::PathBuf;
use thiserror::Error;

use super::constants::*;
use super::event::Particle;
use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum WordError {
    #[error("Failed to parse buffer into Words: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Word buffer of {0} bytes is not a multiple of the record size {1}")]
    TruncatedRecord(usize, usize),
}

#[derive(Debug, Clone, Error)]
pub enum ComposerError {
    #[error("Bunch overflow: more than {cap} {0} detections before a reset marker", cap=BUNCH_CAPACITY)]
    BunchOverflow(Particle),
}

#[derive(Debug, Error)]
pub enum AsciiIndexError {
    #[error("Could not index ASCII file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Line {0} of ASCII file exceeds the maximum line length of {max} bytes", max=MAX_LINE_LENGTH)]
    LineTooLong(u64),
    #[error("ASCII indexing failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum GrouperError {
    #[error("RunGrouper was given an invalid glob pattern: {0}")]
    BadPattern(#[from] glob::PatternError),
    #[error("RunGrouper failed while enumerating files: {0}")]
    Enumeration(#[from] glob::GlobError),
}

#[derive(Debug, Error)]
pub enum TdcFileError {
    #[error("Could not open TdcFile because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Invalid magic code found for TdcFile; expected HPTDC")]
    BadMagic,
    #[error("Unknown TDC mode {0:?} found in TdcFile header")]
    UnknownMode(String),
    #[error("Could not find the first scan marker while rebuilding TdcFile tables")]
    NoScanMarker,
    #[error("Corrupted step table entry for scan {0} step {1}")]
    CorruptedStepTable(usize, usize),
    #[error("TdcFile word decoding failed: {0}")]
    BadWord(#[from] WordError),
    #[error("TdcFile failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum IndexWriterError {
    #[error("IndexWriter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("IndexWriter failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to RunGrouper error: {0}")]
    GrouperError(#[from] GrouperError),
    #[error("Processor failed due to ASCII index error: {0}")]
    AsciiError(#[from] AsciiIndexError),
    #[error("Processor failed due to TdcFile error: {0}")]
    TdcError(#[from] TdcFileError),
    #[error("Processor failed due to Composer error: {0}")]
    ComposerError(#[from] ComposerError),
    #[error("Processor failed due to IndexWriter error: {0}")]
    WriterError(#[from] IndexWriterError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed because the glob pattern matched no files")]
    NoMatchingFiles,
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
