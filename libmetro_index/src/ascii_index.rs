use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use super::constants::{
    ATTRIBUTE_PREFIX, ATTRIBUTE_SEPARATOR, MAX_LINE_LENGTH, SCAN_MARKER, STEP_MARKER,
};
use super::error::AsciiIndexError;
use crate::OrderedMap;

/// The rows belonging to a step (or scan): `row_count` lines starting at `start_line`.
///
/// Lines are counted from 0; `start_line` is the line after the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StepSpan {
    pub start_line: u64,
    pub row_count: u64,
}

impl StepSpan {
    fn open(marker_line: u64) -> Self {
        Self {
            start_line: marker_line + 1,
            row_count: 0,
        }
    }

    fn close(&mut self, closing_line: u64) {
        self.row_count = closing_line.saturating_sub(self.start_line);
    }
}

/// A scan and its steps. The scan span itself runs until the next `#Scan` marker,
/// which is what a step-less scan is read with.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Scan {
    pub span: StepSpan,
    pub steps: OrderedMap<StepSpan>,
}

/// Index of a Metro ASCII measurement log
#[derive(Debug, Clone, Default, Serialize)]
pub struct AsciiIndex {
    pub attrs: OrderedMap<String>,
    pub scans: OrderedMap<Scan>,
}

impl AsciiIndex {
    pub fn step(&self, scan: &str, step: &str) -> Option<&StepSpan> {
        self.scans.get(scan).and_then(|s| s.steps.get(step))
    }

    /// Number of steps across all scans
    pub fn n_steps(&self) -> usize {
        self.scans.values().map(|scan| scan.steps.len()).sum()
    }
}

/// Canonical key of a scan marker argument
fn scan_key(token: Option<&str>) -> Option<String> {
    token
        .and_then(|t| t.parse::<i64>().ok())
        .map(|value| value.to_string())
}

/// Canonical key of a step marker argument. Uses the shortest round-trip form with a
/// mandatory fractional part (`1.0`, `0.5`, `1e-7`).
fn step_key(token: Option<&str>) -> Option<String> {
    token
        .and_then(|t| t.parse::<f64>().ok())
        .map(|value| format!("{value:?}"))
}

fn parse_attribute(line: &str) -> Option<(String, String)> {
    let rest = line.trim().strip_prefix(ATTRIBUTE_PREFIX)?;
    let parts: Vec<&str> = rest.split(ATTRIBUTE_SEPARATOR).collect();
    if parts.len() != 2 {
        return None;
    }
    Some((parts[0].trim().to_string(), parts[1].trim().to_string()))
}

/// Working state of a single indexing pass
#[derive(Debug, Default)]
struct Indexer {
    index: AsciiIndex,
    current_scan: Option<String>,
    current_step: Option<String>,
}

impl Indexer {
    fn close_step(&mut self, line: u64) {
        if let (Some(scan), Some(step)) = (&self.current_scan, self.current_step.take()) {
            if let Some(span) = self
                .index
                .scans
                .get_mut(scan)
                .and_then(|s| s.steps.get_mut(&step))
            {
                span.close(line);
            }
        }
    }

    fn close_scan(&mut self, line: u64) {
        if let Some(scan) = self.current_scan.take() {
            if let Some(s) = self.index.scans.get_mut(&scan) {
                s.span.close(line);
            }
        }
    }

    fn process_line(&mut self, line: u64, text: &str) {
        let mut tokens = text.split_whitespace();
        match tokens.next() {
            Some(SCAN_MARKER) => {
                self.close_step(line);
                self.close_scan(line);
                if let Some(key) = scan_key(tokens.next()) {
                    let scan = self.index.scans.entry(key.clone()).or_default();
                    scan.span = StepSpan::open(line);
                    self.current_scan = Some(key);
                }
            }
            Some(STEP_MARKER) if self.current_scan.is_some() => {
                self.close_step(line);
                if let (Some(key), Some(scan)) = (step_key(tokens.next()), &self.current_scan) {
                    if let Some(s) = self.index.scans.get_mut(scan) {
                        s.steps.insert(key.clone(), StepSpan::open(line));
                        self.current_step = Some(key);
                    }
                }
            }
            _ => {
                if let Some((name, value)) = parse_attribute(text) {
                    self.index.attrs.insert(name, value);
                }
            }
        }
    }

    fn finish(mut self, n_lines: u64) -> AsciiIndex {
        self.close_step(n_lines);
        self.close_scan(n_lines);
        self.index
    }
}

/// Index a Metro ASCII log read from any buffered source.
///
/// The source is read once, line by line. Lines longer than the maximum line length are
/// an error and no partial index is returned.
pub fn index_ascii<R: BufRead>(mut reader: R) -> Result<AsciiIndex, AsciiIndexError> {
    let mut indexer = Indexer::default();
    let mut buffer: Vec<u8> = Vec::with_capacity(MAX_LINE_LENGTH);
    let mut line: u64 = 0;
    loop {
        buffer.clear();
        let n_bytes = reader
            .by_ref()
            .take(MAX_LINE_LENGTH as u64 + 1)
            .read_until(b'\n', &mut buffer)?;
        if n_bytes == 0 {
            break;
        }
        if n_bytes > MAX_LINE_LENGTH {
            return Err(AsciiIndexError::LineTooLong(line));
        }
        // Only marker and attribute lines need to be looked at
        if buffer.first() == Some(&b'#') {
            indexer.process_line(line, &String::from_utf8_lossy(&buffer));
        }
        line += 1;
    }
    Ok(indexer.finish(line))
}

/// Index a Metro ASCII log file
pub fn index_ascii_file(path: &Path) -> Result<AsciiIndex, AsciiIndexError> {
    if !path.exists() {
        return Err(AsciiIndexError::BadFilePath(path.to_path_buf()));
    }
    let file = File::open(path)?;
    index_ascii(BufReader::new(file))
}
