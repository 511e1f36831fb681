use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::constants::*;
use super::error::TdcFileError;
use super::word::{decode_raw_words, Word};
use crate::OrderedMap;

/// Acquisition mode of an HPTDC file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TdcMode {
    /// Raw 32-bit group words
    Groups,
    /// 16 byte hit records
    Hits,
}

impl TdcMode {
    fn record_size(&self) -> usize {
        match self {
            Self::Groups => RAW_WORD_SIZE,
            Self::Hits => HIT_SIZE,
        }
    }

    fn scan_marker(&self) -> &'static [u8] {
        match self {
            Self::Groups => GROUP_SCAN_MARKER,
            Self::Hits => HIT_SCAN_MARKER,
        }
    }

    fn step_marker(&self) -> &'static [u8] {
        match self {
            Self::Groups => GROUP_STEP_MARKER,
            Self::Hits => HIT_STEP_MARKER,
        }
    }
}

/// Location of one step's data. The data begins with a step marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepEntry {
    pub value: String,
    pub data_offset: u64,
    pub data_size: u64,
}

#[derive(Debug, Clone)]
struct Header {
    old_style: bool,
    mode: TdcMode,
    scan_table_offset: i64,
    scan_count: i32,
    param_table_offset: i64,
    param_table_size: i32,
}

/// Reads an HPTDC file from the Metro TDC channel.
///
/// Opening a file reads the header, the scan/step tables (rebuilding them from the data
/// markers if they are missing or damaged) and the parameter table. Step data is then
/// streamed on request. Recoverable problems are collected as warnings.
#[derive(Debug)]
pub struct TdcFile {
    reader: BufReader<File>,
    header: Header,
    scans: Vec<Vec<StepEntry>>,
    tables_rebuilt: bool,
    parameters: OrderedMap<String>,
    warnings: Vec<String>,
    chunk_size: usize,
}

impl TdcFile {
    /// Open an HPTDC file. `chunk_size` is the number of records read at a time.
    pub fn new(path: &Path, ignore_tables: bool, chunk_size: usize) -> Result<Self, TdcFileError> {
        if !path.exists() {
            return Err(TdcFileError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let size_bytes = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let header = read_header(&mut reader)?;
        let chunk_size = chunk_size.max(1);

        let mut warnings = Vec::new();
        let mut scans = None;
        if header.scan_table_offset > 0 && !ignore_tables {
            scans = read_step_tables(&mut reader, &header, size_bytes, &mut warnings)?;
        } else if header.scan_table_offset == 0 && !ignore_tables {
            warnings.push(String::from(
                "Tables are probably corrupted, trying to rebuild",
            ));
        }

        let tables_rebuilt = scans.is_none();
        let scans = match scans {
            Some(s) => s,
            None => {
                // An unclosed file never had its tables written, so the data runs to the end
                let data_end = if header.scan_table_offset <= 0 {
                    size_bytes
                } else {
                    header.scan_table_offset as u64
                };
                rebuild_step_tables(&mut reader, header.mode, data_end, chunk_size)?
            }
        };

        let parameters = read_parameters(&mut reader, &header, size_bytes, &mut warnings);

        Ok(Self {
            reader,
            header,
            scans,
            tables_rebuilt,
            parameters,
            warnings,
            chunk_size,
        })
    }

    pub fn mode(&self) -> TdcMode {
        self.header.mode
    }

    pub fn is_old_style(&self) -> bool {
        self.header.old_style
    }

    pub fn tables_rebuilt(&self) -> bool {
        self.tables_rebuilt
    }

    pub fn scans(&self) -> &[Vec<StepEntry>] {
        &self.scans
    }

    pub fn parameters(&self) -> &OrderedMap<String> {
        &self.parameters
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn step_entry(&self, scan: usize, step: usize) -> Result<&StepEntry, TdcFileError> {
        self.scans
            .get(scan)
            .and_then(|steps| steps.get(step))
            .ok_or(TdcFileError::CorruptedStepTable(scan, step))
    }

    /// Number of payload bytes of a step, excluding its marker
    fn step_data_len(&self, scan: usize, step: usize) -> Result<u64, TdcFileError> {
        let entry = self.step_entry(scan, step)?;
        let marker_len = self.header.mode.step_marker().len() as u64;
        entry
            .data_size
            .checked_sub(marker_len)
            .ok_or(TdcFileError::CorruptedStepTable(scan, step))
    }

    /// Number of records (words or hits) in a step
    pub fn step_record_count(&self, scan: usize, step: usize) -> Result<u64, TdcFileError> {
        Ok(self.step_data_len(scan, step)? / self.header.mode.record_size() as u64)
    }

    /// Stream the payload of a step in chunks of whole records
    pub fn for_each_step_chunk<F, E>(&mut self, scan: usize, step: usize, mut f: F) -> Result<(), E>
    where
        F: FnMut(&[u8]) -> Result<(), E>,
        E: From<TdcFileError>,
    {
        let data_len = self.step_data_len(scan, step)?;
        let marker_len = self.header.mode.step_marker().len() as u64;
        let offset = self.step_entry(scan, step)?.data_offset + marker_len;
        let record_size = self.header.mode.record_size();
        let chunk_len = (self.chunk_size * record_size) as u64;

        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(TdcFileError::from)?;
        let mut buffer = vec![0u8; chunk_len as usize];
        let mut remaining = data_len - data_len % record_size as u64;
        while remaining > 0 {
            let n_bytes = remaining.min(chunk_len) as usize;
            self.reader
                .read_exact(&mut buffer[..n_bytes])
                .map_err(TdcFileError::from)?;
            f(&buffer[..n_bytes])?;
            remaining -= n_bytes as u64;
        }
        Ok(())
    }

    /// Stream the decoded words of a step. Only meaningful for group mode files.
    pub fn for_each_word_chunk<F, E>(&mut self, scan: usize, step: usize, mut f: F) -> Result<(), E>
    where
        F: FnMut(&[Word]) -> Result<(), E>,
        E: From<TdcFileError>,
    {
        self.for_each_step_chunk(scan, step, |chunk| {
            let words = decode_raw_words(chunk).map_err(TdcFileError::from)?;
            f(&words)
        })
    }
}

fn read_header<R: Read + Seek>(reader: &mut R) -> Result<Header, TdcFileError> {
    let mut magic = [0u8; 5];
    reader.read_exact(&mut magic)?;
    if &magic != HPTDC_MAGIC {
        return Err(TdcFileError::BadMagic);
    }

    // Files written since late 2017 carry a sized header followed by a DATA tag;
    // anything else is the old fixed header.
    let header_size = reader.read_i32::<LittleEndian>()?;
    let _version = reader.read_i32::<LittleEndian>()?;
    let mut mode = [0u8; 4];
    reader.read_exact(&mut mode)?;
    let scan_table_offset = reader.read_i64::<LittleEndian>()?;
    let scan_count = reader.read_i32::<LittleEndian>()?;
    let param_table_offset = reader.read_i64::<LittleEndian>()?;
    let param_table_size = reader.read_i32::<LittleEndian>()?;

    let mut old_style = !(HPTDC_HEADER_FIXED_SIZE..=HPTDC_MAX_HEADER_SIZE).contains(&header_size);
    if !old_style {
        reader.seek(SeekFrom::Current(
            (header_size - HPTDC_HEADER_FIXED_SIZE) as i64,
        ))?;
        let mut tag = [0u8; 4];
        old_style = reader.read_exact(&mut tag).is_err() || &tag != HPTDC_DATA_TAG;
    }

    if !old_style {
        let mode = match &mode {
            b"GRPS" => TdcMode::Groups,
            b"HITS" => TdcMode::Hits,
            _ => {
                return Err(TdcFileError::UnknownMode(
                    String::from_utf8_lossy(&mode).to_string(),
                ))
            }
        };
        return Ok(Header {
            old_style,
            mode,
            scan_table_offset,
            scan_count,
            param_table_offset,
            param_table_size,
        });
    }

    reader.seek(SeekFrom::Start(HPTDC_MAGIC.len() as u64))?;
    let scan_table_offset = reader.read_i32::<LittleEndian>()? as i64;
    let scan_count = reader.read_i32::<LittleEndian>()?;
    let param_table_offset = reader.read_i32::<LittleEndian>()? as i64;
    let param_table_size = reader.read_i32::<LittleEndian>()?;
    // Without a mode marker we always assume HITS
    let mode = match reader.read_u8()? {
        b'G' => TdcMode::Groups,
        _ => TdcMode::Hits,
    };
    Ok(Header {
        old_style,
        mode,
        scan_table_offset,
        scan_count,
        param_table_offset,
        param_table_size,
    })
}

/// Read the stored step tables. Returns None if an entry is invalid.
///
/// Table sizes are checked against `size_bytes` before anything is allocated for them.
fn read_step_tables<R: Read + Seek>(
    reader: &mut R,
    header: &Header,
    size_bytes: u64,
    warnings: &mut Vec<String>,
) -> Result<Option<Vec<Vec<StepEntry>>>, TdcFileError> {
    reader.seek(SeekFrom::Start(header.scan_table_offset as u64))?;
    let record_size = header.mode.record_size() as i64;
    let mut scans = Vec::new();
    for scan_idx in 0..header.scan_count.max(0) as usize {
        let step_count = reader.read_i32::<LittleEndian>()?;
        let table_size = reader.read_i32::<LittleEndian>()?;
        let entry_size = STEP_VALUE_LENGTH + if header.old_style { 8 } else { 16 };
        if step_count < 0 || (table_size as i64) < step_count as i64 * entry_size as i64 {
            warnings.push(format!(
                "Step table of scan {scan_idx} is too small for {step_count} steps, ignoring tables"
            ));
            return Ok(None);
        }
        let remaining = size_bytes.saturating_sub(reader.stream_position()?);
        if table_size as u64 > remaining {
            warnings.push(format!(
                "Step table of scan {scan_idx} runs past the end of the file, ignoring tables"
            ));
            return Ok(None);
        }
        let mut table = vec![0u8; table_size as usize];
        reader.read_exact(&mut table)?;
        let mut cursor = std::io::Cursor::new(table);

        let mut steps = Vec::new();
        for step_idx in 0..step_count as usize {
            let mut value = [0u8; STEP_VALUE_LENGTH];
            cursor.read_exact(&mut value)?;
            let (data_offset, data_size) = if header.old_style {
                (
                    cursor.read_i32::<LittleEndian>()? as i64,
                    cursor.read_i32::<LittleEndian>()? as i64,
                )
            } else {
                (
                    cursor.read_i64::<LittleEndian>()?,
                    cursor.read_i64::<LittleEndian>()?,
                )
            };

            if data_size < 0 || data_offset < 0 || data_size % record_size != 0 {
                warnings.push(format!(
                    "Invalid data_size entry {data_size} for step {step_idx}, ignoring tables"
                ));
                return Ok(None);
            }

            let value = match std::str::from_utf8(&value) {
                Ok(v) if v.is_ascii() => v.trim_end_matches('\0').to_string(),
                _ => return Err(TdcFileError::CorruptedStepTable(scan_idx, step_idx)),
            };
            steps.push(StepEntry {
                value,
                data_offset: data_offset as u64,
                data_size: data_size as u64,
            });
        }
        scans.push(steps);
    }
    Ok(Some(scans))
}

/// Rebuild the step tables by searching the data region for scan and step markers
fn rebuild_step_tables<R: Read + Seek>(
    reader: &mut R,
    mode: TdcMode,
    data_end: u64,
    chunk_size: usize,
) -> Result<Vec<Vec<StepEntry>>, TdcFileError> {
    let scan_marker = mode.scan_marker();
    let step_marker = mode.step_marker();
    let marker_len = scan_marker.len();

    // Get aligned to the first scan marker, which always opens the data section
    reader.seek(SeekFrom::Start(HPTDC_MAGIC.len() as u64))?;
    let mut window = Vec::with_capacity(MARKER_SEARCH_WINDOW);
    reader
        .by_ref()
        .take(MARKER_SEARCH_WINDOW as u64)
        .read_to_end(&mut window)?;
    let data_begin = window
        .windows(marker_len)
        .position(|w| w == scan_marker)
        .map(|pos| (pos + HPTDC_MAGIC.len()) as u64)
        .ok_or(TdcFileError::NoScanMarker)?;

    // Markers as (offset, is_scan)
    let mut markers: Vec<(u64, bool)> = Vec::new();
    reader.seek(SeekFrom::Start(data_begin))?;
    let read_length = (marker_len * chunk_size) as u64;
    let mut buffer: Vec<u8> = Vec::new();
    let mut buffer_offset = data_begin;
    let mut position = data_begin;
    while position < data_end {
        let n_read = reader
            .by_ref()
            .take(read_length.min(data_end - position))
            .read_to_end(&mut buffer)?;
        if n_read == 0 {
            break;
        }
        position += n_read as u64;

        let mut idx = 0;
        while idx + marker_len <= buffer.len() {
            let candidate = &buffer[idx..idx + marker_len];
            if candidate == scan_marker || candidate == step_marker {
                markers.push((buffer_offset + idx as u64, candidate == scan_marker));
                idx += marker_len;
            } else {
                idx += 1;
            }
        }
        // Keep the unchecked tail, a marker may straddle the chunk boundary
        buffer.drain(..idx);
        buffer_offset += idx as u64;
    }

    let mut scans: Vec<Vec<StepEntry>> = Vec::new();
    for (idx, (offset, is_scan)) in markers.iter().enumerate() {
        if *is_scan {
            scans.push(Vec::new());
            continue;
        }
        let next = markers.get(idx + 1).map_or(data_end, |(o, _)| *o);
        if let Some(steps) = scans.last_mut() {
            steps.push(StepEntry {
                value: format!("{:?}", steps.len() as f64),
                data_offset: *offset,
                data_size: next - offset,
            });
        }
    }
    Ok(scans)
}

/// Read the `key value` parameter table. Problems are reported as warnings only.
fn read_parameters<R: Read + Seek>(
    reader: &mut R,
    header: &Header,
    size_bytes: u64,
    warnings: &mut Vec<String>,
) -> OrderedMap<String> {
    let mut parameters = OrderedMap::default();
    if header.param_table_offset <= 0 || header.param_table_size <= 1 {
        warnings.push(String::from("Empty parameters table"));
        return parameters;
    }
    // The last byte is a newline
    let table_len = header.param_table_size as u64 - 1;
    if (header.param_table_offset as u64).saturating_add(table_len) > size_bytes {
        warnings.push(String::from(
            "Corrupted parameters table, not present in dataset",
        ));
        return parameters;
    }
    let mut table = vec![0u8; table_len as usize];
    let read = reader
        .seek(SeekFrom::Start(header.param_table_offset as u64))
        .and_then(|_| reader.read_exact(&mut table));
    let text = match (read, std::str::from_utf8(&table)) {
        (Ok(()), Ok(text)) if text.is_ascii() => text,
        _ => {
            warnings.push(String::from(
                "Corrupted parameters table, not present in dataset",
            ));
            return parameters;
        }
    };
    for line in text.split('\n') {
        let parts: Vec<&str> = line.split(' ').collect();
        if parts.len() == 2 {
            parameters.insert(parts[0].to_string(), parts[1].to_string());
        } else {
            warnings.push(format!("Malformed parameter line {line:?}"));
        }
    }
    parameters
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    fn raw_words(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Build a new style group mode file with one scan of two steps
    pub(crate) fn group_file_bytes(step0: &[u32], step1: &[u32], with_tables: bool) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(GROUP_SCAN_MARKER);
        let step0_offset = data.len();
        data.extend_from_slice(GROUP_STEP_MARKER);
        data.extend(raw_words(step0));
        let step1_offset = data.len();
        data.extend_from_slice(GROUP_STEP_MARKER);
        data.extend(raw_words(step1));

        // Magic, 36 bytes of header fields and the DATA tag
        let data_begin = (HPTDC_MAGIC.len() + 36 + HPTDC_DATA_TAG.len()) as i64;
        let table_offset = data_begin + data.len() as i64;
        let params = b"gain 10\nmode fast\n";

        let mut table = Vec::new();
        table.extend(2i32.to_le_bytes());
        table.extend((2i32 * 48).to_le_bytes());
        let entries = [
            ("0.5", step0_offset, (step1_offset - step0_offset) as i64),
            ("1.5", step1_offset, (data.len() - step1_offset) as i64),
        ];
        for (value, offset, size) in entries {
            let mut v = [0u8; STEP_VALUE_LENGTH];
            v[..value.len()].copy_from_slice(value.as_bytes());
            table.extend(v);
            table.extend((data_begin + offset as i64).to_le_bytes());
            table.extend(size.to_le_bytes());
        }

        let mut bytes = Vec::new();
        bytes.extend_from_slice(HPTDC_MAGIC);
        bytes.extend(HPTDC_HEADER_FIXED_SIZE.to_le_bytes());
        bytes.extend(1i32.to_le_bytes());
        bytes.extend_from_slice(b"GRPS");
        if with_tables {
            bytes.extend(table_offset.to_le_bytes());
            bytes.extend(1i32.to_le_bytes());
            bytes.extend((table_offset + table.len() as i64).to_le_bytes());
            bytes.extend((params.len() as i32).to_le_bytes());
        } else {
            bytes.extend(0i64.to_le_bytes());
            bytes.extend(0i32.to_le_bytes());
            bytes.extend(0i64.to_le_bytes());
            bytes.extend(0i32.to_le_bytes());
        }
        bytes.extend_from_slice(HPTDC_DATA_TAG);
        bytes.extend(data);
        if with_tables {
            bytes.extend(table);
            bytes.extend_from_slice(params);
        }
        bytes
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn collect_words(tdc: &mut TdcFile, scan: usize, step: usize) -> Vec<Word> {
        let mut words = Vec::new();
        tdc.for_each_word_chunk(scan, step, |chunk| -> Result<(), TdcFileError> {
            words.extend_from_slice(chunk);
            Ok(())
        })
        .unwrap();
        words
    }

    #[test]
    fn test_read_stored_tables() {
        let file = write_temp(&group_file_bytes(
            &[0x8100_0007, 0x1000_0000],
            &[0x8200_0003, 0x0000_0001, 0x1000_0000],
            true,
        ));
        let mut tdc = TdcFile::new(file.path(), false, 2).unwrap();
        assert_eq!(tdc.mode(), TdcMode::Groups);
        assert!(!tdc.is_old_style());
        assert!(!tdc.tables_rebuilt());
        assert_eq!(tdc.scans().len(), 1);
        let values: Vec<&str> = tdc.scans()[0].iter().map(|s| s.value.as_str()).collect();
        assert_eq!(values, vec!["0.5", "1.5"]);
        assert_eq!(tdc.step_record_count(0, 1).unwrap(), 3);
        assert_eq!(tdc.parameters().get("gain"), Some(&String::from("10")));
        assert_eq!(tdc.parameters().get("mode"), Some(&String::from("fast")));
        assert!(tdc.warnings().is_empty());

        let words = collect_words(&mut tdc, 0, 1);
        assert_eq!(
            words,
            vec![
                Word::new(b"FL", 2, 0, 3),
                Word::new(b"GR", 0, 0, 1),
                Word::new(b"RL", 0, 0, 0)
            ]
        );
    }

    #[test]
    fn test_rebuild_tables_for_unclosed_file() {
        let file = write_temp(&group_file_bytes(&[0x8100_0007, 0x1000_0000], &[0x8100_0001], false));
        let mut tdc = TdcFile::new(file.path(), false, 1).unwrap();
        assert!(tdc.tables_rebuilt());
        let values: Vec<&str> = tdc.scans()[0].iter().map(|s| s.value.as_str()).collect();
        assert_eq!(values, vec!["0.0", "1.0"]);
        assert_eq!(tdc.step_record_count(0, 0).unwrap(), 2);
        assert_eq!(tdc.step_record_count(0, 1).unwrap(), 1);
        assert!(tdc.parameters().is_empty());
        assert_eq!(tdc.warnings().len(), 2);

        let words = collect_words(&mut tdc, 0, 0);
        assert_eq!(words, vec![Word::new(b"FL", 1, 0, 7), Word::new(b"RL", 0, 0, 0)]);
    }

    #[test]
    fn test_ignored_tables_are_rebuilt() {
        let file = write_temp(&group_file_bytes(&[0x8100_0007], &[0x8100_0001], true));
        let tdc = TdcFile::new(file.path(), true, 4).unwrap();
        assert!(tdc.tables_rebuilt());
        assert_eq!(tdc.scans()[0].len(), 2);
        assert_eq!(tdc.scans()[0][1].value, "1.0");
        // Rebuilding stops at the stored table offset
        assert_eq!(tdc.step_record_count(0, 1).unwrap(), 1);
    }

    #[test]
    fn test_parameter_table_past_end_of_file() {
        let mut bytes = group_file_bytes(&[0x8100_0007], &[0x8100_0001], true);
        // param_table_size follows magic, header size, version, mode and three table fields
        bytes[37..41].copy_from_slice(&i32::MAX.to_le_bytes());
        let file = write_temp(&bytes);

        let tdc = TdcFile::new(file.path(), false, 4).unwrap();
        assert!(!tdc.tables_rebuilt());
        assert!(tdc.parameters().is_empty());
        assert_eq!(
            tdc.warnings(),
            &[String::from(
                "Corrupted parameters table, not present in dataset"
            )]
        );
    }

    #[test]
    fn test_step_table_past_end_of_file() {
        let mut bytes = group_file_bytes(&[0x8100_0007], &[0x8100_0001, 0x8100_0002], true);
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&bytes[17..25]);
        // The table size follows the step count at the start of the scan table
        let table_size_at = i64::from_le_bytes(offset) as usize + 4;
        bytes[table_size_at..table_size_at + 4].copy_from_slice(&i32::MAX.to_le_bytes());
        let file = write_temp(&bytes);

        let tdc = TdcFile::new(file.path(), false, 4).unwrap();
        assert!(tdc.tables_rebuilt());
        assert_eq!(tdc.warnings().len(), 1);
        assert!(tdc.warnings()[0].contains("past the end of the file"));
        assert_eq!(tdc.scans()[0].len(), 2);
        assert_eq!(tdc.step_record_count(0, 1).unwrap(), 2);
        assert_eq!(tdc.parameters().get("gain"), Some(&String::from("10")));
    }

    #[test]
    fn test_old_style_hits_file() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(HPTDC_MAGIC);
        bytes.extend([0u8; 16]);
        bytes.push(b'H');
        bytes.extend_from_slice(HIT_SCAN_MARKER);
        bytes.extend_from_slice(HIT_STEP_MARKER);
        bytes.extend([1u8; HIT_SIZE * 3]);
        let file = write_temp(&bytes);

        let tdc = TdcFile::new(file.path(), false, 8).unwrap();
        assert!(tdc.is_old_style());
        assert_eq!(tdc.mode(), TdcMode::Hits);
        assert_eq!(tdc.step_record_count(0, 0).unwrap(), 3);
    }

    #[test]
    fn test_bad_magic() {
        let file = write_temp(b"NOTATDCFILE");
        assert!(matches!(
            TdcFile::new(file.path(), false, 8),
            Err(TdcFileError::BadMagic)
        ));
    }
}
