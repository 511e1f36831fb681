use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::{Date, Time};

use super::config::NamingScheme;
use crate::OrderedMap;

/// Everything the file names of a run tell us about it.
///
/// Metro names its files `<number>_<name>[_<ddmmyyyy>_<hhmmss>]_<channel>.<ext>`.
#[derive(Debug, Clone)]
pub struct RunDescription {
    pub number: String,
    pub name: String,
    pub date: Option<Date>,
    pub time: Option<Time>,
    pub channels: OrderedMap<PathBuf>,
}

fn common_prefix<'a>(names: &[&'a str]) -> &'a str {
    let first = match names.first() {
        Some(f) => *f,
        None => return "",
    };
    let mut len = first.len();
    for name in names.iter().skip(1) {
        len = first
            .char_indices()
            .zip(name.chars())
            .take_while(|((_, a), b)| a == b)
            .map(|((idx, a), _)| idx + a.len_utf8())
            .last()
            .unwrap_or(0)
            .min(len);
    }
    &first[..len]
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl RunDescription {
    /// Describe a run from the files grouped under its number. Paths which are not
    /// regular files are ignored.
    pub fn new(number: &str, files: &[PathBuf]) -> Self {
        let files: Vec<&PathBuf> = files.iter().filter(|p| p.is_file()).collect();
        let stems: Vec<String> = files.iter().map(|p| file_stem(p)).collect();
        let stem_refs: Vec<&str> = stems.iter().map(|s| s.as_str()).collect();

        let run_prefix = format!("{number}_");
        let prefix = common_prefix(&stem_refs).trim_end_matches('_');
        let full_name = prefix.strip_prefix(&run_prefix).unwrap_or(prefix).to_string();

        let mut channels = OrderedMap::default();
        for (path, stem) in files.iter().zip(stems.iter()) {
            let after_number = stem.strip_prefix(&run_prefix).unwrap_or(stem);
            let channel = after_number
                .strip_prefix(full_name.as_str())
                .unwrap_or(after_number)
                .trim_matches('_');
            let channel = if channel.is_empty() {
                // A lone file shares its whole stem with the run name
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            } else {
                channel.to_string()
            };
            channels.insert(channel, path.to_path_buf());
        }

        let (name, date, time) = split_timestamp(&full_name);
        Self {
            number: number.to_string(),
            name,
            date,
            time,
            channels,
        }
    }

    /// Stem of the output file for this run
    pub fn output_stem(&self, naming: NamingScheme) -> String {
        let mut stem = self.number.clone();
        if naming == NamingScheme::Short {
            return stem;
        }
        stem.push('_');
        stem.push_str(&self.name);
        if naming == NamingScheme::Full {
            if let Some(Ok(date)) = self
                .date
                .map(|d| d.format(format_description!("[day][month][year]")))
            {
                stem.push('_');
                stem.push_str(&date);
            }
            if let Some(Ok(time)) = self
                .time
                .map(|t| t.format(format_description!("[hour][minute][second]")))
            {
                stem.push('_');
                stem.push_str(&time);
            }
        }
        stem
    }

    /// Date in ISO form (yyyy-mm-dd)
    pub fn date_string(&self) -> Option<String> {
        self.date
            .and_then(|d| d.format(format_description!("[year]-[month]-[day]")).ok())
    }

    /// Time in hh:mm:ss form
    pub fn time_string(&self) -> Option<String> {
        self.time
            .and_then(|t| t.format(format_description!("[hour]:[minute]:[second]")).ok())
    }
}

/// Split a trailing `_ddmmyyyy_hhmmss` off a run name, if both parts parse
fn split_timestamp(name: &str) -> (String, Option<Date>, Option<Time>) {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() < 2 {
        return (name.to_string(), None, None);
    }
    let date = Date::parse(
        parts[parts.len() - 2],
        format_description!("[day][month][year]"),
    );
    let time = Time::parse(
        parts[parts.len() - 1],
        format_description!("[hour][minute][second]"),
    );
    match (date, time) {
        (Ok(d), Ok(t)) => (parts[..parts.len() - 2].join("_"), Some(d), Some(t)),
        _ => (name.to_string(), None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use time::Month;

    #[test]
    fn test_common_prefix() {
        assert_eq!(common_prefix(&["12_a_x", "12_a_y", "12_ab"]), "12_a");
        assert_eq!(common_prefix(&["abc"]), "abc");
        assert_eq!(common_prefix(&[]), "");
        assert_eq!(common_prefix(&["x", "y"]), "");
    }

    #[test]
    fn test_describe_run_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = ["anode.txt", "tdc#groups.tdc"]
            .iter()
            .map(|ch| dir.path().join(format!("0012_neon_scan_01022024_134501_{ch}")))
            .collect();
        for f in files.iter() {
            File::create(f).unwrap();
        }
        let mut with_dir = files.clone();
        with_dir.push(dir.path().to_path_buf());

        let run = RunDescription::new("0012", &with_dir);
        assert_eq!(run.name, "neon_scan");
        assert_eq!(run.date, Date::from_calendar_date(2024, Month::February, 1).ok());
        assert_eq!(run.time, Time::from_hms(13, 45, 1).ok());
        assert_eq!(run.date_string().as_deref(), Some("2024-02-01"));
        assert_eq!(run.time_string().as_deref(), Some("13:45:01"));
        assert_eq!(
            run.channels.keys().map(String::as_str).collect::<Vec<&str>>(),
            vec!["anode", "tdc#groups"]
        );

        assert_eq!(run.output_stem(NamingScheme::Short), "0012");
        assert_eq!(run.output_stem(NamingScheme::Default), "0012_neon_scan");
        assert_eq!(
            run.output_stem(NamingScheme::Full),
            "0012_neon_scan_01022024_134501"
        );
    }

    #[test]
    fn test_describe_run_without_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = ["3_calib_ch1.txt", "3_calib_ch2.txt"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();
        for f in files.iter() {
            File::create(f).unwrap();
        }
        let run = RunDescription::new("3", &files);
        assert_eq!(run.name, "calib_ch");
        assert!(run.date.is_none());
        assert_eq!(
            run.channels.keys().map(String::as_str).collect::<Vec<&str>>(),
            vec!["1", "2"]
        );
        assert_eq!(run.output_stem(NamingScheme::Full), "3_calib_ch");
    }

    #[test]
    fn test_single_file_run() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("5_single.txt");
        File::create(&file).unwrap();
        let run = RunDescription::new("5", &[file.clone()]);
        assert_eq!(run.name, "single");
        assert_eq!(run.channels.get("5_single.txt"), Some(&file));
    }
}
