use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use super::error::GrouperError;
use crate::OrderedMap;

/// Files matched by a glob pattern, grouped by the run number prefix of their names.
///
/// Groups and the files within them keep the order in which they were enumerated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunGroups {
    groups: OrderedMap<Vec<PathBuf>>,
}

impl RunGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path to its run group. Returns false if the name carries no run number.
    pub fn add(&mut self, path: PathBuf) -> bool {
        let number = match path
            .file_name()
            .map(|name| name.to_string_lossy())
            .and_then(|name| run_number(&name).map(String::from))
        {
            Some(n) => n,
            None => return false,
        };
        self.groups.entry(number).or_default().push(path);
        true
    }

    pub fn get(&self, number: &str) -> Option<&[PathBuf]> {
        self.groups.get(number).map(|files| files.as_slice())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.groups
            .iter()
            .map(|(number, files)| (number.as_str(), files.as_slice()))
    }

    /// The groups ordered by the numeric value of their run number
    pub fn sorted(&self) -> Vec<(&str, &[PathBuf])> {
        let mut runs: Vec<(&str, &[PathBuf])> = self.iter().collect();
        runs.sort_by(|(a, _), (b, _)| compare_run_numbers(a, b));
        runs
    }
}

/// The run number of a file name: one or more leading digits directly followed by `_`.
///
/// Leading zeros are kept.
pub fn run_number(file_name: &str) -> Option<&str> {
    let n_digits = file_name.bytes().take_while(u8::is_ascii_digit).count();
    if n_digits > 0 && file_name.as_bytes().get(n_digits) == Some(&b'_') {
        Some(&file_name[..n_digits])
    } else {
        None
    }
}

// Digit strings of any length compare by value; equal values fall back to the raw text
fn compare_run_numbers(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        .then_with(|| a.cmp(b))
}

/// Expand a glob pattern and group the matches by run number.
///
/// An invalid pattern or a failure while enumerating is an error; a pattern matching
/// nothing gives an empty result.
pub fn group_files_by_run(pattern: &str) -> Result<RunGroups, GrouperError> {
    let mut groups = RunGroups::new();
    for entry in glob::glob(pattern)? {
        groups.add(entry?);
    }
    Ok(groups)
}

/// Expand a glob pattern relative to a base directory and group the matches by run number
pub fn group_files_in(base: &Path, pattern: &str) -> Result<RunGroups, GrouperError> {
    let full_pattern = base.join(pattern);
    group_files_by_run(&full_pattern.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn make_files(dir: &Path, names: &[&str]) {
        for name in names {
            File::create(dir.join(name)).unwrap();
        }
    }

    #[test]
    fn test_run_number() {
        assert_eq!(run_number("007_x.dat"), Some("007"));
        assert_eq!(run_number("12_run_ch1.txt"), Some("12"));
        assert_eq!(run_number("12.txt"), None);
        assert_eq!(run_number("3x_1.txt"), None);
        assert_eq!(run_number("_1.txt"), None);
        assert_eq!(run_number("abc_1.txt"), None);
    }

    #[test]
    fn test_group_directory() {
        let dir = tempfile::tempdir().unwrap();
        make_files(
            dir.path(),
            &[
                "007_x.dat",
                "7_a.txt",
                "12_run_ch1.txt",
                "12_run_ch2.tdc",
                "abc_1.txt",
                "12.txt",
                "3x_1.txt",
            ],
        );
        let groups = group_files_in(dir.path(), "*").unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.get("007").unwrap(), &[dir.path().join("007_x.dat")]);
        assert_eq!(groups.get("7").unwrap(), &[dir.path().join("7_a.txt")]);

        let mut twelve: Vec<PathBuf> = groups.get("12").unwrap().to_vec();
        twelve.sort();
        assert_eq!(
            twelve,
            vec![
                dir.path().join("12_run_ch1.txt"),
                dir.path().join("12_run_ch2.tdc")
            ]
        );

        let total: usize = groups.iter().map(|(_, files)| files.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_regrouping_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        make_files(dir.path(), &["1_a.txt", "2_b.txt", "1_c.txt", "none.txt"]);
        let first = group_files_in(dir.path(), "*.txt").unwrap();
        let second = group_files_in(dir.path(), "*.txt").unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.iter().collect::<Vec<_>>(),
            second.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_sorted_by_value() {
        let mut groups = RunGroups::new();
        for name in ["10_a", "9_a", "002_a", "2_a", "100_a"] {
            assert!(groups.add(PathBuf::from(name)));
        }
        assert!(!groups.add(PathBuf::from("x_a")));
        let order: Vec<&str> = groups.sorted().iter().map(|(n, _)| *n).collect();
        assert_eq!(order, vec!["002", "2", "9", "10", "100"]);
    }

    #[test]
    fn test_empty_match_and_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let groups = group_files_in(dir.path(), "*.nothing").unwrap();
        assert!(groups.is_empty());

        let result = group_files_in(dir.path(), "[");
        assert!(matches!(result, Err(GrouperError::BadPattern(_))));
    }
}
