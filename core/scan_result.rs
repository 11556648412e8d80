use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

pub const LARGEST_FILES_LIMIT: usize = 10;

/// Metadata for one visited filesystem entry. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub lines: usize,
    pub extension: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub excluded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusion_reason: Option<String>,
}

impl FileRecord {
    pub fn file_name(&self) -> String {
        self.relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Aggregate output of one completed scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub root: PathBuf,
    pub total_files: usize,
    pub total_directories: usize,
    pub total_size: u64,
    pub total_lines: usize,
    pub excluded_files: usize,
    pub scan_duration: Duration,
    /// Included files in traversal order.
    pub files: Vec<FileRecord>,
    /// Excluded non-directory entries, kept for diagnostics.
    pub excluded: Vec<FileRecord>,
    /// Included directories relative to the root, sorted.
    pub directories: Vec<PathBuf>,
    pub extension_histogram: BTreeMap<String, usize>,
    pub largest_files: Vec<FileRecord>,
}

impl ScanResult {
    /// Extensions ordered by descending file count, then name.
    pub fn top_extensions(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = self
            .extension_histogram
            .iter()
            .map(|(ext, count)| (ext.as_str(), *count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        counts.truncate(limit);
        counts
    }
}

/// Folds walker records into a `ScanResult`.
#[derive(Debug, Default)]
pub struct ScanAccumulator {
    files: Vec<FileRecord>,
    excluded: Vec<FileRecord>,
    directories: BTreeSet<PathBuf>,
    total_size: u64,
    total_lines: usize,
    histogram: BTreeMap<String, usize>,
}

impl ScanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: FileRecord) {
        match (record.is_dir, record.excluded) {
            (true, false) => {
                self.directories.insert(record.relative_path);
            }
            // Pruned directories count neither as directories nor as files.
            (true, true) => {}
            (false, true) => self.excluded.push(record),
            (false, false) => {
                self.total_size = self.total_size.saturating_add(record.size);
                self.total_lines += record.lines;
                *self.histogram.entry(record.extension.clone()).or_insert(0) += 1;
                self.files.push(record);
            }
        }
    }

    pub fn finish(self, root: PathBuf, scan_duration: Duration) -> ScanResult {
        let mut largest: Vec<FileRecord> = self.files.clone();
        largest.sort_by(|a, b| {
            b.size
                .cmp(&a.size)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });
        largest.truncate(LARGEST_FILES_LIMIT);

        let result = ScanResult {
            root,
            total_files: self.files.len(),
            total_directories: self.directories.len(),
            total_size: self.total_size,
            total_lines: self.total_lines,
            excluded_files: self.excluded.len(),
            scan_duration,
            files: self.files,
            excluded: self.excluded,
            directories: self.directories.into_iter().collect(),
            extension_histogram: self.histogram,
            largest_files: largest,
        };
        log::debug!(
            "Scan aggregated: {} files, {} directories, {} excluded",
            result.total_files,
            result.total_directories,
            result.excluded_files
        );
        result
    }
}
