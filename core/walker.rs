use crate::config::{GenerateOptions, ScanConfig};
use crate::context::{ContextAssembler, ContextBundle};
use crate::error::{AppError, Result};
use crate::filter::{PathFilter, normalized_extension};
use crate::progress::{CancelToken, Progress, ProgressDelivery, ProgressSink, ScanPhase};
use crate::scan_result::{FileRecord, ScanAccumulator, ScanResult};
use chrono::{DateTime, Utc};
use std::fs::{self, File, Metadata};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::time::Instant;
use walkdir::{DirEntry, WalkDir};

/// The estimation pass stops counting past this many files.
pub const ESTIMATE_CAP: usize = 10_000;
/// Line counting stops at this many lines per file.
pub const MAX_COUNTED_LINES: usize = 100_000;

/// Runs scans of one root and turns their results into context bundles.
///
/// Each `scan` call owns its own traversal state. Progress events go through
/// a bounded queue that drops events when full; take the receiver with
/// [`Scanner::progress_receiver`] before starting the scan.
#[derive(Debug)]
pub struct Scanner {
    config: ScanConfig,
    filter: PathFilter,
    options: GenerateOptions,
    progress: ProgressSink,
    progress_rx: Option<Receiver<Progress>>,
    cancel: CancelToken,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Result<Self> {
        Self::with_delivery(config, ProgressDelivery::default())
    }

    pub fn with_delivery(config: ScanConfig, delivery: ProgressDelivery) -> Result<Self> {
        let filter = PathFilter::new(&config)?;
        let (progress, progress_rx) = ProgressSink::channel(delivery);
        Ok(Self {
            config,
            filter,
            options: GenerateOptions::default(),
            progress,
            progress_rx,
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Hands out the consumer end of the progress queue. Returns `None` when
    /// delivery is disabled or the receiver was already taken.
    pub fn progress_receiver(&mut self) -> Option<Receiver<Progress>> {
        self.progress_rx.take()
    }

    pub fn dropped_progress_events(&self) -> u64 {
        self.progress.dropped()
    }

    /// Token for cancelling from another thread. Cancellation is sticky.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        log::debug!("Scan cancellation requested.");
        self.cancel.cancel();
    }

    pub fn set_options(
        &mut self,
        max_file_size: u64,
        max_total_size: u64,
        include_content: bool,
        include_summary: bool,
    ) {
        self.options = GenerateOptions {
            max_file_size,
            max_total_size,
            include_content,
            include_summary,
        };
    }

    pub fn options(&self) -> GenerateOptions {
        self.options
    }

    pub fn generate_context(
        &self,
        result: Option<&ScanResult>,
        project_name: &str,
    ) -> Result<ContextBundle> {
        let result = result.ok_or(AppError::MissingScanResult)?;
        ContextAssembler::new(self.options).assemble(result, project_name)
    }

    pub fn scan(&self) -> Result<ScanResult> {
        let root = &self.config.root;
        validate_root(root)?;
        let started = Instant::now();
        log::info!("Scanning project directory: {}", root.display());

        let estimated_total = self.estimate_files()?;
        log::debug!("Estimated {} files to scan.", estimated_total);
        self.progress.emit(Progress {
            current_path: root.clone(),
            processed: 0,
            estimated_total,
            phase: ScanPhase::Estimating,
            elapsed: started.elapsed(),
        });

        let mut accumulator = ScanAccumulator::new();
        let mut processed = 0usize;
        let mut entries = self.walker().into_iter();

        while let Some(entry_result) = entries.next() {
            if self.cancel.is_cancelled() {
                log::info!("Scan cancelled after {} entries.", processed);
                return Err(AppError::Cancelled);
            }

            let record = match entry_result {
                Ok(entry) if entry.depth() == 0 => continue,
                Ok(entry) => {
                    let record = self.record_for_entry(&entry);
                    if record.is_dir && record.excluded {
                        log::trace!("Pruning directory: {}", record.relative_path.display());
                        entries.skip_current_dir();
                    }
                    record
                }
                Err(err) => self.record_for_error(err)?,
            };

            processed += 1;
            self.progress.emit(Progress {
                current_path: record.path.clone(),
                processed,
                estimated_total,
                phase: ScanPhase::Scanning,
                elapsed: started.elapsed(),
            });
            accumulator.push(record);
        }

        let result = accumulator.finish(root.clone(), started.elapsed());
        log::info!(
            "Scan complete: {} files, {} excluded, {} directories in {:?}.",
            result.total_files,
            result.excluded_files,
            result.total_directories,
            result.scan_duration
        );
        Ok(result)
    }

    /// Counts included files, pruning excluded directories, up to
    /// `ESTIMATE_CAP`. Unreadable entries are skipped.
    fn estimate_files(&self) -> Result<usize> {
        let root = &self.config.root;
        let walker = self.walker().into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || !self
                    .filter
                    .should_exclude(&relative_to(root, entry.path()), entry.file_type().is_dir())
        });

        let mut count = 0usize;
        for entry in walker {
            if self.cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            match entry {
                Ok(entry) if !entry.file_type().is_dir() => {
                    count += 1;
                    if count > ESTIMATE_CAP {
                        log::debug!("Estimate exceeded cap of {} files.", ESTIMATE_CAP);
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => log::trace!("Ignoring entry during estimate: {}", e),
            }
        }
        Ok(count.min(ESTIMATE_CAP))
    }

    fn walker(&self) -> WalkDir {
        let mut walker = WalkDir::new(&self.config.root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();
        if self.config.max_depth > 0 {
            walker = walker.max_depth(self.config.max_depth);
        }
        walker
    }

    fn record_for_entry(&self, entry: &DirEntry) -> FileRecord {
        let path = entry.path().to_path_buf();
        let relative_path = relative_to(&self.config.root, &path);
        let is_dir = entry.file_type().is_dir();
        let extension = if is_dir {
            String::new()
        } else {
            normalized_extension(&relative_path)
        };
        let metadata = entry.metadata();
        let (size, modified) = match &metadata {
            Ok(meta) if !is_dir => (meta.len(), modified_time(meta)),
            Ok(meta) => (0, modified_time(meta)),
            Err(_) => (0, None),
        };
        let mut record = FileRecord {
            path,
            relative_path,
            is_dir,
            size,
            lines: 0,
            extension,
            modified,
            excluded: false,
            exclusion_reason: None,
        };

        if let Some(reason) = self.filter.exclusion_reason(&record.relative_path, is_dir) {
            log::trace!("Excluding {}: {}", record.relative_path.display(), reason);
            return excluded(record, reason);
        }

        if let Err(e) = metadata {
            log::warn!("Cannot read metadata for {}: {}", record.path.display(), e);
            return excluded(record, format!("metadata unavailable: {}", e));
        }

        if is_dir {
            return record;
        }

        if record.size > self.config.max_file_size {
            let reason = format!(
                "file too large: {} bytes exceeds limit of {} bytes",
                record.size, self.config.max_file_size
            );
            log::debug!("Excluding {}: {}", record.relative_path.display(), reason);
            return excluded(record, reason);
        }

        record.lines = match count_lines(&record.path) {
            Ok(lines) => lines,
            Err(e) => {
                log::warn!("Cannot count lines in {}: {}", record.path.display(), e);
                0
            }
        };
        record
    }

    /// Walk errors on non-directories (broken links, loops) become excluded
    /// records; a directory that cannot be listed aborts the scan.
    fn record_for_error(&self, err: walkdir::Error) -> Result<FileRecord> {
        let path = err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.root.clone());
        let listing_failed = err.loop_ancestor().is_none()
            && fs::symlink_metadata(&path).is_ok_and(|meta| meta.is_dir());
        if listing_failed {
            log::error!("Cannot read directory {}: {}", path.display(), err);
            return Err(AppError::Traversal { path, source: err });
        }

        log::warn!("Skipping unreadable entry {}: {}", path.display(), err);
        let relative_path = relative_to(&self.config.root, &path);
        let record = FileRecord {
            extension: normalized_extension(&relative_path),
            path,
            relative_path,
            is_dir: false,
            size: 0,
            lines: 0,
            modified: None,
            excluded: false,
            exclusion_reason: None,
        };
        Ok(excluded(record, format!("unreadable entry: {}", err)))
    }
}

fn excluded(record: FileRecord, reason: String) -> FileRecord {
    FileRecord {
        excluded: true,
        exclusion_reason: Some(reason),
        ..record
    }
}

pub(crate) fn validate_root(root: &Path) -> Result<()> {
    let metadata = fs::metadata(root).map_err(|e| AppError::InvalidRoot {
        path: root.to_path_buf(),
        reason: format!("cannot be accessed: {}", e),
    })?;
    if !metadata.is_dir() {
        return Err(AppError::InvalidRoot {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn relative_to(root: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf())
}

pub(crate) fn modified_time(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

/// Counts `\n`-terminated lines plus a trailing unterminated line, stopping
/// at `MAX_COUNTED_LINES`.
pub fn count_lines(path: &Path) -> io::Result<usize> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut lines = 0usize;
    let mut last_byte = None;
    loop {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        lines += memchr::memchr_iter(b'\n', &buf[..read]).count();
        last_byte = Some(buf[read - 1]);
        if lines >= MAX_COUNTED_LINES {
            return Ok(MAX_COUNTED_LINES);
        }
    }
    if last_byte.is_some_and(|b| b != b'\n') {
        lines += 1;
    }
    Ok(lines.min(MAX_COUNTED_LINES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn write_lines(dir: &Path, rel: &str, lines: usize) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let body: String = (0..lines).map(|i| format!("line {i}\n")).collect();
        fs::write(path, body).unwrap();
    }

    fn scanner_for(config: ScanConfig) -> Scanner {
        Scanner::with_delivery(config, ProgressDelivery::Disabled).unwrap()
    }

    fn visited_non_dirs(result: &ScanResult) -> usize {
        result.files.len() + result.excluded.len()
    }

    #[test]
    fn scenario_mixed_project_counts_files_and_extensions() {
        let tmp = TempDir::new().unwrap();
        write_lines(tmp.path(), "a.go", 50);
        write_lines(tmp.path(), "README.md", 10);
        fs::write(tmp.path().join("data.json"), "{\"k\": 1}").unwrap();

        let result = scanner_for(ScanConfig::new(tmp.path())).scan().unwrap();

        assert_eq!(result.total_files, 3);
        let expected: BTreeMap<String, usize> = [(".go", 1), (".md", 1), (".json", 1)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(result.extension_histogram, expected);
        assert_eq!(result.total_lines, 61);
        let go = result.files.iter().find(|f| f.extension == ".go").unwrap();
        assert_eq!(go.lines, 50);
    }

    #[test]
    fn oversized_file_is_excluded_with_its_size() {
        let tmp = TempDir::new().unwrap();
        let big = File::create(tmp.path().join("huge.txt")).unwrap();
        big.set_len(11 * 1024 * 1024).unwrap();

        let result = scanner_for(ScanConfig::new(tmp.path())).scan().unwrap();

        assert_eq!(result.total_files, 0);
        assert_eq!(result.excluded_files, 1);
        let reason = result.excluded[0].exclusion_reason.as_deref().unwrap();
        assert!(reason.contains("11534336"), "reason was {reason}");
    }

    #[test]
    fn prefix_pattern_prunes_directory() {
        let tmp = TempDir::new().unwrap();
        write_lines(tmp.path(), "node_modules/pkg/index.js", 3);
        write_lines(tmp.path(), "node_modules/other.js", 3);
        write_lines(tmp.path(), "src/index.js", 3);

        let mut config = ScanConfig::unfiltered(tmp.path());
        config.exclude_patterns = vec!["node_modules/**".to_string()];
        let result = scanner_for(config).scan().unwrap();

        assert_eq!(result.total_files, 1);
        assert!(
            result
                .files
                .iter()
                .all(|f| !f.relative_path.starts_with("node_modules"))
        );
        // Pruned contents are never visited, so nothing inside counts as excluded.
        assert_eq!(result.excluded_files, 0);
        assert_eq!(result.directories, vec![PathBuf::from("src")]);
    }

    #[test]
    fn hidden_files_follow_include_hidden() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".env"), "KEY=value\n").unwrap();
        write_lines(tmp.path(), "main.py", 2);

        let mut config = ScanConfig::unfiltered(tmp.path());
        let hidden_off = scanner_for(config.clone()).scan().unwrap();
        assert_eq!(hidden_off.total_files, 1);
        assert_eq!(hidden_off.excluded_files, 1);

        config.include_hidden = true;
        let hidden_on = scanner_for(config).scan().unwrap();
        assert_eq!(hidden_on.total_files, 2);
        assert_eq!(hidden_on.excluded_files, 0);
    }

    #[test]
    fn size_and_pattern_match_is_excluded_once() {
        let tmp = TempDir::new().unwrap();
        let big = File::create(tmp.path().join("dump.log")).unwrap();
        big.set_len(2048).unwrap();

        let mut config = ScanConfig::unfiltered(tmp.path());
        config.exclude_patterns = vec!["*.log".to_string()];
        config.max_file_size = 1024;
        let result = scanner_for(config).scan().unwrap();

        assert_eq!(result.excluded_files, 1);
        assert_eq!(result.excluded.len(), 1);
        assert!(
            result.excluded[0]
                .exclusion_reason
                .as_deref()
                .unwrap()
                .contains("*.log")
        );
    }

    #[test]
    fn empty_directory_yields_empty_result() {
        let tmp = TempDir::new().unwrap();
        let result = scanner_for(ScanConfig::new(tmp.path())).scan().unwrap();
        assert_eq!(result.total_files, 0);
        assert_eq!(result.total_directories, 0);
        assert_eq!(result.excluded_files, 0);
    }

    #[test]
    fn repeated_scans_agree() {
        let tmp = TempDir::new().unwrap();
        write_lines(tmp.path(), "src/lib.rs", 12);
        write_lines(tmp.path(), "src/util/mod.rs", 4);
        write_lines(tmp.path(), "docs/guide.md", 7);

        let scanner = scanner_for(ScanConfig::new(tmp.path()));
        let first = scanner.scan().unwrap();
        let second = scanner.scan().unwrap();
        assert_eq!(first.total_files, second.total_files);
        assert_eq!(first.total_size, second.total_size);
        assert_eq!(first.total_lines, second.total_lines);
        assert_eq!(first.extension_histogram, second.extension_histogram);
        assert_eq!(visited_non_dirs(&first), 3);
    }

    #[test]
    fn max_depth_limits_traversal() {
        let tmp = TempDir::new().unwrap();
        write_lines(tmp.path(), "top.txt", 1);
        write_lines(tmp.path(), "a/mid.txt", 1);
        write_lines(tmp.path(), "a/b/deep.txt", 1);

        let mut config = ScanConfig::unfiltered(tmp.path());
        config.max_depth = 2;
        let result = scanner_for(config).scan().unwrap();
        let names: Vec<String> = result.files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names.len(), 2);
        assert!(!names.contains(&"deep.txt".to_string()));
        assert!(result.directories.contains(&PathBuf::from("a/b")));
    }

    #[test]
    fn cancelled_scan_returns_no_result() {
        let tmp = TempDir::new().unwrap();
        write_lines(tmp.path(), "one.txt", 1);
        let scanner = scanner_for(ScanConfig::new(tmp.path()));
        scanner.cancel_token().cancel();
        let err = scanner.scan().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn invalid_roots_fail_before_traversal() {
        let tmp = TempDir::new().unwrap();
        let missing = scanner_for(ScanConfig::new(tmp.path().join("nope")));
        assert!(matches!(missing.scan(), Err(AppError::InvalidRoot { .. })));

        let file = tmp.path().join("plain.txt");
        fs::write(&file, "x").unwrap();
        let not_dir = scanner_for(ScanConfig::new(&file));
        assert!(matches!(not_dir.scan(), Err(AppError::InvalidRoot { .. })));
    }

    #[test]
    fn progress_events_are_delivered_with_estimate() {
        let tmp = TempDir::new().unwrap();
        write_lines(tmp.path(), "a.txt", 1);
        write_lines(tmp.path(), "b.txt", 1);

        let mut scanner = Scanner::with_delivery(
            ScanConfig::new(tmp.path()),
            ProgressDelivery::Bounded { capacity: 16 },
        )
        .unwrap();
        let rx = scanner.progress_receiver().unwrap();
        assert!(scanner.progress_receiver().is_none());
        scanner.scan().unwrap();

        let events: Vec<Progress> = rx.try_iter().collect();
        assert_eq!(events[0].phase, ScanPhase::Estimating);
        assert_eq!(events[0].estimated_total, 2);
        let last = events.last().unwrap();
        assert_eq!(last.phase, ScanPhase::Scanning);
        assert_eq!(last.processed, 2);
    }

    #[test]
    fn generate_context_requires_a_result() {
        let tmp = TempDir::new().unwrap();
        let scanner = scanner_for(ScanConfig::new(tmp.path()));
        assert!(matches!(
            scanner.generate_context(None, "demo"),
            Err(AppError::MissingScanResult)
        ));
    }

    #[test]
    fn line_count_handles_unterminated_and_capped_files() {
        let tmp = TempDir::new().unwrap();
        let partial = tmp.path().join("partial.txt");
        fs::write(&partial, "a\nb\nc").unwrap();
        assert_eq!(count_lines(&partial).unwrap(), 3);

        let empty = tmp.path().join("empty.txt");
        fs::write(&empty, "").unwrap();
        assert_eq!(count_lines(&empty).unwrap(), 0);

        let many = tmp.path().join("many.txt");
        fs::write(&many, "\n".repeat(MAX_COUNTED_LINES + 50)).unwrap();
        assert_eq!(count_lines(&many).unwrap(), MAX_COUNTED_LINES);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_aborts_scan() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let locked = tmp.path().join("locked");
        write_lines(tmp.path(), "locked/secret.txt", 1);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can list the directory anyway.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let outcome = scanner_for(ScanConfig::unfiltered(tmp.path())).scan();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(outcome, Err(AppError::Traversal { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_is_reported_as_exclusion() {
        let tmp = TempDir::new().unwrap();
        write_lines(tmp.path(), "a/f.txt", 2);
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("a/back")).unwrap();

        let mut config = ScanConfig::new(tmp.path());
        config.follow_symlinks = true;
        let result = scanner_for(config).scan().unwrap();

        assert_eq!(result.total_files, 1);
        assert_eq!(result.excluded_files, 1);
        let looped = &result.excluded[0];
        assert_eq!(looped.relative_path, PathBuf::from("a/back"));
        let reason = looped.exclusion_reason.as_deref().unwrap();
        assert!(reason.contains("loop"), "unexpected reason: {reason}");
    }
}
