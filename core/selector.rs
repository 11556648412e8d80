use crate::mapping::{is_important_name, is_text_type, priority_rank};
use crate::scan_result::FileRecord;

const TEXT_BASE_SCORE: i64 = 10;
const IMPORTANT_NAME_BONUS: i64 = 20;
const PRIORITY_BONUS_CEILING: i64 = 50;

/// Picks the files whose content is embedded in a context bundle.
#[derive(Debug, Clone, Copy)]
pub struct ContentSelector {
    max_file_size: u64,
    max_total_size: u64,
}

impl ContentSelector {
    pub fn new(max_file_size: u64, max_total_size: u64) -> Self {
        Self {
            max_file_size,
            max_total_size,
        }
    }

    /// Highest-scoring files first, accepted greedily until the next file
    /// would overflow the content budget. Equal scores keep input order.
    pub fn select<'a>(&self, files: &'a [FileRecord]) -> Vec<&'a FileRecord> {
        let mut candidates: Vec<(i64, &FileRecord)> = files
            .iter()
            .filter(|f| !f.excluded && !f.is_dir && f.size <= self.max_file_size)
            .map(|f| (score(f), f))
            .filter(|(score, _)| *score > 0)
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let mut selected = Vec::new();
        let mut total: u64 = 0;
        for (score, file) in candidates {
            let next_total = total.saturating_add(file.size);
            if next_total > self.max_total_size {
                log::debug!(
                    "Content budget of {} bytes reached at {} (score {}).",
                    self.max_total_size,
                    file.relative_path.display(),
                    score
                );
                break;
            }
            log::trace!(
                "Selected {} (score {}, {} bytes).",
                file.relative_path.display(),
                score,
                file.size
            );
            total = next_total;
            selected.push(file);
        }
        log::debug!(
            "Selected {} of {} files ({} bytes).",
            selected.len(),
            files.len(),
            total
        );
        selected
    }
}

/// Priority score of a file. Non-text files score zero.
pub fn score(file: &FileRecord) -> i64 {
    let file_name = file.file_name();
    if !is_text_type(&file.extension, &file_name) {
        return 0;
    }

    let mut score = TEXT_BASE_SCORE;
    if let Some(rank) = priority_rank(&file.extension) {
        score += PRIORITY_BONUS_CEILING - rank as i64;
    }

    score += match file.size {
        s if s < 1024 => 5,
        s if s < 10 * 1024 => 3,
        s if s > 100 * 1024 => -5,
        _ => 0,
    };

    if is_important_name(&file_name) {
        score += IMPORTANT_NAME_BONUS;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(rel: &str, size: u64) -> FileRecord {
        let relative_path = PathBuf::from(rel);
        FileRecord {
            path: PathBuf::from("/p").join(&relative_path),
            extension: crate::filter::normalized_extension(&relative_path),
            relative_path,
            is_dir: false,
            size,
            lines: 1,
            modified: None,
            excluded: false,
            exclusion_reason: None,
        }
    }

    #[test]
    fn scores_combine_type_priority_size_and_name() {
        // text + rank 0 bonus + small
        assert_eq!(score(&file("x.go", 100)), 10 + 50 + 5);
        // text + rank 1 bonus + medium + important name
        assert_eq!(score(&file("main.rs", 5000)), 10 + 49 + 3 + 20);
        // text, no priority, large
        assert_eq!(score(&file("notes.txt", 200 * 1024)), 10 - 5);
        assert_eq!(score(&file("logo.png", 10)), 0);
    }

    #[test]
    fn budget_admits_only_one_of_two_mid_sized_files() {
        let files = vec![file("a.txt", 6 * 1024), file("README.md", 6 * 1024)];
        let selected = ContentSelector::new(1024 * 1024, 10 * 1024).select(&files);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].file_name(), "README.md");
    }

    #[test]
    fn selection_stops_at_first_overflow() {
        let files = vec![
            file("main.go", 4000),
            file("big.go", 9000),
            file("tiny.txt", 10),
        ];
        // main.go scores highest, big.go would overflow, tiny.txt is dropped too.
        let selected = ContentSelector::new(u64::MAX, 5000).select(&files);
        let names: Vec<String> = selected.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["main.go".to_string()]);
    }

    #[test]
    fn oversized_and_non_text_files_are_never_selected() {
        let files = vec![
            file("huge.rs", 2048),
            file("image.jpg", 10),
            file("ok.rs", 100),
        ];
        let selected = ContentSelector::new(1024, u64::MAX).select(&files);
        let names: Vec<String> = selected.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["ok.rs".to_string()]);
    }

    #[test]
    fn ties_keep_natural_order() {
        let files = vec![file("b.rs", 100), file("a.rs", 100)];
        let selected = ContentSelector::new(u64::MAX, u64::MAX).select(&files);
        assert_eq!(selected[0].file_name(), "b.rs");
        assert_eq!(selected[1].file_name(), "a.rs");
    }

    #[test]
    fn selected_total_never_exceeds_budget() {
        let files: Vec<FileRecord> = (0..40)
            .map(|i| file(&format!("f{i}.py"), 100 + i * 37))
            .collect();
        let budget = 2500;
        let selected = ContentSelector::new(u64::MAX, budget).select(&files);
        assert!(selected.iter().map(|f| f.size).sum::<u64>() <= budget);
        assert!(!selected.is_empty());
    }
}
