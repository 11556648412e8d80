use crate::config::GenerateOptions;
use crate::mapping::{language_for_extension, priority_rank};
use crate::scan_result::{FileRecord, ScanResult};
use byte_unit::{Byte, UnitType};
use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub const TOP_EXTENSIONS_IN_OVERVIEW: usize = 10;
pub const LARGEST_FILES_IN_OVERVIEW: usize = 5;
pub const FILES_PER_TYPE_LISTING: usize = 20;
pub const DIRECTORY_LISTING_LIMIT: usize = 500;

pub const OVERVIEW_TITLE: &str = "Project Overview";
pub const STRUCTURE_TITLE: &str = "Directory Structure";
pub const ANALYSIS_TITLE: &str = "File Type Analysis";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSection {
    pub title: String,
    pub content: String,
    pub sources: Vec<String>,
}

/// Renders a `ScanResult` and the selected files into ordered sections:
/// overview, directory structure, file-type analysis, then one content
/// section per extension group.
#[derive(Debug, Clone, Copy)]
pub struct SectionBuilder {
    options: GenerateOptions,
}

impl SectionBuilder {
    pub fn new(options: GenerateOptions) -> Self {
        Self { options }
    }

    pub fn build(&self, result: &ScanResult, selected: &[&FileRecord]) -> Vec<ContextSection> {
        let mut sections = vec![
            overview_section(result),
            structure_section(result),
            analysis_section(result),
        ];
        if self.options.include_content {
            sections.extend(self.content_sections(selected));
        } else {
            log::debug!("Content sections disabled.");
        }
        sections
    }

    fn content_sections(&self, selected: &[&FileRecord]) -> Vec<ContextSection> {
        let groups = group_by_extension(selected.iter().copied());
        let mut rendered_total: u64 = 0;
        let mut sections = Vec::with_capacity(groups.len());

        for (extension, files) in groups {
            let mut content = String::new();
            let mut sources = Vec::new();
            for file in files {
                let display_path = display_path(&file.relative_path);
                let body = match self.read_for_render(file) {
                    Ok(text) => {
                        let size = text.len() as u64;
                        if rendered_total.saturating_add(size) > self.options.max_total_size {
                            log::debug!(
                                "Content budget reached before {}; truncating section.",
                                display_path
                            );
                            let _ = writeln!(
                                content,
                                "[truncated: content budget of {} bytes reached]",
                                self.options.max_total_size
                            );
                            break;
                        }
                        rendered_total += size;
                        fenced_block(&text, language_for_extension(extension))
                    }
                    Err(marker) => marker,
                };
                let _ = writeln!(content, "### {}\n\n{}", display_path, body);
                sources.push(display_path);
            }
            if sources.is_empty() {
                log::debug!("No content fits for {}; section dropped.", content_title(extension));
                continue;
            }
            sections.push(ContextSection {
                title: content_title(extension),
                content,
                sources,
            });
        }
        sections
    }

    /// Reads a selected file, re-checking its current size first. Failures
    /// come back as inline markers.
    fn read_for_render(&self, file: &FileRecord) -> Result<String, String> {
        match fs::metadata(&file.path) {
            Ok(meta) if meta.len() > self.options.max_file_size => {
                return Err(format!(
                    "[skipped: {} bytes exceeds the {} byte file limit]\n",
                    meta.len(),
                    self.options.max_file_size
                ));
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Cannot stat {}: {}", file.path.display(), e);
                return Err(format!("[error reading file: {}]\n", e));
            }
        }
        fs::read(&file.path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| {
                log::warn!("Cannot read {}: {}", file.path.display(), e);
                format!("[error reading file: {}]\n", e)
            })
    }
}

fn overview_section(result: &ScanResult) -> ContextSection {
    let mut content = String::new();
    let _ = writeln!(content, "Root: {}", result.root.display());
    let _ = writeln!(content, "Total files: {}", result.total_files);
    let _ = writeln!(content, "Total directories: {}", result.total_directories);
    let _ = writeln!(
        content,
        "Total size: {} ({} bytes)",
        human_size(result.total_size),
        result.total_size
    );
    let _ = writeln!(content, "Total lines: {}", result.total_lines);
    let _ = writeln!(content, "Excluded files: {}", result.excluded_files);
    let _ = writeln!(
        content,
        "Scan duration: {} ms",
        result.scan_duration.as_millis()
    );

    if result.total_files == 0 {
        let _ = writeln!(content, "\nNo files matched the scan rules.");
        return ContextSection {
            title: OVERVIEW_TITLE.to_string(),
            content,
            sources: Vec::new(),
        };
    }

    let _ = writeln!(content, "\nTop extensions:");
    for (extension, count) in result.top_extensions(TOP_EXTENSIONS_IN_OVERVIEW) {
        let _ = writeln!(
            content,
            "- {}: {} {}",
            extension_label(extension),
            count,
            plural(count, "file", "files")
        );
    }

    let _ = writeln!(content, "\nLargest files:");
    let mut sources = Vec::new();
    for file in result.largest_files.iter().take(LARGEST_FILES_IN_OVERVIEW) {
        let path = display_path(&file.relative_path);
        let _ = writeln!(content, "- {} ({})", path, human_size(file.size));
        sources.push(path);
    }

    ContextSection {
        title: OVERVIEW_TITLE.to_string(),
        content,
        sources,
    }
}

fn structure_section(result: &ScanResult) -> ContextSection {
    let root_name = result
        .root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    let mut content = format!("{}/\n", root_name);

    for dir in result.directories.iter().take(DIRECTORY_LISTING_LIMIT) {
        let depth = dir.components().count();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let _ = writeln!(content, "{}{}/", "  ".repeat(depth), name);
    }
    if result.directories.len() > DIRECTORY_LISTING_LIMIT {
        let _ = writeln!(
            content,
            "... showing {} of {} directories",
            DIRECTORY_LISTING_LIMIT,
            result.directories.len()
        );
    }

    ContextSection {
        title: STRUCTURE_TITLE.to_string(),
        content,
        sources: Vec::new(),
    }
}

fn analysis_section(result: &ScanResult) -> ContextSection {
    let groups = group_by_extension(result.files.iter());
    let mut content = String::new();
    let mut sources = Vec::new();

    if groups.is_empty() {
        content.push_str("No files to analyze.\n");
    }

    for (extension, files) in groups {
        let total_size: u64 = files.iter().map(|f| f.size).sum();
        let total_lines: usize = files.iter().map(|f| f.lines).sum();
        let language = language_for_extension(extension)
            .map(|l| format!(", {}", l))
            .unwrap_or_default();
        let _ = writeln!(
            content,
            "### {} ({} {}{})",
            extension_label(extension),
            files.len(),
            plural(files.len(), "file", "files"),
            language
        );
        let _ = writeln!(
            content,
            "Total size: {}, total lines: {}",
            human_size(total_size),
            total_lines
        );
        for file in files.iter().take(FILES_PER_TYPE_LISTING) {
            let path = display_path(&file.relative_path);
            let _ = writeln!(
                content,
                "- {} ({}, {} lines)",
                path,
                human_size(file.size),
                file.lines
            );
            sources.push(path);
        }
        if files.len() > FILES_PER_TYPE_LISTING {
            let _ = writeln!(
                content,
                "... showing {} of {} files",
                FILES_PER_TYPE_LISTING,
                files.len()
            );
        }
        content.push('\n');
    }

    ContextSection {
        title: ANALYSIS_TITLE.to_string(),
        content,
        sources,
    }
}

/// Groups files by extension, keeping input order within a group. Groups are
/// ordered priority extensions first, then by descending file count, then by
/// name.
pub fn group_by_extension<'a>(
    files: impl Iterator<Item = &'a FileRecord>,
) -> IndexMap<&'a str, Vec<&'a FileRecord>> {
    let mut groups: IndexMap<&str, Vec<&FileRecord>> = IndexMap::new();
    for file in files {
        groups.entry(file.extension.as_str()).or_default().push(file);
    }
    groups.sort_by(|ext_a, files_a, ext_b, files_b| {
        compare_extensions(ext_a, files_a.len(), ext_b, files_b.len())
    });
    groups
}

fn compare_extensions(ext_a: &str, count_a: usize, ext_b: &str, count_b: usize) -> Ordering {
    match (priority_rank(ext_a), priority_rank(ext_b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => count_b.cmp(&count_a).then_with(|| ext_a.cmp(ext_b)),
    }
}

fn fenced_block(text: &str, language: Option<&str>) -> String {
    let mut fence = "```".to_string();
    while text.contains(fence.as_str()) {
        fence.push('`');
    }
    let newline = if text.ends_with('\n') { "" } else { "\n" };
    format!(
        "{}{}\n{}{}{}\n",
        fence,
        language.unwrap_or(""),
        text,
        newline,
        fence
    )
}

fn content_title(extension: &str) -> String {
    format!("Content: {}", extension_label(extension))
}

pub fn extension_label(extension: &str) -> &str {
    if extension.is_empty() {
        "(no extension)"
    } else {
        extension
    }
}

pub fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Binary-unit size such as "1.50 KiB"; plain bytes below 1 KiB.
pub fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let adjusted = Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary);
    format!("{:.2}", adjusted)
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 { one } else { many }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::progress::ProgressDelivery;
    use crate::selector::ContentSelector;
    use crate::walker::Scanner;
    use tempfile::TempDir;

    fn scan(dir: &Path) -> ScanResult {
        Scanner::with_delivery(ScanConfig::new(dir), ProgressDelivery::Disabled)
            .unwrap()
            .scan()
            .unwrap()
    }

    fn options(max_file_size: u64, max_total_size: u64) -> GenerateOptions {
        GenerateOptions {
            max_file_size,
            max_total_size,
            include_content: true,
            include_summary: true,
        }
    }

    #[test]
    fn sections_come_in_fixed_order() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(tmp.path().join("README.md"), "# Demo\n").unwrap();
        let result = scan(tmp.path());

        let opts = options(1024, 1024);
        let selected = ContentSelector::new(opts.max_file_size, opts.max_total_size)
            .select(&result.files);
        let sections = SectionBuilder::new(opts).build(&result, &selected);
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                OVERVIEW_TITLE,
                STRUCTURE_TITLE,
                ANALYSIS_TITLE,
                "Content: .rs",
                "Content: .md"
            ]
        );
        assert!(sections[3].content.contains("```rust\nfn main() {}\n```"));
        assert_eq!(sections[3].sources, vec!["src/main.rs".to_string()]);
        assert!(sections[1].content.contains("  src/"));
    }

    #[test]
    fn content_is_omitted_when_disabled() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "print(1)\n").unwrap();
        let result = scan(tmp.path());
        let opts = GenerateOptions {
            include_content: false,
            ..options(1024, 1024)
        };
        let selected: Vec<&FileRecord> = result.files.iter().collect();
        let sections = SectionBuilder::new(opts).build(&result, &selected);
        assert_eq!(sections.len(), 3);
    }

    #[test]
    fn rendered_content_respects_budget_and_marks_truncation() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.go"), "a".repeat(600)).unwrap();
        fs::write(tmp.path().join("b.go"), "b".repeat(600)).unwrap();
        let result = scan(tmp.path());

        // Bypass the selector to exercise the renderer's own guard.
        let selected: Vec<&FileRecord> = result.files.iter().collect();
        let sections = SectionBuilder::new(options(4096, 1000)).build(&result, &selected);
        let go = sections.iter().find(|s| s.title == "Content: .go").unwrap();
        assert!(go.content.contains("[truncated: content budget of 1000 bytes reached]"));
        assert_eq!(go.sources.len(), 1);
        assert!(!go.content.contains(&"b".repeat(600)));
    }

    #[test]
    fn group_without_room_left_gets_no_section() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.go"), "a".repeat(600)).unwrap();
        fs::write(tmp.path().join("c.rs"), "c".repeat(600)).unwrap();
        let result = scan(tmp.path());

        let selected: Vec<&FileRecord> = result.files.iter().collect();
        let sections = SectionBuilder::new(options(4096, 1000)).build(&result, &selected);
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert!(titles.contains(&"Content: .go"));
        assert!(!titles.contains(&"Content: .rs"));
        assert!(
            sections
                .iter()
                .filter(|s| s.title.starts_with("Content: "))
                .all(|s| !s.sources.is_empty())
        );
    }

    #[test]
    fn unreadable_file_renders_inline_marker() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("gone.rs"), "fn x() {}\n").unwrap();
        fs::write(tmp.path().join("kept.rs"), "fn y() {}\n").unwrap();
        let result = scan(tmp.path());
        fs::remove_file(tmp.path().join("gone.rs")).unwrap();

        let selected: Vec<&FileRecord> = result.files.iter().collect();
        let sections = SectionBuilder::new(options(4096, 4096)).build(&result, &selected);
        let rs = sections.iter().find(|s| s.title == "Content: .rs").unwrap();
        assert!(rs.content.contains("[error reading file:"));
        assert!(rs.content.contains("fn y() {}"));
    }

    #[test]
    fn file_grown_past_limit_is_skipped_at_render_time() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("grow.rs"), "x").unwrap();
        let result = scan(tmp.path());
        fs::write(tmp.path().join("grow.rs"), "x".repeat(5000)).unwrap();

        let selected: Vec<&FileRecord> = result.files.iter().collect();
        let sections = SectionBuilder::new(options(100, 100_000)).build(&result, &selected);
        let rs = sections.iter().find(|s| s.title == "Content: .rs").unwrap();
        assert!(rs.content.contains("[skipped: 5000 bytes exceeds the 100 byte file limit]"));
    }

    #[test]
    fn type_listing_is_capped_with_note() {
        let tmp = TempDir::new().unwrap();
        for i in 0..25 {
            fs::write(tmp.path().join(format!("f{i:02}.txt")), "x\n").unwrap();
        }
        let result = scan(tmp.path());
        let analysis = analysis_section(&result);
        assert!(analysis.content.contains("### .txt (25 files)"));
        assert!(analysis.content.contains("... showing 20 of 25 files"));
        assert_eq!(analysis.sources.len(), FILES_PER_TYPE_LISTING);
    }

    #[test]
    fn priority_extensions_lead_group_order() {
        let tmp = TempDir::new().unwrap();
        for i in 0..3 {
            fs::write(tmp.path().join(format!("n{i}.txt")), "x").unwrap();
        }
        fs::write(tmp.path().join("one.md"), "x").unwrap();
        fs::write(tmp.path().join("two.go"), "x").unwrap();
        let result = scan(tmp.path());
        let order: Vec<&str> = group_by_extension(result.files.iter())
            .keys()
            .copied()
            .collect();
        assert_eq!(order, vec![".go", ".md", ".txt"]);
    }

    #[test]
    fn fences_grow_when_content_contains_backticks() {
        let block = fenced_block("a ``` b", Some("markdown"));
        assert!(block.starts_with("````markdown\n"));
        assert!(block.ends_with("\n````\n"));
    }

    #[test]
    fn human_size_switches_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.50 KiB");
    }
}
