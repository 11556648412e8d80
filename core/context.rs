use crate::config::GenerateOptions;
use crate::error::Result;
use crate::sections::{ContextSection, SectionBuilder, extension_label, human_size};
use crate::selector::ContentSelector;
use crate::scan_result::ScanResult;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rough characters-per-token ratio used for estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Serializable result of context generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBundle {
    pub project_name: String,
    pub generated_at: DateTime<Utc>,
    pub total_files: usize,
    pub total_size: u64,
    pub sections: Vec<ContextSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub token_estimate: usize,
}

impl ContextBundle {
    pub fn section(&self, title: &str) -> Option<&ContextSection> {
        self.sections.iter().find(|s| s.title == title)
    }
}

/// Builds a `ContextBundle` from a finished scan.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    options: GenerateOptions,
}

impl ContextAssembler {
    pub fn new(options: GenerateOptions) -> Self {
        Self { options }
    }

    pub fn assemble(&self, result: &ScanResult, project_name: &str) -> Result<ContextBundle> {
        log::debug!("Assembling context bundle for '{}'...", project_name);

        let selected = if self.options.include_content {
            ContentSelector::new(self.options.max_file_size, self.options.max_total_size)
                .select(&result.files)
        } else {
            Vec::new()
        };
        let sections = SectionBuilder::new(self.options).build(result, &selected);

        let summary = self
            .options
            .include_summary
            .then(|| summarize(result, project_name));

        let rendered_chars: usize = sections
            .iter()
            .map(|s| s.title.chars().count() + s.content.chars().count())
            .sum::<usize>()
            + summary.as_deref().map_or(0, |s| s.chars().count());

        let bundle = ContextBundle {
            project_name: project_name.to_string(),
            generated_at: Utc::now(),
            total_files: result.total_files,
            total_size: result.total_size,
            sections,
            summary,
            token_estimate: rendered_chars / CHARS_PER_TOKEN,
        };
        log::info!(
            "Context bundle ready: {} sections, ~{} tokens.",
            bundle.sections.len(),
            bundle.token_estimate
        );
        Ok(bundle)
    }
}

/// One-paragraph description of the scanned project.
pub fn summarize(result: &ScanResult, project_name: &str) -> String {
    if result.total_files == 0 {
        return format!(
            "Project {} contains no files matching the scan rules.",
            project_name
        );
    }
    let mut summary = format!(
        "Project {} contains {} files ({}) across {} directories.",
        project_name,
        result.total_files,
        human_size(result.total_size),
        result.total_directories
    );
    if let Some((extension, count)) = result.top_extensions(1).first() {
        summary.push_str(&format!(
            " The dominant file type is {} with {} files.",
            extension_label(extension),
            count
        ));
    }
    summary
}

/// Cost in currency units for `tokens` at `price_per_thousand` per 1000 tokens.
pub fn estimate_cost(tokens: usize, price_per_thousand: f64) -> f64 {
    tokens as f64 / 1000.0 * price_per_thousand
}
