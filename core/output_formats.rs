use crate::context::ContextBundle;
use crate::error::{AppError, Result};
use crate::sections::human_size;
use serde::Serialize;
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

pub const XML_ROOT_ELEMENT: &str = "contextBundle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Yaml,
    Xml,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Xml => "xml",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "xml" => Ok(OutputFormat::Xml),
            other => Err(AppError::Config(format!(
                "Unsupported output format '{}'. Expected markdown, json, yaml or xml.",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Xml => "xml",
        };
        f.write_str(name)
    }
}

/// How a bundle is rendered for saving or printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub json_minify: bool,
    pub include_timestamp: bool,
}

pub fn render_bundle(bundle: &ContextBundle, options: RenderOptions) -> Result<String> {
    log::debug!("Rendering context bundle as {}.", options.format);
    match options.format {
        OutputFormat::Markdown => Ok(render_markdown(bundle, options.include_timestamp)),
        OutputFormat::Json => serialize_bundle_to_json(bundle, !options.json_minify),
        OutputFormat::Yaml => serialize_bundle_to_yaml(bundle),
        #[cfg(feature = "serde_support")]
        OutputFormat::Xml => serialize_bundle_to_xml(bundle),
        #[cfg(not(feature = "serde_support"))]
        OutputFormat::Xml => Err(AppError::XmlSerialize(
            "XML output requires the serde_support feature".to_string(),
        )),
    }
}

pub fn serialize_to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(value).map_err(AppError::JsonSerialize)
    } else {
        serde_json::to_string(value).map_err(AppError::JsonSerialize)
    }
}

pub fn serialize_to_yaml<T: Serialize>(value: &T) -> Result<String> {
    serde_yml::to_string(value).map_err(AppError::YamlError)
}

pub fn serialize_bundle_to_json(bundle: &ContextBundle, pretty: bool) -> Result<String> {
    serialize_to_json(bundle, pretty)
}

pub fn serialize_bundle_to_yaml(bundle: &ContextBundle) -> Result<String> {
    serialize_to_yaml(bundle)
}

#[cfg(feature = "serde_support")]
pub fn serialize_bundle_to_xml(bundle: &ContextBundle) -> Result<String> {
    quick_xml::se::to_string_with_root(XML_ROOT_ELEMENT, bundle).map_err(AppError::from)
}

/// Markdown document with a header, the summary and every section in order.
pub fn render_markdown(bundle: &ContextBundle, include_timestamp: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Project Context: {}\n", bundle.project_name);
    if include_timestamp {
        let _ = writeln!(
            out,
            "_Generated at {}_\n",
            bundle.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    let _ = writeln!(
        out,
        "Files: {} | Size: {} | Estimated tokens: {}\n",
        bundle.total_files,
        human_size(bundle.total_size),
        bundle.token_estimate
    );
    if let Some(summary) = &bundle.summary {
        let _ = writeln!(out, "## Summary\n\n{}\n", summary);
    }
    for section in &bundle.sections {
        let _ = writeln!(out, "## {}\n\n{}", section.title, section.content.trim_end());
        out.push('\n');
    }
    out
}
