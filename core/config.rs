use crate::error::{AppError, Result};
use crate::mapping::normalize_extension;
use crate::output_formats::RenderOptions;
use crate::progress::ProgressDelivery;
use byte_unit::Byte;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_DIR: &str = ".ctxscan";
pub const DEFAULT_CONFIG_FILENAME: &str = "ctxscan.toml";
pub const DEFAULT_SAVE_DIR: &str = ".ctxscan/out";
pub const DEFAULT_MAX_DEPTH: usize = 32;
pub const DEFAULT_SCAN_MAX_FILE_SIZE: &str = "10MiB";
pub const DEFAULT_SCAN_MAX_TOTAL_SIZE: &str = "100MiB";
pub const DEFAULT_GENERATE_MAX_FILE_SIZE: &str = "512KiB";
pub const DEFAULT_GENERATE_MAX_TOTAL_SIZE: &str = "2MiB";
pub const DEFAULT_PROGRESS_CAPACITY: usize = 100;
pub const DEFAULT_PRICE_PER_THOUSAND: f64 = 0.003;

/// Rules for a single scan invocation. Built once, never mutated while the
/// scan runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanConfig {
    pub root: PathBuf,
    pub exclude_patterns: Vec<String>,
    pub exclude_extensions: Vec<String>,
    /// Deepest entry depth visited; entries directly under the root are at
    /// depth 1. Zero disables the limit.
    pub max_depth: usize,
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub include_hidden: bool,
    pub follow_symlinks: bool,
}

impl ScanConfig {
    /// A config for `root` using the built-in exclusion rules and default limits.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let builtin = get_builtin_excludes();
        Self {
            root: root.into(),
            exclude_patterns: builtin.patterns.clone(),
            exclude_extensions: builtin.extensions.clone(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_file_size: 10 * 1024 * 1024,
            max_total_size: 100 * 1024 * 1024,
            include_hidden: false,
            follow_symlinks: false,
        }
    }

    /// Same limits, no exclusion rules at all.
    pub fn unfiltered(root: impl Into<PathBuf>) -> Self {
        Self {
            exclude_patterns: Vec::new(),
            exclude_extensions: Vec::new(),
            ..Self::new(root)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenerateOptions {
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub include_content: bool,
    pub include_summary: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_file_size: 512 * 1024,
            max_total_size: 2 * 1024 * 1024,
            include_content: true,
            include_summary: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BuiltinExcludes {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

static BUILTIN_EXCLUDES: Lazy<BuiltinExcludes> = Lazy::new(|| {
    let yaml_content = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../data/default_excludes.yaml"
    ));
    serde_yml::from_str(yaml_content).expect("Failed to parse embedded data/default_excludes.yaml")
});

pub fn get_builtin_excludes() -> &'static BuiltinExcludes {
    &BUILTIN_EXCLUDES
}

/// Parses a human size string ("512KiB", "10MB", "2048") into bytes.
pub fn parse_size(size_str: &str) -> Result<u64> {
    let byte_value = Byte::from_str(size_str.trim()).map_err(|e| {
        AppError::SizeParse(format!(
            "Invalid size '{}': {}. Use B, KiB, MiB, KB, MB, etc.",
            size_str, e
        ))
    })?;
    let bytes: u128 = byte_value.into();
    u64::try_from(bytes)
        .map_err(|_| AppError::SizeParse(format!("Size '{}' is too large.", size_str)))
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub generate: GenerateSection,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub save: SaveConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScanSection {
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_exclude_extensions")]
    pub exclude_extensions: Vec<String>,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_scan_max_file_size")]
    pub max_file_size: String,
    #[serde(default = "default_scan_max_total_size")]
    pub max_total_size: String,
    #[serde(default = "default_false")]
    pub include_hidden: bool,
    #[serde(default = "default_false")]
    pub follow_symlinks: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GenerateSection {
    #[serde(default = "default_generate_max_file_size")]
    pub max_file_size: String,
    #[serde(default = "default_generate_max_total_size")]
    pub max_total_size: String,
    #[serde(default = "default_true")]
    pub include_content: bool,
    #[serde(default = "default_true")]
    pub include_summary: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_false")]
    pub json_minify: bool,
    #[serde(default = "default_true")]
    pub include_timestamp: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProgressConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_progress_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    #[serde(default = "default_price_per_thousand")]
    pub price_per_thousand: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SaveConfig {
    #[serde(default = "default_save_dir_config")]
    pub output_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_format() -> String {
    "markdown".to_string()
}
fn default_exclude_patterns() -> Vec<String> {
    get_builtin_excludes().patterns.clone()
}
fn default_exclude_extensions() -> Vec<String> {
    get_builtin_excludes().extensions.clone()
}
fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}
fn default_scan_max_file_size() -> String {
    DEFAULT_SCAN_MAX_FILE_SIZE.to_string()
}
fn default_scan_max_total_size() -> String {
    DEFAULT_SCAN_MAX_TOTAL_SIZE.to_string()
}
fn default_generate_max_file_size() -> String {
    DEFAULT_GENERATE_MAX_FILE_SIZE.to_string()
}
fn default_generate_max_total_size() -> String {
    DEFAULT_GENERATE_MAX_TOTAL_SIZE.to_string()
}
fn default_progress_capacity() -> usize {
    DEFAULT_PROGRESS_CAPACITY
}
fn default_price_per_thousand() -> f64 {
    DEFAULT_PRICE_PER_THOUSAND
}
fn default_save_dir_config() -> PathBuf {
    PathBuf::from(DEFAULT_SAVE_DIR)
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            exclude_patterns: default_exclude_patterns(),
            exclude_extensions: default_exclude_extensions(),
            max_depth: default_max_depth(),
            max_file_size: default_scan_max_file_size(),
            max_total_size: default_scan_max_total_size(),
            include_hidden: default_false(),
            follow_symlinks: default_false(),
        }
    }
}
impl Default for GenerateSection {
    fn default() -> Self {
        Self {
            max_file_size: default_generate_max_file_size(),
            max_total_size: default_generate_max_total_size(),
            include_content: default_true(),
            include_summary: default_true(),
        }
    }
}
impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            json_minify: default_false(),
            include_timestamp: default_true(),
        }
    }
}
impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            capacity: default_progress_capacity(),
        }
    }
}
impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            price_per_thousand: default_price_per_thousand(),
        }
    }
}
impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            output_dir: default_save_dir_config(),
            filename_base: None,
            extension: None,
        }
    }
}

impl Config {
    /// Resolves the root from the CLI value, `PROJECT_ROOT`, or the current
    /// directory. Missing or non-directory roots are fatal.
    pub fn determine_project_root(cli_project_root: Option<&PathBuf>) -> Result<PathBuf> {
        let path_str_opt = cli_project_root
            .map(|p| p.to_string_lossy().to_string())
            .or_else(|| env::var("PROJECT_ROOT").ok().filter(|s| !s.is_empty()));

        let path_to_resolve = match path_str_opt {
            Some(p_str) => PathBuf::from(shellexpand::tilde(&p_str).as_ref()),
            None => env::current_dir().map_err(AppError::Io)?,
        };

        let canonical = path_to_resolve
            .canonicalize()
            .map_err(|e| AppError::InvalidRoot {
                path: path_to_resolve.clone(),
                reason: format!("cannot be resolved: {}", e),
            })?;
        if !canonical.is_dir() {
            return Err(AppError::InvalidRoot {
                path: canonical,
                reason: "not a directory".to_string(),
            });
        }
        Ok(canonical)
    }

    pub fn resolve_config_path(
        project_root: &Path,
        cli_config_file: Option<&String>,
        cli_disable_config: bool,
    ) -> Result<Option<PathBuf>> {
        if cli_disable_config {
            log::debug!("Config file loading disabled via CLI flag.");
            return Ok(None);
        }

        match cli_config_file {
            Some(p_str) => {
                let path = PathBuf::from(shellexpand::tilde(p_str).as_ref());
                let path = if path.is_absolute() || path.exists() {
                    path
                } else {
                    project_root.join(DEFAULT_CONFIG_DIR).join(path)
                };
                if !path.exists() {
                    return Err(AppError::Config(format!(
                        "Specified config file not found at path: {}",
                        path.display()
                    )));
                }
                log::debug!("Using specified config file path: {}", path.display());
                Ok(Some(path))
            }
            None => {
                let default_path = project_root
                    .join(DEFAULT_CONFIG_DIR)
                    .join(DEFAULT_CONFIG_FILENAME);
                if default_path.exists() {
                    log::debug!("Using default config file path: {}", default_path.display());
                    Ok(Some(default_path))
                } else {
                    log::debug!(
                        "No config file specified and default not found at: {}",
                        default_path.display()
                    );
                    Ok(None)
                }
            }
        }
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        log::info!("Loading configuration from: {}", config_path.display());
        let toml_content = fs::read_to_string(config_path).map_err(|e| AppError::FileRead {
            path: config_path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&toml_content).map_err(|e| match e {
            AppError::TomlParse(msg) => AppError::TomlParse(format!(
                "Error parsing config file '{}': {}",
                config_path.display(),
                msg
            )),
            other => other,
        })
    }

    pub fn from_toml_str(toml_content: &str) -> Result<Self> {
        toml::from_str::<Config>(toml_content).map_err(|e| AppError::TomlParse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Builds the immutable per-scan rules for `root`.
    pub fn to_scan_config(&self, root: &Path) -> Result<ScanConfig> {
        let max_file_size = parse_size(&self.scan.max_file_size)?;
        let max_total_size = parse_size(&self.scan.max_total_size)?;
        Ok(ScanConfig {
            root: root.to_path_buf(),
            exclude_patterns: self
                .scan
                .exclude_patterns
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            exclude_extensions: self
                .scan
                .exclude_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .filter(|e| !e.is_empty())
                .collect(),
            max_depth: self.scan.max_depth,
            max_file_size,
            max_total_size,
            include_hidden: self.scan.include_hidden,
            follow_symlinks: self.scan.follow_symlinks,
        })
    }

    pub fn generate_options(&self) -> Result<GenerateOptions> {
        let options = GenerateOptions {
            max_file_size: parse_size(&self.generate.max_file_size)?,
            max_total_size: parse_size(&self.generate.max_total_size)?,
            include_content: self.generate.include_content,
            include_summary: self.generate.include_summary,
        };
        if options.max_total_size == 0 && options.include_content {
            log::warn!("Content budget is zero; no file content will be embedded.");
        }
        Ok(options)
    }

    pub fn progress_delivery(&self) -> ProgressDelivery {
        if self.progress.enabled && self.progress.capacity > 0 {
            ProgressDelivery::Bounded {
                capacity: self.progress.capacity,
            }
        } else {
            ProgressDelivery::Disabled
        }
    }

    pub fn render_options(&self) -> Result<RenderOptions> {
        Ok(RenderOptions {
            format: self.output.format.parse()?,
            json_minify: self.output.json_minify,
            include_timestamp: self.output.include_timestamp,
        })
    }

    pub fn get_effective_project_name(&self, project_root: &Path) -> String {
        self.general.project_name.clone().unwrap_or_else(|| {
            project_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "UnknownProject".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_accepts_binary_and_decimal_units() {
        assert_eq!(parse_size("10MiB").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1000);
        assert_eq!(parse_size("2048").unwrap(), 2048);
        assert!(matches!(parse_size("ten"), Err(AppError::SizeParse(_))));
    }

    #[test]
    fn default_config_carries_builtin_excludes() {
        let config = Config::default();
        assert!(config.scan.exclude_patterns.iter().any(|p| p == "node_modules/**"));
        assert!(config.scan.exclude_extensions.iter().any(|e| e == ".png"));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = Config::from_toml_str(
            r#"
            [scan]
            include_hidden = true
            exclude_extensions = ["LOG"]

            [generate]
            max_total_size = "10KiB"
            "#,
        )
        .unwrap();
        assert!(config.scan.include_hidden);
        assert_eq!(config.scan.max_depth, DEFAULT_MAX_DEPTH);

        let scan = config.to_scan_config(Path::new("/tmp/project")).unwrap();
        assert_eq!(scan.exclude_extensions, vec![".log".to_string()]);
        assert_eq!(scan.max_file_size, 10 * 1024 * 1024);

        let options = config.generate_options().unwrap();
        assert_eq!(options.max_total_size, 10 * 1024);
        assert!(options.include_content);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Config::from_toml_str("[scan]\nmax_depht = 3\n").unwrap_err();
        assert!(matches!(err, AppError::TomlParse(_)));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let rendered = Config::default().to_toml_string().unwrap();
        let parsed = Config::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn disabled_progress_maps_to_no_delivery() {
        let mut config = Config::default();
        assert!(matches!(
            config.progress_delivery(),
            ProgressDelivery::Bounded { capacity: DEFAULT_PROGRESS_CAPACITY }
        ));
        config.progress.enabled = false;
        assert!(matches!(config.progress_delivery(), ProgressDelivery::Disabled));
    }

    #[test]
    fn output_format_is_validated() {
        let mut config = Config::default();
        assert_eq!(
            config.render_options().unwrap().format,
            crate::output_formats::OutputFormat::Markdown
        );
        config.output.format = "pdf".to_string();
        assert!(matches!(config.render_options(), Err(AppError::Config(_))));
    }

    #[test]
    fn missing_root_is_fatal() {
        let missing = PathBuf::from("/definitely/not/here/ctxscan");
        let err = Config::determine_project_root(Some(&missing)).unwrap_err();
        assert!(matches!(err, AppError::InvalidRoot { .. }));
    }
}
