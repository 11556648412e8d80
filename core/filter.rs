use crate::config::ScanConfig;
use crate::error::{AppError, Result};
use crate::mapping::normalize_extension;
use globset::{Glob, GlobBuilder, GlobMatcher};
use std::collections::HashSet;
use std::path::{Component, Path};

/// Exclusion predicate shared by the directory walker and the folder tree so
/// both agree on what is excluded.
///
/// Rules are checked in order and the first match wins: hidden names,
/// extension denylist (files only), then exclude patterns.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include_hidden: bool,
    exclude_extensions: HashSet<String>,
    rules: Vec<PatternRule>,
}

#[derive(Debug, Clone)]
enum PatternRule {
    /// `<prefix>/**`: matches when the prefix appears as consecutive path
    /// components anywhere in the relative path.
    Prefix {
        pattern: String,
        components: Vec<GlobMatcher>,
    },
    /// Any other pattern: base name first, then the relative path.
    Glob {
        pattern: String,
        matcher: GlobMatcher,
    },
}

impl PathFilter {
    pub fn new(config: &ScanConfig) -> Result<Self> {
        let exclude_extensions = config
            .exclude_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();
        let rules = build_pattern_rules(&config.exclude_patterns)?;
        log::trace!(
            "Path filter built: {} pattern rules, hidden included: {}",
            rules.len(),
            config.include_hidden
        );
        Ok(Self {
            include_hidden: config.include_hidden,
            exclude_extensions,
            rules,
        })
    }

    pub fn include_hidden(&self) -> bool {
        self.include_hidden
    }

    /// Same rules with a different hidden-file policy.
    pub fn with_include_hidden(&self, include_hidden: bool) -> Self {
        Self {
            include_hidden,
            ..self.clone()
        }
    }

    pub fn should_exclude(&self, relative_path: &Path, is_dir: bool) -> bool {
        self.exclusion_reason(relative_path, is_dir).is_some()
    }

    /// Describes the first rule excluding `relative_path`, or `None` when the
    /// path is included. `relative_path` is relative to the walk root; the
    /// root itself (an empty path) is never excluded.
    pub fn exclusion_reason(&self, relative_path: &Path, is_dir: bool) -> Option<String> {
        let file_name = relative_path.file_name()?.to_string_lossy();

        if !self.include_hidden && file_name.starts_with('.') {
            return Some("hidden file".to_string());
        }

        if !is_dir {
            let extension = normalized_extension(relative_path);
            if !extension.is_empty() && self.exclude_extensions.contains(&extension) {
                return Some(format!("excluded extension {}", extension));
            }
        }

        for rule in &self.rules {
            match rule {
                PatternRule::Prefix {
                    pattern,
                    components,
                } => {
                    if contains_components(relative_path, components) {
                        return Some(format!("matches pattern {}", pattern));
                    }
                }
                PatternRule::Glob { pattern, matcher } => {
                    if matcher.is_match(&*file_name) || matcher.is_match(relative_path) {
                        return Some(format!("matches pattern {}", pattern));
                    }
                }
            }
        }
        None
    }
}

/// Lower-case extension with a leading dot, or an empty string when the path
/// has none. Dot-files such as `.env` have no extension.
pub fn normalized_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| normalize_extension(&ext.to_string_lossy()))
        .unwrap_or_default()
}

fn build_pattern_rules(patterns: &[String]) -> Result<Vec<PatternRule>> {
    let mut rules = Vec::with_capacity(patterns.len());
    for pattern_str in patterns {
        let pattern = pattern_str.trim();
        if pattern.is_empty() {
            continue;
        }
        let rule = match pattern.strip_suffix("/**") {
            Some(prefix) if !prefix.is_empty() => {
                let components = prefix
                    .split('/')
                    .filter(|c| !c.is_empty())
                    .map(|c| compile(c, pattern, true))
                    .collect::<Result<Vec<_>>>()?;
                PatternRule::Prefix {
                    pattern: pattern.to_string(),
                    components,
                }
            }
            _ => PatternRule::Glob {
                pattern: pattern.to_string(),
                matcher: compile(pattern, pattern, false)?,
            },
        };
        log::trace!("Adding exclude pattern: {}", pattern);
        rules.push(rule);
    }
    Ok(rules)
}

fn compile(glob: &str, original: &str, literal_separator: bool) -> Result<GlobMatcher> {
    let built = if literal_separator {
        GlobBuilder::new(glob).literal_separator(true).build()
    } else {
        Glob::new(glob)
    };
    built.map(|g| g.compile_matcher()).map_err(|e| {
        log::error!("Invalid glob pattern \"{}\": {}", original, e);
        AppError::Glob(format!("Invalid glob pattern \"{}\": {}", original, e))
    })
}

fn contains_components(path: &Path, prefix: &[GlobMatcher]) -> bool {
    if prefix.is_empty() {
        return false;
    }
    let components: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .collect();
    components.windows(prefix.len()).any(|window| {
        window
            .iter()
            .zip(prefix)
            .all(|(component, matcher)| matcher.is_match(component))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn filter_with(patterns: &[&str], extensions: &[&str], include_hidden: bool) -> PathFilter {
        let mut config = ScanConfig::unfiltered("/project");
        config.exclude_patterns = patterns.iter().map(|p| p.to_string()).collect();
        config.exclude_extensions = extensions.iter().map(|e| e.to_string()).collect();
        config.include_hidden = include_hidden;
        PathFilter::new(&config).unwrap()
    }

    #[test]
    fn hidden_names_are_excluded_unless_enabled() {
        let filter = filter_with(&[], &[], false);
        assert_eq!(
            filter.exclusion_reason(Path::new(".env"), false).as_deref(),
            Some("hidden file")
        );
        assert!(filter.should_exclude(Path::new("src/.cache"), true));
        assert!(!filter_with(&[], &[], true).should_exclude(Path::new(".env"), false));
    }

    #[test]
    fn extension_denylist_is_case_insensitive_and_files_only() {
        let filter = filter_with(&[], &["LOG", ".png"], false);
        assert!(filter.should_exclude(Path::new("logs/app.Log"), false));
        assert!(filter.should_exclude(Path::new("img/logo.PNG"), false));
        assert!(!filter.should_exclude(Path::new("weird.log"), true));
        assert!(!filter.should_exclude(Path::new("main.rs"), false));
    }

    #[test]
    fn prefix_patterns_match_any_component() {
        let filter = filter_with(&["node_modules/**", "a/b/**"], &[], false);
        assert!(filter.should_exclude(Path::new("node_modules"), true));
        assert!(filter.should_exclude(Path::new("node_modules/pkg/index.js"), false));
        assert!(filter.should_exclude(Path::new("web/node_modules/x.js"), false));
        assert!(filter.should_exclude(Path::new("x/a/b/c.txt"), false));
        assert!(!filter.should_exclude(Path::new("a/c/b.txt"), false));
        assert!(!filter.should_exclude(Path::new("my_node_modules/x.js"), false));
    }

    #[test]
    fn globs_match_base_name_then_relative_path() {
        let filter = filter_with(&["*.tmp", "docs/*.md", "Makefile"], &[], false);
        assert!(filter.should_exclude(Path::new("deep/dir/x.tmp"), false));
        assert!(filter.should_exclude(Path::new("docs/intro.md"), false));
        assert!(filter.should_exclude(Path::new("Makefile"), false));
        assert!(!filter.should_exclude(Path::new("README.md"), false));
    }

    #[test]
    fn first_matching_rule_supplies_the_reason() {
        let filter = filter_with(&["*.log"], &[".log"], false);
        assert_eq!(
            filter.exclusion_reason(Path::new("run.log"), false).as_deref(),
            Some("excluded extension .log")
        );
        let reason = filter_with(&["*.log"], &[], false)
            .exclusion_reason(Path::new("run.log"), false)
            .unwrap();
        assert!(reason.contains("*.log"));
    }

    #[test]
    fn root_path_is_never_excluded() {
        let filter = filter_with(&["*"], &[], false);
        assert!(!filter.should_exclude(Path::new(""), true));
    }

    #[test]
    fn invalid_patterns_are_configuration_errors() {
        let mut config = ScanConfig::unfiltered(PathBuf::from("/project"));
        config.exclude_patterns = vec!["[unclosed".to_string()];
        assert!(matches!(PathFilter::new(&config), Err(AppError::Glob(_))));
    }

    #[test]
    fn extensions_are_normalized_from_paths() {
        assert_eq!(normalized_extension(Path::new("a/B.GO")), ".go");
        assert_eq!(normalized_extension(Path::new(".env")), "");
        assert_eq!(normalized_extension(Path::new("Makefile")), "");
    }
}
