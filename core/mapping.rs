// Lookup tables keyed by lower-case extension (with leading dot) or file name.
// Extensions here use the same normalized form as `FileRecord::extension`.

/// Extensions ranked for content selection and section ordering.
/// Earlier entries rank higher.
pub const PRIORITY_EXTENSIONS: &[&str] = &[
    ".go", ".rs", ".py", ".js", ".ts", ".tsx", ".jsx", ".java", ".kt", ".c", ".cpp", ".h",
    ".hpp", ".cs", ".rb", ".php", ".swift", ".md", ".toml", ".yaml", ".yml", ".json", ".sql",
    ".sh",
];

/// Substrings of a lower-cased file name that mark a file as a likely entry
/// point or project descriptor.
pub const IMPORTANT_KEYWORDS: &[&str] = &[
    "readme",
    "main",
    "index",
    "app",
    "config",
    "package",
    "makefile",
    "dockerfile",
    "docker-compose",
];

/// Position of `extension` in `PRIORITY_EXTENSIONS`, if listed.
pub fn priority_rank(extension: &str) -> Option<usize> {
    PRIORITY_EXTENSIONS
        .iter()
        .position(|candidate| *candidate == extension)
}

pub fn is_important_name(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    IMPORTANT_KEYWORDS
        .iter()
        .any(|keyword| lower.contains(keyword))
}

// Maps a normalized extension to the language tag used on fenced code blocks.
pub fn language_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        ".go" => Some("go"),
        ".rs" => Some("rust"),
        ".py" => Some("python"),
        ".js" | ".mjs" | ".cjs" => Some("javascript"),
        ".jsx" => Some("jsx"),
        ".ts" => Some("typescript"),
        ".tsx" => Some("tsx"),
        ".java" => Some("java"),
        ".kt" | ".kts" => Some("kotlin"),
        ".scala" => Some("scala"),
        ".c" => Some("c"),
        ".h" => Some("c"),
        ".cpp" | ".cc" | ".cxx" | ".hpp" => Some("cpp"),
        ".cs" => Some("csharp"),
        ".rb" => Some("ruby"),
        ".php" => Some("php"),
        ".swift" => Some("swift"),
        ".lua" => Some("lua"),
        ".r" => Some("r"),
        ".dart" => Some("dart"),
        ".hs" => Some("haskell"),
        ".ex" | ".exs" => Some("elixir"),
        ".sh" | ".bash" | ".zsh" => Some("bash"),
        ".ps1" => Some("powershell"),
        ".sql" => Some("sql"),
        ".html" | ".htm" => Some("html"),
        ".css" => Some("css"),
        ".scss" => Some("scss"),
        ".vue" => Some("vue"),
        ".xml" => Some("xml"),
        ".json" => Some("json"),
        ".yaml" | ".yml" => Some("yaml"),
        ".toml" => Some("toml"),
        ".ini" | ".cfg" => Some("ini"),
        ".md" | ".markdown" => Some("markdown"),
        ".proto" => Some("protobuf"),
        ".graphql" | ".gql" => Some("graphql"),
        ".dockerfile" => Some("dockerfile"),
        ".mk" => Some("makefile"),
        _ => None,
    }
}

/// Whether files with this extension are worth embedding as text.
/// Extension-less files count as text when their name is a known build or
/// container descriptor.
pub fn is_text_type(extension: &str, file_name: &str) -> bool {
    if language_for_extension(extension).is_some() {
        return true;
    }
    match extension {
        ".txt" | ".rst" | ".adoc" | ".org" | ".csv" | ".tsv" | ".env" | ".conf" | ".properties"
        | ".gradle" | ".lock" | ".gitignore" | ".editorconfig" | ".tf" | ".nix" => true,
        "" => {
            let lower = file_name.to_lowercase();
            matches!(
                lower.as_str(),
                "makefile" | "dockerfile" | "gemfile" | "rakefile" | "procfile" | "license"
                    | "readme" | "justfile"
            )
        }
        _ => false,
    }
}

/// Normalizes user-provided extensions ("LOG", ".log", "log") to ".log".
pub fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.is_empty() || trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_rank_follows_list_order() {
        assert_eq!(priority_rank(".go"), Some(0));
        assert!(priority_rank(".rs") < priority_rank(".md"));
        assert_eq!(priority_rank(".png"), None);
    }

    #[test]
    fn important_names_are_case_insensitive() {
        assert!(is_important_name("README.md"));
        assert!(is_important_name("docker-compose.yml"));
        assert!(is_important_name("Makefile"));
        assert!(!is_important_name("util.rs"));
    }

    #[test]
    fn text_type_covers_known_languages_and_descriptors() {
        assert!(is_text_type(".rs", "lib.rs"));
        assert!(is_text_type(".txt", "notes.txt"));
        assert!(is_text_type("", "Dockerfile"));
        assert!(!is_text_type(".png", "logo.png"));
        assert!(!is_text_type("", "random_binary"));
    }

    #[test]
    fn extensions_are_normalized() {
        assert_eq!(normalize_extension("LOG"), ".log");
        assert_eq!(normalize_extension(".Md"), ".md");
        assert_eq!(normalize_extension("  "), "");
    }
}
