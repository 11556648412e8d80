use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct ProjectConfigOpts {
    #[arg(
        short = 'r',
        long,
        help = "Project directory to scan (default: current dir).",
        help_heading = "Project Setup",
        value_name = "PATH"
    )]
    pub project_root: Option<PathBuf>,

    #[arg(
        long,
        help = "Path of the TOML config file (default: .ctxscan/ctxscan.toml).",
        value_name = "CONFIG_FILE",
        conflicts_with = "disable_config_file",
        help_heading = "Project Setup"
    )]
    pub config_file: Option<String>,

    #[arg(
        long,
        help = "Do not load any TOML config file.",
        conflicts_with = "config_file",
        help_heading = "Project Setup"
    )]
    pub disable_config_file: bool,

    #[arg(
        long,
        help = "Project name (overrides config/dir name).",
        value_name = "NAME",
        help_heading = "Project Setup"
    )]
    pub project_name: Option<String>,
}

/// Overrides for the `[scan]` config section.
#[derive(Args, Debug, Clone, Default)]
pub struct ScanOpts {
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append, help = "Add an exclude glob (e.g. 'tmp/**', '*.log').", help_heading = "Scan Rules")]
    pub exclude: Vec<String>,

    #[arg(long = "exclude-ext", value_name = "EXT", action = clap::ArgAction::Append, help = "Add an excluded extension (e.g. 'log', '.csv').", help_heading = "Scan Rules")]
    pub exclude_ext: Vec<String>,

    #[arg(
        long,
        help = "Drop the built-in exclusion rules before applying --exclude/--exclude-ext.",
        help_heading = "Scan Rules"
    )]
    pub no_default_excludes: bool,

    #[arg(
        long,
        value_name = "SIZE",
        help = "Skip files larger than this during the scan (e.g. '10MiB').",
        help_heading = "Scan Rules"
    )]
    pub max_file_size: Option<String>,

    #[arg(
        long,
        value_name = "N",
        help = "Maximum directory depth (0 = unlimited).",
        help_heading = "Scan Rules"
    )]
    pub max_depth: Option<usize>,

    #[arg(long, help = "Include hidden files and directories.", help_heading = "Scan Rules")]
    pub hidden: bool,

    #[arg(long, help = "Follow symbolic links.", help_heading = "Scan Rules")]
    pub follow_symlinks: bool,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Scan a project and build a bounded context bundle for AI models.",
    long_about = "ctxscan walks a project directory under exclusion rules, selects the most relevant \nfile content within a size budget and renders it as a multi-section context document \n(Markdown, JSON, YAML or XML) with a token estimate.",
    help_template = "{about-section}\nUsage: {usage}\n\n{all-args}{after-help}",
    after_help = "EXAMPLES:\n  ctxscan generate --format json --save\n  ctxscan scan --format yaml\n  ctxscan tree --expand src --sort size",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase message verbosity (-v, -vv).")]
    pub verbose: u8,

    #[arg(
        short,
        long,
        global = true,
        help = "Silence informational messages, progress and warnings."
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    #[command(
        visible_alias = "g",
        about = "Scan the project and generate a context bundle."
    )]
    Generate(GenerateArgs),

    #[command(visible_alias = "s", about = "Scan the project and show statistics.")]
    Scan(ScanArgs),

    #[command(
        visible_alias = "t",
        about = "Show the folder tree with per-directory statistics."
    )]
    Tree(TreeArgs),

    #[command(about = "Generate or save shell completion scripts.")]
    Completion(CompletionArgs),

    #[command(about = "Show or save the default configuration file.")]
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub scan: ScanOpts,

    #[arg(
        long,
        value_name = "SIZE",
        help = "Largest single file embedded as content (e.g. '512KiB').",
        help_heading = "Content"
    )]
    pub content_max_file_size: Option<String>,

    #[arg(
        long,
        value_name = "SIZE",
        help = "Total budget for embedded file content (e.g. '2MiB').",
        help_heading = "Content"
    )]
    pub content_budget: Option<String>,

    #[arg(long, help = "Omit file content sections.", help_heading = "Content")]
    pub no_content: bool,

    #[arg(long, help = "Omit the summary paragraph.", help_heading = "Content")]
    pub no_summary: bool,

    #[arg(short = 'f', long, value_name = "FORMAT", value_parser = ["markdown", "md", "json", "yaml", "yml", "xml"], help = "Output format [default: markdown].", help_heading = "Output")]
    pub format: Option<String>,

    #[arg(
        long,
        help = "Emit compact JSON instead of pretty-printed JSON.",
        help_heading = "Output"
    )]
    pub json_minify: bool,

    #[arg(long, help = "Leave the generation timestamp out of Markdown output.", help_heading = "Output")]
    pub no_timestamp: bool,

    #[arg(
        long,
        help = "Write the bundle to standard output. Default unless --save is given; with --save, writes both.",
        help_heading = "Output"
    )]
    pub stdout: bool,

    #[arg(
        short = 's', long, value_name = "SAVE_DIR",
        num_args = 0..=1,
        help_heading = "Output",
        help = "Save the bundle. Optional SAVE_DIR overrides the configured directory.",
    )]
    pub save: Option<Option<PathBuf>>,

    #[arg(
        long,
        help = "Count tokens with the cl100k tokenizer instead of estimating.",
        help_heading = "Estimates"
    )]
    pub exact_tokens: bool,

    #[arg(
        long,
        value_name = "PRICE",
        help = "Price per 1000 tokens used for the cost estimate.",
        help_heading = "Estimates"
    )]
    pub price_per_thousand: Option<f64>,

    #[arg(long, help = "Disable the scan progress bar.", help_heading = "Progress")]
    pub no_progress: bool,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Cancel the scan if it runs longer than this.",
        help_heading = "Progress"
    )]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub scan: ScanOpts,

    #[arg(short = 'f', long, value_name = "FORMAT", value_parser = ["table", "json", "yaml"], help = "Output format [default: table].")]
    pub format: Option<String>,

    #[arg(long, value_name = "N", default_value_t = 10, help = "Rows shown in the extension table.")]
    pub top: usize,

    #[arg(long, help = "List excluded entries with their reasons.")]
    pub show_excluded: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[clap(flatten)]
    pub scan: ScanOpts,

    #[arg(long, value_name = "PATH", num_args = 1.., help = "Expand these directories (relative to the root).")]
    pub expand: Vec<PathBuf>,

    #[arg(long, value_name = "N", help = "Expand every directory down to depth N.")]
    pub depth: Option<usize>,

    #[arg(long, value_name = "SORT", value_parser = ["name", "size", "modified", "extension"], default_value = "name", help = "Sort order for entries.")]
    pub sort: String,

    #[arg(long, help = "Show hidden files and directories.")]
    pub show_hidden: bool,

    #[arg(long, help = "Only list directories.")]
    pub dirs_only: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    #[arg(
        long,
        value_name = "SHELL",
        help = "Shell to generate completions for (fish, bash, zsh) [default: fish]"
    )]
    pub shell: Option<String>,
    #[arg(
        long,
        help = "Save completion script to default location (prompts overwrite)."
    )]
    pub save: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[clap(flatten)]
    pub project_config: ProjectConfigOpts,
    #[arg(
        long,
        help = "Save the default config to .ctxscan/ctxscan.toml (prompts overwrite)."
    )]
    pub save: bool,
    #[arg(long, help = "Overwrite an existing config file without asking.", requires = "save")]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_flags_parse() {
        let cli = Cli::parse_from([
            "ctxscan",
            "-v",
            "g",
            "--exclude",
            "tmp/**",
            "--exclude",
            "*.log",
            "--content-budget",
            "10KiB",
            "--format",
            "json",
            "--save",
            "--exact-tokens",
        ]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Some(Commands::Generate(args)) => {
                assert_eq!(args.scan.exclude, vec!["tmp/**", "*.log"]);
                assert_eq!(args.content_budget.as_deref(), Some("10KiB"));
                assert_eq!(args.format.as_deref(), Some("json"));
                assert!(matches!(args.save, Some(None)));
                assert!(args.exact_tokens);
            }
            other => panic!("expected generate command, got {:?}", other),
        }
    }

    #[test]
    fn stdout_combines_with_save() {
        let cli = Cli::parse_from(["ctxscan", "generate", "--stdout", "--save", "out"]);
        match cli.command {
            Some(Commands::Generate(args)) => {
                assert!(args.stdout);
                assert_eq!(args.save, Some(Some(PathBuf::from("out"))));
            }
            other => panic!("expected generate command, got {:?}", other),
        }
    }

    #[test]
    fn tree_accepts_multiple_expand_paths() {
        let cli = Cli::parse_from(["ctxscan", "tree", "--expand", "src", "docs", "--sort", "size"]);
        match cli.command {
            Some(Commands::Tree(args)) => {
                assert_eq!(args.expand, vec![PathBuf::from("src"), PathBuf::from("docs")]);
                assert_eq!(args.sort, "size");
            }
            other => panic!("expected tree command, got {:?}", other),
        }
    }
}
