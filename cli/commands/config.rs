use anyhow::{Context, Result};
use colored::*;
use ctxscan_core::Config;
use ctxscan_core::config::{DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILENAME};
use std::io::{self, Write};
use std::path::Path;

use crate::cli_args::ConfigArgs;
use crate::output::{write_to_file, write_to_stdout};

pub fn handle_config_command(args: &ConfigArgs, quiet: bool) -> Result<()> {
    let rendered = Config::default()
        .to_toml_string()
        .context("Failed to render default configuration")?;

    if !args.save {
        return write_to_stdout(&rendered);
    }

    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root for config command")?;
    let target = project_root
        .join(DEFAULT_CONFIG_DIR)
        .join(DEFAULT_CONFIG_FILENAME);

    if target.exists() && !args.force && !confirm_overwrite(&target, quiet)? {
        println!("Save cancelled.");
        return Ok(());
    }
    write_to_file(&target, &rendered)?;
    log::info!("Default configuration written to {}", target.display());
    if !quiet {
        println!(
            "{} Default configuration saved to: {}",
            "✅".green(),
            target.display().to_string().blue()
        );
    }
    Ok(())
}

/// Asks before replacing `path`. Quiet mode never overwrites.
pub fn confirm_overwrite(path: &Path, quiet: bool) -> Result<bool> {
    if quiet {
        anyhow::bail!(
            "Target file '{}' exists. Overwrite prevented in quiet mode.",
            path.display()
        );
    }
    print!(
        "{} File already exists at '{}'. Overwrite? [{}/{}] ",
        "⚠️".yellow(),
        path.display().to_string().cyan(),
        "y".green(),
        "N".red()
    );
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut response = String::new();
    io::stdin()
        .read_line(&mut response)
        .context("Failed to read user input")?;
    Ok(response.trim().eq_ignore_ascii_case("y"))
}
