mod cli_args;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use std::path::Path;
use std::process;

use cli_args::{Cli, Commands, ProjectConfigOpts, ScanOpts};
use ctxscan_core::{AppError, Config};

fn main() {
    let cli_args = Cli::parse();

    setup_logging(cli_args.quiet, cli_args.verbose);

    let quiet = cli_args.quiet;
    log::debug!("CLI args parsed: {:?}", cli_args);

    let exit_code = match run_app(cli_args, quiet) {
        Ok(_) => {
            log::info!("Application finished successfully.");
            0
        }
        Err(e) => {
            let exit_code = exit_code_for(&e);
            if !quiet || exit_code == 1 {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
            } else {
                log::error!("Application failed: {:#}", e);
            }
            exit_code
        }
    };
    log::debug!("Exiting with code {}", exit_code);
    process::exit(exit_code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<AppError>() {
        Some(AppError::Config(_))
        | Some(AppError::TomlParse(_))
        | Some(AppError::TomlSerialize(_))
        | Some(AppError::Glob(_))
        | Some(AppError::SizeParse(_))
        | Some(AppError::InvalidArgument(_))
        | Some(AppError::InvalidRoot { .. }) => 1,
        Some(AppError::Io(_))
        | Some(AppError::FileRead { .. })
        | Some(AppError::FileWrite { .. })
        | Some(AppError::DirRead { .. })
        | Some(AppError::Traversal { .. }) => 2,
        Some(AppError::Cancelled) => 3,
        Some(AppError::JsonSerialize(_))
        | Some(AppError::YamlError(_))
        | Some(AppError::XmlSerialize(_)) => 6,
        Some(AppError::TikToken(_)) => 8,
        Some(_) => 1,
        None => 1,
    }
}

fn setup_logging(quiet: bool, verbose: u8) {
    let log_level = if quiet {
        log::LevelFilter::Off
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    log::trace!("Logger initialized with level: {:?}", log_level);
}

fn run_app(cli: Cli, quiet: bool) -> Result<()> {
    match cli.command {
        None => {
            Cli::command().print_help()?;
        }
        Some(command) => match command {
            Commands::Completion(args) => {
                log::debug!("Executing 'completion' command...");
                commands::completion::handle_completion_command(&args, quiet)?;
            }
            Commands::Config(args) => {
                log::debug!("Executing 'config' command...");
                commands::config::handle_config_command(&args, quiet)?;
            }
            Commands::Generate(args) => {
                log::debug!("Executing 'generate' command...");
                commands::generate::handle_generate_command(args, quiet)?;
            }
            Commands::Scan(args) => {
                log::debug!("Executing 'scan' command...");
                commands::scan::handle_scan_command(args, quiet)?;
            }
            Commands::Tree(args) => {
                log::debug!("Executing 'tree' command...");
                commands::tree::handle_tree_command(args, quiet)?;
            }
        },
    }
    Ok(())
}

fn apply_scan_overrides(config: &mut Config, scan: &ScanOpts) {
    log::trace!("Applying scan CLI overrides to config...");
    if scan.no_default_excludes {
        config.scan.exclude_patterns.clear();
        config.scan.exclude_extensions.clear();
    }
    config.scan.exclude_patterns.extend(scan.exclude.iter().cloned());
    config
        .scan
        .exclude_extensions
        .extend(scan.exclude_ext.iter().cloned());
    if let Some(size) = &scan.max_file_size {
        config.scan.max_file_size = size.clone();
    }
    if let Some(depth) = scan.max_depth {
        config.scan.max_depth = depth;
    }
    if scan.hidden {
        config.scan.include_hidden = true;
    }
    if scan.follow_symlinks {
        config.scan.follow_symlinks = true;
    }
}

/// Loads the config file (if any) for `project_root` and applies the shared
/// CLI overrides.
pub fn load_config_for_command(
    project_root: &Path,
    project_opts: &ProjectConfigOpts,
    scan_opts: Option<&ScanOpts>,
) -> Result<Config> {
    let config_path = Config::resolve_config_path(
        project_root,
        project_opts.config_file.as_ref(),
        project_opts.disable_config_file,
    )
    .context("Failed to resolve configuration path")?;

    let mut config = match &config_path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(name) = &project_opts.project_name {
        config.general.project_name = Some(name.clone());
    }
    if let Some(scan) = scan_opts {
        apply_scan_overrides(&mut config, scan);
    }

    config.general.project_name = Some(config.get_effective_project_name(project_root));
    log::trace!("Config after CLI overrides: {:?}", config);
    Ok(config)
}
