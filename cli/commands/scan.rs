use anyhow::{Context, Result};
use ctxscan_core::output_formats::{serialize_to_json, serialize_to_yaml};
use ctxscan_core::{Config, ProgressDelivery, Scanner};

use crate::cli_args::ScanArgs;
use crate::load_config_for_command;
use crate::output::{Theme, print_scan_summary, write_to_stdout};

pub fn handle_scan_command(args: ScanArgs, quiet: bool) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;
    log::info!("Project root determined: {}", project_root.display());

    let config = load_config_for_command(&project_root, &args.project_config, Some(&args.scan))
        .context("Failed to load configuration for scan command")?;
    let scan_config = config.to_scan_config(&project_root)?;

    let scanner = Scanner::with_delivery(scan_config, ProgressDelivery::Disabled)?;
    let result = scanner.scan().context("Scan failed")?;

    match args.format.as_deref() {
        Some("json") => write_to_stdout(&serialize_to_json(&result, true)?),
        Some("yaml") => write_to_stdout(&serialize_to_yaml(&result)?),
        _ => {
            if !quiet {
                print_scan_summary(&result, args.top, args.show_excluded, &Theme::for_stdout());
            }
            Ok(())
        }
    }
}
