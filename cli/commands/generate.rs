use crate::cli_args::GenerateArgs;
use crate::load_config_for_command;
use crate::output::{write_to_file, write_to_stdout};
use anyhow::{Context, Result, anyhow};
use colored::*;
use ctxscan_core::{
    self as core, AppError, Config, ContextBundle, Progress, ProgressDelivery, RenderOptions,
    ScanResult, Scanner, estimate_cost, render_bundle,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tiktoken_rs::cl100k_base;

const UI_TICK: Duration = Duration::from_millis(50);

/// Everything the scan loop reacts to while the worker runs.
enum UiEvent {
    Progress(Progress),
    Finished(Box<ScanOutcome>),
}

struct ScanOutcome {
    scanner: Scanner,
    result: core::Result<ScanResult>,
}

/// Turns the progress queue and the worker's completion channel into a
/// single stream of `UiEvent`s. Only the newest pending progress event is
/// surfaced per tick.
struct EventPump {
    progress: Option<Receiver<Progress>>,
    done: Receiver<ScanOutcome>,
}

impl EventPump {
    fn next(&self) -> Result<Option<UiEvent>> {
        if let Some(latest) = self.progress.as_ref().and_then(|rx| rx.try_iter().last()) {
            return Ok(Some(UiEvent::Progress(latest)));
        }
        match self.done.recv_timeout(UI_TICK) {
            Ok(outcome) => Ok(Some(UiEvent::Finished(Box::new(outcome)))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("Scan worker stopped without reporting a result"))
            }
        }
    }
}

pub fn handle_generate_command(args: GenerateArgs, quiet: bool) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;
    log::info!("Project root determined: {}", project_root.display());

    let mut config = load_config_for_command(&project_root, &args.project_config, Some(&args.scan))
        .context("Failed to load configuration")?;
    apply_generate_overrides(&mut config, &args);

    let scan_config = config.to_scan_config(&project_root)?;
    let options = config.generate_options()?;
    let render_options = config.render_options()?;

    let show_progress = !quiet && config.progress.enabled;
    let delivery = if show_progress {
        config.progress_delivery()
    } else {
        ProgressDelivery::Disabled
    };
    let mut scanner = Scanner::with_delivery(scan_config, delivery)?;
    scanner.set_options(
        options.max_file_size,
        options.max_total_size,
        options.include_content,
        options.include_summary,
    );

    let (scanner, scan_result) =
        run_scan(scanner, show_progress, args.timeout.map(Duration::from_secs))?;
    let result = scan_result.context("Scan failed")?;
    if scanner.dropped_progress_events() > 0 {
        log::debug!(
            "{} progress events dropped while the display was busy.",
            scanner.dropped_progress_events()
        );
    }

    let project_name = config.get_effective_project_name(&project_root);
    let bundle = scanner
        .generate_context(Some(&result), &project_name)
        .context("Failed to generate context bundle")?;
    let rendered = render_bundle(&bundle, render_options)?;

    let tokens = if args.exact_tokens {
        count_tokens_exact(&rendered)?
    } else {
        bundle.token_estimate
    };

    if let Some(cli_dir) = &args.save {
        let path = save_path(&config, cli_dir.as_deref(), &project_root, render_options);
        write_to_file(&path, &rendered)?;
        log::info!("Context saved to {}", path.display());
        if !quiet {
            eprintln!(
                "{} Context saved to: {}",
                "✅".green(),
                path.display().to_string().blue()
            );
        }
    }
    if writes_to_stdout(&args) {
        write_to_stdout(&rendered)?;
    }

    if !quiet {
        print_estimate(&bundle, tokens, args.exact_tokens, config.pricing.price_per_thousand);
    }
    Ok(())
}

/// Stdout is the default destination; `--save` replaces it unless `--stdout`
/// asks for both.
fn writes_to_stdout(args: &GenerateArgs) -> bool {
    args.stdout || args.save.is_none()
}

fn apply_generate_overrides(config: &mut Config, args: &GenerateArgs) {
    log::trace!("Applying generate command CLI overrides to config...");
    if let Some(size) = &args.content_max_file_size {
        config.generate.max_file_size = size.clone();
    }
    if let Some(size) = &args.content_budget {
        config.generate.max_total_size = size.clone();
    }
    if args.no_content {
        config.generate.include_content = false;
    }
    if args.no_summary {
        config.generate.include_summary = false;
    }
    if let Some(format) = &args.format {
        config.output.format = format.clone();
    }
    if args.json_minify {
        config.output.json_minify = true;
    }
    if args.no_timestamp {
        config.output.include_timestamp = false;
    }
    if let Some(price) = args.price_per_thousand {
        config.pricing.price_per_thousand = price;
    }
    if args.no_progress {
        config.progress.enabled = false;
    }
}

/// Runs the scan on a worker thread while this thread drives the progress
/// bar and enforces the optional timeout through the cancel token.
fn run_scan(
    mut scanner: Scanner,
    show_progress: bool,
    timeout: Option<Duration>,
) -> Result<(Scanner, core::Result<ScanResult>)> {
    let progress = scanner.progress_receiver();
    let cancel = scanner.cancel_token();
    let (done_tx, done_rx) = mpsc::channel();
    let worker = thread::Builder::new()
        .name("ctxscan-scan".to_string())
        .spawn(move || {
            let result = scanner.scan();
            let _ = done_tx.send(ScanOutcome { scanner, result });
        })
        .context("Failed to start scan worker")?;

    let pump = EventPump {
        progress,
        done: done_rx,
    };
    let bar = progress_bar(show_progress);
    let started = Instant::now();

    let outcome = loop {
        if let Some(limit) = timeout {
            if started.elapsed() > limit && !cancel.is_cancelled() {
                log::warn!("Scan exceeded {:?}; cancelling.", limit);
                cancel.cancel();
            }
        }
        match pump.next()? {
            None => {}
            Some(UiEvent::Progress(progress)) => update_bar(&bar, &progress),
            Some(UiEvent::Finished(outcome)) => break outcome,
        }
    };
    bar.finish_and_clear();
    worker
        .join()
        .map_err(|_| anyhow!("Scan worker panicked"))?;

    let ScanOutcome { scanner, result } = *outcome;
    Ok((scanner, result))
}

fn progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn update_bar(bar: &ProgressBar, progress: &Progress) {
    // The estimate is capped, so the real count can run past it.
    bar.set_length(progress.estimated_total.max(progress.processed) as u64);
    bar.set_position(progress.processed as u64);
    let name = progress
        .current_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    bar.set_message(format!("{} {}", progress.phase, name));
}

fn count_tokens_exact(text: &str) -> Result<usize> {
    let bpe = cl100k_base().map_err(|e| anyhow!(AppError::TikToken(e.to_string())))?;
    Ok(bpe.encode_ordinary(text).len())
}

fn save_path(
    config: &Config,
    cli_dir: Option<&Path>,
    project_root: &Path,
    render_options: RenderOptions,
) -> PathBuf {
    let dir = cli_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.save.output_dir.clone());
    let dir = if dir.is_absolute() {
        dir
    } else {
        project_root.join(dir)
    };
    let base = config
        .save
        .filename_base
        .clone()
        .unwrap_or_else(|| config.get_effective_project_name(project_root));
    let extension = config
        .save
        .extension
        .as_deref()
        .unwrap_or_else(|| render_options.format.extension());
    dir.join(format!("{}_context.{}", base, extension.trim_start_matches('.')))
}

fn print_estimate(bundle: &ContextBundle, tokens: usize, exact: bool, price_per_thousand: f64) {
    let kind = if exact { "cl100k" } else { "estimated" };
    eprintln!(
        "{} {} files, {} sections, {} tokens ({}), cost ~${:.4} at ${}/1K tokens",
        "ℹ".blue(),
        bundle.total_files,
        bundle.sections.len(),
        tokens.to_string().cyan(),
        kind,
        estimate_cost(tokens, price_per_thousand),
        price_per_thousand
    );
}
