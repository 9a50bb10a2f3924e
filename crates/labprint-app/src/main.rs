// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Labprint: print-job pipeline front end.
//
// Entry point. Initialises logging, loads configuration (file, then
// LABPRINT_* environment overrides), builds the pipeline and runs one
// command.

mod paths;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use labprint_core::error::{Result, error_chain};
use labprint_core::human_errors::humanize_error;
use labprint_core::types::{ColorMode, DuplexMode, JobStatusView, PaperSize, PrintOptions};
use labprint_core::{LabprintError, PipelineConfig};
use labprint_print::PrintPipeline;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "labprint", version, about = "Queue documents for printing with conversion and fallback rendering.")]
struct Cli {
    /// Path to a JSON config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed printers as JSON
    Printers,
    /// Check whether a printer name may be used
    Validate { name: String },
    /// Submit a document and follow it to completion
    Print(PrintArgs),
    /// Show recent print-log entries
    Log {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(clap::Args, Debug)]
struct PrintArgs {
    file: PathBuf,
    #[arg(long)]
    printer: Option<String>,
    #[arg(long, default_value_t = 1)]
    copies: u32,
    /// one-sided, two-sided-long-edge or two-sided-short-edge
    #[arg(long, value_parser = parse_duplex, default_value = "one-sided")]
    duplex: DuplexMode,
    /// color or grayscale
    #[arg(long, value_parser = parse_color, default_value = "color")]
    color: ColorMode,
    #[arg(long, value_parser = parse_paper, default_value = "A4")]
    paper: PaperSize,
    /// Page selection such as "1-3,7"
    #[arg(long)]
    pages: Option<String>,
    /// Return after submission instead of waiting for the result
    #[arg(long)]
    no_wait: bool,
}

fn parse_duplex(s: &str) -> std::result::Result<DuplexMode, String> {
    DuplexMode::from_keyword(s).ok_or_else(|| format!("unknown duplex mode {s:?}"))
}

fn parse_color(s: &str) -> std::result::Result<ColorMode, String> {
    ColorMode::from_keyword(s).ok_or_else(|| format!("unknown color mode {s:?}"))
}

fn parse_paper(s: &str) -> std::result::Result<PaperSize, String> {
    PaperSize::from_keyword(s).ok_or_else(|| format!("unknown paper size {s:?}"))
}

/// `RUST_LOG` wins; otherwise the config's debug flag picks the level.
fn default_filter(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

fn init_tracing(debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter(debug))),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match load_config(cli.config.clone()) {
        Ok(config) => {
            init_tracing(config.debug);
            run(config, cli.command)
        }
        Err(e) => {
            init_tracing(false);
            Err(e)
        }
    };
    match outcome {
        Ok(code) => code,
        Err(e) => {
            let human = humanize_error(&e);
            eprintln!("error: {}", human.message);
            if !human.suggestion.is_empty() {
                eprintln!("hint: {}", human.suggestion);
            }
            debug!(error = %error_chain(&e), "command failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    let path = path.unwrap_or_else(paths::default_config_path);
    let mut config = PipelineConfig::load(&path)?;
    config.apply_process_env();
    Ok(config)
}

fn run(config: PipelineConfig, command: Command) -> Result<ExitCode> {
    debug!(work_dir = %config.work_dir.display(), "configuration loaded");
    let pipeline = PrintPipeline::from_config(config)?;

    match command {
        Command::Printers => {
            let printers = pipeline.list_printers()?;
            println!("{}", serde_json::to_string_pretty(&printers)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { name } => {
            let ok = pipeline.validate_printer_name(&name);
            println!("{}", if ok { "valid" } else { "invalid" });
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Log { limit } => {
            let log = pipeline.print_log().ok_or_else(|| {
                LabprintError::Config("print_log_path is not set; no print log is kept".into())
            })?;
            println!("{}", serde_json::to_string_pretty(&log.recent_entries(limit)?)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Print(args) => print(&pipeline, args),
    }
}

fn print(pipeline: &PrintPipeline, args: PrintArgs) -> Result<ExitCode> {
    let options = PrintOptions {
        copies: args.copies,
        duplex: args.duplex,
        color: args.color,
        paper: args.paper,
        printer: args.printer.unwrap_or_default(),
        page_range: args.pages.unwrap_or_default(),
    };
    options.validate_copies()?;
    if !options.printer.is_empty() && !pipeline.validate_printer_name(&options.printer) {
        return Err(LabprintError::InvalidPrinter(options.printer));
    }

    let (staged, name) = paths::stage_upload(&args.file, &pipeline.config().upload_dir)?;
    pipeline.start()?;
    let id = match pipeline.submit(staged.clone(), options, &name) {
        Ok(id) => id,
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            return Err(e);
        }
    };
    info!(job_id = %id, file = %name, "submitted");
    println!("{id}");
    if args.no_wait {
        return Ok(ExitCode::SUCCESS);
    }

    let mut last: Option<(u8, String)> = None;
    let view = loop {
        let Some(view) = pipeline.get_status(&id) else {
            return Err(LabprintError::InvalidOptions(format!("job {id} disappeared")));
        };
        let current = (view.progress, view.message.clone());
        if last.as_ref() != Some(&current) {
            eprintln!("[{:>3}%] {}", view.progress, view.message);
            last = Some(current);
        }
        if view.state.is_terminal() {
            break view;
        }
        std::thread::sleep(Duration::from_millis(250));
    };
    pipeline.shutdown();
    report(&view)
}

fn report(view: &JobStatusView) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(view)?);
    Ok(if view.result.is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
