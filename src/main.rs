use std::env;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::{info, warn};

use logs_collector::cli::{self, Args, Commands};
use logs_collector::config::{load_items_config, ItemsConfig, Preset};
use logs_collector::constants::STRFTIME_LONG;
use logs_collector::isolation::{worker, IsolatedExecutor};
use logs_collector::logging::{self, LogSink};
use logs_collector::models::CollectionReport;
use logs_collector::orchestrator::Orchestrator;

fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Handle subcommands
    match &args.command {
        // Workers own their logging and exit code
        Some(Commands::Worker { log_sink }) => std::process::exit(worker::run_worker(log_sink.clone())),
        Some(Commands::InitConfig { path, preset }) => {
            logging::initialize_logging(args.verbose, None)?;
            return init_config(path, *preset);
        }
        None => {}
    }

    // Initialize logging
    let sink = LogSink::for_run(
        &env::temp_dir(),
        &format!("{}-logs.{}", args.label, Local::now().format(STRFTIME_LONG)),
    );
    logging::initialize_logging(args.verbose, Some(&sink))?;
    info!("Logging to {}", sink.path().display());

    // Load items and the time window
    let config = load_items_config(args.config.as_deref(), args.preset)?;
    let window = args.time_window()?;

    if !args.yes
        && !cli::user_wants_to_collect(io::stdin().lock(), io::stdout(), &config.items, &window)?
    {
        info!("Collection aborted by user");
        return Ok(());
    }

    let executor = if args.in_process {
        warn!("Running without worker processes; a hung directory cannot be interrupted");
        IsolatedExecutor::in_process()
    } else {
        IsolatedExecutor::current_exe().context("Failed to locate the collector executable")?
    };

    let (report, archive_path) = Orchestrator::new(executor)
        .with_log_sink(sink)
        .run(&args.label, &config.items, &window, args.output.as_deref())
        .context("Collection failed")?;

    print_report(&report);
    println!("Logs collected successfully: {}", archive_path.display());
    Ok(())
}

/// Write a preset out as an editable items file
fn init_config(path: &Path, preset: Option<Preset>) -> Result<()> {
    let preset = preset.unwrap_or_else(Preset::for_current_os);
    info!("Creating {:?} configuration file at {}", preset, path.display());
    let config: ItemsConfig = preset.config();
    config.save_to_yaml_file(path)?;
    info!("Configuration created successfully");
    Ok(())
}

/// Per-item pass/fail table
fn print_report(report: &CollectionReport) {
    println!();
    println!("Collection {} on {}", report.collection_id, report.hostname);
    for item in &report.items {
        let status = if item.is_success() { "ok" } else if item.timed_out { "TIMEOUT" } else { "FAILED" };
        println!("  [{:>7}] {} ({} ms)", status, item.item, item.elapsed_ms);
        if let Some(error) = &item.error {
            println!("            {}", error);
        }
    }
    println!(
        "{} of {} items collected",
        report.succeeded(),
        report.items.len()
    );
}
