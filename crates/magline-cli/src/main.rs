//! magline - harvest entities from the Microsoft Academic Graph
//!
//! Packs id/phrase/level lists into bounded query expressions, pages through
//! every expression with retries, and writes remapped records as JSON lines.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "magline")]
#[command(about = "Harvest fields of study and papers from the Microsoft Academic Graph")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./magline.toml or ~/.config/magline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Attempts per request, the first one included
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Upper bound on query expression length in characters
    #[arg(long, global = true)]
    max_expression_len: Option<usize>,

    /// Entities requested per page
    #[arg(long, global = true)]
    page_size: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest fields of study by id or by level
    Fos(cmd::fos::FosArgs),
    /// Harvest papers matching phrases into per-table JSONL files
    Papers(cmd::papers::PapersArgs),
    /// Fetch a handful of entities by id
    Lookup(cmd::lookup::LookupArgs),
    /// Show current configuration
    Config,
}

/// First SIGINT/SIGTERM asks the running harvest to stop after the current
/// record; a second one exits immediately.
fn register_signal_handlers() -> Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        // SAFETY: the handler only touches an atomic and may call exit
        let registered = unsafe {
            signal_hook::low_level::register(signal, || {
                if magline_core::request_shutdown() {
                    std::process::exit(130);
                }
            })
        };
        registered.with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(magline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, the spinner shows activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    magline_core::init_logging(quiet, cli.debug, multi);

    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // CLI flags override config file values
    if let Some(n) = cli.max_attempts {
        config.http.max_attempts = n;
    }
    if let Some(secs) = cli.timeout {
        config.http.timeout = secs;
    }
    if let Some(len) = cli.max_expression_len {
        config.harvest.max_expression_len = len;
    }
    if let Some(size) = cli.page_size {
        config.harvest.page_size = size;
    }

    register_signal_handlers()?;

    let completed = match cli.command {
        Command::Fos(args) => cmd::fos::run(args, &config, &progress)?,
        Command::Papers(args) => cmd::papers::run(args, &config, &progress)?,
        Command::Lookup(args) => {
            cmd::lookup::run(args, &config)?;
            true
        }
        Command::Config => {
            show_config(&config);
            true
        }
    };

    if !completed || magline_core::is_shutdown_requested() {
        log::warn!("Interrupted");
        std::process::exit(130);
    }
    Ok(())
}

fn show_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec!["Endpoint", &config.mag.endpoint]);
    table.add_row(vec![
        "Subscription key",
        if config.mag.subscription_key.is_some() {
            "configured"
        } else {
            "not set"
        },
    ]);
    table.add_row(vec![
        "Timeout",
        &format!(
            "{}s (connect: {}s)",
            config.http.timeout, config.http.connect_timeout
        ),
    ]);
    table.add_row(vec!["Max attempts", &config.http.max_attempts.to_string()]);
    table.add_row(vec![
        "Backoff",
        &format!(
            "{}ms..{}ms{}",
            config.http.backoff_base_ms,
            config.http.backoff_max_ms,
            if config.http.jitter { " + jitter" } else { "" }
        ),
    ]);
    table.add_row(vec!["Retry", &format!("{:?}", config.http.retry)]);
    table.add_row(vec![
        "Max expression length",
        &magline_core::fmt_num(config.harvest.max_expression_len),
    ]);
    table.add_row(vec!["Page size", &config.harvest.page_size.to_string()]);
    table.add_row(vec![
        "Output directory",
        &config.output.default_dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Fields-of-study remap",
        &format!(
            "{} dropped, {} renamed, {} compacted",
            config.remap.fields_of_study.drop.len(),
            config.remap.fields_of_study.rename.len(),
            config.remap.fields_of_study.compact.len()
        ),
    ]);
    table.add_row(vec![
        "Papers remap",
        &format!(
            "{} dropped, {} renamed",
            config.remap.papers.drop.len(),
            config.remap.papers.rename.len()
        ),
    ]);

    eprintln!("\n{table}");
}
