//! Fos subcommand - harvest fields of study as JSON lines

use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use magline_core::{SharedProgress, fmt_num};
use magline_mag::{Selector, fields_of_study};

use super::{JsonLines, drain, print_summary, query_client};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct FosArgs {
    /// Field-of-study identifiers (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub ids: Option<Vec<i64>>,

    /// Hierarchy levels 0-5 (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub levels: Option<Vec<i64>>,

    /// Stop each expression after this many results
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Returns `false` when interrupted.
pub fn run(args: FosArgs, config: &Config, progress: &SharedProgress) -> Result<bool> {
    // Selector problems are reported before a client is even built
    let selector = Selector::from_parts(args.ids, args.levels)?;
    let harvest_config = config.harvest_config(args.limit);
    harvest_config.validate()?;

    let client = query_client(config)?;
    let out: Box<dyn Write> = match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    let mut sink = JsonLines::new(out);

    log::info!(
        "Harvesting fields of study by {} ({} values)",
        selector.attribute(),
        match &selector {
            Selector::Ids(v) | Selector::Levels(v) => v.len(),
        }
    );
    let start = Instant::now();
    let mut harvest = fields_of_study(
        &client,
        selector,
        config.remap.fields_of_study.clone(),
        &harvest_config,
    )?;
    let bar = progress.harvest_line("fos");
    let completed = drain(&mut harvest, &bar, |record| sink.write(&record));
    bar.finish_and_clear();
    let records = sink.finish()?;
    let completed = completed?;

    let stats = harvest.stats();
    print_summary(
        progress,
        "Fields of study",
        &[
            ("Records", fmt_num(records)),
            ("Expressions", fmt_num(stats.expressions)),
            ("Pages", fmt_num(stats.pages)),
            (
                "Output",
                args.output
                    .as_ref()
                    .map_or("stdout".to_string(), |p| p.display().to_string()),
            ),
            ("Elapsed", format!("{:.1}s", start.elapsed().as_secs_f64())),
        ],
    );
    Ok(completed)
}
