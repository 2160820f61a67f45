//! Lookup subcommand - fetch a few entities by id in one call

use std::io::BufWriter;

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};

use magline_mag::{FIELD_OF_STUDY_ATTRIBUTES, PAPER_ATTRIBUTES, fetch_by_ids};

use super::{JsonLines, query_client};
use crate::config::Config;

/// Ids above this need a paginated harvest instead
const MAX_LOOKUP_IDS: usize = 1_000;

#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Entity identifiers (comma-separated)
    #[arg(long, required = true, value_delimiter = ',')]
    pub ids: Vec<i64>,

    /// Entity type, selects the attribute list and remapping
    #[arg(short, long, value_enum, default_value = "fos")]
    pub entity: LookupEntity,

    /// Attributes to request instead of the entity defaults (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub attributes: Option<Vec<String>>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum LookupEntity {
    Fos,
    Paper,
}

pub fn run(args: LookupArgs, config: &Config) -> Result<()> {
    if args.ids.len() > MAX_LOOKUP_IDS {
        bail!(
            "{} ids requested, lookup takes at most {MAX_LOOKUP_IDS}; use `fos --ids`",
            args.ids.len()
        );
    }
    let (defaults, remap) = match args.entity {
        LookupEntity::Fos => (FIELD_OF_STUDY_ATTRIBUTES, &config.remap.fields_of_study),
        LookupEntity::Paper => (PAPER_ATTRIBUTES, &config.remap.papers),
    };
    let attributes: Vec<String> = args
        .attributes
        .unwrap_or_else(|| defaults.iter().map(|a| a.to_string()).collect());

    let client = query_client(config)?;
    let records = fetch_by_ids(&client, &args.ids, &attributes, remap)?;
    log::info!("{} of {} ids found", records.len(), args.ids.len());

    let mut out = JsonLines::new(BufWriter::new(std::io::stdout().lock()));
    for record in &records {
        out.write(record)?;
    }
    out.finish()?;
    Ok(())
}
