//! Papers subcommand - harvest papers and write one JSONL file per table

use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::Args;

use magline_core::{SharedProgress, fmt_num};
use magline_mag::{
    DateRange, ExpressionBuilder, PAPER_ATTRIBUTES, PaperRows, harvest, normalize_paper,
};

use super::{JsonLines, drain, print_summary, query_client};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct PapersArgs {
    /// Phrases to match (comma-separated)
    #[arg(long, required = true, value_delimiter = ',')]
    pub phrases: Vec<String>,

    /// Attribute the phrases are matched against
    #[arg(long, default_value = "F.FN")]
    pub attribute: String,

    /// Earliest publication date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, requires = "to")]
    pub from: Option<NaiveDate>,

    /// Latest publication date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, requires = "from")]
    pub to: Option<NaiveDate>,

    /// Stop each expression after this many results
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date format: {e}"))
}

/// One JSONL writer per output table. Entity tables (authors,
/// affiliations, fields of study) are written once per id.
struct TableWriters {
    papers: JsonLines<BufWriter<File>>,
    authors: JsonLines<BufWriter<File>>,
    paper_authors: JsonLines<BufWriter<File>>,
    affiliations: JsonLines<BufWriter<File>>,
    author_affiliations: JsonLines<BufWriter<File>>,
    fields_of_study: JsonLines<BufWriter<File>>,
    paper_fields_of_study: JsonLines<BufWriter<File>>,
    journals: JsonLines<BufWriter<File>>,
    conferences: JsonLines<BufWriter<File>>,
    seen_authors: HashSet<i64>,
    seen_affiliations: HashSet<i64>,
    seen_fields: HashSet<i64>,
}

impl TableWriters {
    fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let open = |name: &str| JsonLines::create(&dir.join(format!("{name}.jsonl")));
        Ok(Self {
            papers: open("papers")?,
            authors: open("authors")?,
            paper_authors: open("paper_authors")?,
            affiliations: open("affiliations")?,
            author_affiliations: open("author_affiliations")?,
            fields_of_study: open("fields_of_study")?,
            paper_fields_of_study: open("paper_fields_of_study")?,
            journals: open("journals")?,
            conferences: open("conferences")?,
            seen_authors: HashSet::new(),
            seen_affiliations: HashSet::new(),
            seen_fields: HashSet::new(),
        })
    }

    fn write(&mut self, rows: &PaperRows) -> Result<()> {
        self.papers.write(&rows.paper)?;
        for author in &rows.authors {
            if self.seen_authors.insert(author.id) {
                self.authors.write(author)?;
            }
        }
        for link in &rows.paper_authors {
            self.paper_authors.write(link)?;
        }
        for affiliation in &rows.affiliations {
            if self.seen_affiliations.insert(affiliation.id) {
                self.affiliations.write(affiliation)?;
            }
        }
        for link in &rows.author_affiliations {
            self.author_affiliations.write(link)?;
        }
        for field in &rows.fields_of_study {
            if self.seen_fields.insert(field.id) {
                self.fields_of_study.write(field)?;
            }
        }
        for link in &rows.paper_fields_of_study {
            self.paper_fields_of_study.write(link)?;
        }
        if let Some(journal) = &rows.journal {
            self.journals.write(journal)?;
        }
        if let Some(conference) = &rows.conference {
            self.conferences.write(conference)?;
        }
        Ok(())
    }

    /// Flush every file and return `(table, rows)` counts.
    fn finish(self) -> Result<Vec<(&'static str, usize)>> {
        Ok(vec![
            ("papers", self.papers.finish()?),
            ("authors", self.authors.finish()?),
            ("paper_authors", self.paper_authors.finish()?),
            ("affiliations", self.affiliations.finish()?),
            ("author_affiliations", self.author_affiliations.finish()?),
            ("fields_of_study", self.fields_of_study.finish()?),
            ("paper_fields_of_study", self.paper_fields_of_study.finish()?),
            ("journals", self.journals.finish()?),
            ("conferences", self.conferences.finish()?),
        ])
    }
}

/// Returns `false` when interrupted.
pub fn run(args: PapersArgs, config: &Config, progress: &SharedProgress) -> Result<bool> {
    let date_range = match (args.from, args.to) {
        (Some(start), Some(end)) if start > end => {
            bail!("--from {start} is after --to {end}");
        }
        (Some(start), Some(end)) => Some(DateRange::new(start, end)),
        _ => None,
    };
    let harvest_config = config.harvest_config(args.limit);
    harvest_config.validate()?;

    let mut expressions = ExpressionBuilder::new(
        args.phrases,
        args.attribute.as_str(),
        harvest_config.max_expression_len,
    )?;
    if let Some(range) = date_range {
        expressions = expressions.with_date_range(range);
    }

    let client = query_client(config)?;
    let output_dir = args
        .output
        .unwrap_or_else(|| config.output.default_dir.clone());
    let mut tables = TableWriters::create(&output_dir)?;

    log::info!(
        "Harvesting papers by {} into {}",
        expressions.attribute(),
        output_dir.display()
    );
    let start = Instant::now();
    let mut skipped = 0usize;
    let mut papers = harvest(
        &client,
        expressions,
        PAPER_ATTRIBUTES,
        config.remap.papers.clone(),
        &harvest_config,
    )?;
    let bar = progress.harvest_line("papers");
    let completed = drain(&mut papers, &bar, |record| match normalize_paper(&record) {
        Ok(rows) => tables.write(&rows),
        Err(e) => {
            skipped += 1;
            let id = record.get("id").cloned().unwrap_or_default();
            log::warn!("Skipping paper {id}: {e}");
            Ok(())
        }
    });
    bar.finish_and_clear();
    let counts = tables.finish()?;
    let completed = completed?;

    let stats = papers.stats();
    let mut summary: Vec<(&str, String)> = counts
        .into_iter()
        .map(|(table, rows)| (table, fmt_num(rows)))
        .collect();
    summary.push(("skipped", fmt_num(skipped)));
    summary.push(("expressions", fmt_num(stats.expressions)));
    summary.push(("pages", fmt_num(stats.pages)));
    summary.push(("elapsed", format!("{:.1}s", start.elapsed().as_secs_f64())));
    print_summary(progress, "Papers", &summary);
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn paper(id: i64, author: i64) -> PaperRows {
        let Value::Object(record) = json!({
            "id": id,
            "title": format!("paper {id}"),
            "authors": [{"AuId": author, "DAuN": "A. Author", "S": 1, "AfId": 5, "AfN": "uni"}],
            "fields_of_study": [{"FId": 9, "DFN": "Biology", "FN": "biology"}],
            "journal": {"JId": 3, "JN": "nature"},
        }) else {
            unreachable!()
        };
        normalize_paper(&record).unwrap()
    }

    fn lines(dir: &Path, table: &str) -> usize {
        std::fs::read_to_string(dir.join(format!("{table}.jsonl")))
            .unwrap()
            .lines()
            .count()
    }

    #[test]
    fn writes_every_table_and_dedupes_entities() {
        let dir = tempfile::tempdir().unwrap();
        let mut tables = TableWriters::create(dir.path()).unwrap();
        tables.write(&paper(1, 100)).unwrap();
        tables.write(&paper(2, 100)).unwrap();
        let counts = tables.finish().unwrap();

        assert_eq!(counts.len(), 9);
        assert_eq!(lines(dir.path(), "papers"), 2);
        assert_eq!(lines(dir.path(), "authors"), 1);
        assert_eq!(lines(dir.path(), "paper_authors"), 2);
        assert_eq!(lines(dir.path(), "affiliations"), 1);
        assert_eq!(lines(dir.path(), "author_affiliations"), 2);
        assert_eq!(lines(dir.path(), "fields_of_study"), 1);
        assert_eq!(lines(dir.path(), "paper_fields_of_study"), 2);
        assert_eq!(lines(dir.path(), "journals"), 2);
        assert_eq!(lines(dir.path(), "conferences"), 0);
    }

    #[test]
    fn parse_date_formats() {
        assert_eq!(
            parse_date("2019-12-31"),
            Ok(NaiveDate::from_ymd_opt(2019, 12, 31).unwrap())
        );
        assert!(parse_date("31/12/2019").is_err());
    }
}
