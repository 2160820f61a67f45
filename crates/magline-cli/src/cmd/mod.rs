//! Subcommands and the plumbing they share

pub mod fos;
pub mod lookup;
pub mod papers;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use indicatif::ProgressBar;
use serde::Serialize;

use magline_core::ProgressContext;
use magline_mag::{EvaluateClient, Harvest, QueryClient, Record, Transport};

use crate::config::{Config, KEY_ENV_VAR};

/// Build the retrying query client from the effective configuration.
pub fn query_client(config: &Config) -> Result<QueryClient<EvaluateClient>> {
    let Some(key) = config.mag.subscription_key.as_deref() else {
        bail!("No subscription key: set {KEY_ENV_VAR} or [mag] subscription_key in magline.toml");
    };
    let transport =
        EvaluateClient::new(&config.http_config()).context("Failed to build HTTP client")?;
    Ok(QueryClient::new(transport, key).with_retry(config.retry_policy()))
}

/// Pull records until the harvest ends or shutdown is requested.
///
/// Returns `false` when interrupted. A terminal harvest error is returned
/// as-is after the records before it were handed to `sink`.
pub fn drain<T: Transport>(
    harvest: &mut Harvest<'_, T>,
    bar: &ProgressBar,
    sink: impl FnMut(Record) -> Result<()>,
) -> Result<bool> {
    drain_until(harvest, bar, magline_core::is_shutdown_requested, sink)
}

/// Like [`drain`], with `stop` polled before each record is pulled.
/// Every record taken from the harvest reaches `sink`.
fn drain_until<T: Transport>(
    harvest: &mut Harvest<'_, T>,
    bar: &ProgressBar,
    stop: impl Fn() -> bool,
    mut sink: impl FnMut(Record) -> Result<()>,
) -> Result<bool> {
    loop {
        if stop() {
            log::warn!("Interrupted, stopping harvest");
            return Ok(false);
        }
        let Some(record) = harvest.next() else {
            return Ok(true);
        };
        sink(record?)?;
        bar.inc(1);
        if bar.position() % 1_000 == 0 {
            let stats = harvest.stats();
            bar.set_message(format!(
                "expression {} / page {}",
                stats.expressions, stats.pages
            ));
        }
    }
}

/// Line-delimited JSON sink
pub struct JsonLines<W: Write> {
    out: W,
    rows: usize,
}

impl JsonLines<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self { out, rows: 0 }
    }

    pub fn write<S: Serialize>(&mut self, row: &S) -> Result<()> {
        serde_json::to_writer(&mut self.out, row)?;
        self.out.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<usize> {
        self.out.flush()?;
        Ok(self.rows)
    }
}

/// Print a key-value summary table above any live progress lines
pub fn print_summary(progress: &ProgressContext, title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    progress.println(format!("\n{table}"));
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use magline_core::{Backoff, RequestError, RetryPolicy};
    use magline_mag::{
        EvaluateRequest, ExpressionBuilder, FieldRemap, HarvestConfig, QueryPage, harvest,
    };
    use serde_json::{Value, json};

    use super::*;

    /// Serves `pages` pages of three entities each, then empty pages.
    struct Pages {
        pages: usize,
        calls: Cell<usize>,
    }

    impl Transport for Pages {
        fn evaluate(&self, request: &EvaluateRequest<'_>) -> Result<QueryPage, RequestError> {
            self.calls.set(self.calls.get() + 1);
            let entities = if request.offset / 3 < self.pages {
                (request.offset..request.offset + 3)
                    .map(|id| match json!({"Id": id}) {
                        Value::Object(map) => map,
                        _ => unreachable!(),
                    })
                    .collect()
            } else {
                Vec::new()
            };
            Ok(QueryPage {
                expr: request.expression.query().to_string(),
                entities,
            })
        }
    }

    fn pages_client(pages: usize) -> QueryClient<Pages> {
        let transport = Pages {
            pages,
            calls: Cell::new(0),
        };
        QueryClient::new(transport, "key").with_retry(RetryPolicy {
            backoff: Backoff::none(),
            ..RetryPolicy::default()
        })
    }

    fn config() -> HarvestConfig {
        HarvestConfig {
            page_size: 3,
            ..Default::default()
        }
    }

    #[test]
    fn drain_runs_to_completion() {
        let client = pages_client(2);
        let mut records = harvest(
            &client,
            ExpressionBuilder::new([1i64], "Id", 100).unwrap(),
            &["Id"],
            FieldRemap::identity(),
            &config(),
        )
        .unwrap();
        let mut ids = Vec::new();
        let completed = drain_until(&mut records, &ProgressBar::hidden(), || false, |r| {
            ids.push(r["Id"].clone());
            Ok(())
        })
        .unwrap();
        assert!(completed);
        assert_eq!(ids, (0..6).map(|i| json!(i)).collect::<Vec<_>>());
    }

    #[test]
    fn drain_stop_keeps_every_pulled_record() {
        let client = pages_client(5);
        let mut records = harvest(
            &client,
            ExpressionBuilder::new([1i64], "Id", 100).unwrap(),
            &["Id"],
            FieldRemap::identity(),
            &config(),
        )
        .unwrap();
        let written = Cell::new(0usize);
        let completed = drain_until(
            &mut records,
            &ProgressBar::hidden(),
            || written.get() == 4,
            |_| {
                written.set(written.get() + 1);
                Ok(())
            },
        )
        .unwrap();
        assert!(!completed);
        assert_eq!(written.get(), 4);
        assert_eq!(records.stats().records, 4);
        // Stopped mid-way through the second page
        assert_eq!(client.transport().calls.get(), 2);
    }

    #[test]
    fn json_lines_one_row_per_line() {
        let mut sink = JsonLines::new(Vec::new());
        sink.write(&json!({"id": 1})).unwrap();
        sink.write(&json!({"id": 2, "name": null})).unwrap();
        assert_eq!(sink.rows(), 2);
        let JsonLines { out, .. } = sink;
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"id\":1}\n{\"id\":2,\"name\":null}\n"
        );
    }

    #[test]
    fn json_lines_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        let mut sink = JsonLines::create(&path).unwrap();
        sink.write(&json!([1, 2])).unwrap();
        assert_eq!(sink.finish().unwrap(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1,2]\n");
    }

    #[test]
    fn missing_key_is_reported() {
        let mut config = Config::default();
        config.mag.subscription_key = None;
        let err = query_client(&config).err().unwrap();
        assert!(err.to_string().contains(KEY_ENV_VAR));
    }
}
