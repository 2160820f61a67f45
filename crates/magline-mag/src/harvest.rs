//! Paginated harvesting of query results
//!
//! A [`Harvest`] walks the expressions produced by an [`ExpressionBuilder`].
//! For each expression it requests pages with a growing offset until the
//! service returns an empty page (or the configured result limit is hit),
//! remaps each entity and yields it immediately. Only the current page is
//! held in memory.
//!
//! A remote call that fails terminally ends the whole harvest: the error is
//! yielded once and the iterator then returns `None`. Records already
//! yielded stay valid; later expressions are not attempted.

use std::iter::FusedIterator;

use crate::client::{QueryClient, Record, Transport};
use crate::config::HarvestConfig;
use crate::error::{ConfigError, HarvestError};
use crate::expr::{DateRange, Expression, ExpressionBuilder, QueryItem, lookup_expression};
use crate::remap::FieldRemap;

/// Field codes requested for fields of study: id, display name, level,
/// parent ids, child ids
pub const FIELD_OF_STUDY_ATTRIBUTES: &[&str] = &["Id", "DFN", "FL", "FP.FId", "FC.FId"];

/// Field codes requested for papers, covering everything the row mapping reads
pub const PAPER_ATTRIBUTES: &[&str] = &[
    "Id", "Ti", "Pt", "Y", "D", "CC", "DOI", "BT", "RId", "IA", "PB", "AA.AuId", "AA.DAuN",
    "AA.S", "AA.AfId", "AA.AfN", "F.FId", "F.DFN", "F.FN", "J.JId", "J.JN", "C.CId", "C.CN",
];

/// Which attribute drives a field-of-study harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Specific field-of-study identifiers (`Id`)
    Ids(Vec<i64>),
    /// Whole hierarchy levels, 0 (broadest) to 5 (`FL`)
    Levels(Vec<i64>),
}

impl Selector {
    /// Build a selector from two optional lists, exactly one of which must be set.
    pub fn from_parts(
        ids: Option<Vec<i64>>,
        levels: Option<Vec<i64>>,
    ) -> Result<Self, ConfigError> {
        match (ids, levels) {
            (Some(ids), None) => Ok(Self::Ids(ids)),
            (None, Some(levels)) => Ok(Self::Levels(levels)),
            (Some(_), Some(_)) => Err(ConfigError::ConflictingSelectors),
            (None, None) => Err(ConfigError::NoSelector),
        }
    }

    pub fn attribute(&self) -> &'static str {
        match self {
            Self::Ids(_) => "Id",
            Self::Levels(_) => "FL",
        }
    }

    fn into_values(self) -> Vec<i64> {
        match self {
            Self::Ids(v) | Self::Levels(v) => v,
        }
    }
}

/// Running totals for a harvest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    /// Expressions started
    pub expressions: usize,
    /// Calls that returned a page (empty pages included)
    pub pages: usize,
    /// Records yielded
    pub records: usize,
}

/// Offset cursor over one expression.
#[derive(Debug)]
struct Cursor {
    expression: Expression,
    index: usize,
    offset: usize,
    /// First entity of the previous page, to spot a service ignoring `offset`
    previous_first: Option<Record>,
}

/// Lazy, non-restartable stream of remapped records.
pub struct Harvest<'c, T> {
    client: &'c QueryClient<T>,
    expressions: ExpressionBuilder,
    attributes: Vec<String>,
    remap: FieldRemap,
    page_size: usize,
    result_limit: Option<usize>,
    /// Expression still being paged; `None` once it is exhausted
    cursor: Option<Cursor>,
    page: std::vec::IntoIter<Record>,
    stats: HarvestStats,
    finished: bool,
}

impl<T: Transport> Harvest<'_, T> {
    pub fn stats(&self) -> HarvestStats {
        self.stats
    }

    /// Start the next expression, if any.
    fn next_cursor(&mut self) -> Option<Cursor> {
        let expression = self.expressions.next()?;
        let index = self.stats.expressions;
        self.stats.expressions += 1;
        log::debug!("expression #{index}: {} chars", expression.len());
        Some(Cursor {
            expression,
            index,
            offset: 0,
            previous_first: None,
        })
    }

    /// Fetch the page at the cursor and decide whether paging continues.
    fn fetch(&mut self, cursor: Cursor) -> Result<(), HarvestError> {
        let page = self
            .client
            .query(
                &cursor.expression,
                &self.attributes,
                self.page_size,
                cursor.offset,
            )
            .map_err(|source| HarvestError::Remote {
                expression: cursor.index,
                offset: cursor.offset,
                source,
            })?;
        self.stats.pages += 1;

        if page.entities.is_empty() {
            log::info!(
                "expression #{}: no more entities after {}",
                cursor.index,
                cursor.offset
            );
            return Ok(());
        }

        if !page.expr.is_empty() && page.expr != cursor.expression.query() {
            log::warn!(
                "expression #{}: service answered for a different expression: {}",
                cursor.index,
                page.expr
            );
        }
        if cursor.previous_first.is_some()
            && page.entities.first() == cursor.previous_first.as_ref()
        {
            log::warn!(
                "expression #{}: page at offset {} repeats the previous page, stopping",
                cursor.index,
                cursor.offset
            );
            return Ok(());
        }

        let offset = cursor.offset + page.entities.len();
        log::debug!(
            "expression #{}: {} entities, offset {offset}",
            cursor.index,
            page.entities.len()
        );

        match self.result_limit {
            Some(limit) if offset >= limit => {
                log::info!(
                    "expression #{}: result limit {limit} reached at offset {offset}",
                    cursor.index
                );
            }
            _ => {
                self.cursor = Some(Cursor {
                    offset,
                    previous_first: page.entities.first().cloned(),
                    ..cursor
                })
            }
        }
        self.page = page.entities.into_iter();
        Ok(())
    }
}

impl<T: Transport> Iterator for Harvest<'_, T> {
    type Item = Result<Record, HarvestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(mut record) = self.page.next() {
                self.remap.apply(&mut record);
                self.stats.records += 1;
                return Some(Ok(record));
            }

            let cursor = match self.cursor.take() {
                Some(cursor) => cursor,
                None => match self.next_cursor() {
                    Some(cursor) => cursor,
                    None => {
                        self.finished = true;
                        log::info!(
                            "harvest complete: {} records from {} expressions ({} pages)",
                            self.stats.records,
                            self.stats.expressions,
                            self.stats.pages
                        );
                        return None;
                    }
                },
            };

            if let Err(e) = self.fetch(cursor) {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

impl<T: Transport> FusedIterator for Harvest<'_, T> {}

/// Harvest every record matched by `expressions`.
///
/// Configuration is validated here, before any request is made.
pub fn harvest<'c, T: Transport>(
    client: &'c QueryClient<T>,
    expressions: ExpressionBuilder,
    attributes: &[impl AsRef<str>],
    remap: FieldRemap,
    config: &HarvestConfig,
) -> Result<Harvest<'c, T>, ConfigError> {
    config.validate()?;
    if attributes.is_empty() {
        return Err(ConfigError::EmptyFieldList);
    }
    Ok(Harvest {
        client,
        expressions,
        attributes: attributes.iter().map(|a| a.as_ref().to_string()).collect(),
        remap,
        page_size: config.page_size,
        result_limit: config.result_limit,
        cursor: None,
        page: Vec::new().into_iter(),
        stats: HarvestStats::default(),
        finished: false,
    })
}

/// Harvest fields of study selected by identifier or by level.
pub fn fields_of_study<'c, T: Transport>(
    client: &'c QueryClient<T>,
    selector: Selector,
    remap: FieldRemap,
    config: &HarvestConfig,
) -> Result<Harvest<'c, T>, ConfigError> {
    let attribute = selector.attribute();
    let expressions =
        ExpressionBuilder::new(selector.into_values(), attribute, config.max_expression_len)?;
    harvest(client, expressions, FIELD_OF_STUDY_ATTRIBUTES, remap, config)
}

/// Harvest fields of study given either `ids` or `levels` (not both, not neither).
pub fn harvest_fields_of_study<'c, T: Transport>(
    client: &'c QueryClient<T>,
    ids: Option<Vec<i64>>,
    levels: Option<Vec<i64>>,
    config: &HarvestConfig,
) -> Result<Harvest<'c, T>, ConfigError> {
    let selector = Selector::from_parts(ids, levels)?;
    fields_of_study(client, selector, FieldRemap::fields_of_study(), config)
}

/// Harvest papers matching any of `phrases` on `attribute` (e.g. `F.FN`),
/// optionally restricted to a publication date range.
pub fn harvest_papers<'c, T: Transport>(
    client: &'c QueryClient<T>,
    phrases: Vec<String>,
    attribute: &str,
    date_range: Option<DateRange>,
    config: &HarvestConfig,
) -> Result<Harvest<'c, T>, ConfigError> {
    let items = phrases.into_iter().map(QueryItem::Text);
    let mut expressions = ExpressionBuilder::new(items, attribute, config.max_expression_len)?;
    if let Some(range) = date_range {
        expressions = expressions.with_date_range(range);
    }
    harvest(client, expressions, PAPER_ATTRIBUTES, FieldRemap::papers(), config)
}

/// Fetch a small, known set of entities by identifier in a single call.
///
/// No chunking, no date filter and no pagination: the caller guarantees
/// the id list fits in one expression and one page.
pub fn fetch_by_ids<T: Transport>(
    client: &QueryClient<T>,
    ids: &[i64],
    attributes: &[impl AsRef<str>],
    remap: &FieldRemap,
) -> Result<Vec<Record>, HarvestError> {
    if attributes.is_empty() {
        return Err(ConfigError::EmptyFieldList.into());
    }
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let attributes: Vec<String> = attributes.iter().map(|a| a.as_ref().to_string()).collect();
    let expression = lookup_expression(ids);
    let page = client
        .query(&expression, &attributes, ids.len(), 0)
        .map_err(|source| HarvestError::Remote {
            expression: 0,
            offset: 0,
            source,
        })?;
    let mut records = page.entities;
    for record in &mut records {
        remap.apply(record);
    }
    Ok(records)
}
