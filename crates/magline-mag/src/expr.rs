//! Composite query expressions for the evaluate endpoint
//!
//! The service accepts a restricted boolean grammar:
//! ```text
//! expr=OR(Id=2029,Id=4052)
//! expr=OR(And(Composite(F.FN='deep learning'), D=['2000-01-01', '2020-12-31']),...)
//! ```
//! Long item lists do not fit in one request (the practical ceiling is about
//! 16,000 characters), so [`ExpressionBuilder`] packs items greedily into as
//! many expressions as needed.

use std::iter::FusedIterator;

use chrono::NaiveDate;

use crate::error::ConfigError;

/// Practical ceiling on serialized expression length accepted by the service
pub const DEFAULT_MAX_EXPRESSION_LEN: usize = 16_000;

const PREFIX: &str = "expr=OR(";
const SUFFIX: &str = ")";
const SEPARATOR: char = ',';

/// One value to search for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryItem {
    /// Phrase, rendered quoted: `attr='value'`
    Text(String),
    /// Identifier or level, rendered bare: `attr=value`
    Id(i64),
}

impl QueryItem {
    fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl From<&str> for QueryItem {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for QueryItem {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for QueryItem {
    fn from(n: i64) -> Self {
        Self::Id(n)
    }
}

/// Inclusive publication date range shared by every clause of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    fn render(&self) -> String {
        format!("D=['{}', '{}']", self.start, self.end)
    }
}

/// Render a single attribute comparison.
///
/// Attributes of nested entities (`F.FN`, `AA.AuN`) must be wrapped in
/// `Composite(...)`. Single quotes are stripped from text values since the
/// grammar has no escape for them.
fn comparison(attribute: &str, item: &QueryItem) -> String {
    let cmp = match item {
        QueryItem::Text(s) => format!("{attribute}='{}'", s.replace('\'', "")),
        QueryItem::Id(n) => format!("{attribute}={n}"),
    };
    if attribute.contains('.') {
        format!("Composite({cmp})")
    } else {
        cmp
    }
}

/// A serialized query expression, `expr=OR(...)` included.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Expression(String);

impl Expression {
    fn from_clauses<S: AsRef<str>>(clauses: &[S]) -> Self {
        let body_len: usize = clauses.iter().map(|c| c.as_ref().len() + 1).sum();
        let mut s = String::with_capacity(PREFIX.len() + body_len + SUFFIX.len());
        s.push_str(PREFIX);
        for (i, clause) in clauses.iter().enumerate() {
            if i > 0 {
                s.push(SEPARATOR);
            }
            s.push_str(clause.as_ref());
        }
        s.push_str(SUFFIX);
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Serialized length in bytes, prefix included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The value of the `expr` form field (everything after `expr=`).
    pub fn query(&self) -> &str {
        self.0.strip_prefix("expr=").unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Expression {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lazily packs query items into length-bounded OR expressions.
///
/// Items are taken in input order and appended to the current expression
/// until the next one would push it past `max_len`; that item then opens the
/// next expression. Every item lands in exactly one expression. An item whose
/// clause alone exceeds `max_len` is still emitted, on its own.
#[derive(Debug)]
pub struct ExpressionBuilder {
    items: std::vec::IntoIter<QueryItem>,
    attribute: String,
    max_len: usize,
    date_range: Option<DateRange>,
    /// Clause that overflowed the previous expression
    carry: Option<String>,
}

impl ExpressionBuilder {
    /// Rejects an empty attribute and items mixing text and identifiers.
    pub fn new<I>(
        items: impl IntoIterator<Item = I>,
        attribute: impl Into<String>,
        max_len: usize,
    ) -> Result<Self, ConfigError>
    where
        I: Into<QueryItem>,
    {
        let attribute = attribute.into();
        if attribute.trim().is_empty() {
            return Err(ConfigError::EmptyAttribute);
        }
        let items: Vec<QueryItem> = items.into_iter().map(Into::into).collect();
        if let Some(first) = items.first() {
            let text = first.is_text();
            if items.iter().any(|item| item.is_text() != text) {
                return Err(ConfigError::MixedItemKinds);
            }
        }
        Ok(Self {
            items: items.into_iter(),
            attribute,
            max_len,
            date_range: None,
            carry: None,
        })
    }

    /// Restrict every clause to a publication date range:
    /// `And(attr='value', D=['start', 'end'])`.
    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    fn clause(&self, item: &QueryItem) -> String {
        let cmp = comparison(&self.attribute, item);
        match &self.date_range {
            Some(range) => format!("And({cmp}, {})", range.render()),
            None => cmp,
        }
    }
}

impl Iterator for ExpressionBuilder {
    type Item = Expression;

    fn next(&mut self) -> Option<Expression> {
        let mut clauses: Vec<String> = Vec::new();
        let mut len = PREFIX.len() + SUFFIX.len();

        if let Some(clause) = self.carry.take() {
            len += clause.len();
            clauses.push(clause);
        }

        while let Some(item) = self.items.next() {
            let clause = self.clause(&item);
            let added = clause.len() + usize::from(!clauses.is_empty());
            if !clauses.is_empty() && len + added > self.max_len {
                self.carry = Some(clause);
                break;
            }
            len += added;
            clauses.push(clause);
        }

        if clauses.is_empty() {
            return None;
        }
        Some(Expression::from_clauses(&clauses))
    }
}

impl FusedIterator for ExpressionBuilder {}

/// Single unchunked OR expression over identifiers, for small lookups.
pub fn lookup_expression(ids: &[i64]) -> Expression {
    let clauses: Vec<String> = ids.iter().map(|id| format!("Id={id}")).collect();
    Expression::from_clauses(&clauses)
}
