//! Flatten harvested paper records into relational rows
//!
//! Input is a record remapped with [`FieldRemap::papers`](crate::FieldRemap::papers):
//! descriptive top-level keys, nested author/field/venue objects still keyed
//! by service codes (`AuId`, `DAuN`, `FId`, ...). Optional values that are
//! missing come out as `None` (serialized as `null`), never omitted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::abstract_decode::decode_abstract;
use crate::client::Record;
use crate::error::NormalizeError;

// === Nested entity shapes ===

#[derive(Debug, Deserialize)]
struct AuthorEntry {
    #[serde(rename = "AuId")]
    author_id: i64,
    #[serde(rename = "DAuN", default)]
    name: Option<String>,
    #[serde(rename = "S", default)]
    order: Option<i64>,
    #[serde(rename = "AfId", default)]
    affiliation_id: Option<i64>,
    #[serde(rename = "AfN", default)]
    affiliation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FieldEntry {
    #[serde(rename = "FId")]
    id: i64,
    #[serde(rename = "DFN", default)]
    name: Option<String>,
    #[serde(rename = "FN", default)]
    norm_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JournalEntry {
    #[serde(rename = "JId")]
    id: i64,
    #[serde(rename = "JN", default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConferenceEntry {
    #[serde(rename = "CId")]
    id: i64,
    #[serde(rename = "CN", default)]
    name: Option<String>,
}

// === Output rows ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperRow {
    pub id: i64,
    pub prob: Option<f64>,
    pub title: String,
    pub publication_type: Option<i64>,
    pub year: Option<i64>,
    pub date: Option<String>,
    pub citations: Option<i64>,
    pub doi: Option<String>,
    pub bibtex_doc_type: Option<String>,
    /// Referenced paper ids as JSON array text
    pub references: Option<String>,
    pub abstract_text: Option<String>,
    pub publisher: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorRow {
    pub id: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaperAuthorRow {
    pub paper_id: i64,
    pub author_id: i64,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffiliationRow {
    pub id: i64,
    pub affiliation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorAffiliationRow {
    pub affiliation_id: Option<i64>,
    pub author_id: i64,
    pub paper_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOfStudyRow {
    pub id: i64,
    pub name: Option<String>,
    pub norm_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaperFieldOfStudyRow {
    pub field_of_study_id: i64,
    pub paper_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalRow {
    pub id: i64,
    pub journal_name: Option<String>,
    pub paper_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConferenceRow {
    pub id: i64,
    pub conference_name: Option<String>,
    pub paper_id: i64,
}

/// Every row derived from one paper.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRows {
    pub paper: PaperRow,
    pub authors: Vec<AuthorRow>,
    pub paper_authors: Vec<PaperAuthorRow>,
    pub affiliations: Vec<AffiliationRow>,
    pub author_affiliations: Vec<AuthorAffiliationRow>,
    pub fields_of_study: Vec<FieldOfStudyRow>,
    pub paper_fields_of_study: Vec<PaperFieldOfStudyRow>,
    pub journal: Option<JournalRow>,
    pub conference: Option<ConferenceRow>,
}

// === Field access ===

fn optional<T: DeserializeOwned>(
    record: &Record,
    field: &'static str,
) -> Result<Option<T>, NormalizeError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => T::deserialize(v)
            .map(Some)
            .map_err(|e| NormalizeError::Invalid {
                field,
                message: e.to_string(),
            }),
    }
}

fn required<T: DeserializeOwned>(
    record: &Record,
    field: &'static str,
) -> Result<T, NormalizeError> {
    optional(record, field)?.ok_or(NormalizeError::Missing(field))
}

/// Nested list; absent means empty.
fn list<T: DeserializeOwned>(
    record: &Record,
    field: &'static str,
) -> Result<Vec<T>, NormalizeError> {
    Ok(optional(record, field)?.unwrap_or_default())
}

// === Row mapping ===

pub fn parse_paper(record: &Record) -> Result<PaperRow, NormalizeError> {
    let references = record
        .get("references")
        .filter(|v| !v.is_null())
        .map(Value::to_string);

    Ok(PaperRow {
        id: required(record, "id")?,
        prob: optional(record, "prob")?,
        title: required(record, "title")?,
        publication_type: optional(record, "publication_type")?,
        year: optional(record, "year")?,
        date: optional(record, "date")?,
        citations: optional(record, "citations")?,
        doi: optional(record, "doi")?,
        bibtex_doc_type: optional(record, "bibtex_doc_type")?,
        references,
        abstract_text: decode_abstract(record.get("inverted_abstract")),
        publisher: optional(record, "publisher")?,
    })
}

/// Authors of a paper and their position in its author list.
pub fn parse_authors(
    record: &Record,
    paper_id: i64,
) -> Result<(Vec<AuthorRow>, Vec<PaperAuthorRow>), NormalizeError> {
    let entries: Vec<AuthorEntry> = list(record, "authors")?;
    let authors = entries
        .iter()
        .map(|a| AuthorRow {
            id: a.author_id,
            name: a.name.clone(),
        })
        .collect();
    let paper_authors = entries
        .iter()
        .map(|a| PaperAuthorRow {
            paper_id,
            author_id: a.author_id,
            order: a.order,
        })
        .collect();
    Ok((authors, paper_authors))
}

/// Affiliations, plus one author-affiliation link per author.
///
/// Authors without an affiliation (absent or zero `AfId`) still get a link
/// row with `affiliation_id: None`.
pub fn parse_affiliations(
    record: &Record,
    paper_id: i64,
) -> Result<(Vec<AffiliationRow>, Vec<AuthorAffiliationRow>), NormalizeError> {
    let entries: Vec<AuthorEntry> = list(record, "authors")?;
    let mut affiliations = Vec::new();
    let mut links = Vec::with_capacity(entries.len());
    for author in entries {
        let affiliation_id = author.affiliation_id.filter(|&id| id != 0);
        if let Some(id) = affiliation_id {
            affiliations.push(AffiliationRow {
                id,
                affiliation: author.affiliation,
            });
        }
        links.push(AuthorAffiliationRow {
            affiliation_id,
            author_id: author.author_id,
            paper_id,
        });
    }
    Ok((affiliations, links))
}

pub fn parse_fields_of_study(
    record: &Record,
    paper_id: i64,
) -> Result<(Vec<PaperFieldOfStudyRow>, Vec<FieldOfStudyRow>), NormalizeError> {
    let entries: Vec<FieldEntry> = list(record, "fields_of_study")?;
    let links = entries
        .iter()
        .map(|f| PaperFieldOfStudyRow {
            field_of_study_id: f.id,
            paper_id,
        })
        .collect();
    let fields = entries
        .into_iter()
        .map(|f| FieldOfStudyRow {
            id: f.id,
            name: f.name,
            norm_name: f.norm_name,
        })
        .collect();
    Ok((links, fields))
}

pub fn parse_journal(record: &Record, paper_id: i64) -> Result<Option<JournalRow>, NormalizeError> {
    let entry: Option<JournalEntry> = optional(record, "journal")?;
    Ok(entry.map(|j| JournalRow {
        id: j.id,
        journal_name: j.name,
        paper_id,
    }))
}

pub fn parse_conference(
    record: &Record,
    paper_id: i64,
) -> Result<Option<ConferenceRow>, NormalizeError> {
    let entry: Option<ConferenceEntry> = optional(record, "conference")?;
    Ok(entry.map(|c| ConferenceRow {
        id: c.id,
        conference_name: c.name,
        paper_id,
    }))
}

/// Map one harvested paper to all of its rows.
pub fn normalize_paper(record: &Record) -> Result<PaperRows, NormalizeError> {
    let paper = parse_paper(record)?;
    let paper_id = paper.id;
    let (authors, paper_authors) = parse_authors(record, paper_id)?;
    let (affiliations, author_affiliations) = parse_affiliations(record, paper_id)?;
    let (paper_fields_of_study, fields_of_study) = parse_fields_of_study(record, paper_id)?;
    Ok(PaperRows {
        paper,
        authors,
        paper_authors,
        affiliations,
        author_affiliations,
        fields_of_study,
        paper_fields_of_study,
        journal: parse_journal(record, paper_id)?,
        conference: parse_conference(record, paper_id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remap::FieldRemap;
    use serde_json::json;

    fn paper(v: Value) -> Record {
        let Value::Object(mut map) = v else {
            panic!("not an object");
        };
        FieldRemap::papers().apply(&mut map);
        map
    }

    fn full_paper() -> Record {
        paper(json!({
            "logprob": -19.1,
            "prob": 5.0e-9,
            "Id": 2963403868i64,
            "Ti": "attention is all you need",
            "Pt": 3,
            "Y": 2017,
            "D": "2017-06-12",
            "CC": 9000,
            "DOI": "10.5555/3295222.3295349",
            "BT": "p",
            "RId": [1, 2, 3],
            "IA": {"IndexLength": 2, "InvertedIndex": {"The": [0], "dominant": [1]}},
            "PB": "Curran",
            "AA": [
                {
                    "AuId": 10, "DAuN": "Ashish Vaswani", "S": 1,
                    "AfId": 1291425158i64, "AfN": "google"
                },
                {"AuId": 11, "DAuN": "Noam Shazeer", "S": 2, "AfId": 0}
            ],
            "F": [{"FId": 119857082, "DFN": "Machine learning", "FN": "machine learning"}],
            "C": {"CId": 1127325140, "CN": "nips"}
        }))
    }

    #[test]
    fn paper_row_fields() {
        let row = parse_paper(&full_paper()).unwrap();
        assert_eq!(row.id, 2963403868);
        assert_eq!(row.title, "attention is all you need");
        assert_eq!(row.year, Some(2017));
        assert_eq!(row.citations, Some(9000));
        assert_eq!(row.references.as_deref(), Some("[1,2,3]"));
        assert_eq!(row.abstract_text.as_deref(), Some("The dominant"));
        assert_eq!(row.publisher.as_deref(), Some("Curran"));
    }

    #[test]
    fn optional_fields_become_none() {
        let row = parse_paper(&paper(json!({"Id": 1, "Ti": "untitled"}))).unwrap();
        assert_eq!(row.doi, None);
        assert_eq!(row.bibtex_doc_type, None);
        assert_eq!(row.references, None);
        assert_eq!(row.abstract_text, None);
        assert_eq!(row.publisher, None);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["doi"], Value::Null);
    }

    #[test]
    fn missing_id_is_an_error() {
        let err = parse_paper(&paper(json!({"Ti": "x"}))).unwrap_err();
        assert_eq!(err, NormalizeError::Missing("id"));
    }

    #[test]
    fn mistyped_field_is_an_error() {
        let err = parse_paper(&paper(json!({"Id": 1, "Ti": "x", "Y": "soon"}))).unwrap_err();
        assert!(matches!(err, NormalizeError::Invalid { field: "year", .. }));
    }

    #[test]
    fn authors_and_order() {
        let (authors, links) = parse_authors(&full_paper(), 7).unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[0].name.as_deref(), Some("Ashish Vaswani"));
        assert_eq!(
            links[1],
            PaperAuthorRow {
                paper_id: 7,
                author_id: 11,
                order: Some(2)
            }
        );
    }

    #[test]
    fn affiliation_links_keep_unaffiliated_authors() {
        let (affiliations, links) = parse_affiliations(&full_paper(), 7).unwrap();
        assert_eq!(
            affiliations,
            vec![AffiliationRow {
                id: 1291425158,
                affiliation: Some("google".to_string())
            }]
        );
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].affiliation_id, Some(1291425158));
        assert_eq!(links[1].affiliation_id, None);
    }

    #[test]
    fn venue_rows() {
        let record = full_paper();
        assert!(parse_journal(&record, 7).unwrap().is_none());
        let conference = parse_conference(&record, 7).unwrap().unwrap();
        assert_eq!(conference.id, 1127325140);
        assert_eq!(conference.conference_name.as_deref(), Some("nips"));
        assert_eq!(conference.paper_id, 7);
    }

    #[test]
    fn normalize_bundles_all_rows() {
        let rows = normalize_paper(&full_paper()).unwrap();
        assert_eq!(rows.paper.id, 2963403868);
        assert_eq!(rows.authors.len(), 2);
        assert_eq!(rows.fields_of_study[0].norm_name.as_deref(), Some("machine learning"));
        assert_eq!(rows.paper_fields_of_study[0].paper_id, 2963403868);
        assert_eq!(rows.author_affiliations.len(), 2);
        assert!(rows.conference.is_some());
    }

    #[test]
    fn paper_without_nested_lists() {
        let rows = normalize_paper(&paper(json!({"Id": 3, "Ti": "short"}))).unwrap();
        assert!(rows.authors.is_empty());
        assert!(rows.fields_of_study.is_empty());
        assert!(rows.journal.is_none());
    }
}
