//! Field-code renaming and compaction of raw entities
//!
//! The service keys entity fields by short codes (`Id`, `DFN`, `FP`).
//! A [`FieldRemap`] turns a raw entity into a record with descriptive keys:
//! noise fields are dropped, codes renamed, and lists of single-key objects
//! such as `[{"FId": 7}, {"FId": 9}]` flattened to `[7, 9]`. Absent fields
//! are skipped, never reported.

use serde::Deserialize;
use serde_json::Value;

use crate::client::Record;

/// Rename a field code to a descriptive key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldRename {
    pub code: String,
    pub name: String,
}

/// Flatten a list of objects to the values stored under `key`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Compaction {
    /// Descriptive (post-rename) field name
    pub field: String,
    pub key: String,
}

/// Drop, rename and compaction tables applied to every harvested entity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldRemap {
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub rename: Vec<FieldRename>,
    #[serde(default)]
    pub compact: Vec<Compaction>,
}

fn renames(pairs: &[(&str, &str)]) -> Vec<FieldRename> {
    pairs
        .iter()
        .map(|(code, name)| FieldRename {
            code: code.to_string(),
            name: name.to_string(),
        })
        .collect()
}

impl FieldRemap {
    /// No-op remap: entities pass through untouched.
    pub fn identity() -> Self {
        Self {
            drop: Vec::new(),
            rename: Vec::new(),
            compact: Vec::new(),
        }
    }

    /// Field-of-study entities: id, name, level, parent and child ids.
    pub fn fields_of_study() -> Self {
        Self {
            drop: vec!["logprob".to_string(), "prob".to_string()],
            rename: renames(&[
                ("Id", "id"),
                ("DFN", "name"),
                ("FL", "level"),
                ("FP", "parent_ids"),
                ("FC", "child_ids"),
            ]),
            compact: vec![
                Compaction {
                    field: "parent_ids".to_string(),
                    key: "FId".to_string(),
                },
                Compaction {
                    field: "child_ids".to_string(),
                    key: "FId".to_string(),
                },
            ],
        }
    }

    /// Paper entities, shaped for [`normalize_paper`](crate::normalize::normalize_paper).
    ///
    /// Nested author/field/venue objects keep their own codes; only the
    /// top-level keys are renamed.
    pub fn papers() -> Self {
        Self {
            drop: vec!["logprob".to_string()],
            rename: renames(&[
                ("Id", "id"),
                ("Ti", "title"),
                ("Pt", "publication_type"),
                ("Y", "year"),
                ("D", "date"),
                ("CC", "citations"),
                ("DOI", "doi"),
                ("BT", "bibtex_doc_type"),
                ("RId", "references"),
                ("IA", "inverted_abstract"),
                ("PB", "publisher"),
                ("AA", "authors"),
                ("F", "fields_of_study"),
                ("J", "journal"),
                ("C", "conference"),
            ]),
            compact: Vec::new(),
        }
    }

    /// Apply the tables to `record` in place.
    pub fn apply(&self, record: &mut Record) {
        for field in &self.drop {
            record.remove(field);
        }

        for FieldRename { code, name } in &self.rename {
            if let Some(value) = record.remove(code) {
                record.insert(name.clone(), value);
            }
        }

        for Compaction { field, key } in &self.compact {
            if let Some(Value::Array(items)) = record.get_mut(field) {
                let before = items.len();
                let ids: Vec<Value> = items
                    .iter_mut()
                    .filter_map(|item| item.as_object_mut()?.remove(key))
                    .collect();
                if ids.len() != before {
                    log::debug!(
                        "{field}: {} of {before} entries lacked '{key}'",
                        before - ids.len()
                    );
                }
                *items = ids;
            }
        }
    }
}

impl Default for FieldRemap {
    fn default() -> Self {
        Self::fields_of_study()
    }
}
