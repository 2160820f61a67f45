//! Magline MAG - query synthesis and paginated harvesting for the
//! Microsoft Academic Graph evaluate API
//!
//! Large id/phrase/level lists are packed into length-bounded boolean
//! expressions, each expression is paged through with an offset cursor, and
//! every returned entity is remapped from field codes to descriptive keys.
//!
//! # Example
//!
//! ```no_run
//! use magline_core::HttpConfig;
//! use magline_mag::{EvaluateClient, HarvestConfig, QueryClient, harvest_fields_of_study};
//!
//! let transport = EvaluateClient::new(&HttpConfig::default())?;
//! let client = QueryClient::new(transport, std::env::var("MAG_SUBSCRIPTION_KEY")?);
//!
//! let config = HarvestConfig::default();
//! for record in harvest_fields_of_study(&client, None, Some(vec![0]), &config)? {
//!     let record = record?;
//!     println!("{} {}", record["id"], record["name"]);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod abstract_decode;
pub mod client;
pub mod config;
pub mod error;
pub mod expr;
pub mod harvest;
pub mod normalize;
pub mod remap;

// Re-exports
pub use client::{EvaluateClient, EvaluateRequest, QueryClient, QueryPage, Record, Transport};
pub use config::HarvestConfig;
pub use error::{ConfigError, HarvestError, NormalizeError};
pub use expr::{DateRange, Expression, ExpressionBuilder, QueryItem, lookup_expression};
pub use harvest::{
    FIELD_OF_STUDY_ATTRIBUTES, Harvest, HarvestStats, PAPER_ATTRIBUTES, Selector, fetch_by_ids,
    fields_of_study, harvest, harvest_fields_of_study, harvest_papers,
};
pub use normalize::{PaperRows, normalize_paper};
pub use remap::FieldRemap;
