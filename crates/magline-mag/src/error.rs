//! Error types for query configuration, harvesting and record normalization

use magline_core::RetryError;

/// Malformed caller input, reported before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Neither identifiers nor levels were supplied
    NoSelector,
    /// Both identifiers and levels were supplied
    ConflictingSelectors,
    /// Query items mix text phrases and integer identifiers
    MixedItemKinds,
    EmptyAttribute,
    /// No field codes requested
    EmptyFieldList,
    ZeroPageSize,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSelector => f.write_str("field of study ids or levels must be supplied"),
            Self::ConflictingSelectors => {
                f.write_str("field of study ids and levels are mutually exclusive")
            }
            Self::MixedItemKinds => {
                f.write_str("query items must be all text or all integer identifiers")
            }
            Self::EmptyAttribute => f.write_str("query attribute code is empty"),
            Self::EmptyFieldList => f.write_str("at least one field code must be requested"),
            Self::ZeroPageSize => f.write_str("page size must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Error surfaced by a harvest.
#[derive(Debug)]
pub enum HarvestError {
    Config(ConfigError),
    /// A remote call failed terminally while draining expression `expression`
    /// (0-based); the harvest stops there.
    Remote {
        expression: usize,
        offset: usize,
        source: RetryError,
    },
}

impl std::fmt::Display for HarvestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Remote {
                expression,
                offset,
                source,
            } => write!(
                f,
                "query failed for expression #{expression} at offset {offset}: {source}"
            ),
        }
    }
}

impl std::error::Error for HarvestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Remote { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for HarvestError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// A harvested record lacks a field the row mapping requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    Missing(&'static str),
    Invalid { field: &'static str, message: String },
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "required field '{field}' is missing"),
            Self::Invalid { field, message } => write!(f, "field '{field}' is invalid: {message}"),
        }
    }
}

impl std::error::Error for NormalizeError {}
