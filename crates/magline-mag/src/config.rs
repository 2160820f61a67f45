//! Harvest configuration

use crate::error::ConfigError;
use crate::expr::DEFAULT_MAX_EXPRESSION_LEN;

/// Default number of entities requested per page
pub const DEFAULT_PAGE_SIZE: usize = 1_000;

/// Paging and expression-size settings for one harvest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestConfig {
    /// Upper bound on serialized expression length
    pub max_expression_len: usize,
    /// Entities requested per call
    pub page_size: usize,
    /// Stop paging an expression once this many of its entities were
    /// fetched (for dry runs). Checked per page, so up to one page more may
    /// be returned.
    pub result_limit: Option<usize>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_expression_len: DEFAULT_MAX_EXPRESSION_LEN,
            page_size: DEFAULT_PAGE_SIZE,
            result_limit: None,
        }
    }
}

impl HarvestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = HarvestConfig::default();
        assert_eq!(config.max_expression_len, 16_000);
        assert_eq!(config.page_size, 1_000);
        assert!(config.result_limit.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_page_size_rejected() {
        let config = HarvestConfig {
            page_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPageSize));
    }
}
