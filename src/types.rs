use serde::{Deserialize, Serialize};

use crate::linking::date_range::{RangePolicy, DEFAULT_CLOSED_GRACE_DAYS, DEFAULT_LOOKBACK_MONTHS};

/// Configuration stored in ~/.txaudit/config.json
///
/// Every field is optional on disk; a missing file means defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Store location; defaults to ~/.txaudit/txaudit.db
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(default)]
    pub auto_link: AutoLinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLinkConfig {
    /// Narrow email candidates to those mentioning the property address.
    #[serde(default = "default_address_filter")]
    pub address_filter: bool,
    #[serde(default = "default_content_batch_size")]
    pub content_batch_size: usize,
    #[serde(default = "default_closed_grace_days")]
    pub closed_grace_days: i64,
    #[serde(default = "default_lookback_months")]
    pub lookback_months: u32,
}

impl Default for AutoLinkConfig {
    fn default() -> Self {
        Self {
            address_filter: default_address_filter(),
            content_batch_size: default_content_batch_size(),
            closed_grace_days: default_closed_grace_days(),
            lookback_months: default_lookback_months(),
        }
    }
}

impl AutoLinkConfig {
    pub fn range_policy(&self) -> RangePolicy {
        RangePolicy {
            closed_grace_days: self.closed_grace_days,
            lookback_months: self.lookback_months,
        }
    }
}

fn default_address_filter() -> bool {
    true
}

fn default_content_batch_size() -> usize {
    crate::linking::address_filter::CONTENT_BATCH_SIZE
}

fn default_closed_grace_days() -> i64 {
    DEFAULT_CLOSED_GRACE_DAYS
}

fn default_lookback_months() -> u32 {
    DEFAULT_LOOKBACK_MONTHS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_json::from_str("{}").expect("parse");
        assert!(config.db_path.is_none());
        assert!(config.auto_link.address_filter);
        assert_eq!(config.auto_link.content_batch_size, 100);
        assert_eq!(config.auto_link.closed_grace_days, 30);
        assert_eq!(config.auto_link.lookback_months, 24);
    }

    #[test]
    fn test_partial_auto_link_section() {
        let config: Config = serde_json::from_str(
            r#"{"dbPath": "/tmp/x.db", "autoLink": {"addressFilter": false, "closedGraceDays": 7}}"#,
        )
        .expect("parse");
        assert_eq!(config.db_path.as_deref(), Some("/tmp/x.db"));
        assert!(!config.auto_link.address_filter);
        assert_eq!(config.auto_link.range_policy().closed_grace_days, 7);
        assert_eq!(config.auto_link.range_policy().lookback_months, 24);
    }
}
