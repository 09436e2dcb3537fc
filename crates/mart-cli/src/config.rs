//! Run configuration from an optional TOML file plus command-line overrides.

use std::path::Path;

use anyhow::{Context, Result};
use mart_model::RunConfig;

/// Values given on the command line; `None` keeps the file or default value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigOverrides {
    pub quarantine_threshold: Option<f64>,
    pub max_retries: Option<u32>,
    pub retention_days: Option<u32>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut RunConfig) {
        if let Some(threshold) = self.quarantine_threshold {
            config.quarantine_threshold = threshold;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(days) = self.retention_days {
            config.retention_days = Some(days);
        }
    }
}

/// Parses a TOML run configuration. Missing keys take their defaults;
/// unknown keys are rejected.
pub fn parse_config(text: &str) -> Result<RunConfig> {
    toml::from_str(text).context("invalid run configuration")
}

/// Loads the configuration file if given, applies the overrides and
/// validates the result.
pub fn load_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<RunConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            parse_config(&text).with_context(|| format!("parse config {}", path.display()))?
        }
        None => RunConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use mart_model::TableName;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            batch_size = 100
            retention_days = 365
            required_tables = ["customers", "orders"]

            [quality_weights]
            completeness = 0.5
            uniqueness = 0.25
            validity = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.retention_days, Some(365));
        assert_eq!(
            config.required_tables,
            vec![TableName::Customers, TableName::Orders]
        );
        assert_eq!(config.quality_weights.completeness, 0.5);
        assert_eq!(config.max_retries, RunConfig::default().max_retries);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse_config("batch = 10").is_err());
    }

    #[test]
    fn flags_override_file_values() {
        let mut config = parse_config("quarantine_threshold = 0.1\nmax_retries = 5").unwrap();
        ConfigOverrides {
            quarantine_threshold: Some(0.2),
            max_retries: None,
            retention_days: Some(30),
        }
        .apply(&mut config);
        assert_eq!(config.quarantine_threshold, 0.2);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retention_days, Some(30));
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        let overrides = ConfigOverrides {
            quarantine_threshold: Some(1.5),
            ..ConfigOverrides::default()
        };
        let err = load_config(None, overrides).unwrap_err();
        assert!(err.to_string().contains("quarantine_threshold"), "{err}");
    }
}
