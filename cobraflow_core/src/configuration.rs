//! Process-wide defaults for model building, routing and the regulation loop
use std::sync::{LazyLock, RwLock};

use serde::Deserialize;
use thiserror::Error;

pub static CONFIGURATION: LazyLock<RwLock<Configuration>> =
    LazyLock::new(|| RwLock::new(Configuration::default()));

/// Settings shared by the orchestration components
///
/// Components take a copy at construction time (see [`Configuration::current`]), so changing
/// [`CONFIGURATION`] afterwards only affects components built later.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Default lower flux bound for new reactions
    pub lower_bound: f64,
    /// Default upper flux bound for new reactions
    pub upper_bound: f64,
    /// Name of the topic exchange all queues are bound to
    pub exchange: String,
    /// First word of job request routing keys (`<feed_prefix>.<category>`)
    pub feed_prefix: String,
    /// First word of job result routing keys (`<result_prefix>.<category>`)
    pub result_prefix: String,
    /// Routing key used for cancellation requests
    pub control_key: String,
    /// Appended to a rule quantity name to find its shadow price
    pub compartment_suffix: String,
    /// Maximum number of chained resubmissions per regulated job
    pub max_regulation_rounds: u32,
    /// Maximum number of solver jobs a worker starts per second
    pub worker_rate_limit: Option<u32>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            lower_bound: -1000.,
            upper_bound: 1000.,
            exchange: "tasks".to_string(),
            feed_prefix: "feed".to_string(),
            result_prefix: "result".to_string(),
            control_key: "control.revoke".to_string(),
            compartment_suffix: "_c".to_string(),
            max_regulation_rounds: 3,
            worker_rate_limit: Some(10),
        }
    }
}

impl Configuration {
    /// Copy of the current process-wide configuration
    pub fn current() -> Configuration {
        match CONFIGURATION.read() {
            Ok(config) => config.clone(),
            // A writer panicked mid-update, the stored value is still a complete struct
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the process-wide configuration
    pub fn install(self) {
        match CONFIGURATION.write() {
            Ok(mut config) => *config = self,
            Err(poisoned) => *poisoned.into_inner() = self,
        }
    }

    /// Read a configuration from a JSON document, missing fields take their default value
    pub fn from_json_str(data: &str) -> Result<Configuration, ConfigurationError> {
        let config: Configuration = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.lower_bound > self.upper_bound {
            return Err(ConfigurationError::InvalidValue(format!(
                "lower_bound {} is greater than upper_bound {}",
                self.lower_bound, self.upper_bound
            )));
        }
        for (field, value) in [
            ("exchange", &self.exchange),
            ("feed_prefix", &self.feed_prefix),
            ("result_prefix", &self.result_prefix),
            ("control_key", &self.control_key),
        ] {
            if value.is_empty() {
                return Err(ConfigurationError::InvalidValue(format!(
                    "{field} must not be empty"
                )));
            }
        }
        if self.worker_rate_limit == Some(0) {
            return Err(ConfigurationError::InvalidValue(
                "worker_rate_limit must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Unable to parse configuration: {0}")]
    UnableToParse(#[from] serde_json::Error),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let config = Configuration::from_json_str(r#"{"max_regulation_rounds": 5}"#).unwrap();
        assert_eq!(config.max_regulation_rounds, 5);
        assert_eq!(config.compartment_suffix, "_c");
        assert_eq!(config.feed_prefix, "feed");
        assert_eq!(config.worker_rate_limit, Some(10));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config =
            Configuration::from_json_str(r#"{"tolerance": 1e-9, "exchange": "jobs"}"#).unwrap();
        assert_eq!(
            config,
            Configuration {
                exchange: "jobs".to_string(),
                ..Configuration::default()
            }
        );
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = Configuration::from_json_str(r#"{"lower_bound": 10.0, "upper_bound": 0.0}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue(_)));
    }

    #[test]
    fn rejects_zero_rate_limit() {
        assert!(Configuration::from_json_str(r#"{"worker_rate_limit": 0}"#).is_err());
        let unlimited = Configuration::from_json_str(r#"{"worker_rate_limit": null}"#).unwrap();
        assert_eq!(unlimited.worker_rate_limit, None);
    }
}
