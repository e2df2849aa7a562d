//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Convert the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_network(config, &mut result);
        Self::validate_discovery(config, &mut result);
        Self::validate_loader(config, &mut result);
        Self::validate_events(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_network(config: &Config, result: &mut ValidationResult) {
        let Some(starting_block) = config.network.starting_block else {
            return;
        };

        let deployed_at = config.network.name.default_starting_block();
        if starting_block > deployed_at {
            result.add_warning(ValidationWarning::new(
                "network.starting_block",
                format!(
                    "starting_block {} is after the {} factory deployment ({}), early LBPs will be missed",
                    starting_block, config.network.name, deployed_at
                ),
            ));
        } else if starting_block < deployed_at {
            result.add_warning(ValidationWarning::new(
                "network.starting_block",
                format!(
                    "starting_block {} is before the {} factory deployment ({}), the scan will cover empty blocks",
                    starting_block, config.network.name, deployed_at
                ),
            ));
        }
    }

    fn validate_discovery(config: &Config, result: &mut ValidationResult) {
        if let Some(ref source) = config.discovery.source {
            if !source.exists() {
                result.add_warning(ValidationWarning::new(
                    "discovery.source",
                    format!("Deployment source does not exist: {:?}", source),
                ));
            }
        }
    }

    fn validate_loader(config: &Config, result: &mut ValidationResult) {
        if config.loader.loading_delay_ms > 5_000 {
            result.add_warning(ValidationWarning::new(
                "loader.loading_delay_ms",
                "loading_delay_ms is very high (>5000), slow loads will look frozen",
            ));
        }
    }

    fn validate_events(config: &Config, result: &mut ValidationResult) {
        if config.events.capacity == 0 {
            result.add_error(ValidationError::new(
                "events.capacity",
                "capacity must be greater than 0",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.to_ascii_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!(
                    "Unknown log level '{}', valid values: {:?}",
                    config.logging.level, VALID_LOG_LEVELS
                ),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
