//! CLI configuration.
//!
//! Loaded via the `config` crate from `CHAINFLOW__*` environment variables,
//! e.g. `CHAINFLOW__COMPILER__STRICT_PARAMETERS=false`.

use chainflow_workflow::CompilerConfig;
use serde::Deserialize;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CHAINFLOW";

/// CLI configuration composed from library configs.
#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    /// Graph compiler settings.
    #[serde(default)]
    pub compiler: CompilerConfig,
}

impl CliConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()
    }
}
