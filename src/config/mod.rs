//! Configuration management for the distributed test harness.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Section-wise validation
mod cluster;
mod log_check;
mod monitoring;
mod stress;
mod wait;
pub use cluster::*;
pub use log_check::*;
pub use monitoring::*;
pub use stress::*;
pub use wait::*;
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "DTEST";

/// Main configuration container for the harness
///
/// Combines all section configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with `DTEST__` prefix (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DtestConfig {
    /// How clusters are created and reached through ccm
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Poll budgets and settle delays
    #[serde(default)]
    pub wait: WaitPolicies,
    /// Load generation defaults
    #[serde(default)]
    pub stress: StressConfig,
    /// Node log checking at teardown
    #[serde(default)]
    pub log_check: LogCheckConfig,
    /// Harness logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl DtestConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `DTEST__` prefix (highest priority)
    ///
    /// # Note
    /// This method does NOT validate the configuration. Callers MUST call `validate()`
    /// after all overrides are applied.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("DTEST__CLUSTER__VERSION", "3.0.9");
    /// let cfg = DtestConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.cluster.validate()?;
        self.wait.validate()?;
        self.stress.validate()?;
        self.log_check.validate()?;
        self.observability.validate()?;
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("log_check.ignore_patterns")
}
