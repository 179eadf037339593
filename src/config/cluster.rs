use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// ccm executable, resolved through `PATH` unless absolute
    #[serde(default = "default_ccm_binary")]
    pub ccm_binary: String,

    /// Isolated ccm configuration directory (exported as `CCM_CONFIG_DIR`)
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Database version ccm should download/build, e.g. `3.0.9`
    #[serde(default)]
    pub version: Option<String>,

    /// Local database install used instead of a version download
    #[serde(default)]
    pub install_dir: Option<PathBuf>,

    /// Prefix of generated cluster names
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Leave the cluster on disk when a scenario fails, for post-mortem
    #[serde(default)]
    pub keep_on_failure: bool,

    /// Upper bound for any single ccm invocation
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            ccm_binary: default_ccm_binary(),
            config_dir: default_config_dir(),
            version: None,
            install_dir: None,
            name_prefix: default_name_prefix(),
            keep_on_failure: false,
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl ClusterConfig {
    /// Validates cluster configuration consistency
    /// # Errors
    /// Returns `Error::Config` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if self.ccm_binary.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "ccm_binary cannot be empty".into(),
            )));
        }

        if self.version.is_some() && self.install_dir.is_some() {
            return Err(Error::Config(ConfigError::Message(
                "version and install_dir are mutually exclusive".into(),
            )));
        }

        if self.config_dir.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "config_dir path cannot be empty".into(),
            )));
        }

        // ccm uses the name as a directory and rejects separators
        if self.name_prefix.is_empty()
            || !self.name_prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Config(ConfigError::Message(format!(
                "name_prefix must be non-empty [A-Za-z0-9_], got `{}`",
                self.name_prefix
            ))));
        }

        if self.command_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "command_timeout_ms must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_ccm_binary() -> String {
    "ccm".to_string()
}
fn default_config_dir() -> PathBuf {
    std::env::temp_dir().join("dtest")
}
fn default_name_prefix() -> String {
    "test".to_string()
}
fn default_command_timeout_ms() -> u64 {
    600_000
}
