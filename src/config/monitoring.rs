use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// Default filter directive, `RUST_LOG` takes precedence when set
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Write harness logs into `<log_dir>/dtest.log` instead of stdout
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            log_dir: None,
        }
    }
}

impl ObservabilityConfig {
    /// Validates observability configuration
    /// # Errors
    /// Returns `Error::Config` when the filter directive does not parse
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = EnvFilter::try_new(&self.filter) {
            return Err(Error::Config(ConfigError::Message(format!(
                "observability.filter `{}` is invalid: {}",
                self.filter, e
            ))));
        }

        if let Some(dir) = &self.log_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config(ConfigError::Message(
                    "observability.log_dir cannot be empty when set".into(),
                )));
            }
        }

        Ok(())
    }
}

fn default_filter() -> String {
    "dtest=info".to_string()
}
