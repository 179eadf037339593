use config::ConfigError;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Teardown log checking
///
/// `ignore_patterns` are the defaults every scenario starts from; scenarios add
/// their own on top when building the value passed to teardown.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogCheckConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Regular expressions matched against each error block
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

impl Default for LogCheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ignore_patterns: vec![],
        }
    }
}

impl LogCheckConfig {
    pub fn validate(&self) -> Result<()> {
        for pattern in &self.ignore_patterns {
            if let Err(e) = Regex::new(pattern) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "log_check.ignore_patterns contains invalid pattern `{pattern}`: {e}"
                ))));
            }
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}
