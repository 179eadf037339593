use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StressConfig {
    /// Where stress reports (`-log file=`) are written
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Client threads when a workload does not pick its own
    #[serde(default = "default_threads")]
    pub threads: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            threads: default_threads(),
        }
    }
}

impl StressConfig {
    pub fn validate(&self) -> Result<()> {
        if self.report_dir.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "stress.report_dir cannot be empty".into(),
            )));
        }
        if !(1..=1024).contains(&self.threads) {
            return Err(Error::Config(ConfigError::Message(format!(
                "stress.threads must be between 1 and 1024, got {}",
                self.threads
            ))));
        }
        Ok(())
    }
}

fn default_report_dir() -> PathBuf {
    std::env::temp_dir().join("dtest").join("stress")
}
fn default_threads() -> u32 {
    8
}
