use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Bounded poll template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Total budget before the wait fails (unit: milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Pause between attempts (unit: milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl PollPolicy {
    pub const fn new(
        timeout_ms: u64,
        interval_ms: u64,
    ) -> Self {
        Self {
            timeout_ms,
            interval_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}.timeout_ms must be greater than 0"
            ))));
        }
        if self.interval_ms == 0 || self.interval_ms > self.timeout_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}.interval_ms must be in 1..={}, got {}",
                self.timeout_ms, self.interval_ms
            ))));
        }
        Ok(())
    }
}

/// Divide waits by what the cluster is converging on
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WaitPolicies {
    /// Node answering queries after start
    #[serde(default = "default_node_ready")]
    pub node_ready: PollPolicy,

    /// Secondary index build completion
    #[serde(default = "default_index_build")]
    pub index_build: PollPolicy,

    /// Bootstrap streaming / load convergence
    #[serde(default = "default_streaming")]
    pub streaming: PollPolicy,

    /// Pattern showing up in a node log
    #[serde(default = "default_log_watch")]
    pub log_watch: PollPolicy,

    /// Pause after schema changes so every node sees them (unit: milliseconds)
    #[serde(default = "default_schema_settle_ms")]
    pub schema_settle_ms: u64,

    /// Pause after administrative operations such as flush/compact/cleanup
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Pause between iterations of background checkers, 0 for none
    #[serde(default)]
    pub checker_pause_ms: u64,
}

impl Default for WaitPolicies {
    fn default() -> Self {
        Self {
            node_ready: default_node_ready(),
            index_build: default_index_build(),
            streaming: default_streaming(),
            log_watch: default_log_watch(),
            schema_settle_ms: default_schema_settle_ms(),
            settle_ms: default_settle_ms(),
            checker_pause_ms: 0,
        }
    }
}

impl WaitPolicies {
    pub fn validate(&self) -> Result<()> {
        self.node_ready.validate("wait.node_ready")?;
        self.index_build.validate("wait.index_build")?;
        self.streaming.validate("wait.streaming")?;
        self.log_watch.validate("wait.log_watch")?;
        Ok(())
    }

    pub fn schema_settle(&self) -> Duration {
        Duration::from_millis(self.schema_settle_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn checker_pause(&self) -> Duration {
        Duration::from_millis(self.checker_pause_ms)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_interval_ms() -> u64 {
    500
}
fn default_node_ready() -> PollPolicy {
    PollPolicy::new(60_000, 500)
}
fn default_index_build() -> PollPolicy {
    PollPolicy::new(120_000, 250)
}
fn default_streaming() -> PollPolicy {
    PollPolicy::new(300_000, 1_000)
}
fn default_log_watch() -> PollPolicy {
    PollPolicy::new(120_000, 250)
}
fn default_schema_settle_ms() -> u64 {
    200
}
fn default_settle_ms() -> u64 {
    500
}
