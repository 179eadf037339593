//! Process seam: every external tool the harness drives goes through
//! [`CommandRunner`], and every ccm call through [`Ccm`].

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::Error;
use crate::InfraError;
use crate::Result;

/// Environment variable ccm reads its configuration directory from
pub const CCM_CONFIG_DIR_ENV: &str = "CCM_CONFIG_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl fmt::Display for Invocation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given stderr.
    pub fn failed(
        status: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Runs the invocation to completion and captures its output.
    ///
    /// A non-zero exit status is NOT an error at this level; callers decide.
    async fn run(
        &self,
        invocation: Invocation,
    ) -> Result<CommandOutput>;
}

/// Runs invocations as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: Invocation,
    ) -> Result<CommandOutput> {
        let command_line = invocation.to_string();
        debug!(command = %command_line, "running");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(InfraError::Spawn {
                    command: command_line,
                    source: e,
                }
                .into())
            }
            Err(_) => {
                warn!(command = %command_line, timeout = ?self.timeout, "command timed out");
                return Err(Error::Timeout {
                    what: command_line,
                    elapsed: self.timeout,
                });
            }
        };

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// ccm bound to one configuration directory.
#[derive(Clone)]
pub struct Ccm {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    config_dir: PathBuf,
}

impl fmt::Debug for Ccm {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Ccm")
            .field("binary", &self.binary)
            .field("config_dir", &self.config_dir)
            .finish()
    }
}

impl Ccm {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        binary: impl Into<String>,
        config_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            binary: binary.into(),
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn invocation<I, S>(
        &self,
        args: I,
    ) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            program: self.binary.clone(),
            args: args.into_iter().map(Into::into).collect(),
            envs: vec![(
                CCM_CONFIG_DIR_ENV.to_string(),
                self.config_dir.display().to_string(),
            )],
        }
    }

    /// Raw output, whatever the exit status.
    pub async fn output<I, S>(
        &self,
        args: I,
    ) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner.run(self.invocation(args)).await
    }

    /// Stdout of a command that must succeed.
    pub async fn exec<I, S>(
        &self,
        args: I,
    ) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = self.invocation(args);
        let command = invocation.to_string();
        let output = self.runner.run(invocation).await?;
        if !output.success() {
            let stderr = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(InfraError::CommandFailed {
                command,
                status: output.status,
                stderr,
            }
            .into());
        }
        Ok(output.stdout)
    }
}
