use std::path::PathBuf;

use tracing::info;
use tracing::warn;

use crate::file_io::create_parent_dir_if_not_exist;
use crate::CassandraVersion;
use crate::NodeHandle;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StressMode {
    Write,
    Read,
    /// Reads and writes in the `read:write` ratio
    Mixed { read: u32, write: u32 },
}

/// One stress tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressSpec {
    pub mode: StressMode,
    pub operations: u64,
    /// Key population, e.g. `seq=1..1M`
    pub population: Option<String>,
    /// Compaction strategy class of the generated schema
    pub compaction: Option<String>,
    /// `-insert` options, e.g. `visits=EXP(1..5)`
    pub insert: Vec<String>,
    pub threads: Option<u32>,
    /// Report destination
    pub log_file: Option<PathBuf>,
}

impl StressSpec {
    fn new(
        mode: StressMode,
        operations: u64,
    ) -> Self {
        Self {
            mode,
            operations,
            population: None,
            compaction: None,
            insert: vec![],
            threads: None,
            log_file: None,
        }
    }

    pub fn write(operations: u64) -> Self {
        Self::new(StressMode::Write, operations)
    }

    pub fn read(operations: u64) -> Self {
        Self::new(StressMode::Read, operations)
    }

    pub fn mixed(
        operations: u64,
        read: u32,
        write: u32,
    ) -> Self {
        Self::new(StressMode::Mixed { read, write }, operations)
    }

    pub fn population(
        mut self,
        population: impl Into<String>,
    ) -> Self {
        self.population = Some(population.into());
        self
    }

    pub fn compaction(
        mut self,
        strategy: impl Into<String>,
    ) -> Self {
        self.compaction = Some(strategy.into());
        self
    }

    pub fn insert_option(
        mut self,
        option: impl Into<String>,
    ) -> Self {
        self.insert.push(option.into());
        self
    }

    pub fn threads(
        mut self,
        threads: u32,
    ) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn log_file(
        mut self,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Command line for the stress tool shipped with `version`.
    ///
    /// Before 2.1 the tool only understood `-n <count>`, so nothing else is
    /// emitted for those versions.
    pub fn to_args(
        &self,
        version: &CassandraVersion,
    ) -> Vec<String> {
        if !version.at_least(2, 1) {
            if self.mode != StressMode::Write {
                warn!(mode = ?self.mode, %version, "legacy stress only writes");
            }
            return vec!["-n".to_string(), self.operations.to_string()];
        }

        let mut args = match self.mode {
            StressMode::Write => vec!["write".to_string()],
            StressMode::Read => vec!["read".to_string()],
            StressMode::Mixed { .. } => vec!["mixed".to_string()],
        };
        args.push(format!("n={}", self.operations));
        if let StressMode::Mixed { read, write } = self.mode {
            args.push(format!("ratio(read={read},write={write})"));
        }
        if !self.insert.is_empty() {
            args.push("-insert".to_string());
            args.extend(self.insert.iter().cloned());
        }
        if let Some(pop) = &self.population {
            args.push("-pop".to_string());
            args.push(pop.clone());
        }
        if let Some(strategy) = &self.compaction {
            args.push("-schema".to_string());
            args.push(format!("compaction(strategy={strategy})"));
        }
        if let Some(threads) = self.threads {
            args.push("-rate".to_string());
            args.push(format!("threads={threads}"));
        }
        if let Some(path) = &self.log_file {
            args.push("-log".to_string());
            args.push(format!("file={}", path.display()));
        }
        args
    }
}

/// Runs `spec` from `node`; a failing stress run fails the caller.
pub async fn run_bulk(
    node: &NodeHandle,
    spec: &StressSpec,
    version: &CassandraVersion,
) -> Result<String> {
    if let Some(path) = &spec.log_file {
        create_parent_dir_if_not_exist(path)?;
    }
    let args = spec.to_args(version);
    info!(node = %node.name(), mode = ?spec.mode, operations = spec.operations, "bulk workload");
    node.stress(&args).await
}
