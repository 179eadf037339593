use std::path::Path;
use std::path::PathBuf;

use parking_lot::RwLock;
use regex::Regex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error_blocks;
use crate::file_io::list_dirs;
use crate::file_io::list_files;
use crate::file_io::read_lines;
use crate::parse_load;
use crate::poll::poll_until;
use crate::CassandraVersion;
use crate::Ccm;
use crate::CommandOutput;
use crate::Liveness;
use crate::PollPolicy;
use crate::Result;
use crate::Token;

const SSTABLE_DATA_SUFFIX: &str = "-Data.db";

/// First JMX port; node `i` listens on `JMX_PORT_BASE + 100 * i`
pub const JMX_PORT_BASE: u16 = 7000;
pub const DEFAULT_REMOTE_DEBUG_PORT: u16 = 2000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Block until the other live nodes see this one as up
    pub wait_other_notice: bool,
    /// Block until the native protocol port accepts connections
    pub wait_for_binary_proto: bool,
}

impl StartOptions {
    pub fn wait_other_notice(mut self) -> Self {
        self.wait_other_notice = true;
        self
    }

    pub fn wait_for_binary_proto(mut self) -> Self {
        self.wait_for_binary_proto = true;
        self
    }

    pub(crate) fn to_args(self) -> Vec<String> {
        let mut args = vec![];
        if self.wait_other_notice {
            args.push("--wait-other-notice".to_string());
        }
        if self.wait_for_binary_proto {
            args.push("--wait-for-binary-proto".to_string());
        }
        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOptions {
    /// Block until the other live nodes see this one as down
    pub wait_other_notice: bool,
    /// SIGTERM when true, SIGKILL otherwise
    pub gently: bool,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            wait_other_notice: false,
            gently: true,
        }
    }
}

impl StopOptions {
    pub fn wait_other_notice(mut self) -> Self {
        self.wait_other_notice = true;
        self
    }

    pub fn not_gently(mut self) -> Self {
        self.gently = false;
        self
    }
}

/// `nodetool repair` arguments, shaped by server version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOptions {
    pub keyspace: Option<String>,
    pub tables: Vec<String>,
    pub sequential: bool,
    pub full: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            keyspace: None,
            tables: vec![],
            sequential: true,
            full: true,
        }
    }
}

impl RepairOptions {
    pub fn keyspace(
        mut self,
        keyspace: impl Into<String>,
    ) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn tables<I, S>(
        mut self,
        tables: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn parallel(mut self) -> Self {
        self.sequential = false;
        self
    }

    /// Since 3.0 repair defaults to parallel and incremental, so sequential and
    /// full must be asked for; before 3.0 sequential was the default.
    pub fn to_args(
        &self,
        version: &CassandraVersion,
    ) -> Vec<String> {
        let modern = version.at_least(3, 0);
        let mut args = vec!["repair".to_string()];
        if self.sequential {
            if modern {
                args.push("-seq".to_string());
            }
        } else if !modern {
            args.push("-par".to_string());
        }
        if modern && self.full {
            args.push("-full".to_string());
        }
        if let Some(ks) = &self.keyspace {
            args.push(ks.clone());
            args.extend(self.tables.iter().cloned());
        }
        args
    }
}

/// Where and how a node joins the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub bootstrap: bool,
    pub token: Option<Token>,
    pub data_center: Option<String>,
    pub remote_debug_port: u16,
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self {
            bootstrap: true,
            token: None,
            data_center: None,
            remote_debug_port: DEFAULT_REMOTE_DEBUG_PORT,
        }
    }
}

impl NodeSpec {
    pub fn token(
        mut self,
        token: Token,
    ) -> Self {
        self.token = Some(token);
        self
    }

    pub fn data_center(
        mut self,
        dc: impl Into<String>,
    ) -> Self {
        self.data_center = Some(dc.into());
        self
    }

    pub fn remote_debug_port(
        mut self,
        port: u16,
    ) -> Self {
        self.remote_debug_port = port;
        self
    }

    pub fn no_bootstrap(mut self) -> Self {
        self.bootstrap = false;
        self
    }
}

/// One database process managed by ccm.
#[derive(Debug)]
pub struct NodeHandle {
    name: String,
    index: u32,
    token: Option<Token>,
    data_center: Option<String>,
    remote_debug_port: u16,
    directory: PathBuf,
    ccm: Ccm,
    liveness: RwLock<Liveness>,
}

impl NodeHandle {
    pub(crate) fn new(
        ccm: Ccm,
        cluster_dir: &Path,
        index: u32,
        token: Option<Token>,
        data_center: Option<String>,
        remote_debug_port: u16,
    ) -> Self {
        let name = format!("node{index}");
        Self {
            directory: cluster_dir.join(&name),
            name,
            index,
            token,
            data_center,
            remote_debug_port,
            ccm,
            liveness: RwLock::new(Liveness::Down),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn token(&self) -> Option<Token> {
        self.token
    }

    pub fn data_center(&self) -> Option<&str> {
        self.data_center.as_deref()
    }

    /// Loopback alias every interface of this node binds to
    pub fn address(&self) -> String {
        format!("127.0.0.{}", self.index)
    }

    pub fn jmx_port(&self) -> u16 {
        JMX_PORT_BASE + 100 * self.index as u16
    }

    pub fn remote_debug_port(&self) -> u16 {
        self.remote_debug_port
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn log_path(&self) -> PathBuf {
        self.directory.join("logs").join("system.log")
    }

    pub fn liveness(&self) -> Liveness {
        *self.liveness.read()
    }

    pub(crate) fn set_liveness(
        &self,
        liveness: Liveness,
    ) {
        let mut current = self.liveness.write();
        debug!(node = %self.name, from = ?*current, to = ?liveness, "liveness transition");
        *current = liveness;
    }

    async fn ccm_node<I, S>(
        &self,
        args: I,
    ) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let full: Vec<String> = std::iter::once(self.name.clone())
            .chain(args.into_iter().map(Into::into))
            .collect();
        self.ccm.exec(full).await
    }

    pub async fn start(
        &self,
        options: StartOptions,
    ) -> Result<()> {
        info!(node = %self.name, ?options, "starting node");
        self.set_liveness(Liveness::Starting);
        let mut args = vec!["start".to_string()];
        args.extend(options.to_args());
        match self.ccm_node(args).await {
            Ok(_) => {
                self.set_liveness(Liveness::Up);
                Ok(())
            }
            Err(e) => {
                warn!(node = %self.name, "failed to start: {:?}", e);
                self.set_liveness(Liveness::Down);
                Err(e)
            }
        }
    }

    pub async fn stop(
        &self,
        options: StopOptions,
    ) -> Result<()> {
        info!(node = %self.name, ?options, "stopping node");
        let mut args = vec!["stop".to_string()];
        if options.wait_other_notice {
            args.push("--wait-other-notice".to_string());
        }
        if !options.gently {
            args.push("--not-gently".to_string());
        }
        self.ccm_node(args).await?;
        self.set_liveness(Liveness::Down);
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        debug!(node = %self.name, "flush");
        self.ccm_node(["flush"]).await.map(|_| ())
    }

    /// Major compaction; `None` keyspace compacts everything.
    pub async fn compact(
        &self,
        keyspace: Option<&str>,
        table: Option<&str>,
    ) -> Result<()> {
        let mut args = vec!["compact".to_string()];
        if let Some(ks) = keyspace {
            args.push(ks.to_string());
            if let Some(t) = table {
                args.push(t.to_string());
            }
        }
        debug!(node = %self.name, ?args, "compact");
        self.nodetool_args(args).await.map(|_| ())
    }

    pub async fn cleanup(&self) -> Result<()> {
        debug!(node = %self.name, "cleanup");
        self.ccm_node(["cleanup"]).await.map(|_| ())
    }

    pub async fn repair(
        &self,
        options: &RepairOptions,
        version: &CassandraVersion,
    ) -> Result<String> {
        let args = options.to_args(version);
        info!(node = %self.name, ?args, "repair");
        self.nodetool_args(args).await
    }

    pub async fn decommission(&self) -> Result<()> {
        info!(node = %self.name, "decommission");
        self.nodetool_args(vec!["decommission".to_string()]).await?;
        self.set_liveness(Liveness::Decommissioned);
        Ok(())
    }

    /// Generic administrative call, e.g. `nodetool("compact ks cf")`.
    pub async fn nodetool(
        &self,
        command: &str,
    ) -> Result<String> {
        self.nodetool_args(command.split_whitespace().map(str::to_owned).collect())
            .await
    }

    async fn nodetool_args(
        &self,
        args: Vec<String>,
    ) -> Result<String> {
        let mut full = vec!["nodetool".to_string()];
        full.extend(args);
        self.ccm_node(full).await
    }

    /// Runs the stress tool from this node's install; returns its stdout.
    pub async fn stress(
        &self,
        args: &[String],
    ) -> Result<String> {
        info!(node = %self.name, ?args, "stress");
        let mut full = vec!["stress".to_string()];
        full.extend(args.iter().cloned());
        self.ccm_node(full).await
    }

    /// Runs a cqlsh script against this node; the output is returned whatever
    /// the exit status so statement errors can be classified by the caller.
    pub async fn cqlsh(
        &self,
        script: &str,
    ) -> Result<CommandOutput> {
        self.ccm
            .output([self.name.as_str(), "cqlsh", "-x", script])
            .await
    }

    /// `*-Data.db` files of `keyspace`, optionally of one table only.
    pub async fn get_sstables(
        &self,
        keyspace: &str,
        table: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let table = table.filter(|t| !t.is_empty());
        let mut sstables = Vec::new();

        for data_dir in list_dirs(&self.directory, |name| name.starts_with("data")).await? {
            let table_dirs = list_dirs(&data_dir.join(keyspace), |name| match table {
                // table directories are `<table>-<cfid>` since 2.1, plain `<table>` before
                Some(t) => name == t || name.strip_prefix(t).is_some_and(|rest| rest.starts_with('-')),
                None => true,
            })
            .await?;
            for dir in table_dirs {
                sstables.extend(list_files(&dir, |name| name.ends_with(SSTABLE_DATA_SUFFIX)).await?);
            }
        }

        debug!(node = %self.name, keyspace, ?table, count = sstables.len(), "sstables");
        Ok(sstables)
    }

    pub async fn get_sstable_count(
        &self,
        keyspace: &str,
        table: Option<&str>,
    ) -> Result<usize> {
        Ok(self.get_sstables(keyspace, table).await?.len())
    }

    /// On-disk load in bytes, as reported by `nodetool info`.
    pub async fn get_load_size(&self) -> Result<u64> {
        let info = self.nodetool("info").await?;
        let load = parse_load(&info)?;
        debug!(node = %self.name, ?load, "load");
        Ok(load.bytes())
    }

    pub async fn grep_log(
        &self,
        pattern: &Regex,
    ) -> Result<Vec<String>> {
        Ok(read_lines(&self.log_path())
            .await?
            .into_iter()
            .filter(|l| pattern.is_match(l))
            .collect())
    }

    pub async fn grep_log_for_errors(&self) -> Result<Vec<String>> {
        Ok(error_blocks(&read_lines(&self.log_path()).await?))
    }

    /// Current log length, to watch only what is logged afterwards.
    pub async fn mark_log(&self) -> Result<usize> {
        Ok(read_lines(&self.log_path()).await?.len())
    }

    /// Waits for a line matching `pattern` after line `from`.
    pub async fn watch_log_for(
        &self,
        pattern: &Regex,
        from: usize,
        policy: PollPolicy,
    ) -> Result<String> {
        let what = format!("`{}` in {} log", pattern.as_str(), self.name);
        poll_until(&what, policy, || async {
            let lines = read_lines(&self.log_path()).await?;
            Ok(lines.into_iter().skip(from).find(|l| pattern.is_match(l)))
        })
        .await
    }
}
