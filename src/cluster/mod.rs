//! Cluster lifecycle over ccm.
//!
//! [`ClusterHandle`] owns one ccm cluster and its [`ClusterTopology`]. Every
//! call is a pass-through to ccm; the local logic is argument shaping, token
//! bookkeeping and parsing of what the tools print back.
mod ccm;
mod logs;
mod node;
mod nodetool;
mod topology;
pub use ccm::*;
pub use logs::*;
pub use node::*;
pub use nodetool::*;
pub use topology::*;

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use config::ConfigError;
use nanoid::nanoid;
use tokio::sync::OnceCell;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::ClusterConfig;
use crate::Error;
use crate::Result;
use crate::TopologyError;

const NAME_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Remote debug port ccm gives populated node `i`: `2000 + 100 * i`
const POPULATE_DEBUG_PORT_BASE: u16 = 2000;

/// Native protocol port, bound on each node's own loopback alias
pub const BINARY_PORT: u16 = 9042;

#[derive(Debug)]
pub struct ClusterHandle {
    name: String,
    ccm: Ccm,
    settings: ClusterConfig,
    topology: ClusterTopology,
    version: OnceCell<CassandraVersion>,
}

impl ClusterHandle {
    /// Creates an empty, uniquely named cluster `<prefix>_<scenario>_<id>`.
    pub async fn create(
        scenario: &str,
        settings: &ClusterConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let name = format!(
            "{}_{}_{}",
            settings.name_prefix,
            scenario,
            nanoid!(8, &NAME_ALPHABET)
        );
        let ccm = Ccm::new(runner, settings.ccm_binary.clone(), settings.config_dir.clone());

        let mut args = vec!["create".to_string(), name.clone()];
        match (&settings.version, &settings.install_dir) {
            (Some(version), _) => {
                args.push("-v".to_string());
                args.push(version.clone());
            }
            (None, Some(dir)) => args.push(format!("--install-dir={}", dir.display())),
            (None, None) => {
                return Err(Error::Config(ConfigError::Message(
                    "either cluster.version or cluster.install_dir must be set".into(),
                )))
            }
        }

        tokio::fs::create_dir_all(&settings.config_dir).await?;
        info!(cluster = %name, config_dir = ?settings.config_dir, "creating cluster");
        ccm.exec(args).await?;

        Ok(Self {
            name,
            ccm,
            settings: settings.clone(),
            topology: ClusterTopology::new(),
            version: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ccm(&self) -> &Ccm {
        &self.ccm
    }

    pub fn directory(&self) -> PathBuf {
        self.ccm.config_dir().join(&self.name)
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    pub fn balanced_tokens(
        &self,
        count: usize,
    ) -> Vec<Token> {
        balanced_tokens(count)
    }

    /// Adds `count` nodes holding `tokens` (balanced when `None`).
    pub async fn populate(
        &mut self,
        count: usize,
        tokens: Option<&[Token]>,
    ) -> Result<&mut Self> {
        if count == 0 {
            return Err(TopologyError::Empty.into());
        }
        let tokens = match tokens {
            Some(t) if t.len() != count => {
                return Err(TopologyError::TokenCountMismatch {
                    expected: count,
                    actual: t.len(),
                }
                .into())
            }
            Some(t) => t.to_vec(),
            None => balanced_tokens(count),
        };

        info!(cluster = %self.name, count, ?tokens, "populating");
        let count_arg = count.to_string();
        self.ccm.exec(["populate", "-n", count_arg.as_str()]).await?;

        let cluster_dir = self.directory();
        for (i, token) in tokens.into_iter().enumerate() {
            let index = i as u32 + 1;
            let node = Arc::new(NodeHandle::new(
                self.ccm.clone(),
                &cluster_dir,
                index,
                Some(token),
                None,
                POPULATE_DEBUG_PORT_BASE + 100 * index as u16,
            ));
            self.ccm
                .exec([
                    node.name().to_string(),
                    "updateconf".to_string(),
                    "num_tokens: 1".to_string(),
                    format!("initial_token: {token}"),
                ])
                .await?;
            self.topology.push(node)?;
        }
        Ok(self)
    }

    /// Writes `key: value` pairs into every node's configuration file.
    pub async fn set_configuration_options<I, K, V>(
        &self,
        values: I,
        batch_commitlog: bool,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Display,
        V: Display,
    {
        let mut args = vec!["updateconf".to_string()];
        args.extend(values.into_iter().map(|(k, v)| format!("{k}: {v}")));
        if batch_commitlog {
            args.push("--batch-cl".to_string());
        }
        debug!(cluster = %self.name, ?args, "updating configuration");
        self.ccm.exec(args).await.map(|_| ())
    }

    pub async fn start(
        &self,
        options: StartOptions,
    ) -> Result<()> {
        let members: Vec<_> = self
            .topology
            .nodes()
            .iter()
            .filter(|n| n.liveness() != Liveness::Decommissioned)
            .cloned()
            .collect();
        info!(cluster = %self.name, nodes = members.len(), ?options, "starting cluster");

        for node in &members {
            node.set_liveness(Liveness::Starting);
        }
        let mut args = vec!["start".to_string()];
        args.extend(options.to_args());

        let outcome = self.ccm.exec(args).await;
        let state = if outcome.is_ok() { Liveness::Up } else { Liveness::Down };
        for node in &members {
            node.set_liveness(state);
        }
        outcome.map(|_| ())
    }

    pub async fn stop(&self) -> Result<()> {
        info!(cluster = %self.name, "stopping cluster");
        self.ccm.exec(["stop"]).await?;
        for node in self.topology.nodes() {
            if node.liveness() != Liveness::Decommissioned {
                node.set_liveness(Liveness::Down);
            }
        }
        Ok(())
    }

    /// Registers a new node `node<i>` on `127.0.0.<i>`; it is not started.
    pub async fn add_node(
        &mut self,
        spec: NodeSpec,
    ) -> Result<Arc<NodeHandle>> {
        let index = self.topology.next_index();
        let node = Arc::new(NodeHandle::new(
            self.ccm.clone(),
            &self.directory(),
            index,
            spec.token,
            spec.data_center.clone(),
            spec.remote_debug_port,
        ));
        self.topology.push(node.clone())?;

        let address = node.address();
        let mut args = vec!["add".to_string()];
        if spec.bootstrap {
            args.push("-b".to_string());
        }
        args.extend([
            "-i".to_string(),
            address.clone(),
            "-j".to_string(),
            node.jmx_port().to_string(),
            "-r".to_string(),
            spec.remote_debug_port.to_string(),
        ]);
        if let Some(token) = spec.token {
            // `=` keeps negative tokens from being read as options
            args.push(format!("--token={token}"));
        }
        if let Some(dc) = &spec.data_center {
            args.push("-d".to_string());
            args.push(dc.clone());
        }
        args.push("--binary-itf".to_string());
        args.push(format!("{address}:{BINARY_PORT}"));
        args.push(node.name().to_string());

        info!(cluster = %self.name, node = %node.name(), ?spec, "adding node");
        if let Err(e) = self.ccm.exec(args).await {
            warn!(node = %node.name(), "ccm add failed: {:?}", e);
            self.topology.remove(node.name())?;
            return Err(e);
        }
        Ok(node)
    }

    /// Stops and forgets a node, deleting its directory.
    pub async fn remove_node(
        &mut self,
        name: &str,
    ) -> Result<Arc<NodeHandle>> {
        self.topology.get(name)?;
        info!(cluster = %self.name, node = name, "removing node");
        self.ccm.exec([name, "remove"]).await?;
        self.topology.remove(name)
    }

    pub fn nodelist(&self) -> Vec<Arc<NodeHandle>> {
        self.topology.nodes().to_vec()
    }

    pub fn node(
        &self,
        name: &str,
    ) -> Result<Arc<NodeHandle>> {
        self.topology.get(name)
    }

    /// Configured version, else the one reported by the first node's install.
    pub async fn version(&self) -> Result<CassandraVersion> {
        self.version
            .get_or_try_init(|| async {
                if let Some(v) = &self.settings.version {
                    return Ok(CassandraVersion::from_str(v)?);
                }
                let first = self.topology.nodes().first().ok_or(TopologyError::Empty)?;
                let output = self.ccm.exec([first.name(), "version"]).await?;
                let version = parse_release_version(&output)?;
                debug!(cluster = %self.name, %version, "detected version");
                Ok::<_, Error>(version)
            })
            .await
            .cloned()
    }

    /// Removes every process and all on-disk state of the cluster.
    pub async fn destroy(&self) -> Result<()> {
        info!(cluster = %self.name, "destroying cluster");
        self.ccm.exec(["remove", self.name.as_str()]).await?;
        for node in self.topology.nodes() {
            if node.liveness() != Liveness::Decommissioned {
                node.set_liveness(Liveness::Down);
            }
        }
        Ok(())
    }
}
