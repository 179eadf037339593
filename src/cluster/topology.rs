use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::NodeHandle;
use crate::ParseError;
use crate::Result;
use crate::TopologyError;

/// Murmur3 partitioner token
pub type Token = i64;

/// Data center of nodes added without one
pub const DEFAULT_DATA_CENTER: &str = "dc1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Down,
    Starting,
    Up,
    /// Left the ring; terminal
    Decommissioned,
}

/// Evenly spaced Murmur3 tokens: `i * (2^64 / n) - 2^63`.
pub fn balanced_tokens(count: usize) -> Vec<Token> {
    if count == 0 {
        return vec![];
    }
    let step = (1u128 << 64) / count as u128;
    (0..count as u128)
        .map(|i| (i * step) as i128 - (1i128 << 63))
        .map(|t| t as Token)
        .collect()
}

/// Database release, ordered on its numeric part.
#[derive(Debug, Clone, Eq)]
pub struct CassandraVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// e.g. `beta1`, `SNAPSHOT`
    pub suffix: Option<String>,
}

impl CassandraVersion {
    pub const fn new(
        major: u32,
        minor: u32,
        patch: u32,
    ) -> Self {
        Self {
            major,
            minor,
            patch,
            suffix: None,
        }
    }

    pub fn at_least(
        &self,
        major: u32,
        minor: u32,
    ) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl FromStr for CassandraVersion {
    type Err = ParseError;

    /// Accepts `3.0.9`, `2.1`, `4.0-beta1`, and ccm-style `binary:3.0.9` /
    /// `git:cassandra-3.0.9`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidVersion(s.to_string());

        let raw = s.trim();
        let raw = raw.rsplit(':').next().unwrap_or(raw);
        let raw = raw.strip_prefix("cassandra-").unwrap_or(raw);

        let (numbers, suffix) = match raw.split_once('-') {
            Some((n, suf)) if !suf.is_empty() => (n, Some(suf.to_string())),
            Some(_) => return Err(invalid()),
            None => (raw, None),
        };

        let mut parts = numbers.split('.');
        let mut next = |required: bool| -> std::result::Result<u32, ParseError> {
            match parts.next() {
                Some(p) => p.parse::<u32>().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let major = next(true)?;
        let minor = next(true)?;
        let patch = next(false)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
            suffix,
        })
    }
}

impl fmt::Display for CassandraVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(suffix) = &self.suffix {
            write!(f, "-{suffix}")?;
        }
        Ok(())
    }
}

impl PartialEq for CassandraVersion {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for CassandraVersion {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CassandraVersion {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

/// Ordered node set with unique tokens.
#[derive(Debug, Default, Clone)]
pub struct ClusterTopology {
    nodes: Vec<Arc<NodeHandle>>,
}

impl ClusterTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node, rejecting a token already held by another node.
    pub fn push(
        &mut self,
        node: Arc<NodeHandle>,
    ) -> Result<()> {
        if let Some(token) = node.token() {
            if self.nodes.iter().any(|n| n.token() == Some(token)) {
                return Err(TopologyError::DuplicateToken(token.to_string()).into());
            }
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn remove(
        &mut self,
        name: &str,
    ) -> Result<Arc<NodeHandle>> {
        let pos = self
            .nodes
            .iter()
            .position(|n| n.name() == name)
            .ok_or_else(|| TopologyError::UnknownNode(name.to_string()))?;
        Ok(self.nodes.remove(pos))
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Result<Arc<NodeHandle>> {
        self.nodes
            .iter()
            .find(|n| n.name() == name)
            .cloned()
            .ok_or_else(|| TopologyError::UnknownNode(name.to_string()).into())
    }

    pub fn nodes(&self) -> &[Arc<NodeHandle>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes currently answering or about to.
    pub fn live_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.liveness(), Liveness::Up | Liveness::Starting))
            .count()
    }

    /// A keyspace with replication factor `rf` needs at least `rf` ring members.
    pub fn validate_replication(
        &self,
        rf: u32,
    ) -> Result<()> {
        let members = self
            .nodes
            .iter()
            .filter(|n| n.liveness() != Liveness::Decommissioned)
            .count();
        if (rf as usize) > members {
            return Err(TopologyError::ReplicationFactor { rf, nodes: members }.into());
        }
        Ok(())
    }

    /// Per data center variant of [`Self::validate_replication`].
    pub fn validate_dc_replication(
        &self,
        data_center: &str,
        rf: u32,
    ) -> Result<()> {
        let members = self
            .nodes
            .iter()
            .filter(|n| n.liveness() != Liveness::Decommissioned)
            .filter(|n| n.data_center().unwrap_or(DEFAULT_DATA_CENTER) == data_center)
            .count();
        if (rf as usize) > members {
            return Err(TopologyError::ReplicationFactor { rf, nodes: members }.into());
        }
        Ok(())
    }

    /// Next free index for `node<i>` naming.
    pub fn next_index(&self) -> u32 {
        self.nodes.iter().map(|n| n.index()).max().unwrap_or(0) + 1
    }
}
