//! CQL for the keyspaces and tables scenarios create.

use crate::ClusterTopology;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replication {
    /// `SimpleStrategy` with one replication factor
    Simple(u32),
    /// `NetworkTopologyStrategy`, replication factor per data center
    NetworkTopology(Vec<(String, u32)>),
}

impl Replication {
    pub fn network_topology<I, S>(per_dc: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Replication::NetworkTopology(per_dc.into_iter().map(|(dc, rf)| (dc.into(), rf)).collect())
    }

    /// Replication map literal, e.g. `{'class':'SimpleStrategy', 'replication_factor':1}`.
    pub fn to_cql(&self) -> String {
        match self {
            Replication::Simple(rf) => {
                format!("{{'class':'SimpleStrategy', 'replication_factor':{rf}}}")
            }
            Replication::NetworkTopology(per_dc) => {
                let dcs: Vec<String> = per_dc.iter().map(|(dc, rf)| format!("'{dc}':{rf}")).collect();
                format!("{{'class':'NetworkTopologyStrategy', {}}}", dcs.join(", "))
            }
        }
    }

    /// Each data center must hold at least as many nodes as replicas asked of it.
    pub fn validate(
        &self,
        topology: &ClusterTopology,
    ) -> Result<()> {
        match self {
            Replication::Simple(rf) => topology.validate_replication(*rf),
            Replication::NetworkTopology(per_dc) => {
                for (dc, rf) in per_dc {
                    topology.validate_dc_replication(dc, *rf)?;
                }
                Ok(())
            }
        }
    }
}

pub fn create_keyspace_cql(
    name: &str,
    replication: &Replication,
) -> String {
    format!("CREATE KEYSPACE {name} WITH replication={}", replication.to_cql())
}

/// Shape of the test tables scenarios create.
///
/// Without extra columns the table is `(key, c varchar, v varchar)` clustered
/// on `c`; with columns, `key` alone is the primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOptions {
    pub key_type: String,
    /// `(name, type)` in declaration order
    pub columns: Vec<(String, String)>,
    /// Compressor prefix, e.g. `LZ4` for `LZ4Compressor`; `None` disables compression
    pub compression: Option<String>,
    pub read_repair: Option<f64>,
    pub gc_grace: Option<u32>,
    pub speculative_retry: Option<String>,
    /// Compaction strategy class
    pub compaction: Option<String>,
    pub compact_storage: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            key_type: "varchar".to_string(),
            columns: vec![],
            compression: None,
            read_repair: None,
            gc_grace: None,
            speculative_retry: None,
            compaction: None,
            compact_storage: false,
        }
    }
}

impl TableOptions {
    pub fn key_type(
        mut self,
        key_type: impl Into<String>,
    ) -> Self {
        self.key_type = key_type.into();
        self
    }

    pub fn column(
        mut self,
        name: impl Into<String>,
        cql_type: impl Into<String>,
    ) -> Self {
        self.columns.push((name.into(), cql_type.into()));
        self
    }

    pub fn gc_grace(
        mut self,
        seconds: u32,
    ) -> Self {
        self.gc_grace = Some(seconds);
        self
    }

    pub fn compression(
        mut self,
        compressor: impl Into<String>,
    ) -> Self {
        self.compression = Some(compressor.into());
        self
    }

    pub fn read_repair(
        mut self,
        chance: f64,
    ) -> Self {
        self.read_repair = Some(chance);
        self
    }

    pub fn speculative_retry(
        mut self,
        retry: impl Into<String>,
    ) -> Self {
        self.speculative_retry = Some(retry.into());
        self
    }

    pub fn compaction(
        mut self,
        strategy: impl Into<String>,
    ) -> Self {
        self.compaction = Some(strategy.into());
        self
    }

    pub fn compact_storage(mut self) -> Self {
        self.compact_storage = true;
        self
    }

    pub fn create_table_cql(
        &self,
        name: &str,
    ) -> String {
        let mut query = if self.columns.is_empty() {
            format!(
                "CREATE TABLE {name} (key {}, c varchar, v varchar, PRIMARY KEY(key, c)) WITH comment='test cf'",
                self.key_type
            )
        } else {
            let extra: String = self.columns.iter().map(|(c, t)| format!(", {c} {t}")).collect();
            format!(
                "CREATE TABLE {name} (key {} PRIMARY KEY{extra}) WITH comment='test cf'",
                self.key_type
            )
        };

        match &self.compression {
            Some(c) => query.push_str(&format!(" AND compression = {{ 'sstable_compression': '{c}Compressor' }}")),
            None => query.push_str(" AND compression = {}"),
        }
        if let Some(chance) = self.read_repair {
            query.push_str(&format!(" AND read_repair_chance={chance:.6}"));
        }
        if let Some(gc) = self.gc_grace {
            query.push_str(&format!(" AND gc_grace_seconds={gc}"));
        }
        if let Some(retry) = &self.speculative_retry {
            query.push_str(&format!(" AND speculative_retry='{retry}'"));
        }
        if let Some(strategy) = &self.compaction {
            query.push_str(&format!(" AND compaction = {{'class': '{strategy}'}}"));
        }
        if self.compact_storage {
            query.push_str(" AND COMPACT STORAGE");
        }
        query
    }
}
