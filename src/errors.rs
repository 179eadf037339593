//! Harness Error Hierarchy
//!
//! Defines the error types surfaced by scenario code, categorized by where the
//! failure originated: a result check, the database's query interface, a
//! background checker, report/tool output parsing, or the process layer.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

use crate::session::Row;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Expected vs. actual mismatch; terminates the scenario
    #[error(transparent)]
    Assertion(#[from] AssertionError),

    /// Statement failed on the query interface
    #[error(transparent)]
    Query(#[from] QueryError),

    /// First failure captured by a background checker since the previous check
    #[error("Concurrent operation failed at iteration {iteration}: {source}")]
    ConcurrentCheck {
        iteration: u64,
        #[source]
        source: Box<Error>,
    },

    /// Malformed or incomplete tool output
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Process-level failures (ccm, nodetool, stress)
    #[error(transparent)]
    Infrastructure(#[from] InfraError),

    /// Cluster topology invariants
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Harness configuration loading/validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Bounded poll exhausted its budget
    #[error("Timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// True when the server refused the statement (as opposed to failing to run it).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Query(QueryError::Rejected { .. }))
    }

    /// Rejection message, if this error is a server-side rejection.
    pub fn rejection_message(&self) -> Option<&str> {
        match self {
            Error::Query(QueryError::Rejected { message, .. }) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssertionError {
    #[error("Expected {expected} row(s) from `{query}` but got {actual}: {rows:?}")]
    RowCount {
        query: String,
        expected: usize,
        actual: usize,
        rows: Vec<Row>,
    },

    #[error("Unexpected row from `{query}`: expected {expected:?}, got {actual:?}")]
    RowMismatch {
        query: String,
        expected: Row,
        actual: Row,
    },

    #[error("Unexpected rows from `{query}`: expected {expected:?}, got {actual:?}")]
    RowsMismatch {
        query: String,
        expected: Vec<Row>,
        actual: Vec<Row>,
    },

    #[error("Expected `{query}` to be rejected but it succeeded with {rows:?}")]
    UnexpectedSuccess { query: String, rows: Vec<Row> },

    #[error("Rejection of `{query}` does not mention `{expected}`: {actual}")]
    RejectionMismatch {
        query: String,
        expected: String,
        actual: String,
    },

    #[error("{a} and {b} differ by more than {error} relative tolerance")]
    NotAlmostEqual { a: f64, b: f64, error: f64 },

    #[error("Relative tolerance must be non-negative, got {0}")]
    InvalidTolerance(f64),

    #[error("Unexpected error(s) in {node} log: {errors:?}")]
    UnexpectedLogErrors { node: String, errors: Vec<String> },

    #[error("{0}")]
    Condition(String),
}

/// Kinds of server-side statement rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    InvalidRequest,
    Syntax,
    Configuration,
    Unauthorized,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Statement refused by the server
    #[error("{kind:?}: {message}")]
    Rejected { kind: RejectionKind, message: String },

    /// Not enough live replicas for the requested consistency level
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Replicas did not answer in time
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Client could not reach the node
    #[error("Connection error: {0}")]
    Connection(String),

    /// Any other server-reported failure
    #[error("Server error: {0}")]
    Server(String),

    /// Bound values do not fit the statement template
    #[error("Cannot bind statement: {0}")]
    Bind(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Label `{label}` not found in report {path:?}")]
    MissingLabel {
        label: &'static str,
        path: Option<PathBuf>,
    },

    #[error("Value `{value}` after `{label}` is not a number")]
    InvalidNumber { label: String, value: String },

    #[error("No `Load` line in nodetool info output")]
    MissingLoadLine,

    #[error("Unexpected load unit `{0}`")]
    UnexpectedUnit(String),

    #[error("Invalid version string `{0}`")]
    InvalidVersion(String),

    #[error("Malformed tool output: {0}")]
    MalformedOutput(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("`{command}` exited with {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("Token {0} is already assigned in this topology")]
    DuplicateToken(String),

    #[error("Expected {expected} tokens for {expected} nodes, got {actual}")]
    TokenCountMismatch { expected: usize, actual: usize },

    #[error("Replication factor {rf} needs at least {rf} nodes, topology has {nodes}")]
    ReplicationFactor { rf: u32, nodes: usize },

    #[error("Unknown node `{0}`")]
    UnknownNode(String),

    #[error("Cluster has no nodes")]
    Empty,
}
