//! Black-box distributed tests for a clustered database.
//!
//! Clusters are created and driven through `ccm`, queried through `cqlsh`,
//! loaded with the database's stress tool, and checked with bounded waits,
//! background checkers and result assertions. [`Scenario`] ties one cluster's
//! lifecycle together; the scenarios themselves live under `tests/`.
mod assertions;
mod checker;
mod cluster;
mod config;
mod errors;
mod observability;
mod scenario;
mod session;
mod workload;
pub mod utils;

pub use assertions::*;
pub use checker::*;
pub use cluster::*;
pub use config::*;
pub use errors::*;
pub use observability::*;
pub use scenario::*;
pub use session::*;
pub use utils::*;
pub use workload::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
