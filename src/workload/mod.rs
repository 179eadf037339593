//! Synthetic load against a session or through the stress tool.
//!
//! The `c1c2` helpers write and read back the two-column rows the bootstrap
//! scenarios use; [`random_reader`] wraps the read side as a
//! [`ConcurrentChecker`](crate::ConcurrentChecker) operation.
mod report;
mod stress;
pub use report::*;
pub use stress::*;

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::Rng;
use tracing::debug;

use crate::assert_one;
use crate::row;
use crate::Consistency;
use crate::Result;
use crate::Session;
use crate::Statement;

/// Table the `c1c2` helpers read and write
pub const C1C2_TABLE: &str = "cf";

pub fn c1c2_key(key: u64) -> String {
    format!("k{key}")
}

pub async fn insert_c1c2(
    session: &dyn Session,
    key: u64,
    consistency: Consistency,
) -> Result<()> {
    let query = format!(
        "UPDATE {C1C2_TABLE} SET c1='value1', c2='value2' WHERE key='{}'",
        c1c2_key(key)
    );
    session
        .execute(Statement::new(query).with_consistency(consistency))
        .await?;
    Ok(())
}

/// Reads key `k<key>` back; exactly `['value1', 'value2']` must come out.
pub async fn query_c1c2(
    session: &dyn Session,
    key: u64,
    consistency: Consistency,
) -> Result<()> {
    let query = format!("SELECT c1, c2 FROM {C1C2_TABLE} WHERE key='{}'", c1c2_key(key));
    assert_one(
        session,
        Statement::new(query).with_consistency(consistency),
        row!["value1", "value2"],
    )
    .await
}

/// `count` sequential single-row inserts, keys `0..count`.
pub async fn run_simple(
    session: &dyn Session,
    count: u64,
    consistency: Consistency,
) -> Result<()> {
    debug!(count, %consistency, "simple insert workload");
    for key in 0..count {
        insert_c1c2(session, key, consistency).await?;
    }
    Ok(())
}

/// Checker operation querying a random key in `[0, keys)` per call.
pub fn random_reader(
    session: Arc<dyn Session>,
    keys: u64,
    consistency: Consistency,
) -> impl FnMut() -> BoxFuture<'static, Result<()>> + Send + 'static {
    move || {
        let key = rand::thread_rng().gen_range(0..keys.max(1));
        let session = session.clone();
        async move { query_c1c2(session.as_ref(), key, consistency).await }.boxed()
    }
}
