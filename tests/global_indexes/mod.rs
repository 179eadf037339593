//! Secondary index behavior across schema and topology changes; 3.0 and later.

use std::ops::Range;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serial_test::serial;

use dtest::assert_invalid;
use dtest::assert_none;
use dtest::assert_one;
use dtest::poll::wait_until;
use dtest::row;
use dtest::Consistency;
use dtest::CqlshSession;
use dtest::IgnoredLogPatterns;
use dtest::NodeSpec;
use dtest::Replication;
use dtest::Result;
use dtest::Scenario;
use dtest::Session;
use dtest::StartOptions;
use dtest::Statement;

use crate::common::run_scenario;

const ROWS: i32 = 1_000;
const EXTRA_ROWS: Range<i32> = 1_000..1_100;

/// Rows written before the index exists
const UNINDEXED_ROWS: i32 = 10_000;
const INSERT_BATCH: usize = 100;

const UNBUILT_INDEX: &str = "Cannot query index until it is built.";

/// Three nodes, keyspace `ks` with RF 1; `None` below 3.0.
async fn prepare(scenario: &mut Scenario) -> Result<Option<Arc<CqlshSession>>> {
    scenario.cluster_mut().populate(3, None).await?;
    if !scenario.requires_version(3, 0).await? {
        return Ok(None);
    }
    scenario.cluster().start(StartOptions::default()).await?;

    let node1 = scenario.cluster().node("node1")?;
    let session = scenario.patient_cql_connection(&node1).await?;
    scenario
        .create_ks(session.as_ref(), "ks", Replication::Simple(1))
        .await?;
    Ok(Some(session))
}

async fn create_indexed_table(
    scenario: &Scenario,
    session: &dyn Session,
    value_type: &str,
) -> Result<()> {
    session
        .execute(Statement::new(format!(
            "CREATE TABLE t (id int PRIMARY KEY, v {value_type})"
        )))
        .await?;
    session.execute(Statement::new("CREATE INDEX ON t (v)")).await?;
    scenario.schema_settle().await;
    Ok(())
}

async fn insert_rows(
    session: &dyn Session,
    ids: Range<i32>,
) -> Result<()> {
    for i in ids {
        session
            .execute(Statement::new(format!("INSERT INTO t (id, v) VALUES ({i}, {i})")))
            .await?;
    }
    Ok(())
}

/// Each value in `ids` finds exactly its own row through the index.
async fn assert_indexed(
    session: &dyn Session,
    table: &str,
    ids: Range<i32>,
) -> Result<()> {
    for i in ids {
        assert_one(session, format!("SELECT * FROM {table} WHERE v = {i}"), row![i, i]).await?;
    }
    Ok(())
}

async fn run_indexed(
    name: &str,
    body: for<'a> fn(&'a mut Scenario, Arc<CqlshSession>) -> BoxFuture<'a, Result<()>>,
) -> Result<()> {
    run_scenario(name, IgnoredLogPatterns::none(), move |s| {
        async move {
            match prepare(s).await? {
                Some(session) => body(s, session).await,
                None => Ok(()),
            }
        }
        .boxed()
    })
    .await
}

/// Until the build finishes, an index query is either answered correctly or
/// refused as unbuilt; afterwards every value is found.
#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn populate_index_after_insert() -> Result<()> {
    run_indexed("populate_index_after_insert", |s, session| {
        populate_index_after_insert_body(s, session).boxed()
    })
    .await
}

async fn populate_index_after_insert_body(
    scenario: &mut Scenario,
    session: Arc<CqlshSession>,
) -> Result<()> {
    let session = session.as_ref();
    session
        .execute(Statement::new("CREATE TABLE t (id int PRIMARY KEY, v int)"))
        .await?;
    scenario.schema_settle().await;

    let ids: Vec<i32> = (0..UNINDEXED_ROWS).collect();
    for chunk in ids.chunks(INSERT_BATCH) {
        let inserts = chunk
            .iter()
            .map(|i| format!("INSERT INTO t (id, v) VALUES ({i}, {i})"));
        session.execute(Statement::batch(inserts)).await?;
    }

    session.execute(Statement::new("CREATE INDEX ON t (v)")).await?;

    for i in 0..UNINDEXED_ROWS {
        match assert_one(session, format!("SELECT * FROM t WHERE v = {i}"), row![i, i]).await {
            Ok(()) => {}
            Err(e) if e.rejection_message().is_some_and(|m| m.contains(UNBUILT_INDEX)) => {}
            Err(e) => return Err(e),
        }
    }

    let policy = scenario.settings().wait.index_build;
    wait_until("index on t (v) to be built", policy, || async move {
        match assert_one(session, "SELECT * FROM t WHERE v = 0", row![0, 0]).await {
            Ok(()) => Ok(true),
            Err(e) if e.rejection_message().is_some_and(|m| m.contains(UNBUILT_INDEX)) => Ok(false),
            Err(e) => Err(e),
        }
    })
    .await?;

    assert_indexed(session, "t", 0..UNINDEXED_ROWS).await
}

/// Once the index is dropped, queries on `v` are refused.
#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn drop_index() -> Result<()> {
    run_indexed("drop_index", |s, session| drop_index_body(s, session).boxed()).await
}

async fn drop_index_body(
    scenario: &mut Scenario,
    session: Arc<CqlshSession>,
) -> Result<()> {
    let session = session.as_ref();
    create_indexed_table(scenario, session, "int").await?;
    insert_rows(session, 0..ROWS).await?;
    assert_indexed(session, "t", 0..ROWS).await?;

    session.execute(Statement::new("DROP INDEX ks.t_v_idx")).await?;
    scenario.schema_settle().await;

    for i in 0..ROWS {
        assert_invalid(session, format!("SELECT * FROM t WHERE v = {i}")).await?;
    }
    Ok(())
}

/// Recreating an indexed table under the same name (CASSANDRA-6924).
#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn dropping_cf() -> Result<()> {
    run_indexed("dropping_cf", |s, session| dropping_cf_body(s, session).boxed()).await
}

async fn dropping_cf_body(
    scenario: &mut Scenario,
    session: Arc<CqlshSession>,
) -> Result<()> {
    let session = session.as_ref();
    for _ in 0..10 {
        match session.execute(Statement::new("DROP TABLE t")).await {
            Ok(_) => {}
            // first round: nothing to drop
            Err(e) if e.is_rejection() => {}
            Err(e) => return Err(e),
        }

        create_indexed_table(scenario, session, "int").await?;
        for i in 0..10 {
            session
                .execute(Statement::new(format!("INSERT INTO t (id, v) VALUES ({i}, 0)")))
                .await?;
        }
        assert_one(session, "SELECT count(*) FROM t WHERE v = 0", row![10]).await?;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn add_node_after_index() -> Result<()> {
    run_indexed("add_node_after_index", |s, session| {
        add_node_after_index_body(s, session).boxed()
    })
    .await
}

async fn add_node_after_index_body(
    scenario: &mut Scenario,
    session: Arc<CqlshSession>,
) -> Result<()> {
    let session = session.as_ref();
    create_indexed_table(scenario, session, "int").await?;
    insert_rows(session, 0..ROWS).await?;
    assert_indexed(session, "t", 0..ROWS).await?;

    let node4 = scenario.cluster_mut().add_node(NodeSpec::default()).await?;
    node4.start(StartOptions::default()).await?;

    let session2 = scenario.patient_exclusive_cql_connection(&node4).await?;
    assert_indexed(session2.as_ref(), "ks.t", 0..ROWS).await?;

    insert_rows(session, EXTRA_ROWS).await?;
    assert_indexed(session, "t", EXTRA_ROWS).await
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn drop_node_after_index() -> Result<()> {
    run_indexed("drop_node_after_index", |s, session| {
        drop_node_after_index_body(s, session).boxed()
    })
    .await
}

async fn drop_node_after_index_body(
    scenario: &mut Scenario,
    session: Arc<CqlshSession>,
) -> Result<()> {
    let session = session.as_ref();
    create_indexed_table(scenario, session, "int").await?;
    insert_rows(session, 0..ROWS).await?;
    assert_indexed(session, "t", 0..ROWS).await?;

    let node3 = scenario.cluster().node("node3")?;
    node3.decommission().await?;
    scenario.cluster_mut().remove_node(node3.name()).await?;

    assert_indexed(session, "ks.t", 0..ROWS).await?;

    insert_rows(session, EXTRA_ROWS).await?;
    assert_indexed(session, "t", EXTRA_ROWS).await
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn add_dc_after_index() -> Result<()> {
    run_indexed("add_dc_after_index", |s, session| {
        add_dc_after_index_body(s, session).boxed()
    })
    .await
}

async fn add_dc_after_index_body(
    scenario: &mut Scenario,
    session: Arc<CqlshSession>,
) -> Result<()> {
    let session = session.as_ref();
    create_indexed_table(scenario, session, "int").await?;
    insert_rows(session, 0..ROWS).await?;
    assert_indexed(session, "t", 0..ROWS).await?;

    let node4 = scenario
        .cluster_mut()
        .add_node(NodeSpec::default().data_center("dc2"))
        .await?;
    node4.start(StartOptions::default()).await?;
    // second node of dc2 needs its own debug port
    let node5 = scenario
        .cluster_mut()
        .add_node(NodeSpec::default().remote_debug_port(2500).data_center("dc2"))
        .await?;
    node5.start(StartOptions::default()).await?;

    let session2 = scenario.patient_exclusive_cql_connection(&node4).await?;
    assert_indexed(session2.as_ref(), "ks.t", 0..ROWS).await?;

    insert_rows(session, EXTRA_ROWS).await?;
    assert_indexed(session, "t", EXTRA_ROWS).await
}

/// An overwritten value is no longer found through the index (CASSANDRA-8272).
#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn update_then_query_old_value() -> Result<()> {
    run_indexed("update_then_query_old_value", |s, session| {
        update_then_query_old_value_body(s, session).boxed()
    })
    .await
}

async fn update_then_query_old_value_body(
    scenario: &mut Scenario,
    session: Arc<CqlshSession>,
) -> Result<()> {
    let session = session.as_ref();
    create_indexed_table(scenario, session, "text").await?;

    for i in 0..ROWS {
        session
            .execute(Statement::new(format!("INSERT INTO t (id, v) VALUES (0, 'foo{i}')")))
            .await?;
    }

    for i in 0..ROWS {
        let update = Statement::new(format!("UPDATE t SET v = 'bar{i}' WHERE id = 0"))
            .with_consistency(Consistency::Quorum);
        session.execute(update).await?;
        assert_none(
            session,
            Statement::new(format!("SELECT * FROM t WHERE v = 'foo{i}'"))
                .with_consistency(Consistency::Quorum),
        )
        .await?;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn global_index() -> Result<()> {
    run_indexed("global_index", |s, session| global_index_body(s, session).boxed()).await
}

async fn global_index_body(
    scenario: &mut Scenario,
    session: Arc<CqlshSession>,
) -> Result<()> {
    let session = session.as_ref();
    create_indexed_table(scenario, session, "int").await?;
    insert_rows(session, 0..ROWS).await?;
    assert_indexed(session, "t", 0..ROWS).await
}
