use futures::FutureExt;
use serial_test::serial;

use dtest::assert_all;
use dtest::assert_row_count;
use dtest::row;
use dtest::IgnoredLogPatterns;
use dtest::Replication;
use dtest::Result;
use dtest::Scenario;
use dtest::Session;
use dtest::StartOptions;
use dtest::Statement;
use dtest::TableOptions;

use crate::common::expect_sstables;
use crate::common::run_scenario;

/// Tombstones are purged by the first compaction after gc grace.
#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn gc() -> Result<()> {
    run_scenario("gc", IgnoredLogPatterns::none(), |s| gc_body(s).boxed()).await
}

async fn gc_body(scenario: &mut Scenario) -> Result<()> {
    scenario.cluster_mut().populate(1, None).await?;
    scenario.cluster().start(StartOptions::default()).await?;
    let version = scenario.cluster().version().await?;
    let node1 = scenario.cluster().node("node1")?;
    scenario.settle().await;

    let session = scenario.patient_cql_connection(&node1).await?;
    let session = session.as_ref();
    scenario.create_ks(session, "ks", Replication::Simple(1)).await?;
    let table = TableOptions::default()
        .gc_grace(0)
        .key_type("int")
        .column("c1", "int");
    scenario.create_cf(session, "cf", &table).await?;

    session
        .execute(Statement::new("INSERT INTO cf (key, c1) VALUES (1, 1)"))
        .await?;
    session
        .execute(Statement::new("INSERT INTO cf (key, c1) VALUES (2, 1)"))
        .await?;
    node1.flush().await?;

    assert_all(session, "SELECT * FROM cf", vec![row![1, 1], row![2, 1]], true).await?;

    session
        .execute(Statement::new("DELETE FROM cf WHERE key = 1"))
        .await?;
    if !version.at_least(1, 2) {
        // the deleted row still shows as a bare key until compaction
        assert_row_count(session, "SELECT * FROM cf", 2).await?;
    }

    node1.flush().await?;
    scenario.settle().await;
    node1.compact(None, None).await?;
    scenario.settle().await;

    assert_all(session, "SELECT * FROM cf", vec![row![2, 1]], false).await?;
    expect_sstables(&node1, "ks", Some("cf"), 1).await
}
