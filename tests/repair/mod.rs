use std::time::Duration;

use futures::FutureExt;
use serial_test::serial;

use dtest::assert_none;
use dtest::poll::settle;
use dtest::Consistency;
use dtest::IgnoredLogPatterns;
use dtest::RepairOptions;
use dtest::Replication;
use dtest::Result;
use dtest::Scenario;
use dtest::Session;
use dtest::StartOptions;
use dtest::Statement;
use dtest::StopOptions;

use crate::common::expect_sstables;
use crate::common::run_scenario;

/// Longer than the table's one second gc grace
const GC_GRACE_WAIT: Duration = Duration::from_secs(2);

const SELECT_K1: &str = "SELECT c1, c2 FROM cf WHERE key = 'k1'";

/// A delete seen by one replica only must not come back through repair once
/// the tombstone is past gc grace (ticket 16084).
#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn t16084() -> Result<()> {
    run_scenario("t16084", IgnoredLogPatterns::none(), |s| t16084_body(s).boxed()).await
}

async fn t16084_body(scenario: &mut Scenario) -> Result<()> {
    scenario.cluster_mut().populate(2, None).await?;
    scenario
        .cluster()
        .set_configuration_options(
            [
                ("hinted_handoff_enabled", false),
                ("enable_christmas_patch", true),
            ],
            true,
        )
        .await?;
    scenario.cluster().start(StartOptions::default()).await?;
    let version = scenario.cluster().version().await?;
    let node1 = scenario.cluster().node("node1")?;
    let node2 = scenario.cluster().node("node2")?;

    let session = scenario.patient_cql_connection(&node1).await?;
    let session = session.as_ref();
    scenario.create_ks(session, "ks", Replication::Simple(2)).await?;
    // compaction stays off so nothing is purged behind the scenario's back
    session
        .execute(Statement::new(
            "CREATE TABLE cf (key text, c1 text, c2 text, PRIMARY KEY (key, c1)) \
             WITH gc_grace_seconds = 1 \
             AND compaction = {'class': 'SizeTieredCompactionStrategy', 'enabled': 'false'}",
        ))
        .await?;
    scenario.schema_settle().await;

    session
        .execute(
            Statement::new("INSERT INTO cf (key, c1, c2) VALUES ('k1', 'v1', 'value')")
                .with_consistency(Consistency::All),
        )
        .await?;
    node1.flush().await?;
    node2.flush().await?;

    // only node1 sees the delete
    node2.stop(StopOptions::default().wait_other_notice()).await?;
    session
        .execute(
            Statement::new("DELETE FROM cf WHERE key = 'k1'").with_consistency(Consistency::One),
        )
        .await?;
    node1.flush().await?;
    settle("gc grace", GC_GRACE_WAIT).await;

    assert_none(
        session,
        Statement::new(SELECT_K1).with_consistency(Consistency::One),
    )
    .await?;

    // unrepaired sstables keep the tombstone: two sstables compact into one
    node1.compact(Some("ks"), Some("cf")).await?;
    expect_sstables(&node1, "ks", None, 1).await?;

    node2
        .start(StartOptions::default().wait_other_notice())
        .await?;
    assert_none(
        session,
        Statement::new(SELECT_K1).with_consistency(Consistency::All),
    )
    .await?;

    let repair = RepairOptions::default().keyspace("ks").tables(["cf"]);
    node2.repair(&repair, &version).await?;
    assert_none(
        session,
        Statement::new(SELECT_K1).with_consistency(Consistency::All),
    )
    .await?;

    // repaired data can be purged: nothing is left on either node
    for node in [&node1, &node2] {
        node.compact(Some("ks"), Some("cf")).await?;
        expect_sstables(node, "ks", None, 0).await?;
    }
    Ok(())
}
