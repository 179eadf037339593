use futures::FutureExt;
use serial_test::serial;
use tracing::info;

use dtest::assert_almost_equal;
use dtest::assert_row_count;
use dtest::random_reader;
use dtest::run_bulk;
use dtest::run_simple;
use dtest::Consistency;
use dtest::IgnoredLogPatterns;
use dtest::NodeSpec;
use dtest::Replication;
use dtest::Result;
use dtest::Scenario;
use dtest::StartOptions;
use dtest::StressSpec;
use dtest::TableOptions;
use dtest::C1C2_TABLE;

use crate::common::run_scenario;

const KEYS: u64 = 10_000;

/// Migration pushed to a node that is not up yet; replayed once it starts.
fn ignored_patterns() -> Result<IgnoredLogPatterns> {
    IgnoredLogPatterns::from_patterns([r"Can't send migration request: node.*is down"])
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn simple_bootstrap() -> Result<()> {
    run_scenario("simple_bootstrap", ignored_patterns()?, |s| {
        simple_bootstrap_body(s).boxed()
    })
    .await
}

async fn simple_bootstrap_body(scenario: &mut Scenario) -> Result<()> {
    let tokens = scenario.cluster().balanced_tokens(2);
    scenario.cluster_mut().populate(1, Some(&tokens[..1])).await?;
    scenario
        .cluster()
        .start(StartOptions::default().wait_other_notice())
        .await?;
    let node1 = scenario.cluster().node("node1")?;

    let session = scenario.patient_cql_connection(&node1).await?;
    scenario
        .create_ks(session.as_ref(), "ks", Replication::Simple(1))
        .await?;
    let table = TableOptions::default()
        .column("c1", "text")
        .column("c2", "text");
    scenario.create_cf(session.as_ref(), C1C2_TABLE, &table).await?;

    run_simple(session.as_ref(), KEYS, Consistency::One).await?;
    node1.flush().await?;
    let initial_size = node1.get_load_size().await?;

    // reads must keep succeeding for the whole bootstrap
    let mut reader = scenario.go(
        "reader",
        random_reader(session.clone(), KEYS, Consistency::One),
    );

    let node2 = scenario
        .cluster_mut()
        .add_node(NodeSpec::default().token(tokens[1]))
        .await?;
    node2
        .start(StartOptions::default().wait_for_binary_proto())
        .await?;

    reader.check()?;
    node1.cleanup().await?;
    scenario.settle().await;
    reader.check()?;
    let summary = reader.stop().await?;

    let size1 = node1.get_load_size().await?;
    let size2 = node2.get_load_size().await?;
    info!(initial_size, size1, size2, reads = summary.iterations, "load after bootstrap");

    assert_balanced_load(initial_size, size1, size2)
}

const LOAD_TOLERANCE: f64 = 0.3;

/// After cleanup both nodes hold about half of what the single node held.
fn assert_balanced_load(
    initial_size: u64,
    size1: u64,
    size2: u64,
) -> Result<()> {
    assert_almost_equal(size1 as f64, size2 as f64, LOAD_TOLERANCE)?;
    assert_almost_equal(initial_size as f64, 2.0 * size1 as f64, LOAD_TOLERANCE)?;
    assert_almost_equal(initial_size as f64, 2.0 * size2 as f64, LOAD_TOLERANCE)
}

#[test]
fn test_balanced_load_tolerates_thirty_percent() {
    assert_balanced_load(250, 100, 100).unwrap();
    assert_balanced_load(250, 110, 100).unwrap();
    assert!(assert_balanced_load(250, 100, 60).is_err());
    assert!(assert_balanced_load(400, 100, 100).is_err());
}

/// A bootstrapped node serves data written before it joined.
#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn read_from_bootstrapped_node() -> Result<()> {
    run_scenario("read_from_bootstrapped_node", ignored_patterns()?, |s| {
        read_from_bootstrapped_node_body(s).boxed()
    })
    .await
}

async fn read_from_bootstrapped_node_body(scenario: &mut Scenario) -> Result<()> {
    scenario.cluster_mut().populate(3, None).await?;
    let version = scenario.cluster().version().await?;
    scenario.cluster().start(StartOptions::default()).await?;

    let node1 = scenario.cluster().node("node1")?;
    run_bulk(&node1, &StressSpec::write(10_000).threads(8), &version).await?;

    let node4 = scenario.cluster_mut().add_node(NodeSpec::default()).await?;
    node4.start(StartOptions::default()).await?;

    let session = scenario.patient_cql_connection(&node4).await?;
    let stress_table = if version.at_least(2, 1) {
        "keyspace1.standard1"
    } else {
        "\"Keyspace1\".\"Standard1\""
    };
    assert_row_count(
        session.as_ref(),
        format!("SELECT * FROM {stress_table} LIMIT 10"),
        10,
    )
    .await
}
