//! Stress throughput and latency per compaction strategy.
//!
//! Results are collected and logged only; no strategy is judged against another.

use futures::FutureExt;
use serial_test::serial;
use tracing::info;

use dtest::parse_report;
use dtest::run_bulk;
use dtest::IgnoredLogPatterns;
use dtest::Result;
use dtest::Scenario;
use dtest::Session;
use dtest::StartOptions;
use dtest::Statement;
use dtest::StressSpec;
use dtest::WorkloadResult;

use crate::common::run_scenario;

const STRATEGIES: [&str; 3] = [
    "LeveledCompactionStrategy",
    "SizeTieredCompactionStrategy",
    "DateTieredCompactionStrategy",
];

const OPERATIONS: u64 = 1_000_000;

/// Keyspace the stress tool generates its schema in
const STRESS_KEYSPACE: &str = "keyspace1";

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires ccm and a Cassandra installation"]
#[serial]
async fn compaction_perf() -> Result<()> {
    run_scenario("compaction_perf", IgnoredLogPatterns::none(), |s| {
        compaction_perf_body(s).boxed()
    })
    .await
}

fn write_only(strategy: &str) -> StressSpec {
    StressSpec::write(OPERATIONS)
        .population("seq=1..1M")
        .compaction(strategy)
}

fn read_update(strategy: &str) -> StressSpec {
    StressSpec::mixed(OPERATIONS, 3, 1)
        .insert_option("visits=EXP(1..5)")
        .insert_option("partitions=fixed(1)")
        .insert_option("select-ratio=fixed(1)/1")
        .population("seq=1M..2M")
        .compaction(strategy)
}

async fn compaction_perf_body(scenario: &mut Scenario) -> Result<()> {
    scenario.cluster_mut().populate(1, None).await?;
    scenario.cluster().start(StartOptions::default()).await?;
    let version = scenario.cluster().version().await?;
    let node1 = scenario.cluster().node("node1")?;
    let session = scenario.patient_cql_connection(&node1).await?;

    let mut write_results: Vec<(String, WorkloadResult)> = Vec::new();
    let mut read_update_results: Vec<(String, WorkloadResult)> = Vec::new();

    for strategy in STRATEGIES {
        let report = scenario.stress_report_path(&format!("write-only-{strategy}"));
        run_bulk(&node1, &write_only(strategy).log_file(&report), &version).await?;
        write_results.push((strategy.to_string(), parse_report(&report).await?));

        let report = scenario.stress_report_path(&format!("read-update-{strategy}"));
        run_bulk(&node1, &read_update(strategy).log_file(&report), &version).await?;
        read_update_results.push((strategy.to_string(), parse_report(&report).await?));

        session
            .execute(Statement::new(format!("DROP KEYSPACE {STRESS_KEYSPACE}")))
            .await?;
        scenario.schema_settle().await;
    }

    for (workload, results) in [("write-only", &write_results), ("read-update", &read_update_results)] {
        for (strategy, result) in results {
            info!(workload, strategy = %strategy, %result, "compaction workload");
        }
    }
    Ok(())
}
