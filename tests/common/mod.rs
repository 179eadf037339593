//! Shared scenario plumbing: settings, logging and the setup/teardown frame.

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;

use dtest::init_observability;
use dtest::AssertionError;
use dtest::DtestConfig;
use dtest::IgnoredLogPatterns;
use dtest::NodeHandle;
use dtest::Result;
use dtest::Scenario;

static LOGGER_INIT: Lazy<Option<WorkerGuard>> = Lazy::new(|| {
    let settings = DtestConfig::new().unwrap_or_default();
    match init_observability(&settings.observability) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("logging not initialized: {e}");
            None
        }
    }
});

pub fn enable_logger() {
    Lazy::force(&LOGGER_INIT);
}

/// Harness settings from `CONFIG_PATH` and `DTEST__*`, validated.
pub fn settings() -> Result<DtestConfig> {
    DtestConfig::new()?.validate()
}

/// Sets up scenario `name`, runs `body` on it and tears it down with
/// `ignored` log patterns; the body's failure wins over teardown failures.
pub async fn run_scenario<F>(
    name: &str,
    ignored: IgnoredLogPatterns,
    body: F,
) -> Result<()>
where
    F: for<'a> FnOnce(&'a mut Scenario) -> BoxFuture<'a, Result<()>>,
{
    enable_logger();
    let mut scenario = Scenario::setup(name, settings()?).await?;
    let outcome = body(&mut scenario).await;
    if let Err(e) = &outcome {
        error!(scenario = name, "body failed: {:?}", e);
    }
    scenario.finish(outcome, &ignored).await
}

pub async fn expect_sstables(
    node: &NodeHandle,
    keyspace: &str,
    table: Option<&str>,
    expected: usize,
) -> Result<()> {
    let sstables = node.get_sstables(keyspace, table).await?;
    if sstables.len() != expected {
        return Err(AssertionError::Condition(format!(
            "{} holds {} sstable(s) for {keyspace}, expected {expected}: {sstables:?}",
            node.name(),
            sstables.len()
        ))
        .into());
    }
    Ok(())
}
