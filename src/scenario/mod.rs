//! Scenario composition.
//!
//! A [`Scenario`] owns one freshly created cluster in its own ccm config
//! directory, the sessions and background checkers built on it, and the
//! teardown that checks node logs and removes everything.
//!
//! ```ignore
//! let mut scenario = Scenario::setup("gc", DtestConfig::new()?.validate()?).await?;
//! let outcome = run_body(&mut scenario).await;
//! scenario.finish(outcome, &IgnoredLogPatterns::none()).await?;
//! ```
mod log_check;
mod schema;
pub use log_check::*;
pub use schema::*;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::poll::settle;
use crate::poll::wait_until;
use crate::AssertionError;
use crate::CassandraVersion;
use crate::ClusterHandle;
use crate::CommandRunner;
use crate::ConcurrentChecker;
use crate::CqlshSession;
use crate::DtestConfig;
use crate::Error;
use crate::NodeHandle;
use crate::PendingFailure;
use crate::ProcessRunner;
use crate::Result;
use crate::Session;
use crate::Statement;

/// Cheapest statement every node answers once its native port is up
const READY_QUERY: &str = "SELECT release_version FROM system.local";

pub struct Scenario {
    name: String,
    settings: DtestConfig,
    cluster: ClusterHandle,
    token: CancellationToken,
    checkers: TaskTracker,
    pending: Mutex<Vec<(String, PendingFailure)>>,
}

impl std::fmt::Debug for Scenario {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("cluster", &self.cluster.name())
            .finish()
    }
}

impl Scenario {
    /// Creates the scenario's cluster; ccm runs as child processes.
    pub async fn setup(
        name: &str,
        settings: DtestConfig,
    ) -> Result<Self> {
        let runner = Arc::new(ProcessRunner::new(Duration::from_millis(
            settings.cluster.command_timeout_ms,
        )));
        Self::setup_with_runner(name, settings, runner).await
    }

    pub async fn setup_with_runner(
        name: &str,
        settings: DtestConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let mut cluster_settings = settings.cluster.clone();
        cluster_settings.config_dir = settings.cluster.config_dir.join(name);

        info!(scenario = name, "setting up");
        let cluster = ClusterHandle::create(name, &cluster_settings, runner).await?;

        Ok(Self {
            name: name.to_string(),
            settings,
            cluster,
            token: CancellationToken::new(),
            checkers: TaskTracker::new(),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &DtestConfig {
        &self.settings
    }

    pub fn cluster(&self) -> &ClusterHandle {
        &self.cluster
    }

    pub fn cluster_mut(&mut self) -> &mut ClusterHandle {
        &mut self.cluster
    }

    /// `false` (and a log line) when the cluster is older than `major.minor`;
    /// the scenario body should then return early with `Ok`.
    pub async fn requires_version(
        &self,
        major: u32,
        minor: u32,
    ) -> Result<bool> {
        let version = self.cluster.version().await?;
        if version.at_least(major, minor) {
            return Ok(true);
        }
        let required = CassandraVersion::new(major, minor, 0);
        warn!(scenario = %self.name, %version, %required, "skipping: version too old");
        Ok(false)
    }

    /// Session on `node`, once the node answers queries.
    pub async fn patient_cql_connection(
        &self,
        node: &Arc<NodeHandle>,
    ) -> Result<Arc<CqlshSession>> {
        let session = Arc::new(CqlshSession::new(node.clone()));
        let candidate = session.clone();
        wait_until(
            &format!("{} to accept queries", node.name()),
            self.settings.wait.node_ready,
            move || {
                let candidate = candidate.clone();
                async move {
                    match candidate.execute(Statement::new(READY_QUERY)).await {
                        Ok(_) => Ok(true),
                        Err(e) if e.is_rejection() => Err(e),
                        Err(Error::Query(_)) => Ok(false),
                        Err(e) => Err(e),
                    }
                }
            },
        )
        .await?;
        Ok(session)
    }

    /// Same as [`Self::patient_cql_connection`]: a cqlsh session only ever
    /// talks to its own node.
    pub async fn patient_exclusive_cql_connection(
        &self,
        node: &Arc<NodeHandle>,
    ) -> Result<Arc<CqlshSession>> {
        self.patient_cql_connection(node).await
    }

    /// Creates keyspace `name` and makes it the session's current keyspace.
    pub async fn create_ks(
        &self,
        session: &dyn Session,
        name: &str,
        replication: Replication,
    ) -> Result<()> {
        replication.validate(self.cluster.topology())?;
        session
            .execute(Statement::new(create_keyspace_cql(name, &replication)))
            .await?;
        session.execute(Statement::new(format!("USE {name}"))).await?;
        Ok(())
    }

    pub async fn create_cf(
        &self,
        session: &dyn Session,
        name: &str,
        options: &TableOptions,
    ) -> Result<()> {
        session
            .execute(Statement::new(options.create_table_cql(name)))
            .await?;
        self.schema_settle().await;
        Ok(())
    }

    /// Background checker stopped at teardown at the latest. A failure it
    /// captured and nobody collected fails the teardown.
    pub fn go<F, Fut>(
        &self,
        name: &str,
        operation: F,
    ) -> ConcurrentChecker
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let checker = ConcurrentChecker::start_tracked(
            format!("{}/{}", self.name, name),
            operation,
            self.settings.wait.checker_pause(),
            self.token.child_token(),
            &self.checkers,
        );
        self.pending
            .lock()
            .push((checker.name().to_string(), checker.pending()));
        checker
    }

    /// Stress report destination for this scenario.
    pub fn stress_report_path(
        &self,
        label: &str,
    ) -> PathBuf {
        self.settings
            .stress
            .report_dir
            .join(self.cluster.name())
            .join(format!("{label}.txt"))
    }

    pub async fn schema_settle(&self) {
        settle("schema agreement", self.settings.wait.schema_settle()).await;
    }

    pub async fn settle(&self) {
        settle("administrative operation", self.settings.wait.settle()).await;
    }

    /// Teardown after a successful body.
    pub async fn teardown(
        self,
        ignored: &IgnoredLogPatterns,
    ) -> Result<()> {
        self.finish(Ok(()), ignored).await
    }

    /// Tears down and reports the body's failure first, then any log errors
    /// or cleanup failure.
    pub async fn finish(
        self,
        outcome: Result<()>,
        ignored: &IgnoredLogPatterns,
    ) -> Result<()> {
        self.token.cancel();
        self.checkers.close();
        self.checkers.wait().await;
        let late_failure = self.uncollected_checker_failure();

        let log_errors = match self.unexpected_log_errors(ignored).await {
            Ok(errors) => errors,
            Err(e) => {
                warn!(scenario = %self.name, "log check failed: {:?}", e);
                vec![]
            }
        };

        let failed = outcome.is_err() || late_failure.is_some() || !log_errors.is_empty();
        let destroyed = if failed && self.settings.cluster.keep_on_failure {
            warn!(scenario = %self.name, directory = ?self.cluster.directory(), "keeping cluster for inspection");
            Ok(())
        } else {
            self.cluster.destroy().await
        };

        if let Err(e) = &outcome {
            error!(scenario = %self.name, "scenario failed: {}", e);
        }
        outcome?;
        if let Some(e) = late_failure {
            error!(scenario = %self.name, "checker failure after its last check: {}", e);
            return Err(e);
        }

        if !log_errors.is_empty() {
            let nodes: Vec<&str> = log_errors.iter().map(|(n, _)| n.as_str()).collect();
            return Err(AssertionError::UnexpectedLogErrors {
                node: nodes.join(", "),
                errors: log_errors.into_iter().flat_map(|(_, e)| e).collect(),
            }
            .into());
        }
        destroyed?;
        info!(scenario = %self.name, "teardown complete");
        Ok(())
    }

    /// First failure left in a checker started by [`Self::go`]; the others are
    /// only logged.
    fn uncollected_checker_failure(&self) -> Option<Error> {
        let mut first = None;
        for (name, pending) in self.pending.lock().iter() {
            if let Some(e) = pending.take() {
                warn!(scenario = %self.name, checker = %name, "uncollected checker failure: {:?}", e);
                first.get_or_insert(e);
            }
        }
        first
    }

    /// Error blocks per node that neither the configured nor `ignored`
    /// patterns account for.
    async fn unexpected_log_errors(
        &self,
        ignored: &IgnoredLogPatterns,
    ) -> Result<Vec<(String, Vec<String>)>> {
        if !self.settings.log_check.enabled {
            return Ok(vec![]);
        }
        let patterns =
            IgnoredLogPatterns::from_patterns(&self.settings.log_check.ignore_patterns)?.merge(ignored);

        let mut found = Vec::new();
        for node in self.cluster.nodelist() {
            let errors = patterns.unexpected(node.grep_log_for_errors().await?);
            if !errors.is_empty() {
                warn!(node = %node.name(), count = errors.len(), "unexpected errors in log");
                found.push((node.name().to_string(), errors));
            }
        }
        Ok(found)
    }
}

impl Drop for Scenario {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
