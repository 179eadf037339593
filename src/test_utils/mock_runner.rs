//! ccm expectations over [`MockCommandRunner`].
//!
//! Each expectation matches the exact ccm argument list and answers with a
//! canned [`CommandOutput`]; unmatched invocations fail the test through
//! mockall.

use std::path::Path;
use std::sync::Arc;

use crate::Ccm;
use crate::CommandOutput;
use crate::MockCommandRunner;
use crate::MockSession;
use crate::NodeHandle;
use crate::Rows;
use crate::CCM_CONFIG_DIR_ENV;

/// Expects exactly one ccm call with `args`.
pub fn expect_ccm(
    runner: &mut MockCommandRunner,
    args: &[&str],
    output: CommandOutput,
) {
    let expected: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    runner
        .expect_run()
        .withf(move |inv| inv.args == expected)
        .times(1)
        .returning(move |_| Ok(output.clone()));
}

/// Expects any number of ccm calls with `args`.
pub fn allow_ccm(
    runner: &mut MockCommandRunner,
    args: &[&str],
    output: CommandOutput,
) {
    let expected: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    runner
        .expect_run()
        .withf(move |inv| inv.args == expected)
        .returning(move |_| Ok(output.clone()));
}

/// Every invocation must carry the isolated config dir.
pub fn expect_config_dir_env(
    runner: &mut MockCommandRunner,
    config_dir: &Path,
) {
    let dir = config_dir.display().to_string();
    runner
        .expect_run()
        .withf(move |inv| {
            inv.envs
                .iter()
                .any(|(k, v)| k == CCM_CONFIG_DIR_ENV && *v == dir)
        })
        .times(1)
        .returning(|_| Ok(CommandOutput::ok("")));
}

pub fn mock_ccm(
    runner: MockCommandRunner,
    config_dir: &Path,
) -> Ccm {
    Ccm::new(Arc::new(runner), "ccm", config_dir)
}

/// `node<index>` of cluster `test`, its directory under `config_dir/test`.
pub fn mock_node(
    runner: MockCommandRunner,
    config_dir: &Path,
    index: u32,
) -> NodeHandle {
    NodeHandle::new(
        mock_ccm(runner, config_dir),
        &config_dir.join("test"),
        index,
        None,
        None,
        2000,
    )
}

/// Session answering every statement with `rows`.
pub fn session_returning(rows: Rows) -> MockSession {
    let mut session = MockSession::new();
    session
        .expect_execute()
        .returning(move |_| Ok(rows.clone()));
    session
}
