//! One-shot query interface: SQL text in, rows of tab-separated text out.

use crate::config::ConnectionArgs;
use crate::error::DumpError;
use anyhow::Result;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// A row is the list of raw text fields in column order. No coercion happens
/// here; callers interpret fields by position.
pub type Row = Vec<String>;

/// Anything that can execute a query and hand back text rows.
/// `Sync` so statistics for several tables can be fetched concurrently.
pub trait QueryRunner: Sync {
    fn query(&self, sql: &str) -> Result<Vec<Row>>;
}

/// Split psql unaligned output: empty lines are dropped, each remaining line
/// splits on single tabs.
pub fn parse_rows(output: &str) -> Vec<Row> {
    output
        .lines()
        .filter(|l| !l.is_empty())
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect()
}

/// Fresh `psql` process per call.
#[derive(Clone, Debug)]
pub struct Psql {
    pub path: PathBuf,
    pub connection: ConnectionArgs,
}

impl Psql {
    pub fn new(path: impl Into<PathBuf>, connection: ConnectionArgs) -> Self {
        Self { path: path.into(), connection }
    }

    /// Base invocation shared by queries and exports: quiet, unaligned,
    /// tuples only, no psqlrc, stop on first error.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(["-qAtX", "-v", "ON_ERROR_STOP=1"]);
        cmd.args(self.connection.to_args());
        cmd
    }
}

impl QueryRunner for Psql {
    fn query(&self, sql: &str) -> Result<Vec<Row>> {
        tracing::debug!(sql, "psql query");
        let mut cmd = self.command();
        cmd.args(["-F", "\t", "-c", sql]);
        let stdout = run_captured(cmd, "psql")?;
        Ok(parse_rows(&stdout))
    }
}

/// Run a command to completion and return its stdout. Spawn failure, signal
/// death, or non-zero exit becomes `DumpError::ExternalTool` carrying stderr.
pub(crate) fn run_captured(mut cmd: Command, tool: &str) -> Result<String> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| DumpError::tool_spawn(tool, &e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(DumpError::tool_exit(tool, output.status, stderr).into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
