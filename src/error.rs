//! Error taxonomy for a dump run.
//!
//! Most functions return `anyhow::Result`; the variants below are raised inside
//! `anyhow` where the caller needs to tell the failure classes apart
//! (the binary downcasts them to pick an exit code).

use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DumpError {
    /// Invalid options or paths. Raised before any database access.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The table listing came back empty; there is nothing to back up.
    #[error("no tables found in the schema listing, nothing to dump")]
    EmptyCatalog,

    /// An external command could not be spawned, died, or exited non-zero.
    #[error("{tool} failed ({status}){}", fmt_stderr(.stderr))]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    /// plan.json is missing or unreadable in resume mode.
    #[error("cannot use plan file: {0}")]
    PlanFile(String),
}

impl DumpError {
    pub fn config(msg: impl Into<String>) -> Self {
        DumpError::Config(msg.into())
    }

    pub(crate) fn tool_exit(tool: &str, status: ExitStatus, stderr: String) -> Self {
        let status = match status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        DumpError::ExternalTool { tool: tool.to_string(), status, stderr }
    }

    pub(crate) fn tool_spawn(tool: &str, err: &std::io::Error) -> Self {
        DumpError::ExternalTool {
            tool: tool.to_string(),
            status: format!("spawn failed: {err}"),
            stderr: String::new(),
        }
    }
}

fn fmt_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() { String::new() } else { format!(": {trimmed}") }
}
