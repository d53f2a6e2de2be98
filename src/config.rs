use crate::error::DumpError;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Accepted range for the number of concurrent workers.
pub const MIN_JOBS: usize = 1;
pub const MAX_JOBS: usize = 100;

/// Default split threshold: tables above 10 MB get partitioned.
pub const DEFAULT_MAX_SIZE_KB: u64 = 10_240;

/// Paths (or bare names looked up on `PATH`) of the external PostgreSQL tools.
#[derive(Clone, Debug)]
pub struct ToolPaths {
    pub pg_dump: PathBuf,
    pub pg_restore: PathBuf,
    pub psql: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            pg_dump: PathBuf::from("pg_dump"),
            pg_restore: PathBuf::from("pg_restore"),
            psql: PathBuf::from("psql"),
        }
    }
}

/// Connection flags forwarded verbatim to `pg_dump` and `psql`.
#[derive(Clone, Debug, Default)]
pub struct ConnectionArgs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub dbname: Option<String>,
}

impl ConnectionArgs {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(h) = &self.host { args.push("-h".to_string()); args.push(h.clone()); }
        if let Some(p) = self.port { args.push("-p".to_string()); args.push(p.to_string()); }
        if let Some(u) = &self.username { args.push("-U".to_string()); args.push(u.clone()); }
        if let Some(d) = &self.dbname { args.push("-d".to_string()); args.push(d.clone()); }
        args
    }
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct DumpOptions {
    pub output_dir: PathBuf,
    pub compressor: Option<PathBuf>,
    pub jobs: usize,
    pub max_size_kb: u64,              // split threshold, kilobytes
    pub tools: ToolPaths,
    pub connection: ConnectionArgs,
    pub resume: bool,                  // continue from plan.json in output_dir
    pub progress: bool,                // show the live status line
    pub max_idle_sleep: Duration,      // upper bound on one coordinator wait
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            compressor: None,
            jobs: 1,
            max_size_kb: DEFAULT_MAX_SIZE_KB,
            tools: ToolPaths::default(),
            connection: ConnectionArgs::default(),
            resume: false,
            progress: true,
            max_idle_sleep: Duration::from_secs(1),
        }
    }
}

impl DumpOptions {
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_compressor(mut self, compressor: Option<PathBuf>) -> Self {
        self.compressor = compressor;
        self
    }
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }
    pub fn with_max_size_kb(mut self, kb: u64) -> Self {
        self.max_size_kb = kb;
        self
    }
    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }
    pub fn with_connection(mut self, connection: ConnectionArgs) -> Self {
        self.connection = connection;
        self
    }
    pub fn with_resume(mut self, yes: bool) -> Self {
        self.resume = yes;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_max_idle_sleep(mut self, d: Duration) -> Self {
        self.max_idle_sleep = d.max(Duration::from_millis(1));
        self
    }

    /// Pre-flight checks. Every failure is a `DumpError::Config` and nothing
    /// has touched the database yet. Tool paths are resolved in place.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_JOBS..=MAX_JOBS).contains(&self.jobs) {
            return Err(DumpError::config(format!(
                "jobs must be between {MIN_JOBS} and {MAX_JOBS}, got {}",
                self.jobs
            ))
            .into());
        }
        if self.max_size_kb < 1 {
            return Err(DumpError::config("max size must be at least 1 kB").into());
        }
        check_output_dir(&self.output_dir)?;

        if let Some(c) = &self.compressor {
            self.compressor = Some(resolve_tool("compressor", c)?);
        }
        self.tools.pg_dump = resolve_tool("pg_dump", &self.tools.pg_dump)?;
        self.tools.pg_restore = resolve_tool("pg_restore", &self.tools.pg_restore)?;
        self.tools.psql = resolve_tool("psql", &self.tools.psql)?;
        Ok(())
    }
}

fn check_output_dir(dir: &Path) -> Result<()> {
    let meta = fs::metadata(dir).map_err(|e| {
        DumpError::config(format!("output directory {} does not exist: {e}", dir.display()))
    })?;
    if !meta.is_dir() {
        return Err(DumpError::config(format!("{} is not a directory", dir.display())).into());
    }
    let probe = dir.join(".chunkdump_write_probe");
    fs::write(&probe, b"")
        .map_err(|e| DumpError::config(format!("output directory {} is not writable: {e}", dir.display())))?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

/// Resolve a tool given either as a path (contains a separator) or a bare name
/// searched on `PATH`. The result must be an executable regular file.
pub fn resolve_tool(label: &str, tool: &Path) -> Result<PathBuf> {
    if tool.as_os_str().is_empty() {
        return Err(DumpError::config(format!("{label}: empty path")).into());
    }
    if tool.components().count() > 1 || tool.is_absolute() {
        if is_executable(tool) {
            return Ok(tool.to_path_buf());
        }
        return Err(DumpError::config(format!("{label}: {} is not an executable file", tool.display())).into());
    }
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(tool);
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }
    }
    Err(DumpError::config(format!("{label}: {} not found on PATH", tool.display())).into())
}

#[cfg(unix)]
fn is_executable(p: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(p).map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(p: &Path) -> bool {
    fs::metadata(p).map(|m| m.is_file()).unwrap_or(false)
}
