//! Append-only manifest of planned and finished blobs, plus the JSON plan file
//! that resume mode reads back.
//!
//! Manifest layout:
//! ```text
//! # chunkdump plan, 12 blobs, created 2026-10-19T08:00:00Z
//!     id | type  | schema           | table                          |         size | condition
//!      0 | range | public           | big                            |         6000 | id <= '100'::integer
//! ...
//! range dump (#0) of public.big finished after 3.140 seconds.
//! ```

use crate::blob::ScheduledBlob;
use crate::error::DumpError;
use crate::paths::{MANIFEST_FILE, PLAN_FILE};
use crate::util::create_with_backoff;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "unknown".to_string())
}

pub fn column_header() -> String {
    format!(
        "{:>6} | {:<5} | {:<16} | {:<30} | {:>12} | {}",
        "id", "type", "schema", "table", "size", "condition"
    )
}

pub fn planned_line(job: &ScheduledBlob) -> String {
    let b = &job.blob;
    format!(
        "{:>6} | {:<5} | {:<16} | {:<30} | {:>12} | {}",
        job.id,
        b.type_tag(),
        b.schema,
        b.table,
        b.size_kb,
        b.condition().unwrap_or("")
    )
}

pub fn completion_line(job: &ScheduledBlob, elapsed: Duration) -> String {
    format!("{} finished after {:.3} seconds.", job, elapsed.as_secs_f64())
}

/// Line-oriented writer; every line is flushed as soon as it is written so
/// the file reflects progress even if the run dies.
pub struct Manifest {
    path: PathBuf,
    out: BufWriter<File>,
}

impl Manifest {
    /// Start a fresh manifest in `dir` (truncating a previous one).
    pub fn create(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let f = create_with_backoff(&path, 16, 50).with_context(|| format!("create {}", path.display()))?;
        Ok(Self { path, out: BufWriter::new(f) })
    }

    /// Continue an existing manifest (resume mode).
    pub fn append(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {} for append", path.display()))?;
        Ok(Self { path, out: BufWriter::new(f) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.out.write_all(line.as_bytes())?;
        self.out.write_all(b"\n")?;
        self.out.flush().with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }

    /// Header plus one line per blob, in work order.
    pub fn write_plan(&mut self, title: &str, jobs: &[ScheduledBlob]) -> Result<()> {
        self.write_line(&format!("# {title}, {} blobs, created {}", jobs.len(), now_rfc3339()))?;
        self.write_line(&column_header())?;
        for job in jobs {
            self.write_line(&planned_line(job))?;
        }
        Ok(())
    }

    pub fn record_completion(&mut self, job: &ScheduledBlob, elapsed: Duration) -> Result<()> {
        self.write_line(&completion_line(job, elapsed))
    }
}

/// Everything resume mode needs to continue a run without re-planning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanFile {
    pub created_at: String,
    pub max_size_kb: u64,
    pub blobs: Vec<ScheduledBlob>,
}

impl PlanFile {
    pub fn new(max_size_kb: u64, blobs: Vec<ScheduledBlob>) -> Self {
        Self { created_at: now_rfc3339(), max_size_kb, blobs }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(PLAN_FILE);
        let f = create_with_backoff(&path, 16, 50).with_context(|| format!("create {}", path.display()))?;
        let mut w = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut w, self)?;
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(PLAN_FILE);
        let f = File::open(&path)
            .map_err(|e| DumpError::PlanFile(format!("{}: {e}", path.display())))?;
        let plan = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| DumpError::PlanFile(format!("{}: {e}", path.display())))?;
        Ok(plan)
    }
}
