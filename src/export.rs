//! Export task: one `psql` COPY per blob, optionally piped through a
//! compressor, written to the blob's data file.

use crate::blob::{BlobKind, ScheduledBlob};
use crate::paths::{data_file_path, staging_path};
use crate::pool::Launcher;
use crate::query::Psql;
use crate::sql;
use crate::util::{create_with_backoff, promote_file};
use crate::worker::{spawn_pipeline, CompletionSender, Stage};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;

/// SQL statements a worker runs, in order. Range blobs turn off sequential
/// scans first so the key index serves the range predicate.
pub fn export_statements(job: &ScheduledBlob) -> Vec<String> {
    match &job.blob.kind {
        BlobKind::Whole => vec![sql::copy_whole(&job.blob.qualified)],
        BlobKind::Range { condition } => vec![
            sql::DISABLE_SEQSCAN.to_string(),
            sql::copy_range(&job.blob.qualified, condition),
        ],
    }
}

pub struct ExportLauncher {
    psql: Psql,
    compressor: Option<PathBuf>,
    output_dir: PathBuf,
}

impl ExportLauncher {
    pub fn new(psql: Psql, compressor: Option<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self { psql, compressor, output_dir: output_dir.into() }
    }

    /// `psql -c ...` alone, or `psql -c ... | <compressor>`.
    pub fn stages(&self, job: &ScheduledBlob) -> Vec<Stage> {
        let mut export = self.psql.command();
        for stmt in export_statements(job) {
            export.arg("-c").arg(stmt);
        }
        let mut stages = vec![Stage::new("psql", export)];
        if let Some(c) = &self.compressor {
            stages.push(Stage::new(c.display().to_string(), Command::new(c)));
        }
        stages
    }
}

impl Launcher for ExportLauncher {
    fn launch(&mut self, job: &ScheduledBlob, done: &CompletionSender) -> Result<u32> {
        let target = staging_path(&data_file_path(&self.output_dir, job));
        let out = create_with_backoff(&target, 16, 50)
            .with_context(|| format!("create {}", target.display()))?;
        spawn_pipeline(job.id, self.stages(job), Some(out), done)
    }

    fn finish(&mut self, job: &ScheduledBlob) -> Result<()> {
        let dest = data_file_path(&self.output_dir, job);
        promote_file(&staging_path(&dest), &dest)
    }
}
