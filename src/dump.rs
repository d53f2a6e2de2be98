use crate::blob::ScheduledBlob;
use crate::catalog::load_catalog;
use crate::config::{ConnectionArgs, DumpOptions, ToolPaths};
use crate::export::ExportLauncher;
use crate::listing::{SchemaDump, TableListing};
use crate::manifest::{Manifest, PlanFile};
use crate::partition::PartitionPlanner;
use crate::paths::{data_file_name, finished_data_files};
use crate::pool::{Launcher, PoolReport, WorkerPool};
use crate::query::{Psql, QueryRunner};
use crate::schedule::schedule;
use crate::util::init_tracing_once;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Outcome of a whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DumpSummary {
    /// Blobs in the plan.
    pub planned: usize,
    /// Blobs skipped because a finished data file already existed (resume).
    pub skipped: usize,
    pub pool: PoolReport,
}

#[derive(Clone, Default)]
pub struct ParallelDump {
    pub(crate) opts: DumpOptions,
}

impl ParallelDump {
    pub fn new() -> Self {
        Self { opts: DumpOptions::default() }
    }

    pub fn from_options(opts: DumpOptions) -> Self {
        Self { opts }
    }

    // -------- Builder methods --------
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_output_dir(dir); self }
    pub fn compressor(mut self, c: Option<PathBuf>) -> Self { self.opts = self.opts.with_compressor(c); self }
    pub fn jobs(mut self, n: usize) -> Self { self.opts = self.opts.with_jobs(n); self }
    pub fn max_size_kb(mut self, kb: u64) -> Self { self.opts = self.opts.with_max_size_kb(kb); self }
    pub fn tools(mut self, tools: ToolPaths) -> Self { self.opts = self.opts.with_tools(tools); self }
    pub fn connection(mut self, c: ConnectionArgs) -> Self { self.opts = self.opts.with_connection(c); self }
    pub fn resume(mut self, yes: bool) -> Self { self.opts = self.opts.with_resume(yes); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn max_idle_sleep(mut self, d: Duration) -> Self { self.opts = self.opts.with_max_idle_sleep(d); self }

    pub fn options(&self) -> &DumpOptions {
        &self.opts
    }

    /// Validate, then either plan and dump from scratch or continue a
    /// previous run from its plan file.
    pub fn run(self) -> Result<DumpSummary> {
        init_tracing_once();
        let mut opts = self.opts;
        opts.validate()?;

        let psql = Psql::new(&opts.tools.psql, opts.connection.clone());
        let launcher = ExportLauncher::new(psql.clone(), opts.compressor.clone(), &opts.output_dir);
        if opts.resume {
            return resume_dump(&opts, launcher);
        }
        let listing = SchemaDump::new(&opts.tools.pg_dump, &opts.tools.pg_restore, opts.connection.clone(), &opts.output_dir);
        plan_and_dump(&opts, &listing, &psql, launcher)
    }
}

/// Listing -> catalog -> partitions -> work order.
pub fn plan(opts: &DumpOptions, listing: &dyn TableListing, runner: &dyn QueryRunner) -> Result<Vec<ScheduledBlob>> {
    let tables = listing.list_tables().context("listing tables")?;
    let catalog = load_catalog(&tables, runner)?;
    let blobs = PartitionPlanner::new(runner, opts.max_size_kb)
        .concurrency(opts.jobs)
        .plan(catalog)?;
    let jobs = schedule(blobs);
    let range = jobs.iter().filter(|j| j.blob.is_range()).count();
    tracing::info!("Planned {} blobs ({} whole, {} range)", jobs.len(), jobs.len() - range, range);
    Ok(jobs)
}

/// Fresh run: plan, persist plan and manifest header, then execute.
pub fn plan_and_dump<L: Launcher>(
    opts: &DumpOptions,
    listing: &dyn TableListing,
    runner: &dyn QueryRunner,
    launcher: L,
) -> Result<DumpSummary> {
    let jobs = plan(opts, listing, runner)?;
    PlanFile::new(opts.max_size_kb, jobs.clone()).save(&opts.output_dir)?;

    let mut manifest = Manifest::create(&opts.output_dir)?;
    manifest.write_plan("chunkdump plan", &jobs)?;

    let planned = jobs.len();
    let pool = execute(opts, launcher, jobs, &mut manifest)?;
    Ok(DumpSummary { planned, skipped: 0, pool })
}

/// Continue from `plan.json`, skipping blobs whose data file was promoted.
pub fn resume_dump<L: Launcher>(opts: &DumpOptions, launcher: L) -> Result<DumpSummary> {
    let plan = PlanFile::load(&opts.output_dir)?;
    if plan.max_size_kb != opts.max_size_kb {
        tracing::warn!(
            "plan was made with max size {} kB, ignoring the current {} kB",
            plan.max_size_kb,
            opts.max_size_kb
        );
    }
    let finished = finished_data_files(&opts.output_dir);
    let planned = plan.blobs.len();
    let todo: Vec<ScheduledBlob> = plan
        .blobs
        .into_iter()
        .filter(|j| !finished.contains(&data_file_name(&j.blob.schema, &j.blob.table, j.id)))
        .collect();
    let skipped = planned - todo.len();
    tracing::info!("Resuming plan from {}: {} of {} blobs already done", plan.created_at, skipped, planned);

    let mut manifest = Manifest::append(&opts.output_dir)?;
    manifest.write_plan("chunkdump resume", &todo)?;
    let pool = execute(opts, launcher, todo, &mut manifest)?;
    Ok(DumpSummary { planned, skipped, pool })
}

fn execute<L: Launcher>(opts: &DumpOptions, launcher: L, jobs: Vec<ScheduledBlob>, manifest: &mut Manifest) -> Result<PoolReport> {
    WorkerPool::new(launcher, opts.jobs)
        .max_idle_sleep(opts.max_idle_sleep)
        .progress(opts.progress)
        .run(jobs, manifest)
}
