use chunkdump::{init_tracing_once, ConnectionArgs, DumpError, DumpOptions, ParallelDump, ToolPaths, DEFAULT_MAX_SIZE_KB};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// Parallel logical backup of a PostgreSQL database, with large tables split
/// into primary-key ranges sized from the planner statistics.
#[derive(Parser, Debug)]
#[command(name = "chunkdump", version)]
struct Cli {
    /// Existing, writable directory receiving schema, data files and manifest.
    #[arg(short = 'o', long)]
    output_dir: PathBuf,

    /// Compressor each data stream is piped through (e.g. gzip, zstd).
    #[arg(short = 'c', long)]
    compressor: Option<PathBuf>,

    /// Concurrent export workers (1-100).
    #[arg(short = 'j', long, default_value_t = 1)]
    jobs: usize,

    /// Tables above this size in kB are split into ranges.
    #[arg(short = 's', long, default_value_t = DEFAULT_MAX_SIZE_KB)]
    max_size: u64,

    #[arg(long, default_value = "pg_dump")]
    pg_dump: PathBuf,
    #[arg(long, default_value = "pg_restore")]
    pg_restore: PathBuf,
    #[arg(long, default_value = "psql")]
    psql: PathBuf,

    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    dbname: Option<String>,

    /// Continue an interrupted run from plan.json in the output directory.
    #[arg(long)]
    resume: bool,

    /// Disable the live status line.
    #[arg(long)]
    no_progress: bool,

    /// Longest idle wait between scheduler passes, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    max_sleep_ms: u64,
}

impl Cli {
    fn into_options(self) -> DumpOptions {
        DumpOptions::default()
            .with_output_dir(&self.output_dir)
            .with_compressor(self.compressor)
            .with_jobs(self.jobs)
            .with_max_size_kb(self.max_size)
            .with_tools(ToolPaths { pg_dump: self.pg_dump, pg_restore: self.pg_restore, psql: self.psql })
            .with_connection(ConnectionArgs {
                host: self.host,
                port: self.port,
                username: self.username,
                dbname: self.dbname,
            })
            .with_resume(self.resume)
            .with_progress(!self.no_progress)
            .with_max_idle_sleep(Duration::from_millis(self.max_sleep_ms))
    }
}

fn main() {
    init_tracing_once();
    let opts = Cli::parse().into_options();

    match ParallelDump::from_options(opts).run() {
        Ok(summary) => {
            tracing::info!(
                "Done: {} blobs dumped ({} planned, {} already present), peak {} workers",
                summary.pool.completed,
                summary.planned,
                summary.skipped,
                summary.pool.peak_running
            );
        }
        Err(e) => match e.downcast_ref::<DumpError>() {
            Some(DumpError::EmptyCatalog) => {
                tracing::info!("{}", e);
            }
            _ => {
                tracing::error!("{:#}", e);
                process::exit(1);
            }
        },
    }
}
