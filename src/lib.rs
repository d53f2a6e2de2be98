mod config;
mod error;
mod util;

mod sql;
mod query;
mod listing;
mod catalog;

mod blob;
mod partition;
mod schedule;
mod paths;
mod manifest;

mod progress;
mod worker;
mod pool;
mod export;
mod dump;

pub use crate::config::{resolve_tool, ConnectionArgs, DumpOptions, ToolPaths, DEFAULT_MAX_SIZE_KB, MAX_JOBS, MIN_JOBS};
pub use crate::error::DumpError;
pub use crate::dump::{plan, plan_and_dump, resume_dump, DumpSummary, ParallelDump};

// Catalog and planning.
pub use crate::catalog::{build_catalog, load_catalog, Catalog, PrimaryKey, TableDescriptor};
pub use crate::listing::{parse_toc, SchemaDump, TableListing, SCHEMA_DUMP_FILE};
pub use crate::query::{parse_rows, Psql, QueryRunner, Row};
pub use crate::partition::{split_table, PartitionPlanner, PartitionValue};
pub use crate::blob::{Blob, BlobKind, ScheduledBlob};
pub use crate::schedule::schedule;

// SQL rendering helpers.
pub use crate::sql::{decode_hex_text, quote_ident, quote_literal, range_condition, typed_literal};

// Output files: naming, manifest, plan.
pub use crate::paths::{data_file_name, escape_segment, finished_data_files, staging_path, MANIFEST_FILE, PLAN_FILE};
pub use crate::manifest::{column_header, completion_line, planned_line, Manifest, PlanFile};

// Execution engine.
pub use crate::pool::{Launcher, PoolReport, WorkerPool};
pub use crate::worker::{spawn_pipeline, Completion, CompletionSender, Stage};
pub use crate::export::{export_statements, ExportLauncher};
pub use crate::progress::{StatusCounts, StatusLine};

pub use crate::util::init_tracing_once;
