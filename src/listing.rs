//! Schema extraction and table listing via `pg_dump -s` + `pg_restore -l`.

use crate::config::ConnectionArgs;
use crate::query::run_captured;
use anyhow::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Source of the `(schema, table)` pairs to back up.
pub trait TableListing {
    fn list_tables(&self) -> Result<Vec<(String, String)>>;
}

/// Dumps the schema into the output directory, then lists it.
/// The schema dump stays behind for restore.
#[derive(Clone, Debug)]
pub struct SchemaDump {
    pub pg_dump: PathBuf,
    pub pg_restore: PathBuf,
    pub connection: ConnectionArgs,
    pub target: PathBuf,
}

pub const SCHEMA_DUMP_FILE: &str = "schema.dump";

impl SchemaDump {
    pub fn new(pg_dump: &Path, pg_restore: &Path, connection: ConnectionArgs, output_dir: &Path) -> Self {
        Self {
            pg_dump: pg_dump.to_path_buf(),
            pg_restore: pg_restore.to_path_buf(),
            connection,
            target: output_dir.join(SCHEMA_DUMP_FILE),
        }
    }
}

impl TableListing for SchemaDump {
    fn list_tables(&self) -> Result<Vec<(String, String)>> {
        let mut dump = Command::new(&self.pg_dump);
        dump.args(["-Fc", "-s", "-f"]).arg(&self.target).args(self.connection.to_args());
        run_captured(dump, "pg_dump")?;
        tracing::info!("Schema dumped to {}", self.target.display());

        let mut list = Command::new(&self.pg_restore);
        list.arg("-l").arg(&self.target);
        let toc = run_captured(list, "pg_restore")?;
        Ok(parse_toc(&toc))
    }
}

fn toc_table_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "<dump id>; <catalog oid> <oid> TABLE <schema> <table> <owner>"
    RE.get_or_init(|| Regex::new(r"^\d+; \d+ \d+ TABLE (.+)$").unwrap())
}

/// Other TOC descriptors that begin with `TABLE`.
const TABLE_SUBKINDS: [&str; 2] = ["DATA", "ATTACH"];

/// Extract `(schema, table)` pairs from a `pg_restore -l` listing, in order.
/// Only plain `TABLE` entries count; `TABLE DATA`, `TABLE ATTACH`, comments
/// and other object kinds are skipped. Names are printed unquoted, so the
/// schema runs to the first space and the owner starts after the last one;
/// table names may contain spaces, schema and owner names may not.
pub fn parse_toc(listing: &str) -> Vec<(String, String)> {
    listing
        .lines()
        .filter(|l| !l.starts_with(';'))
        .filter_map(|l| toc_table_line().captures(l.trim_end()))
        .filter_map(|caps| {
            let rest = caps.get(1)?.as_str();
            let (schema, tail) = rest.split_once(' ')?;
            if TABLE_SUBKINDS.contains(&schema) {
                return None;
            }
            let (table, _owner) = tail.rsplit_once(' ')?;
            Some((schema.to_string(), table.to_string()))
        })
        .collect()
}
