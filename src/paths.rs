//! Output file naming and discovery of finished data files.

use crate::blob::ScheduledBlob;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const MANIFEST_FILE: &str = "manifest.txt";
pub const PLAN_FILE: &str = "plan.json";
const STAGING_SUFFIX: &str = ".inprogress";

/// Escape one name segment: `[A-Za-z0-9]` passes through, every other UTF-8
/// byte becomes `_` plus two lowercase hex digits. `_` itself is escaped, so
/// the mapping is injective and the output stays within `[A-Za-z0-9_]`.
pub fn escape_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() {
            out.push(b as char);
        } else {
            let _ = write!(out, "_{:02x}", b);
        }
    }
    out
}

/// `data.<schema>.<table>.<id>.dump`, every segment escaped.
pub fn data_file_name(schema: &str, table: &str, id: u32) -> String {
    ["data", schema, table, &id.to_string(), "dump"]
        .iter()
        .map(|s| escape_segment(s))
        .collect::<Vec<_>>()
        .join(".")
}

pub fn data_file_path(dir: &Path, job: &ScheduledBlob) -> PathBuf {
    dir.join(data_file_name(&job.blob.schema, &job.blob.table, job.id))
}

/// Where a worker writes before the coordinator promotes the file.
pub fn staging_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

/// File names of promoted data files directly inside `dir`.
pub fn finished_data_files(dir: &Path) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with("data.") && name.ends_with(".dump") {
                found.insert(name.to_string());
            }
        }
    }
    found
}
