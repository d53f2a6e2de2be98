//! Partition planner: turns table descriptors into blobs, splitting oversized
//! tables into primary-key ranges sized from the column statistics.
//!
//! For a table with sampled boundaries `v0 < v1 < ... < v(N-1)`:
//!
//! ```text
//!   part 0      key <= v0                      size * sel(v0), or 0 if unknown
//!   part i      key > v(i-1) AND key <= vi     size * sel(vi), or size / (N-1)
//!   part N      key > v(N-1)                   0
//! ```
//!
//! The N+1 predicates are mutually exclusive and together cover every
//! non-NULL key. The size estimates are heuristics used only for ordering.

use crate::blob::Blob;
use crate::catalog::{Catalog, PrimaryKey, TableDescriptor};
use crate::query::{QueryRunner, Row};
use crate::sql;
use ahash::AHashMap;
use anyhow::{Context, Result};
use rayon::prelude::*;

/// A sampled boundary for a table's key. `selectivity` is the statistics
/// estimate attached to the value, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionValue {
    pub value: String,
    pub selectivity: Option<f64>,
}

impl PartitionValue {
    pub fn new(value: impl Into<String>, selectivity: Option<f64>) -> Self {
        Self { value: value.into(), selectivity }
    }
}

fn parse_partition_value(row: &Row) -> Result<PartitionValue> {
    let value = sql::decode_hex_text(row.first().map(String::as_str).unwrap_or_default())?;
    let selectivity = match row.get(1).map(String::as_str) {
        None | Some("") => None,
        Some(s) => Some(s.parse::<f64>().with_context(|| format!("bad selectivity {s:?}"))?),
    };
    Ok(PartitionValue { value, selectivity })
}

#[inline]
fn share(size_kb: u64, fraction: f64) -> u64 {
    (size_kb as f64 * fraction).round().max(0.0) as u64
}

/// Split one table into `values.len() + 1` range blobs. Falls back to a single
/// whole blob when the table has no primary key or no sampled values.
pub fn split_table(t: &TableDescriptor, values: &[PartitionValue]) -> Vec<Blob> {
    let pk = match &t.primary_key {
        Some(pk) if !values.is_empty() => pk,
        _ => return vec![Blob::whole(t)],
    };
    let n = values.len();
    let mut blobs = Vec::with_capacity(n + 1);

    for (i, v) in values.iter().enumerate() {
        let size_kb = match (i, v.selectivity) {
            (_, Some(sel)) => share(t.size_kb, sel),
            (0, None) => 0,
            // Equal share over all boundaries, not over the remaining rows.
            (_, None) => (t.size_kb as f64 / (n - 1) as f64).round() as u64,
        };
        let lower = if i == 0 { None } else { Some(values[i - 1].value.as_str()) };
        let condition = sql::range_condition(&pk.column, &pk.sql_type, lower, Some(&v.value));
        blobs.push(Blob::range(t, i as u32, size_kb, condition));
    }

    let tail = sql::range_condition(&pk.column, &pk.sql_type, Some(&values[n - 1].value), None);
    blobs.push(Blob::range(t, n as u32, 0, tail));
    blobs
}

pub struct PartitionPlanner<'a> {
    runner: &'a dyn QueryRunner,
    max_size_kb: u64,
    concurrency: usize,
}

impl<'a> PartitionPlanner<'a> {
    pub fn new(runner: &'a dyn QueryRunner, max_size_kb: u64) -> Self {
        Self { runner, max_size_kb, concurrency: 1 }
    }

    /// Number of statistics queries allowed in flight at once.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Produce blobs for every table in the catalog, in catalog order.
    pub fn plan(&self, catalog: Catalog) -> Result<Vec<Blob>> {
        let mut tables = catalog.into_tables();

        let candidates: Vec<u32> = tables
            .iter()
            .filter(|t| t.size_kb > self.max_size_kb && t.oid != 0)
            .map(|t| t.oid)
            .collect();
        if !candidates.is_empty() {
            let keys = self.primary_keys(&candidates)?;
            for t in tables.iter_mut().filter(|t| t.size_kb > self.max_size_kb) {
                t.primary_key = keys.get(&t.oid).cloned();
                if t.primary_key.is_none() {
                    tracing::info!("{}.{} has no single-column primary key, dumping whole", t.schema, t.table);
                }
            }
        }

        let splittable: Vec<&TableDescriptor> = tables
            .iter()
            .filter(|t| t.size_kb > self.max_size_kb && t.primary_key.is_some())
            .collect();
        let mut sampled: AHashMap<u32, Vec<PartitionValue>> = AHashMap::with_capacity(splittable.len());
        for chunk in splittable.chunks(self.concurrency) {
            let fetched = chunk
                .par_iter()
                .map(|t| self.key_statistics(t).map(|v| (t.oid, v)))
                .collect::<Result<Vec<_>>>()?;
            sampled.extend(fetched);
        }

        let mut blobs = Vec::with_capacity(tables.len());
        for t in &tables {
            match sampled.get(&t.oid) {
                Some(values) if t.size_kb > self.max_size_kb && t.primary_key.is_some() => {
                    if values.is_empty() {
                        tracing::info!("{}.{} has no key statistics, dumping whole", t.schema, t.table);
                    }
                    let parts = split_table(t, values);
                    tracing::debug!("{}.{} ({} kB) split into {} blobs", t.schema, t.table, t.size_kb, parts.len());
                    blobs.extend(parts);
                }
                _ => blobs.push(Blob::whole(t)),
            }
        }
        Ok(blobs)
    }

    fn primary_keys(&self, oids: &[u32]) -> Result<AHashMap<u32, PrimaryKey>> {
        let rows = self
            .runner
            .query(&sql::primary_keys(oids))
            .context("fetching primary keys")?;
        let mut keys = AHashMap::with_capacity(rows.len());
        for row in rows {
            if row.len() < 3 {
                anyhow::bail!("primary key row has {} fields, expected 3: {:?}", row.len(), row);
            }
            let oid: u32 = row[0].parse().with_context(|| format!("bad oid {:?}", row[0]))?;
            keys.insert(oid, PrimaryKey { column: row[1].clone(), sql_type: row[2].clone() });
        }
        Ok(keys)
    }

    fn key_statistics(&self, t: &TableDescriptor) -> Result<Vec<PartitionValue>> {
        let Some(pk) = &t.primary_key else { return Ok(Vec::new()) };
        let query = sql::key_statistics(&t.schema, &t.table, &pk.column, &pk.sql_type);
        let rows = self
            .runner
            .query(&query)
            .with_context(|| format!("fetching key statistics for {}.{}", t.schema, t.table))?;
        rows.iter().map(parse_partition_value).collect()
    }
}
