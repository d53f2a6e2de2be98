//! Table catalog: the listing joined with per-table size and oid.

use crate::error::DumpError;
use crate::query::{QueryRunner, Row};
use crate::sql;
use anyhow::{Context, Result};
use std::collections::BTreeMap;

/// Primary key chosen for splitting a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryKey {
    pub column: String,
    pub sql_type: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableDescriptor {
    pub schema: String,
    pub table: String,
    pub qualified: String, // usable as-is in SQL
    pub oid: u32,
    pub size_kb: u64,      // heap + TOAST
    pub primary_key: Option<PrimaryKey>,
}

/// schema -> table -> descriptor, iterated in name order.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    schemas: BTreeMap<String, BTreeMap<String, TableDescriptor>>,
}

impl Catalog {
    pub fn get(&self, schema: &str, table: &str) -> Option<&TableDescriptor> {
        self.schemas.get(schema).and_then(|t| t.get(table))
    }

    pub fn len(&self) -> usize {
        self.schemas.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.schemas.values().flat_map(BTreeMap::values)
    }

    pub fn into_tables(self) -> Vec<TableDescriptor> {
        self.schemas.into_values().flat_map(BTreeMap::into_values).collect()
    }
}

/// Size row as returned by [`sql::TABLE_SIZES`].
struct SizeRow {
    qualified: String,
    oid: u32,
    size_kb: u64,
    partitioned: bool,
}

fn parse_size_row(row: &Row) -> Result<((String, String), SizeRow)> {
    if row.len() < 6 {
        anyhow::bail!("size row has {} fields, expected 6: {:?}", row.len(), row);
    }
    let oid = row[3].parse().with_context(|| format!("bad oid {:?}", row[3]))?;
    let size_kb = row[4].parse().with_context(|| format!("bad size {:?}", row[4]))?;
    Ok((
        (row[0].clone(), row[1].clone()),
        SizeRow { qualified: row[2].clone(), oid, size_kb, partitioned: row[5] == "p" },
    ))
}

/// Join the listing with the size rows. Listed tables without a size row are
/// kept with size 0 (and no oid). Partitioned parents are dropped: they hold
/// no rows and cannot be copied, their partitions are listed on their own.
/// A listing with nothing left to dump is `DumpError::EmptyCatalog`.
pub fn build_catalog(listing: &[(String, String)], size_rows: &[Row]) -> Result<Catalog> {
    if listing.is_empty() {
        return Err(DumpError::EmptyCatalog.into());
    }

    let mut sizes = BTreeMap::new();
    for row in size_rows {
        let (key, size) = parse_size_row(row)?;
        sizes.insert(key, size);
    }

    let mut catalog = Catalog::default();
    for (schema, table) in listing {
        let desc = match sizes.remove(&(schema.clone(), table.clone())) {
            Some(s) if s.partitioned => {
                tracing::debug!("{}.{} is partitioned, dumping its partitions instead", schema, table);
                continue;
            }
            Some(s) => TableDescriptor {
                schema: schema.clone(),
                table: table.clone(),
                qualified: s.qualified,
                oid: s.oid,
                size_kb: s.size_kb,
                primary_key: None,
            },
            None => {
                tracing::debug!("no size row for {}.{}, assuming 0 kB", schema, table);
                TableDescriptor {
                    schema: schema.clone(),
                    table: table.clone(),
                    qualified: format!("{}.{}", sql::quote_ident(schema), sql::quote_ident(table)),
                    oid: 0,
                    size_kb: 0,
                    primary_key: None,
                }
            }
        };
        catalog
            .schemas
            .entry(schema.clone())
            .or_default()
            .insert(table.clone(), desc);
    }
    if catalog.is_empty() {
        return Err(DumpError::EmptyCatalog.into());
    }
    Ok(catalog)
}

/// Run the size query and build the catalog.
pub fn load_catalog(listing: &[(String, String)], runner: &dyn QueryRunner) -> Result<Catalog> {
    if listing.is_empty() {
        return Err(DumpError::EmptyCatalog.into());
    }
    let rows = runner.query(sql::TABLE_SIZES).context("fetching table sizes")?;
    let catalog = build_catalog(listing, &rows)?;
    tracing::info!(
        "Catalog: {} tables, {} kB total",
        catalog.len(),
        catalog.tables().map(|t| t.size_kb).sum::<u64>()
    );
    Ok(catalog)
}
