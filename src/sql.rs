//! SQL text rendering: identifier/literal quoting and the handful of query
//! templates the dump needs. Generated SQL is an opaque string handed to psql.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::OnceLock;

fn plain_ident() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_$]*$").unwrap())
}

/// Quote an identifier only when PostgreSQL would otherwise fold or reject it.
pub fn quote_ident(name: &str) -> String {
    if plain_ident().is_match(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Single-quoted string literal with embedded quotes doubled.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Literal cast to the key's declared type, e.g. `'100'::integer`.
/// `sql_type` is the `regtype` output and is already valid SQL.
pub fn typed_literal(value: &str, sql_type: &str) -> String {
    format!("{}::{}", quote_literal(value), sql_type)
}

/// Boolean predicate selecting keys in `(lower, upper]`; either bound may be open.
pub fn range_condition(column: &str, sql_type: &str, lower: Option<&str>, upper: Option<&str>) -> String {
    let col = quote_ident(column);
    match (lower, upper) {
        (None, Some(hi)) => format!("{col} <= {}", typed_literal(hi, sql_type)),
        (Some(lo), Some(hi)) => format!(
            "{col} > {} AND {col} <= {}",
            typed_literal(lo, sql_type),
            typed_literal(hi, sql_type)
        ),
        (Some(lo), None) => format!("{col} > {}", typed_literal(lo, sql_type)),
        (None, None) => "true".to_string(),
    }
}

/// One row per table: schema, table, qualified name, oid, size in kB (heap
/// plus its TOAST relation with indexes), relkind. Partitioned parents (`p`)
/// are reported so the catalog can drop them; their partitions hold the rows.
pub const TABLE_SIZES: &str = "\
SELECT n.nspname, c.relname, c.oid::regclass, c.oid, \
(pg_relation_size(c.oid) + COALESCE(pg_total_relation_size(NULLIF(c.reltoastrelid, 0)), 0)) / 1024, \
c.relkind \
FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
WHERE c.relkind IN ('r', 'p') \
ORDER BY 1, 2";

/// Single-column primary keys for the given table oids: oid, column, type.
pub fn primary_keys(oids: &[u32]) -> String {
    let list = oids.iter().map(|o| o.to_string()).collect::<Vec<_>>().join(", ");
    format!(
        "SELECT c.oid, a.attname, a.atttypid::regtype \
         FROM pg_class c \
         JOIN pg_index i ON i.indrelid = c.oid AND i.indisprimary AND i.indnatts = 1 \
         JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = i.indkey[0] \
         WHERE c.oid IN ({list}) \
         ORDER BY 1"
    )
}

/// Sampled key values with optional per-value selectivity, ascending by the
/// typed value. Histogram bounds carry no selectivity; most-common values carry
/// their frequency. Values come back hex-encoded (see [`decode_hex_text`]) so
/// tabs and newlines in text keys survive psql's unaligned output. Only the
/// table's own statistics are read, not the ones including inheritance children.
pub fn key_statistics(schema: &str, table: &str, column: &str, sql_type: &str) -> String {
    let filter = format!(
        "schemaname = {} AND tablename = {} AND attname = {} AND NOT inherited",
        quote_literal(schema),
        quote_literal(table),
        quote_literal(column)
    );
    format!(
        "SELECT encode(convert_to(s.v::text, 'UTF8'), 'hex'), max(s.p) FROM ( \
         SELECT unnest(histogram_bounds::text::{ty}[]) AS v, NULL::float8 AS p FROM pg_stats WHERE {filter} \
         UNION ALL \
         SELECT unnest(most_common_vals::text::{ty}[]), unnest(most_common_freqs)::float8 FROM pg_stats WHERE {filter} \
         ) s WHERE s.v IS NOT NULL GROUP BY s.v ORDER BY s.v",
        ty = sql_type
    )
}

pub const DISABLE_SEQSCAN: &str = "SET enable_seqscan = false";

/// `COPY table TO` reads the named table only, never inheritance children.
pub fn copy_whole(qualified: &str) -> String {
    format!("COPY {qualified} TO STDOUT")
}

/// `ONLY` keeps child tables' rows out; each child is dumped on its own.
pub fn copy_range(qualified: &str, condition: &str) -> String {
    format!("COPY (SELECT * FROM ONLY {qualified} WHERE {condition}) TO STDOUT")
}

/// Inverse of `encode(convert_to(x, 'UTF8'), 'hex')`.
pub fn decode_hex_text(hex: &str) -> Result<String> {
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        anyhow::bail!("malformed hex text {hex:?}");
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .with_context(|| format!("malformed hex text {hex:?}"))?;
    String::from_utf8(bytes).with_context(|| format!("hex text {hex:?} is not UTF-8"))
}
