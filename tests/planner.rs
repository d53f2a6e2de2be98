#[path = "common/mod.rs"]
mod common;

use chunkdump::{
    build_catalog, decode_hex_text, export_statements, schedule, split_table, Blob, BlobKind, PartitionPlanner,
    PartitionValue, PrimaryKey, TableDescriptor,
};
use common::*;
use regex::Regex;

fn keyed(size_kb: u64) -> TableDescriptor {
    let mut t = table("public", "big", 16400, size_kb);
    t.primary_key = Some(PrimaryKey { column: "id".into(), sql_type: "integer".into() });
    t
}

fn conditions(blobs: &[Blob]) -> Vec<&str> {
    blobs.iter().map(|b| b.condition().unwrap()).collect()
}

/// Evaluate the integer range predicates produced for an `integer` key.
fn matches(condition: &str, key: i64) -> bool {
    let re = Regex::new(r"id (<=|>) '(-?\d+)'::integer").unwrap();
    let all = re.captures_iter(condition).all(|c| {
        let bound: i64 = c[2].parse().unwrap();
        match &c[1] {
            "<=" => key <= bound,
            _ => key > bound,
        }
    });
    all
}

/// 20000 kB table, boundaries [(100, 0.3), (500, unknown)]:
/// - first slice gets 30% of the size
/// - the interior slice with unknown selectivity gets size / (N-1) = 20000
/// - the open tail is always estimated at 0
#[test]
fn split_follows_the_documented_size_heuristic() {
    let t = keyed(20000);
    let values = vec![PartitionValue::new("100", Some(0.3)), PartitionValue::new("500", None)];
    let blobs = split_table(&t, &values);

    assert_eq!(blobs.len(), 3);
    assert_eq!(
        conditions(&blobs),
        vec![
            "id <= '100'::integer",
            "id > '100'::integer AND id <= '500'::integer",
            "id > '500'::integer",
        ]
    );
    let sizes: Vec<u64> = blobs.iter().map(|b| b.size_kb).collect();
    assert_eq!(sizes, vec![6000, 20000, 0]);
    let parts: Vec<u32> = blobs.iter().map(|b| b.part).collect();
    assert_eq!(parts, vec![0, 1, 2]);
}

#[test]
fn unknown_selectivity_on_first_boundary_counts_as_zero() {
    let t = keyed(9000);
    let values = vec![
        PartitionValue::new("10", None),
        PartitionValue::new("20", None),
        PartitionValue::new("30", None),
        PartitionValue::new("40", Some(0.5)),
    ];
    let sizes: Vec<u64> = split_table(&t, &values).iter().map(|b| b.size_kb).collect();
    assert_eq!(sizes, vec![0, 3000, 3000, 4500, 0]);
}

/// K boundaries give K+1 slices and every key matches exactly one of them.
#[test]
fn range_slices_are_disjoint_and_cover_all_keys() {
    let t = keyed(50_000);
    let values: Vec<PartitionValue> = [-20, 0, 7, 8, 100, 1000]
        .iter()
        .map(|v| PartitionValue::new(v.to_string(), None))
        .collect();
    let blobs = split_table(&t, &values);
    assert_eq!(blobs.len(), values.len() + 1);
    assert!(blobs.iter().all(Blob::is_range));

    for key in -50..1100 {
        let hits = blobs.iter().filter(|b| matches(b.condition().unwrap(), key)).count();
        assert_eq!(hits, 1, "key {key} matched {hits} slices");
    }
}

#[test]
fn split_falls_back_to_whole_without_values_or_key() {
    let t = keyed(50_000);
    let blobs = split_table(&t, &[]);
    assert_eq!(blobs.len(), 1);
    assert_eq!(blobs[0].kind, BlobKind::Whole);
    assert_eq!(blobs[0].size_kb, 50_000);

    let no_pk = table("public", "heap", 1, 50_000);
    let blobs = split_table(&no_pk, &[PartitionValue::new("1", None)]);
    assert_eq!(blobs.len(), 1);
    assert_eq!(blobs[0].kind, BlobKind::Whole);
}

#[test]
fn literals_and_identifiers_are_escaped() {
    let mut t = table("public", "people", 5, 100);
    t.primary_key = Some(PrimaryKey { column: "Name".into(), sql_type: "text".into() });
    let blobs = split_table(&t, &[PartitionValue::new("O'Brien", None)]);
    assert_eq!(
        conditions(&blobs),
        vec!["\"Name\" <= 'O''Brien'::text", "\"Name\" > 'O''Brien'::text"]
    );
}

/// End to end through the planner with a scripted database:
/// - `small` stays whole with its measured size
/// - `big` has a key and statistics and is split
/// - `nokey` is big but has no primary key
/// - `nostats` is big with a key but no statistics
#[test]
fn planner_splits_only_oversized_tables_with_key_and_stats() {
    let tables = vec![
        ("public".to_string(), "small".to_string()),
        ("public".to_string(), "big".to_string()),
        ("public".to_string(), "nokey".to_string()),
        ("public".to_string(), "nostats".to_string()),
    ];
    let sizes = vec![
        row(&["public", "small", "small", "100", "10240", "r"]),
        row(&["public", "big", "big", "200", "20000", "r"]),
        row(&["public", "nokey", "nokey", "300", "30000", "r"]),
        row(&["public", "nostats", "nostats", "400", "40000", "r"]),
    ];
    let catalog = build_catalog(&tables, &sizes).unwrap();

    let runner = ScriptedRunner::new()
        .on("indisprimary", vec![row(&["200", "id", "integer"]), row(&["400", "id", "bigint"])])
        .on("tablename = 'big'", vec![row(&[hex("100").as_str(), "0.3"]), row(&[hex("500").as_str(), ""])]);

    let blobs = PartitionPlanner::new(&runner, 10240).concurrency(4).plan(catalog).unwrap();

    let small: Vec<_> = blobs.iter().filter(|b| b.table == "small").collect();
    assert_eq!(small.len(), 1);
    assert_eq!(small[0].kind, BlobKind::Whole);
    assert_eq!(small[0].size_kb, 10240, "size at the threshold is not split");

    let big: Vec<_> = blobs.iter().filter(|b| b.table == "big").collect();
    assert_eq!(big.len(), 3);
    assert_eq!(big.iter().map(|b| b.size_kb).collect::<Vec<_>>(), vec![6000, 20000, 0]);

    for name in ["nokey", "nostats"] {
        let b: Vec<_> = blobs.iter().filter(|b| b.table == name).collect();
        assert_eq!(b.len(), 1, "{name} should stay whole");
        assert_eq!(b[0].kind, BlobKind::Whole);
    }

    // one batched key lookup covering only the oversized tables
    let seen = runner.seen.lock().clone();
    let pk_queries: Vec<_> = seen.iter().filter(|q| q.contains("indisprimary")).collect();
    assert_eq!(pk_queries.len(), 1);
    assert!(pk_queries[0].contains("IN (200, 300, 400)"));
    // statistics only for tables that have a key
    assert_eq!(runner.queries_containing("pg_stats"), 2);
    assert_eq!(runner.queries_containing("tablename = 'nokey'"), 0);
    assert!(seen.iter().any(|q| q.contains("histogram_bounds::text::bigint[]")));
    // own statistics only; inheritance-wide ones would double the boundaries
    let stats: Vec<_> = seen.iter().filter(|q| q.contains("pg_stats")).collect();
    assert!(stats.iter().all(|q| q.contains("AND NOT inherited")));
    assert!(stats.iter().all(|q| q.contains("encode(convert_to(s.v::text, 'UTF8'), 'hex')")));
}

/// Text keys containing tabs and newlines come back hex-encoded, so each
/// boundary stays one value and the predicates quote it intact.
#[test]
fn text_keys_with_tabs_and_newlines_stay_single_boundaries() {
    let tables = vec![("public".to_string(), "notes".to_string())];
    let sizes = vec![row(&["public", "notes", "notes", "700", "30000", "r"])];
    let catalog = build_catalog(&tables, &sizes).unwrap();
    let runner = ScriptedRunner::new()
        .on("indisprimary", vec![row(&["700", "title", "text"])])
        .on(
            "tablename = 'notes'",
            vec![row(&[hex("a\tb").as_str(), ""]), row(&[hex("m\nz").as_str(), "0.5"])],
        );

    let blobs = PartitionPlanner::new(&runner, 10240).plan(catalog).unwrap();
    assert_eq!(
        conditions(&blobs),
        vec![
            "title <= 'a\tb'::text",
            "title > 'a\tb'::text AND title <= 'm\nz'::text",
            "title > 'm\nz'::text",
        ]
    );
    assert_eq!(blobs.iter().map(|b| b.size_kb).collect::<Vec<_>>(), vec![0, 15000, 0]);
}

#[test]
fn malformed_statistics_values_are_rejected() {
    assert_eq!(decode_hex_text(&hex("O'Brien")).unwrap(), "O'Brien");
    assert_eq!(decode_hex_text("").unwrap(), "");
    for bad in ["abc", "zz", "c3", "é1"] {
        assert!(decode_hex_text(bad).is_err(), "{bad:?}");
    }
}

/// Range exports read the parent's own rows only; children are separate blobs.
#[test]
fn range_exports_leave_child_tables_out() {
    let parent = keyed(20000);
    let jobs = schedule(split_table(&parent, &[PartitionValue::new("100", None)]));
    for job in &jobs {
        let stmts = export_statements(job);
        assert_eq!(stmts[0], "SET enable_seqscan = false");
        assert!(stmts[1].starts_with("COPY (SELECT * FROM ONLY public.big WHERE "), "{}", stmts[1]);
    }

    let whole = schedule(vec![Blob::whole(&table("public", "child", 2, 10))]);
    assert_eq!(export_statements(&whole[0]), vec!["COPY public.child TO STDOUT"]);
}

#[test]
fn planner_skips_key_lookup_when_nothing_is_oversized() {
    let tables = vec![("public".to_string(), "a".to_string())];
    let sizes = vec![row(&["public", "a", "a", "1", "5", "r"])];
    let catalog = build_catalog(&tables, &sizes).unwrap();
    let runner = ScriptedRunner::new();

    let blobs = PartitionPlanner::new(&runner, 10).plan(catalog).unwrap();
    assert_eq!(blobs.len(), 1);
    assert_eq!(runner.seen.lock().len(), 0);
}
