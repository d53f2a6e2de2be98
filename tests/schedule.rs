#[path = "common/mod.rs"]
mod common;

use chunkdump::{schedule, split_table, Blob, PartitionValue, PrimaryKey};
use common::*;

fn whole(schema: &str, name: &str, size_kb: u64) -> Blob {
    Blob::whole(&table(schema, name, 1, size_kb))
}

fn sample() -> Vec<Blob> {
    let mut big = table("public", "events", 7, 90_000);
    big.primary_key = Some(PrimaryKey { column: "id".into(), sql_type: "bigint".into() });
    let values = vec![
        PartitionValue::new("1000", Some(0.25)),
        PartitionValue::new("2000", None),
        PartitionValue::new("3000", None),
    ];
    let mut blobs = split_table(&big, &values);
    blobs.push(whole("public", "users", 500));
    blobs.push(whole("public", "accounts", 500));
    blobs.push(whole("archive", "accounts", 500));
    blobs.push(whole("public", "tiny", 0));
    blobs
}

/// Output is size descending, then table name ascending; ids are 0..N in
/// output order.
#[test]
fn schedule_orders_by_size_then_table_name() {
    let jobs = schedule(sample());
    assert_eq!(jobs.len(), 8);

    let ids: Vec<u32> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, (0..8).collect::<Vec<u32>>());

    for w in jobs.windows(2) {
        let (a, b) = (&w[0].blob, &w[1].blob);
        assert!(
            a.size_kb > b.size_kb || (a.size_kb == b.size_kb && a.table <= b.table),
            "{:?} scheduled before {:?}",
            a,
            b
        );
    }

    let order: Vec<(String, u64)> = jobs.iter().map(|j| (format!("{}.{}", j.blob.schema, j.blob.table), j.blob.size_kb)).collect();
    assert_eq!(order[0], ("public.events".to_string(), 45_000));
    assert_eq!(order[1], ("public.events".to_string(), 45_000));
    assert_eq!(order[2], ("public.events".to_string(), 22_500));
    // equal sizes: table name first, schema breaks the remaining tie
    assert_eq!(order[3], ("archive.accounts".to_string(), 500));
    assert_eq!(order[4], ("public.accounts".to_string(), 500));
    assert_eq!(order[5], ("public.users".to_string(), 500));
}

#[test]
fn schedule_is_independent_of_input_order() {
    let forward = schedule(sample());
    let mut reversed_input = sample();
    reversed_input.reverse();
    let reversed = schedule(reversed_input);
    assert_eq!(forward, reversed);

    // running the same plan twice gives the same ids
    assert_eq!(schedule(sample()), schedule(sample()));
}

#[test]
fn schedule_of_nothing_is_empty() {
    assert!(schedule(Vec::new()).is_empty());
}
