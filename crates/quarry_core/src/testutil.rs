//! Helpers shared by unit tests.

use crate::arrays::record::Record;
use crate::arrays::scalar::DataType;
use crate::arrays::schema::{Field, Schema};
use crate::storage::dataset::Dataset;

/// Schema with `n` nullable Int64 columns named `c0`, `c1`, ...
pub fn int_schema(n: usize) -> Schema {
    Schema::new((0..n).map(|idx| Field::new(format!("c{idx}"), DataType::Int64, true)))
}

/// Single column dataset containing `0..n`.
pub fn int_dataset(n: usize, per_extent: usize) -> Dataset {
    Dataset::from_records(
        int_schema(1),
        per_extent,
        (0..n).map(|i| crate::record![i as i64]),
    )
    .unwrap()
}

/// Dataset built from records with the given schema.
pub fn dataset(schema: Schema, per_extent: usize, records: impl IntoIterator<Item = Record>) -> Dataset {
    Dataset::from_records(schema, per_extent, records).unwrap()
}

/// Dataset with extents stored as files in `dir`.
pub fn disk_dataset(
    dir: &std::path::Path,
    schema: Schema,
    per_extent: usize,
    records: impl IntoIterator<Item = Record>,
) -> Dataset {
    let mut dataset = Dataset::on_disk(schema, per_extent, dir).unwrap();
    let mut writer = dataset.writer();
    for record in records {
        writer.insert_record(record).unwrap();
    }
    writer.close().unwrap();
    dataset
}

pub fn sorted(mut records: Vec<Record>) -> Vec<Record> {
    records.sort();
    records
}

/// Assert two sets of records are equal ignoring order.
#[track_caller]
pub fn assert_same_records(expected: Vec<Record>, got: Vec<Record>) {
    assert_eq!(sorted(expected), sorted(got));
}
