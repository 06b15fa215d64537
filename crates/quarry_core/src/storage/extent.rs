use std::ops::Range;

use quarry_error::{DbError, Result};

use crate::arrays::record::Record;

/// One physically contiguous chunk of a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extent {
    records: Vec<Record>,
}

impl Extent {
    pub fn new(records: Vec<Record>) -> Self {
        Extent { records }
    }

    pub fn empty() -> Self {
        Extent {
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, row: usize) -> Option<&Record> {
        self.records.get(row)
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Copy a contiguous range of records into a new extent.
    pub fn slice(&self, range: Range<usize>) -> Result<Extent> {
        if range.start > range.end || range.end > self.records.len() {
            return Err(DbError::new("Extent slice out of bounds")
                .with_field("start", range.start)
                .with_field("end", range.end)
                .with_field("len", self.records.len()));
        }
        Ok(Extent {
            records: self.records[range].to_vec(),
        })
    }
}
