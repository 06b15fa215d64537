use quarry_error::{DbError, Result};

use super::dataset::Dataset;
use super::extent::Extent;
use crate::arrays::record::Record;
use crate::arrays::schema::Schema;

/// Destination for output records.
pub trait RecordSink {
    fn insert(&mut self, record: Record) -> Result<()>;
}

impl RecordSink for Vec<Record> {
    fn insert(&mut self, record: Record) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

/// Appends records to a dataset, cutting a new extent every time the max
/// records per extent is reached.
///
/// Buffered records are only written once the writer is closed.
#[derive(Debug)]
pub struct DatasetWriter<'a> {
    dataset: &'a mut Dataset,
    buffer: Vec<Record>,
    rows_written: usize,
}

impl<'a> DatasetWriter<'a> {
    pub(crate) fn new(dataset: &'a mut Dataset) -> Self {
        DatasetWriter {
            dataset,
            buffer: Vec::new(),
            rows_written: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        self.dataset.schema()
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn insert_record(&mut self, record: Record) -> Result<()> {
        let arity = self.dataset.schema().arity();
        if record.arity() != arity {
            return Err(DbError::new("Record arity does not match dataset schema")
                .with_field("record", record.arity())
                .with_field("schema", arity));
        }

        self.buffer.push(record);
        self.rows_written += 1;

        if self.buffer.len() >= self.dataset.max_records_per_extent() {
            self.flush_extent()?;
        }

        Ok(())
    }

    /// Flush remaining buffered records, returning the total number of rows
    /// written.
    pub fn close(mut self) -> Result<usize> {
        self.flush_extent()?;
        Ok(self.rows_written)
    }

    fn flush_extent(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let records = std::mem::take(&mut self.buffer);
        self.dataset.push_extent(Extent::new(records))
    }
}

impl RecordSink for DatasetWriter<'_> {
    fn insert(&mut self, record: Record) -> Result<()> {
        self.insert_record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::testutil::int_schema;

    #[test]
    fn records_buffered_until_close() {
        let mut dataset = Dataset::new(int_schema(1), 4).unwrap();
        let mut writer = dataset.writer();
        for i in 0..6 {
            writer.insert(record![i]).unwrap();
        }
        assert_eq!(6, writer.rows_written());
        assert_eq!(6, writer.close().unwrap());

        assert_eq!(2, dataset.extent_count());
        assert_eq!(4, dataset.extent_len(0).unwrap());
        assert_eq!(2, dataset.extent_len(1).unwrap());
    }

    #[test]
    fn wrong_arity_rejected() {
        let mut dataset = Dataset::new(int_schema(2), 4).unwrap();
        let mut writer = dataset.writer();
        assert!(writer.insert(record![1]).is_err());
    }
}
