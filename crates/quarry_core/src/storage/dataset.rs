use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarry_error::{DbError, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::extent::Extent;
use super::file::{read_jsonl, remove_file_if_exists, write_jsonl};
use super::reader::DatasetReader;
use super::temp::TempFileNamer;
use super::writer::DatasetWriter;
use crate::arrays::key::Key;
use crate::arrays::record::Record;
use crate::arrays::schema::Schema;
use crate::expr::predicate::Predicate;

#[derive(Debug)]
enum ExtentSlot {
    /// Extent kept in memory.
    Memory(Arc<Extent>),
    /// Extent written to a file, swapped in on demand.
    Disk { path: PathBuf, len: usize },
}

impl ExtentSlot {
    fn len(&self) -> usize {
        match self {
            Self::Memory(extent) => extent.len(),
            Self::Disk { len, .. } => *len,
        }
    }
}

/// Ordered collection of records split across extents.
///
/// Extents are either held in memory, or written to files in the dataset's
/// directory and read back when requested with `pop_at`.
#[derive(Debug)]
pub struct Dataset {
    schema: Schema,
    extents: Vec<ExtentSlot>,
    max_records_per_extent: usize,
    /// Set for on-disk datasets.
    storage: Option<TempFileNamer>,
    /// Key the dataset is known to be sorted by.
    sorted_by: Option<Key>,
}

impl Dataset {
    /// Create an empty in-memory dataset.
    pub fn new(schema: Schema, max_records_per_extent: usize) -> Result<Self> {
        if max_records_per_extent == 0 {
            return Err(DbError::new("Max records per extent must be greater than zero"));
        }
        Ok(Dataset {
            schema,
            extents: Vec::new(),
            max_records_per_extent,
            storage: None,
            sorted_by: None,
        })
    }

    /// Create an empty dataset whose extents are stored in `directory`.
    pub fn on_disk(
        schema: Schema,
        max_records_per_extent: usize,
        directory: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut dataset = Self::new(schema, max_records_per_extent)?;
        let namer = TempFileNamer::new(directory).with_prefix("dataset");
        namer.ensure_directory()?;
        dataset.storage = Some(namer);
        Ok(dataset)
    }

    /// Create an in-memory dataset from records, chunked into extents.
    pub fn from_records(
        schema: Schema,
        max_records_per_extent: usize,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Self> {
        let mut dataset = Self::new(schema, max_records_per_extent)?;
        let mut writer = dataset.writer();
        for record in records {
            writer.insert_record(record)?;
        }
        writer.close()?;
        Ok(dataset)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }

    pub fn record_count(&self) -> usize {
        self.extents.iter().map(|e| e.len()).sum()
    }

    /// Number of records in an extent without swapping it in.
    pub fn extent_len(&self, extent_id: usize) -> Result<usize> {
        self.extents
            .get(extent_id)
            .map(|e| e.len())
            .ok_or_else(|| missing_extent(extent_id, self.extents.len()))
    }

    pub fn max_records_per_extent(&self) -> usize {
        self.max_records_per_extent
    }

    /// Directory holding extent files, None for in-memory datasets.
    pub fn directory(&self) -> Option<&Path> {
        self.storage.as_ref().map(|s| s.directory())
    }

    /// If the dataset spans more than one extent.
    pub fn is_large(&self) -> bool {
        self.extents.len() > 1
    }

    pub fn sorted_by(&self) -> Option<&Key> {
        self.sorted_by.as_ref()
    }

    pub fn is_sorted_by(&self, key: &Key) -> bool {
        self.sorted_by.as_ref() == Some(key)
    }

    /// Swap in an extent by id.
    pub fn pop_at(&self, extent_id: usize) -> Result<Arc<Extent>> {
        match self.extents.get(extent_id) {
            Some(ExtentSlot::Memory(extent)) => Ok(extent.clone()),
            Some(ExtentSlot::Disk { path, len }) => {
                let records: Vec<Record> = read_jsonl(path)?;
                if records.len() != *len {
                    return Err(DbError::new("Extent file has unexpected record count")
                        .with_field("path", path.display())
                        .with_field("expected", len)
                        .with_field("got", records.len()));
                }
                Ok(Arc::new(Extent::new(records)))
            }
            None => Err(missing_extent(extent_id, self.extents.len())),
        }
    }

    /// Append an extent to the end of the dataset.
    ///
    /// Clears any sort marker.
    pub fn push_extent(&mut self, extent: Extent) -> Result<()> {
        if extent.len() > self.max_records_per_extent {
            return Err(DbError::new("Extent exceeds max records per extent")
                .with_field("len", extent.len())
                .with_field("max", self.max_records_per_extent));
        }

        let slot = match &self.storage {
            Some(namer) => {
                let path = namer.next_path("extent");
                let len = write_jsonl(&path, extent.records())?;
                ExtentSlot::Disk { path, len }
            }
            None => ExtentSlot::Memory(Arc::new(extent)),
        };

        self.extents.push(slot);
        self.sorted_by = None;

        Ok(())
    }

    pub fn open_reader(&self, filter: Option<Predicate>) -> Result<DatasetReader<'_>> {
        DatasetReader::try_new(self, filter)
    }

    pub fn writer(&mut self) -> DatasetWriter<'_> {
        DatasetWriter::new(self)
    }

    /// Read every record in extent order.
    pub fn collect_records(&self) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(self.record_count());
        for extent_id in 0..self.extents.len() {
            let extent = self.pop_at(extent_id)?;
            records.extend_from_slice(extent.records());
        }
        Ok(records)
    }

    /// Sort the dataset in place by `key`.
    ///
    /// The sort is stable. Afterwards the dataset is marked as sorted by the
    /// key.
    pub fn sort(&mut self, key: &Key) -> Result<()> {
        key.validate(self.schema.arity())?;
        if self.is_sorted_by(key) {
            return Ok(());
        }

        debug!(%key, records = self.record_count(), "sorting dataset");

        let mut records = self.collect_records()?;
        records.sort_by(|a, b| Record::compare(a, key, b, key));
        self.replace_records(records)?;
        self.sorted_by = Some(key.clone());

        Ok(())
    }

    pub fn shuffle<R>(&mut self, rng: &mut R) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        let mut records = self.collect_records()?;
        records.shuffle(rng);
        self.replace_records(records)
    }

    pub fn reverse(&mut self) -> Result<()> {
        let mut records = self.collect_records()?;
        records.reverse();
        self.replace_records(records)
    }

    /// Remove all extents, deleting any extent files.
    pub fn clear(&mut self) -> Result<()> {
        for slot in self.extents.drain(..) {
            if let ExtentSlot::Disk { path, .. } = slot {
                remove_file_if_exists(&path)?;
            }
        }
        self.sorted_by = None;
        Ok(())
    }

    fn replace_records(&mut self, records: Vec<Record>) -> Result<()> {
        self.clear()?;
        let mut writer = self.writer();
        for record in records {
            writer.insert_record(record)?;
        }
        writer.close()?;
        Ok(())
    }
}

fn missing_extent(extent_id: usize, count: usize) -> DbError {
    DbError::new("Missing extent")
        .with_field("extent_id", extent_id)
        .with_field("extent_count", count)
}
