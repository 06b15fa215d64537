use std::sync::Arc;

use quarry_error::{DbError, Result};

use super::dataset::Dataset;
use super::extent::Extent;
use crate::arrays::record::Record;
use crate::arrays::schema::Schema;
use crate::expr::predicate::Predicate;
use crate::expr::register::{Register, RowBinding};

/// Cursor over a dataset's records, optionally filtered by a predicate.
///
/// The cursor always rests on a record matching the filter, or past the end
/// of the data. Extents are swapped in one at a time as the cursor moves.
#[derive(Debug)]
pub struct DatasetReader<'a> {
    dataset: &'a Dataset,
    filter: Option<Predicate>,
    /// Binding used for evaluating the filter.
    binding: RowBinding,
    extent_idx: usize,
    row_idx: usize,
    /// Extent for `extent_idx`, None once past the end.
    extent: Option<Arc<Extent>>,
}

impl<'a> DatasetReader<'a> {
    pub(crate) fn try_new(dataset: &'a Dataset, filter: Option<Predicate>) -> Result<Self> {
        let filter = filter.filter(|f| !f.is_always_true());
        let mut reader = DatasetReader {
            dataset,
            filter,
            binding: RowBinding::new(),
            extent_idx: 0,
            row_idx: 0,
            extent: None,
        };
        reader.load_extent()?;
        reader.normalize()?;
        reader.skip_unmatched()?;
        Ok(reader)
    }

    pub fn schema(&self) -> &Schema {
        self.dataset.schema()
    }

    pub fn end_of_data(&self) -> bool {
        self.read().is_none()
    }

    /// Current record, None when at the end.
    pub fn read(&self) -> Option<&Record> {
        self.extent.as_ref().and_then(|e| e.get(self.row_idx))
    }

    /// Return the current record and advance the cursor.
    pub fn read_next(&mut self) -> Result<Option<Record>> {
        let record = self.read().cloned();
        if record.is_some() {
            self.advance()?;
        }
        Ok(record)
    }

    /// Bind the current record to a register, returning false at the end of
    /// the data.
    pub fn bind(&self, register: &mut Register) -> bool {
        match self.read() {
            Some(record) => {
                register.assign(record.clone());
                true
            }
            None => {
                register.clear();
                false
            }
        }
    }

    /// Move to the next matching record. No-op at the end.
    pub fn advance(&mut self) -> Result<()> {
        if self.end_of_data() {
            return Ok(());
        }
        self.row_idx += 1;
        self.normalize()?;
        self.skip_unmatched()
    }

    /// Move the cursor back by `n` matching records.
    ///
    /// On error the cursor is left where it was.
    pub fn revert(&mut self, n: usize) -> Result<()> {
        let saved = (self.extent_idx, self.row_idx, self.extent.clone());
        let result = self.step_back_matching(n);
        if result.is_err() {
            (self.extent_idx, self.row_idx, self.extent) = saved;
        }
        result
    }

    fn step_back_matching(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            loop {
                if !self.step_back()? {
                    return Err(DbError::new("Cannot revert past the start of the data")
                        .with_field("n", n));
                }
                if self.current_matches()? {
                    break;
                }
            }
        }
        Ok(())
    }

    fn load_extent(&mut self) -> Result<()> {
        self.extent = if self.extent_idx < self.dataset.extent_count() {
            Some(self.dataset.pop_at(self.extent_idx)?)
        } else {
            None
        };
        Ok(())
    }

    /// Move past exhausted (or empty) extents.
    fn normalize(&mut self) -> Result<()> {
        while let Some(extent) = &self.extent {
            if self.row_idx < extent.len() {
                break;
            }
            self.extent_idx += 1;
            self.row_idx = 0;
            self.load_extent()?;
        }
        Ok(())
    }

    fn step_back(&mut self) -> Result<bool> {
        if self.extent.is_some() && self.row_idx > 0 {
            self.row_idx -= 1;
            return Ok(true);
        }

        let (orig_extent, orig_row) = (self.extent_idx, self.row_idx);
        let mut idx = self.extent_idx.min(self.dataset.extent_count());
        while idx > 0 {
            idx -= 1;
            let len = self.dataset.extent_len(idx)?;
            if len > 0 {
                self.extent_idx = idx;
                self.row_idx = len - 1;
                self.load_extent()?;
                return Ok(true);
            }
        }

        // Nothing before us, stay put.
        self.extent_idx = orig_extent;
        self.row_idx = orig_row;
        Ok(false)
    }

    fn current_matches(&mut self) -> Result<bool> {
        let filter = match &self.filter {
            Some(filter) => filter,
            None => return Ok(true),
        };
        let record = match self.extent.as_ref().and_then(|e| e.get(self.row_idx)) {
            Some(record) => record.clone(),
            None => return Ok(false),
        };
        self.binding.assign_left(record);
        filter.evaluate(&self.binding)
    }

    fn skip_unmatched(&mut self) -> Result<()> {
        while !self.end_of_data() && !self.current_matches()? {
            self.row_idx += 1;
            self.normalize()?;
        }
        Ok(())
    }
}
