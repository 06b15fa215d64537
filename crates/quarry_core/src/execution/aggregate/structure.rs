use std::sync::Arc;

use hashbrown::HashMap;
use quarry_error::{DbError, Result};
use tracing::debug;

use super::spill::SpilledHeader;
use super::table::{GroupRow, GroupingDefinition, GroupingTable, merge_states};
use crate::arrays::record::Record;
use crate::arrays::scalar::ScalarValue;
use crate::expr::projection::Projection;
use crate::expr::register::RowBinding;
use crate::storage::temp::TempFileNamer;
use crate::storage::writer::RecordSink;

/// Grouping table that spills to disk once it holds too many groups.
///
/// Lifecycle: `insert` rows, `close`, `consolidate`, then `render`. Spill
/// files are deleted when the structure (or the header owning them) is
/// dropped.
#[derive(Debug)]
pub struct AggregateStructure {
    table: GroupingTable,
    namer: TempFileNamer,
    headers: Vec<SpilledHeader>,
    rows_inserted: usize,
    spills: usize,
    consolidated: bool,
}

impl AggregateStructure {
    pub fn try_new(
        definition: Arc<GroupingDefinition>,
        max_groups_in_memory: usize,
        namer: TempFileNamer,
    ) -> Result<Self> {
        if max_groups_in_memory == 0 {
            return Err(DbError::new("Max groups in memory must be greater than zero"));
        }
        Ok(AggregateStructure {
            table: GroupingTable::new(definition, max_groups_in_memory),
            namer,
            headers: Vec::new(),
            rows_inserted: 0,
            spills: 0,
            consolidated: false,
        })
    }

    pub fn definition(&self) -> &Arc<GroupingDefinition> {
        self.table.definition()
    }

    pub fn rows_inserted(&self) -> usize {
        self.rows_inserted
    }

    /// Number of times a table has been written to disk.
    pub fn spill_count(&self) -> usize {
        self.spills
    }

    pub fn is_spilled(&self) -> bool {
        !self.headers.is_empty()
    }

    pub fn headers(&self) -> &[SpilledHeader] {
        &self.headers
    }

    pub fn groups_in_memory(&self) -> usize {
        self.table.len()
    }

    /// Add a row, spilling the current table first if it's full.
    pub fn insert(&mut self, record: &Record) -> Result<()> {
        if self.table.is_full() {
            self.spill_table()?;
        }
        self.table.insert(record)?;
        self.rows_inserted += 1;
        self.consolidated = false;
        Ok(())
    }

    /// Flush the in-memory table if anything has been spilled, so every
    /// group lives on disk.
    pub fn close(&mut self) -> Result<()> {
        if self.is_spilled() {
            self.spill_table()?;
        }
        Ok(())
    }

    /// Union headers so that each group key lives in exactly one header.
    ///
    /// Groups in header `i` that also appear in a later header are merged into
    /// the later header. Headers left empty are deleted.
    pub fn consolidate(&mut self) -> Result<()> {
        if self.consolidated || !self.is_spilled() {
            self.consolidated = true;
            return Ok(());
        }
        self.close()?;

        let before = self.headers.len();

        for i in 0..self.headers.len() {
            let mut current: HashMap<Vec<ScalarValue>, Vec<_>> = self.headers[i]
                .read()?
                .into_iter()
                .map(|row| (row.key, row.states))
                .collect();

            for j in (i + 1)..self.headers.len() {
                if current.is_empty() {
                    break;
                }

                let mut later = self.headers[j].read()?;
                let mut changed = false;
                for row in later.iter_mut() {
                    if let Some(states) = current.remove(&row.key) {
                        merge_states(&mut row.states, &states)?;
                        changed = true;
                    }
                }
                if changed {
                    self.headers[j].rewrite(&later)?;
                }
            }

            let mut remaining: Vec<_> = current
                .into_iter()
                .map(|(key, states)| GroupRow { key, states })
                .collect();
            remaining.sort_by(|a, b| a.key.cmp(&b.key));
            self.headers[i].rewrite(&remaining)?;
        }

        // Dropping a header deletes its file.
        self.headers.retain(|header| !header.is_empty());

        debug!(
            headers_before = before,
            headers_after = self.headers.len(),
            "consolidated spilled aggregate tables"
        );

        self.consolidated = true;
        Ok(())
    }

    /// Render every group through `projection` into `sink`.
    ///
    /// The projection reads the rendered group (keys followed by aggregate
    /// values) from the left register. Returns the number of records
    /// written.
    pub fn render<S>(&mut self, projection: &Projection, sink: &mut S) -> Result<usize>
    where
        S: RecordSink + ?Sized,
    {
        let mut binding = RowBinding::new();
        let mut written = 0;

        if !self.is_spilled() {
            for row in self.table.rows() {
                binding.assign_left(row.render());
                sink.insert(projection.evaluate(&binding)?)?;
                written += 1;
            }
            return Ok(written);
        }

        self.consolidate()?;
        for header in &self.headers {
            for row in header.read()? {
                binding.assign_left(row.render());
                sink.insert(projection.evaluate(&binding)?)?;
                written += 1;
            }
        }

        Ok(written)
    }

    /// Fold another structure with the same definition into this one.
    pub fn merge(&mut self, mut other: AggregateStructure) -> Result<()> {
        if self.definition() != other.definition() {
            return Err(DbError::new("Cannot merge aggregate structures with different definitions"));
        }

        self.rows_inserted += other.rows_inserted;
        self.spills += other.spills;
        self.consolidated = false;

        match (self.is_spilled(), other.is_spilled()) {
            (false, false) => {
                let new_groups = self.table.count_new_groups(&other.table);
                if self.table.len() + new_groups <= self.table.capacity() {
                    let other_table = std::mem::replace(&mut other.table, self.table.new_empty());
                    self.table.absorb(other_table)?;
                } else {
                    self.spill_table()?;
                    other.spill_table()?;
                    self.headers.append(&mut other.headers);
                }
            }
            (false, true) | (true, false) | (true, true) => {
                // Anything still in memory is written out, then the header
                // lists are concatenated.
                self.spill_table()?;
                other.spill_table()?;
                self.headers.append(&mut other.headers);
            }
        }

        Ok(())
    }

    /// Write the in-memory table to a new header, leaving an empty table.
    fn spill_table(&mut self) -> Result<()> {
        if self.table.is_empty() {
            return Ok(());
        }
        let rows = self.table.take_rows();
        let header = SpilledHeader::write(&self.namer, &rows)?;
        self.headers.push(header);
        self.spills += 1;
        Ok(())
    }
}
