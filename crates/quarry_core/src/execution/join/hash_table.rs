use std::sync::Arc;

use hashbrown::HashMap;
use quarry_error::Result;
use tracing::trace;

use super::match_tracker::MatchTracker;
use super::{JoinEmitter, JoinSpec, UnmatchedSide, emit_unmatched, extent_offsets};
use crate::arrays::key::Key;
use crate::arrays::scalar::ScalarValue;
use crate::storage::dataset::Dataset;
use crate::storage::extent::Extent;
use crate::storage::writer::RecordSink;

/// Location of a row within a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowId {
    pub extent: usize,
    pub row: usize,
}

/// Key values to the rows holding them. Rows with null keys are left out
/// since they can never match.
#[derive(Debug, Default)]
pub struct RowIndex {
    rows: HashMap<Vec<ScalarValue>, Vec<RowId>>,
}

impl RowIndex {
    pub fn build(dataset: &Dataset, key: &Key) -> Result<Self> {
        let mut rows: HashMap<Vec<ScalarValue>, Vec<RowId>> = HashMap::new();
        for extent_id in 0..dataset.extent_count() {
            let extent = dataset.pop_at(extent_id)?;
            for (row, record) in extent.records().iter().enumerate() {
                if record.has_null_key(key) {
                    continue;
                }
                rows.entry(record.key_values(key))
                    .or_default()
                    .push(RowId {
                        extent: extent_id,
                        row,
                    });
            }
        }
        Ok(RowIndex { rows })
    }

    pub fn num_keys(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, key: &[ScalarValue]) -> Option<&[RowId]> {
        self.rows.get(key).map(|rows| rows.as_slice())
    }

    /// Every (left, right) pair sharing a key, sorted by extent pair so each
    /// side's extents are swapped in as few times as possible.
    pub fn join_tuples(&self, other: &RowIndex) -> Vec<(RowId, RowId)> {
        let mut tuples = Vec::new();
        for (key, left_rows) in &self.rows {
            let right_rows = match other.rows.get(key) {
                Some(rows) => rows,
                None => continue,
            };
            for &l in left_rows {
                for &r in right_rows {
                    tuples.push((l, r));
                }
            }
        }
        tuples.sort_unstable_by_key(|(l, r)| (l.extent, r.extent, l.row, r.row));
        tuples
    }
}

/// Holds the most recently requested extent of a dataset.
#[derive(Debug)]
struct ExtentCache<'a> {
    dataset: &'a Dataset,
    current: Option<(usize, Arc<Extent>)>,
    swaps: usize,
}

impl<'a> ExtentCache<'a> {
    fn new(dataset: &'a Dataset) -> Self {
        ExtentCache {
            dataset,
            current: None,
            swaps: 0,
        }
    }

    fn get(&mut self, extent_id: usize) -> Result<Arc<Extent>> {
        if let Some((id, extent)) = &self.current {
            if *id == extent_id {
                return Ok(extent.clone());
            }
        }
        let extent = self.dataset.pop_at(extent_id)?;
        self.current = Some((extent_id, extent.clone()));
        self.swaps += 1;
        Ok(extent)
    }
}

/// Join by building a row index for each side and streaming the joined
/// row ids.
pub fn hash_join<S>(
    left: &Dataset,
    right: &Dataset,
    spec: &JoinSpec,
    emitter: &mut JoinEmitter<'_, S>,
) -> Result<()>
where
    S: RecordSink + ?Sized,
{
    let method = spec.method();
    let predicate = spec.predicate();

    let left_index = RowIndex::build(left, spec.left_key())?;
    let right_index = RowIndex::build(right, spec.right_key())?;
    let tuples = left_index.join_tuples(&right_index);

    trace!(
        left_keys = left_index.num_keys(),
        right_keys = right_index.num_keys(),
        tuples = tuples.len(),
        "built join indexes"
    );

    let mut left_matches = MatchTracker::empty();
    left_matches.ensure_initialized(left.record_count());
    let mut right_matches = MatchTracker::empty();
    right_matches.ensure_initialized(right.record_count());

    if !tuples.is_empty() {
        let left_offsets = extent_offsets(left)?;
        let right_offsets = extent_offsets(right)?;

        let mut left_cache = ExtentCache::new(left);
        let mut right_cache = ExtentCache::new(right);

        for (l, r) in tuples {
            let left_extent = left_cache.get(l.extent)?;
            let right_extent = right_cache.get(r.extent)?;

            if !emitter.bind_and_check(
                &left_extent.records()[l.row],
                &right_extent.records()[r.row],
                predicate,
            )? {
                continue;
            }
            left_matches.set_match(left_offsets[l.extent] + l.row);
            right_matches.set_match(right_offsets[r.extent] + r.row);
            if method.emits_matches() {
                emitter.emit_bound()?;
            }
        }

        trace!(
            left_swaps = left_cache.swaps,
            right_swaps = right_cache.swaps,
            "streamed join tuples"
        );
    }

    if method.emits_left_unmatched() {
        emit_unmatched(left, &left_matches, UnmatchedSide::Left, emitter)?;
    }
    if method.emits_right_unmatched() {
        emit_unmatched(right, &right_matches, UnmatchedSide::Right, emitter)?;
    }

    Ok(())
}
