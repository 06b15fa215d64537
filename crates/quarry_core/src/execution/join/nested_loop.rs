use quarry_error::Result;

use super::match_tracker::MatchTracker;
use super::{JoinEmitter, JoinMethod, UnmatchedSide, emit_unmatched};
use crate::expr::predicate::Predicate;
use crate::storage::dataset::Dataset;
use crate::storage::writer::RecordSink;

/// Compare every left row against every right row.
///
/// `predicate` must already include key equality. Left extents are swapped
/// in once, right extents once per left extent.
pub fn nested_loop_join<S>(
    left: &Dataset,
    right: &Dataset,
    method: JoinMethod,
    predicate: &Predicate,
    emitter: &mut JoinEmitter<'_, S>,
) -> Result<()>
where
    S: RecordSink + ?Sized,
{
    let mut left_matches = MatchTracker::empty();
    let mut right_matches = MatchTracker::empty();
    right_matches.ensure_initialized(right.record_count());

    for left_id in 0..left.extent_count() {
        let left_extent = left.pop_at(left_id)?;

        left_matches.reset();
        left_matches.ensure_initialized(left_extent.len());

        let mut right_offset = 0;
        for right_id in 0..right.extent_count() {
            let right_extent = right.pop_at(right_id)?;

            for (left_idx, l) in left_extent.records().iter().enumerate() {
                for (right_idx, r) in right_extent.records().iter().enumerate() {
                    if !emitter.bind_and_check(l, r, predicate)? {
                        continue;
                    }
                    left_matches.set_match(left_idx);
                    right_matches.set_match(right_offset + right_idx);
                    if method.emits_matches() {
                        emitter.emit_bound()?;
                    }
                }
            }

            right_offset += right_extent.len();
        }

        // Every right row has been seen for this left extent.
        if method.emits_left_unmatched() {
            for idx in left_matches.unmatched(0..left_extent.len()) {
                emitter.emit_left_unmatched(&left_extent.records()[idx])?;
            }
        }
    }

    if method.emits_right_unmatched() {
        emit_unmatched(right, &right_matches, UnmatchedSide::Right, emitter)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::key::Key;
    use crate::arrays::scalar::ScalarValue;
    use crate::expr::projection::Projection;
    use crate::record;
    use crate::testutil::{assert_same_records, dataset, int_schema};

    #[test]
    fn predicate_only_join_spanning_extents() {
        // l#0 < r#0 over multiple extents on both sides.
        let left = dataset(int_schema(1), 2, (0..5).map(|i| record![i]));
        let right = dataset(int_schema(1), 3, (2..6).map(|i| record![i]));

        let predicate = Predicate::new(crate::expr::ScalarExpression::compare(
            crate::expr::ComparisonOperator::Lt,
            crate::expr::ScalarExpression::column(0),
            crate::expr::ScalarExpression::right_column(0),
        ));

        let projection = Projection::concat(1, 1);
        let mut out = Vec::new();
        let mut emitter = JoinEmitter::new(&projection, left.schema(), right.schema(), &mut out);
        nested_loop_join(&left, &right, JoinMethod::Full, &predicate, &mut emitter).unwrap();

        let mut expected = Vec::new();
        for l in 0..5i64 {
            for r in 2..6i64 {
                if l < r {
                    expected.push(record![l, r]);
                }
            }
        }
        // Nothing unmatched on the left since 4 < 5, right 2 only matches 0 and 1.
        assert_same_records(expected, out);
    }

    #[test]
    fn anti_right_tracks_across_left_extents() {
        let left = dataset(int_schema(1), 1, [record![1], record![3]]);
        let right = dataset(int_schema(1), 2, [record![1], record![2], record![3]]);

        let predicate = Predicate::key_equality(&Key::new([0]), &Key::new([0])).unwrap();
        let projection = Projection::concat(1, 1);
        let mut out = Vec::new();
        let mut emitter = JoinEmitter::new(&projection, left.schema(), right.schema(), &mut out);
        nested_loop_join(&left, &right, JoinMethod::AntiRight, &predicate, &mut emitter).unwrap();

        assert_eq!(vec![record![ScalarValue::Null, 2]], out);
    }
}
