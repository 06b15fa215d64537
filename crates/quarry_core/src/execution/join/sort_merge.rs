use std::cmp::Ordering;

use quarry_error::Result;

use super::{JoinEmitter, JoinSpec};
use crate::arrays::record::Record;
use crate::storage::dataset::Dataset;
use crate::storage::writer::RecordSink;

/// Merge two datasets sorted on their join keys.
///
/// When keys are equal the run of right rows sharing the key is buffered
/// once, then replayed against every left row with that key. Rows with null
/// keys sort first and never match.
pub fn sort_merge_join<S>(
    left: &Dataset,
    right: &Dataset,
    spec: &JoinSpec,
    emitter: &mut JoinEmitter<'_, S>,
) -> Result<()>
where
    S: RecordSink + ?Sized,
{
    let method = spec.method();
    let left_key = spec.left_key();
    let right_key = spec.right_key();
    let predicate = spec.predicate();

    let mut left_reader = left.open_reader(None)?;
    let mut right_reader = right.open_reader(None)?;

    // Right rows sharing the current key, and if they've been matched.
    let mut run: Vec<Record> = Vec::new();
    let mut run_matches: Vec<bool> = Vec::new();

    loop {
        let l = left_reader.read().cloned();
        let r = right_reader.read().cloned();

        let (l, r) = match (l, r) {
            (None, None) => break,
            (Some(l), None) => {
                if method.emits_left_unmatched() {
                    emitter.emit_left_unmatched(&l)?;
                }
                left_reader.advance()?;
                continue;
            }
            (None, Some(r)) => {
                if method.emits_right_unmatched() {
                    emitter.emit_right_unmatched(&r)?;
                }
                right_reader.advance()?;
                continue;
            }
            (Some(l), Some(r)) => (l, r),
        };

        if l.has_null_key(left_key) {
            if method.emits_left_unmatched() {
                emitter.emit_left_unmatched(&l)?;
            }
            left_reader.advance()?;
            continue;
        }
        if r.has_null_key(right_key) {
            if method.emits_right_unmatched() {
                emitter.emit_right_unmatched(&r)?;
            }
            right_reader.advance()?;
            continue;
        }

        match Record::compare(&l, left_key, &r, right_key) {
            Ordering::Less => {
                if method.emits_left_unmatched() {
                    emitter.emit_left_unmatched(&l)?;
                }
                left_reader.advance()?;
            }
            Ordering::Greater => {
                if method.emits_right_unmatched() {
                    emitter.emit_right_unmatched(&r)?;
                }
                right_reader.advance()?;
            }
            Ordering::Equal => {
                run.clear();
                while let Some(r) = right_reader.read() {
                    if Record::compare(&l, left_key, r, right_key) != Ordering::Equal {
                        break;
                    }
                    run.push(r.clone());
                    right_reader.advance()?;
                }
                run_matches.clear();
                run_matches.resize(run.len(), false);

                while let Some(l) = left_reader.read().cloned() {
                    if Record::compare(&l, left_key, &run[0], right_key) != Ordering::Equal {
                        break;
                    }

                    let mut matched = false;
                    for (idx, r) in run.iter().enumerate() {
                        if !emitter.bind_and_check(&l, r, predicate)? {
                            continue;
                        }
                        matched = true;
                        run_matches[idx] = true;
                        if method.emits_matches() {
                            emitter.emit_bound()?;
                        }
                    }

                    if !matched && method.emits_left_unmatched() {
                        emitter.emit_left_unmatched(&l)?;
                    }
                    left_reader.advance()?;
                }

                if method.emits_right_unmatched() {
                    for (r, _) in run.iter().zip(&run_matches).filter(|(_, m)| !**m) {
                        emitter.emit_right_unmatched(r)?;
                    }
                }
            }
        }
    }

    Ok(())
}
