//! Joins over two datasets.
//!
//! Every join method can be executed by each of the three algorithms. The
//! algorithms only decide which pairs are inspected, match semantics are the
//! same for all of them: a pair matches if its keys are equal and non-null,
//! and the residual predicate evaluates to true.

pub mod hash_table;
pub mod match_tracker;
pub mod nested_loop;
pub mod sort_merge;

use std::fmt;

use match_tracker::MatchTracker;
use quarry_error::{DbError, Result};
use tracing::debug;

use crate::arrays::key::Key;
use crate::arrays::record::Record;
use crate::arrays::schema::{Field, Schema};
use crate::config::execution::{DEFAULT_NESTED_LOOP_RATIO, ExecutionConfig};
use crate::expr::ScalarExpression;
use crate::expr::predicate::Predicate;
use crate::expr::projection::Projection;
use crate::expr::register::{RowBinding, Side};
use crate::storage::dataset::Dataset;
use crate::storage::writer::RecordSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinMethod {
    /// Every matching pair.
    Inner,
    /// Inner plus unmatched left rows padded with nulls.
    Left,
    /// Inner plus unmatched right rows padded with nulls.
    Right,
    /// Inner plus unmatched rows from both sides.
    Full,
    /// Only unmatched left rows.
    AntiLeft,
    /// Only unmatched right rows.
    AntiRight,
    /// Unmatched rows from both sides.
    AntiInner,
    /// Every pair, keys and predicate are ignored.
    Cross,
}

impl JoinMethod {
    pub const fn emits_matches(&self) -> bool {
        matches!(
            self,
            JoinMethod::Inner
                | JoinMethod::Left
                | JoinMethod::Right
                | JoinMethod::Full
                | JoinMethod::Cross
        )
    }

    pub const fn emits_left_unmatched(&self) -> bool {
        matches!(
            self,
            JoinMethod::Left | JoinMethod::Full | JoinMethod::AntiLeft | JoinMethod::AntiInner
        )
    }

    pub const fn emits_right_unmatched(&self) -> bool {
        matches!(
            self,
            JoinMethod::Right | JoinMethod::Full | JoinMethod::AntiRight | JoinMethod::AntiInner
        )
    }
}

impl fmt::Display for JoinMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::Left => write!(f, "LEFT"),
            Self::Right => write!(f, "RIGHT"),
            Self::Full => write!(f, "FULL"),
            Self::AntiLeft => write!(f, "ANTI LEFT"),
            Self::AntiRight => write!(f, "ANTI RIGHT"),
            Self::AntiInner => write!(f, "ANTI INNER"),
            Self::Cross => write!(f, "CROSS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinAlgorithm {
    NestedLoop,
    SortMerge,
    HashTable,
}

impl fmt::Display for JoinAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NestedLoop => write!(f, "nested_loop"),
            Self::SortMerge => write!(f, "sort_merge"),
            Self::HashTable => write!(f, "hash_table"),
        }
    }
}

/// What to join on and what to produce.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    method: JoinMethod,
    left_key: Key,
    right_key: Key,
    /// Residual condition checked on pairs with equal keys.
    predicate: Predicate,
    /// Output projection over the (left, right) binding. Defaults to all left
    /// columns followed by all right columns.
    projection: Option<Projection>,
}

impl JoinSpec {
    pub fn try_new(method: JoinMethod, left_key: Key, right_key: Key) -> Result<Self> {
        if left_key.arity() != right_key.arity() {
            return Err(DbError::new("Join keys have different arities")
                .with_field("left", left_key.arity())
                .with_field("right", right_key.arity()));
        }
        Ok(JoinSpec {
            method,
            left_key,
            right_key,
            predicate: Predicate::always_true(),
            projection: None,
        })
    }

    /// Join without keys, e.g. a cross join.
    pub fn keyless(method: JoinMethod) -> Self {
        JoinSpec {
            method,
            left_key: Key::empty(),
            right_key: Key::empty(),
            predicate: Predicate::always_true(),
            projection: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn method(&self) -> JoinMethod {
        self.method
    }

    pub fn left_key(&self) -> &Key {
        &self.left_key
    }

    pub fn right_key(&self) -> &Key {
        &self.right_key
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Projection producing output records.
    pub fn output_projection(&self, left: &Schema, right: &Schema) -> Projection {
        self.projection
            .clone()
            .unwrap_or_else(|| Projection::concat(left.arity(), right.arity()))
    }

    /// Schema of output records.
    ///
    /// Every field is nullable since outer joins pad either side with nulls.
    pub fn output_schema(&self, left: &Schema, right: &Schema) -> Result<Schema> {
        let projection = match &self.projection {
            Some(projection) => projection,
            None => {
                let fields = left.fields().iter().chain(right.fields());
                return Ok(Schema::new(fields.map(|f| {
                    Field::new(f.name.clone(), f.datatype, true)
                })));
            }
        };

        let fields = projection
            .exprs()
            .iter()
            .map(|expr| {
                let name = match expr {
                    ScalarExpression::Column { side: Side::Left, idx } => {
                        left.fields().get(*idx).map(|f| f.name.clone())
                    }
                    ScalarExpression::Column { side: Side::Right, idx } => {
                        right.fields().get(*idx).map(|f| f.name.clone())
                    }
                    _ => None,
                };
                let datatype = expr.datatype(left, right)?;
                Ok(Field::new(name.unwrap_or_else(|| expr.to_string()), datatype, true))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Schema::new(fields))
    }

    fn validate(&self, left: &Schema, right: &Schema) -> Result<()> {
        self.left_key.validate(left.arity())?;
        self.right_key.validate(right.arity())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinOptions {
    /// Run with this algorithm instead of the one picked by `optimize`.
    pub algorithm: Option<JoinAlgorithm>,
    pub nested_loop_ratio: f64,
}

impl Default for JoinOptions {
    fn default() -> Self {
        JoinOptions {
            algorithm: None,
            nested_loop_ratio: DEFAULT_NESTED_LOOP_RATIO,
        }
    }
}

impl JoinOptions {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        JoinOptions {
            algorithm: None,
            nested_loop_ratio: config.nested_loop_ratio,
        }
    }

    pub fn with_algorithm(mut self, algorithm: JoinAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinStats {
    pub algorithm: JoinAlgorithm,
    pub left_rows: usize,
    pub right_rows: usize,
    pub rows_emitted: usize,
}

/// Pick an algorithm for joining the two datasets.
///
/// Sort-merge if both sides are already sorted on their keys, nested loop if
/// one side is tiny relative to the other, hash table otherwise.
pub fn optimize(left: &Dataset, right: &Dataset, spec: &JoinSpec, ratio: f64) -> JoinAlgorithm {
    if spec.method == JoinMethod::Cross || spec.left_key.is_empty() {
        return JoinAlgorithm::NestedLoop;
    }

    if left.is_sorted_by(&spec.left_key) && right.is_sorted_by(&spec.right_key) {
        return JoinAlgorithm::SortMerge;
    }

    let (l, r) = (left.record_count(), right.record_count());
    let larger = l.max(r);
    if larger == 0 {
        return JoinAlgorithm::NestedLoop;
    }
    let smaller = l.min(r);
    if (smaller as f64) / (larger as f64) <= ratio {
        JoinAlgorithm::NestedLoop
    } else {
        JoinAlgorithm::HashTable
    }
}

/// Join two datasets, writing output records to `sink`.
///
/// Sort-merge sorts either input in place if it isn't already sorted by its
/// key.
pub fn execute_join<S>(
    left: &mut Dataset,
    right: &mut Dataset,
    spec: &JoinSpec,
    options: &JoinOptions,
    sink: &mut S,
) -> Result<JoinStats>
where
    S: RecordSink + ?Sized,
{
    spec.validate(left.schema(), right.schema())?;

    let mut algorithm = options
        .algorithm
        .unwrap_or_else(|| optimize(left, right, spec, options.nested_loop_ratio));
    if spec.method == JoinMethod::Cross || spec.left_key.is_empty() {
        algorithm = JoinAlgorithm::NestedLoop;
    }

    debug!(
        method = %spec.method,
        %algorithm,
        left_key = %spec.left_key,
        right_key = %spec.right_key,
        left_rows = left.record_count(),
        right_rows = right.record_count(),
        "executing join"
    );

    let projection = spec.output_projection(left.schema(), right.schema());
    let mut emitter = JoinEmitter::new(&projection, left.schema(), right.schema(), sink);

    match algorithm {
        JoinAlgorithm::NestedLoop => {
            // Keys are folded into the predicate, nested loop only ever
            // evaluates the predicate.
            let predicate = if spec.method == JoinMethod::Cross {
                Predicate::always_true()
            } else {
                spec.predicate
                    .clone()
                    .and(Predicate::key_equality(&spec.left_key, &spec.right_key)?)
            };
            nested_loop::nested_loop_join(left, right, spec.method, &predicate, &mut emitter)?;
        }
        JoinAlgorithm::SortMerge => {
            left.sort(&spec.left_key)?;
            right.sort(&spec.right_key)?;
            sort_merge::sort_merge_join(left, right, spec, &mut emitter)?;
        }
        JoinAlgorithm::HashTable => {
            hash_table::hash_join(left, right, spec, &mut emitter)?;
        }
    }

    let stats = JoinStats {
        algorithm,
        left_rows: left.record_count(),
        right_rows: right.record_count(),
        rows_emitted: emitter.rows_emitted,
    };
    debug!(?stats, "join complete");

    Ok(stats)
}

/// Binds pairs, evaluates the output projection and writes to the sink.
#[derive(Debug)]
pub(crate) struct JoinEmitter<'a, S: ?Sized> {
    projection: &'a Projection,
    binding: RowBinding,
    left_nulls: Record,
    right_nulls: Record,
    sink: &'a mut S,
    rows_emitted: usize,
}

impl<'a, S> JoinEmitter<'a, S>
where
    S: RecordSink + ?Sized,
{
    pub(crate) fn new(
        projection: &'a Projection,
        left: &Schema,
        right: &Schema,
        sink: &'a mut S,
    ) -> Self {
        JoinEmitter {
            projection,
            binding: RowBinding::new(),
            left_nulls: left.null_record(),
            right_nulls: right.null_record(),
            sink,
            rows_emitted: 0,
        }
    }

    /// Bind a pair, returning if it satisfies the predicate.
    pub(crate) fn bind_and_check(
        &mut self,
        left: &Record,
        right: &Record,
        predicate: &Predicate,
    ) -> Result<bool> {
        self.binding.assign_pair(left.clone(), right.clone());
        predicate.evaluate(&self.binding)
    }

    /// Emit the currently bound pair.
    pub(crate) fn emit_bound(&mut self) -> Result<()> {
        let record = self.projection.evaluate(&self.binding)?;
        self.sink.insert(record)?;
        self.rows_emitted += 1;
        Ok(())
    }

    pub(crate) fn emit_left_unmatched(&mut self, left: &Record) -> Result<()> {
        self.binding
            .assign_pair(left.clone(), self.right_nulls.clone());
        self.emit_bound()
    }

    pub(crate) fn emit_right_unmatched(&mut self, right: &Record) -> Result<()> {
        self.binding
            .assign_pair(self.left_nulls.clone(), right.clone());
        self.emit_bound()
    }
}

/// Global row offset of each extent in the dataset.
pub(crate) fn extent_offsets(dataset: &Dataset) -> Result<Vec<usize>> {
    let mut offsets = Vec::with_capacity(dataset.extent_count());
    let mut offset = 0;
    for extent_id in 0..dataset.extent_count() {
        offsets.push(offset);
        offset += dataset.extent_len(extent_id)?;
    }
    Ok(offsets)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnmatchedSide {
    Left,
    Right,
}

/// Emit every row of `dataset` not marked in `tracker`.
///
/// The tracker is indexed by global row offset.
pub(crate) fn emit_unmatched<S>(
    dataset: &Dataset,
    tracker: &MatchTracker,
    side: UnmatchedSide,
    emitter: &mut JoinEmitter<'_, S>,
) -> Result<()>
where
    S: RecordSink + ?Sized,
{
    let mut offset = 0;
    for extent_id in 0..dataset.extent_count() {
        let extent = dataset.pop_at(extent_id)?;
        let rows = offset..(offset + extent.len());
        for idx in tracker.unmatched(rows) {
            let record = &extent.records()[idx];
            match side {
                UnmatchedSide::Left => emitter.emit_left_unmatched(record)?,
                UnmatchedSide::Right => emitter.emit_right_unmatched(record)?,
            }
        }
        offset += extent.len();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::arrays::scalar::{DataType, ScalarValue};
    use crate::arrays::schema::Field;
    use crate::expr::{ComparisonOperator, ScalarExpression};
    use crate::record;
    use crate::testutil::{assert_same_records, dataset, int_schema};

    const ALL_METHODS: [JoinMethod; 8] = [
        JoinMethod::Inner,
        JoinMethod::Left,
        JoinMethod::Right,
        JoinMethod::Full,
        JoinMethod::AntiLeft,
        JoinMethod::AntiRight,
        JoinMethod::AntiInner,
        JoinMethod::Cross,
    ];

    const ALL_ALGORITHMS: [JoinAlgorithm; 3] = [
        JoinAlgorithm::NestedLoop,
        JoinAlgorithm::SortMerge,
        JoinAlgorithm::HashTable,
    ];

    fn kv_schema() -> Schema {
        Schema::new([
            Field::new("k", DataType::Int64, true),
            Field::new("v", DataType::Utf8, true),
        ])
    }

    fn scenario_a() -> (Dataset, Dataset) {
        let left = dataset(
            kv_schema(),
            2,
            [record![1, "a"], record![2, "b"], record![3, "c"]],
        );
        let right = dataset(
            kv_schema(),
            2,
            [record![2, "x"], record![2, "y"], record![4, "z"]],
        );
        (left, right)
    }

    fn run(
        left: &mut Dataset,
        right: &mut Dataset,
        spec: &JoinSpec,
        algorithm: JoinAlgorithm,
    ) -> (JoinStats, Vec<Record>) {
        let mut out = Vec::new();
        let options = JoinOptions::default().with_algorithm(algorithm);
        let stats = execute_join(left, right, spec, &options, &mut out).unwrap();
        assert_eq!(out.len(), stats.rows_emitted);
        (stats, out)
    }

    fn null() -> ScalarValue {
        ScalarValue::Null
    }

    #[test]
    fn mismatched_key_arity_errors() {
        let err = JoinSpec::try_new(JoinMethod::Inner, Key::new([0]), Key::new([0, 1])).unwrap_err();
        assert_eq!("Join keys have different arities", err.get_msg());
    }

    #[test]
    fn key_out_of_bounds_errors() {
        let (mut left, mut right) = scenario_a();
        let spec = JoinSpec::try_new(JoinMethod::Inner, Key::new([5]), Key::new([0])).unwrap();
        let mut out = Vec::new();
        let result = execute_join(&mut left, &mut right, &spec, &JoinOptions::default(), &mut out);
        assert!(result.is_err());
    }

    #[test]
    fn scenario_a_all_algorithms() {
        for algorithm in ALL_ALGORITHMS {
            let (mut left, mut right) = scenario_a();

            let inner = JoinSpec::try_new(JoinMethod::Inner, Key::new([0]), Key::new([0])).unwrap();
            let (stats, out) = run(&mut left, &mut right, &inner, algorithm);
            assert_eq!(algorithm, stats.algorithm);
            assert_same_records(
                vec![record![2, "b", 2, "x"], record![2, "b", 2, "y"]],
                out,
            );

            let left_join = JoinSpec::try_new(JoinMethod::Left, Key::new([0]), Key::new([0])).unwrap();
            let (_, out) = run(&mut left, &mut right, &left_join, algorithm);
            assert_same_records(
                vec![
                    record![2, "b", 2, "x"],
                    record![2, "b", 2, "y"],
                    record![1, "a", null(), null()],
                    record![3, "c", null(), null()],
                ],
                out,
            );
        }
    }

    #[test]
    fn scenario_a_other_methods() {
        let expected = |method: JoinMethod| -> Vec<Record> {
            match method {
                JoinMethod::Right => vec![
                    record![2, "b", 2, "x"],
                    record![2, "b", 2, "y"],
                    record![null(), null(), 4, "z"],
                ],
                JoinMethod::Full => vec![
                    record![2, "b", 2, "x"],
                    record![2, "b", 2, "y"],
                    record![1, "a", null(), null()],
                    record![3, "c", null(), null()],
                    record![null(), null(), 4, "z"],
                ],
                JoinMethod::AntiLeft => vec![
                    record![1, "a", null(), null()],
                    record![3, "c", null(), null()],
                ],
                JoinMethod::AntiRight => vec![record![null(), null(), 4, "z"]],
                JoinMethod::AntiInner => vec![
                    record![1, "a", null(), null()],
                    record![3, "c", null(), null()],
                    record![null(), null(), 4, "z"],
                ],
                _ => unreachable!(),
            }
        };

        for method in [
            JoinMethod::Right,
            JoinMethod::Full,
            JoinMethod::AntiLeft,
            JoinMethod::AntiRight,
            JoinMethod::AntiInner,
        ] {
            for algorithm in ALL_ALGORITHMS {
                let (mut left, mut right) = scenario_a();
                let spec = JoinSpec::try_new(method, Key::new([0]), Key::new([0])).unwrap();
                let (_, out) = run(&mut left, &mut right, &spec, algorithm);
                assert_same_records(expected(method), out);
            }
        }
    }

    #[test]
    fn cross_join_ignores_keys_and_predicate() {
        for algorithm in ALL_ALGORITHMS {
            let (mut left, mut right) = scenario_a();
            let spec = JoinSpec::try_new(JoinMethod::Cross, Key::new([0]), Key::new([0]))
                .unwrap()
                .with_predicate(Predicate::new(ScalarExpression::lit(false)));
            let (stats, out) = run(&mut left, &mut right, &spec, algorithm);
            assert_eq!(JoinAlgorithm::NestedLoop, stats.algorithm);
            assert_eq!(9, out.len());
        }
    }

    #[test]
    fn null_keys_never_match() {
        for algorithm in ALL_ALGORITHMS {
            let mut left = dataset(
                kv_schema(),
                4,
                [record![None::<i64>, "a"], record![1, "b"]],
            );
            let mut right = dataset(
                kv_schema(),
                4,
                [record![None::<i64>, "x"], record![1, "y"]],
            );
            let spec = JoinSpec::try_new(JoinMethod::Full, Key::new([0]), Key::new([0])).unwrap();
            let (_, out) = run(&mut left, &mut right, &spec, algorithm);
            assert_same_records(
                vec![
                    record![1, "b", 1, "y"],
                    record![null(), "a", null(), null()],
                    record![null(), null(), null(), "x"],
                ],
                out,
            );
        }
    }

    #[test]
    fn residual_predicate_and_projection() {
        for algorithm in ALL_ALGORITHMS {
            let (mut left, mut right) = scenario_a();
            // Only pairs where the right value is 'y'.
            let predicate = Predicate::new(ScalarExpression::equals(
                ScalarExpression::right_column(1),
                ScalarExpression::lit("y"),
            ));
            let projection = Projection::new([
                ScalarExpression::column(1),
                ScalarExpression::right_column(1),
            ]);
            let spec = JoinSpec::try_new(JoinMethod::Left, Key::new([0]), Key::new([0]))
                .unwrap()
                .with_predicate(predicate)
                .with_projection(projection);

            let (_, out) = run(&mut left, &mut right, &spec, algorithm);
            assert_same_records(
                vec![
                    record!["b", "y"],
                    record!["a", null()],
                    record!["c", null()],
                ],
                out,
            );
        }
    }

    #[test]
    fn optimize_selection() {
        let (mut left, mut right) = scenario_a();
        let spec = JoinSpec::try_new(JoinMethod::Inner, Key::new([0]), Key::new([0])).unwrap();
        assert_eq!(JoinAlgorithm::HashTable, optimize(&left, &right, &spec, 0.05));
        // Ratio of 1 always prefers nested loop.
        assert_eq!(JoinAlgorithm::NestedLoop, optimize(&left, &right, &spec, 1.0));

        left.sort(&Key::new([0])).unwrap();
        assert_eq!(JoinAlgorithm::HashTable, optimize(&left, &right, &spec, 0.05));
        right.sort(&Key::new([0])).unwrap();
        assert_eq!(JoinAlgorithm::SortMerge, optimize(&left, &right, &spec, 0.05));

        let small = dataset(kv_schema(), 4, [record![1, "a"]]);
        let large = dataset(kv_schema(), 8, (0..40).map(|i| record![i, "v"]));
        assert_eq!(JoinAlgorithm::NestedLoop, optimize(&small, &large, &spec, 0.05));

        let cross = JoinSpec::keyless(JoinMethod::Cross);
        assert_eq!(JoinAlgorithm::NestedLoop, optimize(&left, &right, &cross, 0.05));
    }

    #[test]
    fn sort_merge_sorts_inputs() {
        let (mut left, mut right) = scenario_a();
        left.reverse().unwrap();
        right.reverse().unwrap();
        let spec = JoinSpec::try_new(JoinMethod::Inner, Key::new([0]), Key::new([0])).unwrap();
        run(&mut left, &mut right, &spec, JoinAlgorithm::SortMerge);
        assert!(left.is_sorted_by(&Key::new([0])));
        assert!(right.is_sorted_by(&Key::new([0])));
    }

    fn random_side(rng: &mut ChaCha8Rng, max_rows: usize, max_key: i64) -> Dataset {
        let rows = rng.random_range(0..max_rows);
        let records: Vec<_> = (0..rows)
            .map(|idx| {
                let key = if rng.random_range(0..10) == 0 {
                    ScalarValue::Null
                } else {
                    ScalarValue::Int64(rng.random_range(0..max_key))
                };
                let other = ScalarValue::Int64(rng.random_range(0..4));
                Record::new([key, other, ScalarValue::Int64(idx as i64)])
            })
            .collect();
        let per_extent = rng.random_range(1..8);
        dataset(int_schema(3), per_extent, records)
    }

    #[test]
    fn algorithms_agree_random() {
        let mut rng = ChaCha8Rng::seed_from_u64(1234);

        for _ in 0..30 {
            let left = random_side(&mut rng, 30, 8);
            let right = random_side(&mut rng, 30, 8);
            let left_records = left.collect_records().unwrap();
            let right_records = right.collect_records().unwrap();

            // Join on the first column with a residual on the second.
            let predicate = Predicate::new(ScalarExpression::compare(
                ComparisonOperator::LtEq,
                ScalarExpression::column(1),
                ScalarExpression::right_column(1),
            ));

            for method in ALL_METHODS {
                let spec = JoinSpec::try_new(method, Key::new([0]), Key::new([0]))
                    .unwrap()
                    .with_predicate(predicate.clone());

                let outputs: Vec<_> = ALL_ALGORITHMS
                    .iter()
                    .map(|&algorithm| {
                        let mut l = dataset(int_schema(3), 5, left_records.clone());
                        let mut r = dataset(int_schema(3), 3, right_records.clone());
                        run(&mut l, &mut r, &spec, algorithm).1
                    })
                    .collect();

                for out in &outputs[1..] {
                    assert_same_records(outputs[0].clone(), out.clone());
                }
            }
        }
    }

    #[test]
    fn left_join_complete_and_inner_anti_partition_left() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);

        for _ in 0..20 {
            // Right side has unique keys, so each left row matches at most once.
            let right_keys: Vec<i64> = (0..20).filter(|_| rng.random_bool(0.5)).collect();
            let right_records: Vec<_> = right_keys.iter().map(|&k| record![k, k * 10, 0]).collect();
            let left = random_side(&mut rng, 40, 20);
            let left_records = left.collect_records().unwrap();

            for algorithm in ALL_ALGORITHMS {
                let count = |method: JoinMethod| {
                    let mut l = dataset(int_schema(3), 4, left_records.clone());
                    let mut r = dataset(int_schema(3), 4, right_records.clone());
                    let spec = JoinSpec::try_new(method, Key::new([0]), Key::new([0])).unwrap();
                    run(&mut l, &mut r, &spec, algorithm).1
                };

                let left_out = count(JoinMethod::Left);
                // Every left row appears in the output.
                let mut seen: Vec<_> = left_out
                    .iter()
                    .map(|r| Record::new(r.values()[0..3].iter().cloned()))
                    .collect();
                seen.sort();
                let mut expected = left_records.clone();
                expected.sort();
                assert_eq!(expected, seen);

                let inner = count(JoinMethod::Inner).len();
                let anti = count(JoinMethod::AntiLeft).len();
                assert_eq!(left_records.len(), inner + anti);
            }
        }
    }

    #[test]
    fn empty_inputs() {
        for algorithm in ALL_ALGORITHMS {
            let mut left = dataset(kv_schema(), 4, Vec::new());
            let mut right = dataset(kv_schema(), 4, [record![1, "x"]]);
            let spec = JoinSpec::try_new(JoinMethod::Full, Key::new([0]), Key::new([0])).unwrap();
            let (_, out) = run(&mut left, &mut right, &spec, algorithm);
            assert_same_records(vec![record![null(), null(), 1, "x"]], out);
        }
    }
}
