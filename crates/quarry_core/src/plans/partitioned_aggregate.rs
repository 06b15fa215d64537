use std::sync::Arc;
use std::time::Instant;

use quarry_error::Result;
use tracing::{debug, info};

use super::PlanStats;
use super::aggregate::render;
use crate::config::execution::ExecutionConfig;
use crate::execution::aggregate::structure::AggregateStructure;
use crate::execution::aggregate::table::GroupingDefinition;
use crate::execution::job::{Job, MapFactory, MapNode, Reducer};
use crate::expr::predicate::Predicate;
use crate::expr::projection::Projection;
use crate::expr::register::RowBinding;
use crate::runtime::scheduler::Scheduler;
use crate::storage::dataset::Dataset;
use crate::storage::extent::Extent;
use crate::storage::temp::TempFileNamer;
use crate::storage::writer::RecordSink;

/// Group a dataset by aggregating each partition concurrently, then merging
/// the per-partition structures.
#[derive(Debug, Clone)]
pub struct PartitionedAggregatePlan {
    definition: Arc<GroupingDefinition>,
    filter: Option<Predicate>,
    projection: Option<Projection>,
}

impl PartitionedAggregatePlan {
    pub fn new(definition: GroupingDefinition) -> Self {
        PartitionedAggregatePlan {
            definition: Arc::new(definition),
            filter: None,
            projection: None,
        }
    }

    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Run the plan with `config.partitions` partitions on the scheduler.
    pub fn execute<S>(
        &self,
        input: &Dataset,
        config: &ExecutionConfig,
        scheduler: &Scheduler,
        sink: &mut S,
    ) -> Result<PlanStats>
    where
        S: RecordSink + ?Sized,
    {
        let start = Instant::now();
        self.definition.validate(input.schema())?;

        let factory = AggregateNodeFactory {
            definition: &self.definition,
            filter: self.filter.as_ref(),
            max_groups_in_memory: config.max_groups_in_memory,
            namer: config.temp_file_namer(),
        };

        let mut job = Job::try_new(input, config.partitions, &factory)?;
        let partitions = job.num_partitions();
        let strategy = job.strategy();
        job.run_concurrent(scheduler)?;

        let mut reducer = AggregateReducer::default();
        job.reduce(&mut reducer)?;

        let rows_read = reducer.rows_read;
        let mut structure = match reducer.total {
            Some(structure) => structure,
            None => factory.new_structure()?,
        };
        structure.close()?;
        let rows_written = render(&mut structure, self.projection.as_ref(), sink)?;

        let stats = PlanStats {
            rows_read,
            rows_written,
            elapsed: start.elapsed(),
        };
        info!(
            partitions,
            strategy = ?strategy,
            rows_read,
            rows_written,
            spills = structure.spill_count(),
            elapsed = ?stats.elapsed,
            "partitioned aggregate plan finished"
        );

        Ok(stats)
    }
}

#[derive(Debug)]
struct AggregateNodeFactory<'a> {
    definition: &'a Arc<GroupingDefinition>,
    filter: Option<&'a Predicate>,
    max_groups_in_memory: usize,
    namer: TempFileNamer,
}

impl AggregateNodeFactory<'_> {
    fn new_structure(&self) -> Result<AggregateStructure> {
        AggregateStructure::try_new(
            self.definition.clone(),
            self.max_groups_in_memory,
            self.namer.clone(),
        )
    }
}

impl MapFactory for AggregateNodeFactory<'_> {
    type Node = AggregateNode;

    fn create_node(&self, partition_id: usize) -> Result<Self::Node> {
        Ok(AggregateNode {
            partition_id,
            filter: self.filter.cloned(),
            binding: RowBinding::new(),
            structure: self.new_structure()?,
            rows_read: 0,
        })
    }
}

/// Aggregates the extents of a single partition.
#[derive(Debug)]
struct AggregateNode {
    partition_id: usize,
    filter: Option<Predicate>,
    binding: RowBinding,
    structure: AggregateStructure,
    rows_read: usize,
}

impl MapNode for AggregateNode {
    fn execute(&mut self, extent: &Extent) -> Result<()> {
        for record in extent.records() {
            if let Some(filter) = &self.filter {
                self.binding.assign_left(record.clone());
                if !filter.evaluate(&self.binding)? {
                    continue;
                }
            }
            self.structure.insert(record)?;
            self.rows_read += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.structure.close()?;
        debug!(
            partition = self.partition_id,
            rows_read = self.rows_read,
            groups_in_memory = self.structure.groups_in_memory(),
            headers = self.structure.headers().len(),
            "aggregate node closed"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AggregateReducer {
    total: Option<AggregateStructure>,
    rows_read: usize,
}

impl Reducer<AggregateNode> for AggregateReducer {
    fn consume(&mut self, node: AggregateNode) -> Result<()> {
        self.rows_read += node.rows_read;
        match &mut self.total {
            Some(total) => total.merge(node.structure),
            None => {
                self.total = Some(node.structure);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::arrays::key::Key;
    use crate::arrays::record::Record;
    use crate::arrays::scalar::{DataType, ScalarValue};
    use crate::arrays::schema::{Field, Schema};
    use crate::execution::aggregate::function::{AggregateExpr, AggregateFunction};
    use crate::expr::{ComparisonOperator, ScalarExpression};
    use crate::plans::aggregate::AggregatePlan;
    use crate::record;
    use crate::testutil::{assert_same_records, dataset, disk_dataset, int_schema};

    fn definition() -> GroupingDefinition {
        GroupingDefinition::new(
            Key::new([0]),
            [
                AggregateExpr::count_star(),
                AggregateExpr::on_column(AggregateFunction::Count, 2).unwrap(),
                AggregateExpr::on_column(AggregateFunction::Sum, 1).unwrap(),
                AggregateExpr::on_column(AggregateFunction::Avg, 1).unwrap(),
                AggregateExpr::on_column(AggregateFunction::Min, 2).unwrap(),
                AggregateExpr::on_column(AggregateFunction::Max, 2).unwrap(),
            ],
        )
    }

    fn random_input(rng: &mut ChaCha8Rng, rows: usize, per_extent: usize) -> Dataset {
        let records: Vec<Record> = (0..rows)
            .map(|_| {
                let nullable = if rng.random_bool(0.2) {
                    ScalarValue::Null
                } else {
                    ScalarValue::Int64(rng.random_range(-100..100))
                };
                Record::new([
                    ScalarValue::Int64(rng.random_range(0..25)),
                    ScalarValue::Int64(rng.random_range(0..1000)),
                    nullable,
                ])
            })
            .collect();
        dataset(int_schema(3), per_extent, records)
    }

    #[test]
    fn matches_serial_plan() {
        logutil::init_test();
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::try_new(4).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let filter = Predicate::new(ScalarExpression::compare(
            ComparisonOperator::Lt,
            ScalarExpression::column(1),
            ScalarExpression::lit(800),
        ));

        // One extent (sliced by rows) and many extents.
        for (rows, per_extent) in [(300, 1000), (500, 7)] {
            let input = random_input(&mut rng, rows, per_extent);

            for max_groups_in_memory in [4, 1024] {
                let base = ExecutionConfig {
                    max_groups_in_memory,
                    spill_directory: Some(dir.path().to_path_buf()),
                    ..Default::default()
                };

                let mut expected = Vec::new();
                let serial = AggregatePlan::new(definition())
                    .with_filter(filter.clone())
                    .execute(&input, &base, &mut expected)
                    .unwrap();

                for partitions in [1, 2, 4, 8] {
                    let config = ExecutionConfig {
                        partitions,
                        ..base.clone()
                    };
                    let mut got = Vec::new();
                    let stats = PartitionedAggregatePlan::new(definition())
                        .with_filter(filter.clone())
                        .execute(&input, &config, &scheduler, &mut got)
                        .unwrap();

                    assert_eq!(serial.rows_read, stats.rows_read);
                    assert_eq!(serial.rows_written, stats.rows_written);
                    assert_same_records(expected.clone(), got);
                }
            }
        }

        assert_eq!(0, std::fs::read_dir(dir.path()).unwrap().count());
    }

    #[test]
    fn scenario_b() {
        logutil::init_test();
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::try_new(2).unwrap();
        let input = dataset(
            int_schema(2),
            1,
            [record![1, 10], record![1, 20], record![2, 5]],
        );
        let definition = GroupingDefinition::new(
            Key::new([0]),
            [
                AggregateExpr::on_column(AggregateFunction::Sum, 1).unwrap(),
                AggregateExpr::count_star(),
            ],
        );
        let config = ExecutionConfig {
            partitions: 3,
            max_groups_in_memory: 1,
            spill_directory: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let mut out = Vec::new();
        PartitionedAggregatePlan::new(definition)
            .execute(&input, &config, &scheduler, &mut out)
            .unwrap();
        assert_same_records(vec![record![1, 30, 2], record![2, 5, 1]], out);
    }

    #[test]
    fn sum_overflow_independent_of_partitions() {
        logutil::init_test();
        let dir = tempfile::tempdir().unwrap();
        // One row per extent. The second partition sums past i64::MAX on its
        // own before merging with the first.
        let input = dataset(
            int_schema(2),
            1,
            [record![1, -1], record![1, -1], record![1, i64::MAX], record![1, 1]],
        );
        let definition = || {
            GroupingDefinition::new(
                Key::new([0]),
                [
                    AggregateExpr::on_column(AggregateFunction::Sum, 1).unwrap(),
                    AggregateExpr::count_star(),
                ],
            )
        };
        let expected = vec![record![1, i64::MAX - 1, 4]];

        for max_groups_in_memory in [1, 1024] {
            let base = ExecutionConfig {
                num_threads: 2,
                max_groups_in_memory,
                spill_directory: Some(dir.path().to_path_buf()),
                ..Default::default()
            };
            let scheduler = Scheduler::from_config(&base).unwrap();

            let mut serial = Vec::new();
            AggregatePlan::new(definition())
                .execute(&input, &base, &mut serial)
                .unwrap();
            assert_eq!(expected, serial);

            for partitions in [2, 4] {
                let config = ExecutionConfig {
                    partitions,
                    ..base.clone()
                };
                let mut got = Vec::new();
                PartitionedAggregatePlan::new(definition())
                    .execute(&input, &config, &scheduler, &mut got)
                    .unwrap();
                assert_eq!(expected, got);
            }
        }
    }

    #[test]
    fn disk_input_with_floats_and_large_ints() {
        logutil::init_test();
        let input_dir = tempfile::tempdir().unwrap();
        let spill_dir = tempfile::tempdir().unwrap();
        let schema = Schema::new([
            Field::new("k", DataType::Int64, true),
            Field::new("v", DataType::Float64, true),
            Field::new("n", DataType::Int64, true),
        ]);
        let input = disk_dataset(
            input_dir.path(),
            schema,
            2,
            [
                record![1, 1.5, i64::MAX],
                record![2, f64::INFINITY, i64::MIN],
                record![1, 2.5, i64::MAX],
                record![2, -0.5, -1],
                record![3, f64::NAN, 5],
                record![1, 4.0, i64::MIN],
            ],
        );
        let definition = || {
            GroupingDefinition::new(
                Key::new([0]),
                [
                    AggregateExpr::on_column(AggregateFunction::Sum, 1).unwrap(),
                    AggregateExpr::on_column(AggregateFunction::Max, 1).unwrap(),
                    AggregateExpr::on_column(AggregateFunction::Sum, 2).unwrap(),
                    AggregateExpr::count_star(),
                ],
            )
        };
        let expected = vec![
            record![1, 8.0, 4.0, i64::MAX - 1, 3],
            // Below i64::MIN, rendered as a float.
            record![2, f64::INFINITY, f64::INFINITY, i64::MIN as f64, 2],
            record![3, f64::NAN, f64::NAN, 5, 1],
        ];

        for max_groups_in_memory in [1, 1024] {
            let base = ExecutionConfig {
                num_threads: 2,
                max_groups_in_memory,
                spill_directory: Some(spill_dir.path().to_path_buf()),
                ..Default::default()
            };
            let scheduler = Scheduler::from_config(&base).unwrap();

            let mut serial = Vec::new();
            AggregatePlan::new(definition())
                .execute(&input, &base, &mut serial)
                .unwrap();
            assert_same_records(expected.clone(), serial);

            for partitions in [1, 3] {
                let config = ExecutionConfig {
                    partitions,
                    ..base.clone()
                };
                let mut got = Vec::new();
                PartitionedAggregatePlan::new(definition())
                    .execute(&input, &config, &scheduler, &mut got)
                    .unwrap();
                assert_same_records(expected.clone(), got);
            }
        }

        assert_eq!(0, std::fs::read_dir(spill_dir.path()).unwrap().count());
    }

    #[test]
    fn empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::try_new(2).unwrap();
        let input = dataset(int_schema(3), 4, Vec::new());
        let config = ExecutionConfig {
            partitions: 4,
            spill_directory: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let mut out = Vec::new();
        let stats = PartitionedAggregatePlan::new(definition())
            .execute(&input, &config, &scheduler, &mut out)
            .unwrap();
        assert_eq!(PlanStats { elapsed: stats.elapsed, ..Default::default() }, stats);
        assert!(out.is_empty());
    }
}
