use std::time::Instant;

use quarry_error::Result;
use tracing::info;

use super::PlanStats;
use crate::config::execution::ExecutionConfig;
use crate::execution::join::{JoinAlgorithm, JoinOptions, JoinSpec, execute_join};
use crate::storage::dataset::Dataset;
use crate::storage::writer::RecordSink;

/// Join two datasets.
#[derive(Debug, Clone)]
pub struct MergePlan {
    spec: JoinSpec,
    options: JoinOptions,
    /// Used for datasets created by the plan.
    config: ExecutionConfig,
}

impl MergePlan {
    pub fn new(spec: JoinSpec, config: &ExecutionConfig) -> Self {
        MergePlan {
            spec,
            options: JoinOptions::from_config(config),
            config: config.clone(),
        }
    }

    /// Always join with `algorithm`.
    pub fn with_algorithm(mut self, algorithm: JoinAlgorithm) -> Self {
        self.options = self.options.with_algorithm(algorithm);
        self
    }

    pub fn spec(&self) -> &JoinSpec {
        &self.spec
    }

    /// Run the join, writing output records to `sink`.
    ///
    /// Inputs may be sorted in place if sort-merge is used.
    pub fn execute<S>(&self, left: &mut Dataset, right: &mut Dataset, sink: &mut S) -> Result<PlanStats>
    where
        S: RecordSink + ?Sized,
    {
        let start = Instant::now();
        let join = execute_join(left, right, &self.spec, &self.options, sink)?;

        let stats = PlanStats {
            rows_read: join.left_rows + join.right_rows,
            rows_written: join.rows_emitted,
            elapsed: start.elapsed(),
        };
        info!(
            method = %self.spec.method(),
            algorithm = %join.algorithm,
            left_rows = join.left_rows,
            right_rows = join.right_rows,
            rows_written = stats.rows_written,
            elapsed = ?stats.elapsed,
            "merge plan finished"
        );

        Ok(stats)
    }

    /// Run the join into a new in-memory dataset.
    pub fn execute_to_dataset(
        &self,
        left: &mut Dataset,
        right: &mut Dataset,
    ) -> Result<(Dataset, PlanStats)> {
        let schema = self.spec.output_schema(left.schema(), right.schema())?;
        let mut output = self.config.new_dataset(schema)?;
        let stats = self.execute_into(left, right, &mut output)?;
        Ok((output, stats))
    }

    /// Run the join, appending output records to `output`.
    pub fn execute_into(
        &self,
        left: &mut Dataset,
        right: &mut Dataset,
        output: &mut Dataset,
    ) -> Result<PlanStats> {
        let mut writer = output.writer();
        let stats = self.execute(left, right, &mut writer)?;
        writer.close()?;
        Ok(stats)
    }
}
