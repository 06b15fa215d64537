use std::sync::Arc;
use std::time::Instant;

use quarry_error::Result;
use tracing::info;

use super::PlanStats;
use crate::config::execution::ExecutionConfig;
use crate::execution::aggregate::structure::AggregateStructure;
use crate::execution::aggregate::table::GroupingDefinition;
use crate::expr::predicate::Predicate;
use crate::expr::projection::Projection;
use crate::storage::dataset::Dataset;
use crate::storage::writer::RecordSink;

/// Group a dataset on the calling thread.
#[derive(Debug, Clone)]
pub struct AggregatePlan {
    definition: Arc<GroupingDefinition>,
    filter: Option<Predicate>,
    projection: Option<Projection>,
}

impl AggregatePlan {
    pub fn new(definition: GroupingDefinition) -> Self {
        AggregatePlan {
            definition: Arc::new(definition),
            filter: None,
            projection: None,
        }
    }

    /// Only aggregate rows matching the predicate.
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Projection applied to each rendered group. Defaults to the group keys
    /// followed by the aggregate values.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn definition(&self) -> &Arc<GroupingDefinition> {
        &self.definition
    }

    pub fn execute<S>(
        &self,
        input: &Dataset,
        config: &ExecutionConfig,
        sink: &mut S,
    ) -> Result<PlanStats>
    where
        S: RecordSink + ?Sized,
    {
        let start = Instant::now();
        self.definition.validate(input.schema())?;

        let mut structure = AggregateStructure::try_new(
            self.definition.clone(),
            config.max_groups_in_memory,
            config.temp_file_namer(),
        )?;

        let mut reader = input.open_reader(self.filter.clone())?;
        let mut rows_read = 0;
        while let Some(record) = reader.read_next()? {
            structure.insert(&record)?;
            rows_read += 1;
        }

        structure.close()?;
        let rows_written = render(&mut structure, self.projection.as_ref(), sink)?;

        let stats = PlanStats {
            rows_read,
            rows_written,
            elapsed: start.elapsed(),
        };
        info!(
            rows_read,
            rows_written,
            spills = structure.spill_count(),
            elapsed = ?stats.elapsed,
            "aggregate plan finished"
        );

        Ok(stats)
    }
}

/// Consolidate and render a closed structure.
pub(crate) fn render<S>(
    structure: &mut AggregateStructure,
    projection: Option<&Projection>,
    sink: &mut S,
) -> Result<usize>
where
    S: RecordSink + ?Sized,
{
    structure.consolidate()?;
    match projection {
        Some(projection) => structure.render(projection, sink),
        None => {
            let projection = Projection::identity(structure.definition().output_arity());
            structure.render(&projection, sink)
        }
    }
}
