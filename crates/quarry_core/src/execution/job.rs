use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use quarry_error::{DbError, Result};
use tracing::{debug, trace};

use super::partition::{Partition, PartitionStrategy, Partitioner};
use crate::runtime::scheduler::Scheduler;
use crate::storage::dataset::Dataset;
use crate::storage::extent::Extent;

/// One worker's private state.
///
/// Nodes own everything they evaluate with, nothing is shared with other
/// nodes.
pub trait MapNode: Send {
    /// Process one extent of the node's partition.
    fn execute(&mut self, extent: &Extent) -> Result<()>;

    /// Called once after the partition is exhausted.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Builds a fresh node for each partition.
pub trait MapFactory {
    type Node: MapNode;

    fn create_node(&self, partition_id: usize) -> Result<Self::Node>;
}

/// Folds finished nodes into a final result.
pub trait Reducer<N> {
    fn consume(&mut self, node: N) -> Result<()>;

    /// Consume nodes in the order given.
    fn consume_all<I>(&mut self, nodes: I) -> Result<()>
    where
        I: IntoIterator<Item = N>,
    {
        for node in nodes {
            self.consume(node)?;
        }
        Ok(())
    }
}

/// A node paired with the partition it reads from.
#[derive(Debug)]
pub struct MapWorker<'a, N> {
    node: N,
    partition: Partition<'a>,
    closed: bool,
    extents_processed: usize,
}

impl<'a, N> MapWorker<'a, N>
where
    N: MapNode,
{
    pub fn id(&self) -> usize {
        self.partition.id()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    /// Drive the node over every extent in the partition.
    fn run(&mut self) -> Result<()> {
        while let Some(extent) = self.partition.request_next()? {
            self.node.execute(&extent)?;
            self.extents_processed += 1;
        }
        trace!(
            partition = self.id(),
            extents = self.extents_processed,
            "map worker exhausted partition"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.node.close()?;
            self.closed = true;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Created,
    Completed,
}

/// Map/reduce over the partitions of a dataset.
#[derive(Debug)]
pub struct Job<'a, N> {
    strategy: PartitionStrategy,
    workers: Vec<MapWorker<'a, N>>,
    state: JobState,
}

impl<'a, N> Job<'a, N>
where
    N: MapNode,
{
    /// Partition the dataset and create one node per partition.
    pub fn try_new<F>(dataset: &'a Dataset, partitions: usize, factory: &F) -> Result<Self>
    where
        F: MapFactory<Node = N>,
    {
        let partitioner = Partitioner::try_new(dataset, partitions)?;
        let strategy = partitioner.strategy();

        let workers = partitioner
            .into_partitions()
            .into_iter()
            .map(|partition| {
                let node = factory.create_node(partition.id())?;
                Ok(MapWorker {
                    node,
                    partition,
                    closed: false,
                    extents_processed: 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Job {
            strategy,
            workers,
            state: JobState::Created,
        })
    }

    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    pub fn num_partitions(&self) -> usize {
        self.workers.len()
    }

    pub fn workers(&self) -> &[MapWorker<'a, N>] {
        &self.workers
    }

    /// Run every worker on the scheduler's pool and wait for all of them.
    ///
    /// If any worker fails, the error from the lowest partition id is
    /// returned and the job can't be reduced.
    pub fn run_concurrent(&mut self, scheduler: &Scheduler) -> Result<()> {
        self.check_state(JobState::Created)?;
        debug!(partitions = self.workers.len(), "running job concurrently");

        let errors: Mutex<Vec<(usize, DbError)>> = Mutex::new(Vec::new());

        scheduler.pool().scope(|s| {
            for worker in self.workers.iter_mut() {
                let errors = &errors;
                s.spawn(move |_| {
                    let id = worker.id();
                    let result = panic::catch_unwind(AssertUnwindSafe(|| worker.run()))
                        .unwrap_or_else(|_| {
                            Err(DbError::new("Map worker panicked").with_field("partition", id))
                        });
                    if let Err(e) = result {
                        errors.lock().push((id, e));
                    }
                });
            }
        });

        let mut errors = errors.into_inner();
        if !errors.is_empty() {
            errors.sort_by_key(|(id, _)| *id);
            let (id, err) = errors.swap_remove(0);
            debug!(partition = id, failed = errors.len() + 1, "job failed");
            return Err(err);
        }

        self.close_all()
    }

    /// Run every worker on the calling thread, in partition order.
    pub fn run_sequential(&mut self) -> Result<()> {
        self.check_state(JobState::Created)?;
        debug!(partitions = self.workers.len(), "running job sequentially");

        for worker in &mut self.workers {
            worker.run()?;
        }

        self.close_all()
    }

    /// Hand the nodes to the reducer in partition id order.
    pub fn reduce<R>(self, reducer: &mut R) -> Result<()>
    where
        R: Reducer<N>,
    {
        self.check_state(JobState::Completed)?;
        reducer.consume_all(self.workers.into_iter().map(|w| w.node))
    }

    fn close_all(&mut self) -> Result<()> {
        for worker in &mut self.workers {
            worker.close()?;
        }
        self.state = JobState::Completed;
        Ok(())
    }

    fn check_state(&self, expected: JobState) -> Result<()> {
        if self.state != expected {
            return Err(DbError::new("Job in unexpected state")
                .with_field("expected", format!("{expected:?}"))
                .with_field("state", format!("{:?}", self.state)));
        }
        Ok(())
    }
}
