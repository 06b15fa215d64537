use std::ops::Range;
use std::sync::Arc;

use quarry_error::{DbError, Result};
use tracing::debug;

use crate::storage::dataset::Dataset;
use crate::storage::extent::Extent;

/// How a dataset was split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// Single extent sliced by record counts.
    Small,
    /// Contiguous ranges of whole extents.
    Large,
}

/// Split `total` items into `n` contiguous ranges.
///
/// Each range gets `total / n` items, the first `total % n` ranges get one
/// extra.
pub fn split_ranges(total: usize, n: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let base = total / n;
    let remainder = total % n;

    let mut start = 0;
    (0..n)
        .map(|idx| {
            let len = base + usize::from(idx < remainder);
            let range = start..(start + len);
            start += len;
            range
        })
        .collect()
}

/// Splits a dataset into disjoint partitions.
///
/// Partitions can be requested by id from the partitioner directly, or moved
/// out with `into_partitions` so each worker exclusively owns its cursor.
#[derive(Debug)]
pub struct Partitioner<'a> {
    strategy: PartitionStrategy,
    partitions: Vec<Partition<'a>>,
}

impl<'a> Partitioner<'a> {
    /// Create a partitioner for the dataset.
    ///
    /// Single extent datasets are split by records into `requested`
    /// partitions. Otherwise the partition count is capped at the extent count
    /// since an extent is never split across partitions.
    pub fn try_new(dataset: &'a Dataset, requested: usize) -> Result<Self> {
        if requested == 0 {
            return Err(DbError::new("Requested partition count must be greater than zero"));
        }

        let extent_count = dataset.extent_count();
        let partitioner = if extent_count == 1 {
            Self::small(dataset, requested)?
        } else {
            Self::large(dataset, requested.min(extent_count).max(1))?
        };

        debug!(
            strategy = ?partitioner.strategy,
            requested,
            partitions = partitioner.partitions.len(),
            extent_count,
            "created partitioner"
        );

        Ok(partitioner)
    }

    fn small(dataset: &'a Dataset, n: usize) -> Result<Self> {
        let extent = dataset.pop_at(0)?;
        let partitions = split_ranges(extent.len(), n)
            .into_iter()
            .enumerate()
            .map(|(id, range)| {
                let sub = extent.slice(range)?;
                Ok(Partition {
                    id,
                    elements: sub.len(),
                    source: PartitionSource::Small {
                        extent: Some(Arc::new(sub)),
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Partitioner {
            strategy: PartitionStrategy::Small,
            partitions,
        })
    }

    fn large(dataset: &'a Dataset, n: usize) -> Result<Self> {
        let partitions = split_ranges(dataset.extent_count(), n)
            .into_iter()
            .enumerate()
            .map(|(id, extents)| {
                let elements = extents
                    .clone()
                    .map(|extent_id| dataset.extent_len(extent_id))
                    .sum::<Result<usize>>()?;
                Ok(Partition {
                    id,
                    elements,
                    source: PartitionSource::Large {
                        dataset,
                        cursor: extents.start,
                        extents,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Partitioner {
            strategy: PartitionStrategy::Large,
            partitions,
        })
    }

    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Number of records assigned to a partition.
    pub fn elements(&self, partition: usize) -> Result<usize> {
        Ok(self.get(partition)?.elements())
    }

    pub fn can_request(&self, partition: usize) -> Result<bool> {
        Ok(self.get(partition)?.can_request())
    }

    pub fn request(&mut self, partition: usize) -> Result<Option<Arc<Extent>>> {
        self.get_mut(partition)?.request()
    }

    pub fn request_next(&mut self, partition: usize) -> Result<Option<Arc<Extent>>> {
        self.get_mut(partition)?.request_next()
    }

    /// Hand out the partitions, ordered by id.
    pub fn into_partitions(self) -> Vec<Partition<'a>> {
        self.partitions
    }

    fn get(&self, partition: usize) -> Result<&Partition<'a>> {
        self.partitions
            .get(partition)
            .ok_or_else(|| missing_partition(partition, self.partitions.len()))
    }

    fn get_mut(&mut self, partition: usize) -> Result<&mut Partition<'a>> {
        let count = self.partitions.len();
        self.partitions
            .get_mut(partition)
            .ok_or_else(|| missing_partition(partition, count))
    }
}

fn missing_partition(partition: usize, count: usize) -> DbError {
    DbError::new("Missing partition")
        .with_field("partition", partition)
        .with_field("partition_count", count)
}

/// A disjoint assignment of records to one worker.
#[derive(Debug)]
pub struct Partition<'a> {
    id: usize,
    elements: usize,
    source: PartitionSource<'a>,
}

#[derive(Debug)]
enum PartitionSource<'a> {
    /// Pre-sliced records, handed out exactly once.
    Small { extent: Option<Arc<Extent>> },
    /// Range of extents, swapped in one at a time.
    Large {
        dataset: &'a Dataset,
        extents: Range<usize>,
        cursor: usize,
    },
}

impl Partition<'_> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn elements(&self) -> usize {
        self.elements
    }

    /// If there's another extent to request.
    pub fn can_request(&self) -> bool {
        match &self.source {
            PartitionSource::Small { extent } => extent.is_some(),
            PartitionSource::Large {
                extents, cursor, ..
            } => *cursor < extents.end,
        }
    }

    /// Request the first extent of the partition, resetting the cursor.
    ///
    /// Small partitions only hand out their records once, requesting again
    /// returns None.
    pub fn request(&mut self) -> Result<Option<Arc<Extent>>> {
        if let PartitionSource::Large {
            extents, cursor, ..
        } = &mut self.source
        {
            *cursor = extents.start;
        }
        self.request_next()
    }

    /// Request the next extent, returning None once the partition is
    /// exhausted.
    pub fn request_next(&mut self) -> Result<Option<Arc<Extent>>> {
        match &mut self.source {
            PartitionSource::Small { extent } => Ok(extent.take()),
            PartitionSource::Large {
                dataset,
                extents,
                cursor,
            } => {
                if *cursor >= extents.end {
                    return Ok(None);
                }
                let extent = dataset.pop_at(*cursor)?;
                *cursor += 1;
                Ok(Some(extent))
            }
        }
    }
}
