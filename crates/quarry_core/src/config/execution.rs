use std::path::PathBuf;

use quarry_error::{DbError, Result, ResultExt};
use serde::{Deserialize, Serialize};

use crate::arrays::schema::Schema;
use crate::storage::dataset::Dataset;
use crate::storage::temp::TempFileNamer;

pub const DEFAULT_MAX_RECORDS_PER_EXTENT: usize = 8192;
pub const DEFAULT_MAX_GROUPS_IN_MEMORY: usize = 65536;

/// Ratio of the smaller to the larger join input at or below which a nested
/// loop join is preferred over a hash join.
pub const DEFAULT_NESTED_LOOP_RATIO: f64 = 0.05;

/// Configuration for executing plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Target number of partitions for parallel jobs.
    pub partitions: usize,
    /// Threads in the compute pool.
    pub num_threads: usize,
    /// Groups an aggregate table holds in memory before spilling.
    pub max_groups_in_memory: usize,
    pub nested_loop_ratio: f64,
    /// Max records per extent for datasets created during execution.
    pub max_records_per_extent: usize,
    /// Directory for spilled aggregate tables. Defaults to the system temp
    /// directory.
    pub spill_directory: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        ExecutionConfig {
            partitions: cpus,
            num_threads: cpus,
            max_groups_in_memory: DEFAULT_MAX_GROUPS_IN_MEMORY,
            nested_loop_ratio: DEFAULT_NESTED_LOOP_RATIO,
            max_records_per_extent: DEFAULT_MAX_RECORDS_PER_EXTENT,
            spill_directory: None,
        }
    }
}

impl ExecutionConfig {
    /// Parse a config from json, missing fields use defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let config: ExecutionConfig =
            serde_json::from_str(s).context("Failed to parse execution config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(DbError::new("Partitions must be greater than zero"));
        }
        if self.num_threads == 0 {
            return Err(DbError::new("Number of threads must be greater than zero"));
        }
        if self.max_groups_in_memory == 0 {
            return Err(DbError::new("Max groups in memory must be greater than zero"));
        }
        if self.max_records_per_extent == 0 {
            return Err(DbError::new("Max records per extent must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.nested_loop_ratio) {
            return Err(DbError::new("Nested loop ratio must be between 0 and 1")
                .with_field("ratio", self.nested_loop_ratio));
        }
        Ok(())
    }

    /// Empty in-memory dataset using the configured extent size.
    pub fn new_dataset(&self, schema: Schema) -> Result<Dataset> {
        Dataset::new(schema, self.max_records_per_extent)
    }

    /// Namer for temp files in the spill directory.
    pub fn temp_file_namer(&self) -> TempFileNamer {
        let dir = self
            .spill_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        TempFileNamer::new(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_partial() {
        let config = ExecutionConfig::from_json(r#"{"partitions": 3, "max_groups_in_memory": 1}"#)
            .unwrap();
        assert_eq!(3, config.partitions);
        assert_eq!(1, config.max_groups_in_memory);
        assert_eq!(DEFAULT_NESTED_LOOP_RATIO, config.nested_loop_ratio);
        assert_eq!(None, config.spill_directory);
    }

    #[test]
    fn invalid_values() {
        assert!(ExecutionConfig::from_json(r#"{"partitions": 0}"#).is_err());
        assert!(ExecutionConfig::from_json(r#"{"nested_loop_ratio": 1.5}"#).is_err());
        assert!(ExecutionConfig::from_json("not json").is_err());
    }

    #[test]
    fn new_dataset_uses_extent_size() {
        let config = ExecutionConfig {
            max_records_per_extent: 3,
            ..Default::default()
        };
        let mut dataset = config.new_dataset(crate::testutil::int_schema(1)).unwrap();
        assert_eq!(3, dataset.max_records_per_extent());

        let mut writer = dataset.writer();
        for i in 0..7 {
            writer.insert_record(crate::record![i]).unwrap();
        }
        writer.close().unwrap();
        assert_eq!(3, dataset.extent_count());
    }

    #[test]
    fn spill_directory_used_for_namer() {
        let config = ExecutionConfig {
            spill_directory: Some(PathBuf::from("/data/spill")),
            ..Default::default()
        };
        assert!(config.temp_file_namer().next_path("x").starts_with("/data/spill"));
    }
}
