use std::fmt;
use std::sync::Arc;

use quarry_error::{DbError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::config::execution::ExecutionConfig;

/// Thread pool that parallel jobs run their map tasks on.
#[derive(Clone)]
pub struct Scheduler {
    pool: Arc<ThreadPool>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("num_threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn try_new(num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(DbError::new("Scheduler requires at least one thread"));
        }

        let thread_pool = ThreadPoolBuilder::new()
            .thread_name(|idx| format!("quarry-compute-{idx}"))
            .num_threads(num_threads)
            .build()
            .map_err(|e| DbError::with_source("Failed to build thread pool", Box::new(e)))?;

        debug!(num_threads, "created scheduler");

        Ok(Scheduler {
            pool: Arc::new(thread_pool),
        })
    }

    /// Scheduler with `config.num_threads` threads.
    pub fn from_config(config: &ExecutionConfig) -> Result<Self> {
        Self::try_new(config.num_threads)
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub(crate) fn pool(&self) -> &ThreadPool {
        &self.pool
    }
}
