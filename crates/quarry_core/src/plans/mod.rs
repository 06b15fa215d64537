//! Plans for single execution steps.
//!
//! A plan wires datasets, compiled expressions and the execution engines
//! together and reports what it did through [`PlanStats`].

pub mod aggregate;
pub mod merge;
pub mod partitioned_aggregate;

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanStats {
    /// Input rows consumed, after filtering.
    pub rows_read: usize,
    /// Rows written to the output sink.
    pub rows_written: usize,
    pub elapsed: Duration,
}

impl fmt::Display for PlanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read: {}, written: {}, elapsed: {:?}",
            self.rows_read, self.rows_written, self.elapsed
        )
    }
}
