//! Embedded analytical execution core.
//!
//! Joins, spillable grouped aggregation and partitioned map/reduce jobs over
//! datasets made of extents.

pub mod arrays;
pub mod config;
pub mod execution;
pub mod expr;
pub mod plans;
pub mod runtime;
pub mod storage;

#[cfg(test)]
mod testutil;
