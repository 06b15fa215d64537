//! Grouped aggregation with spill to disk.

pub mod function;
pub mod spill;
pub mod state;
pub mod structure;
pub mod table;
