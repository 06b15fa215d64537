pub mod aggregate;
pub mod job;
pub mod join;
pub mod partition;
