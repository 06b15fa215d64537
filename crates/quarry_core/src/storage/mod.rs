pub mod dataset;
pub mod extent;
pub mod file;
pub mod reader;
pub mod temp;
pub mod writer;
