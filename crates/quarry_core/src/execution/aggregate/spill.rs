use std::path::{Path, PathBuf};

use quarry_error::Result;
use tracing::{trace, warn};

use super::table::GroupRow;
use crate::storage::file::{read_jsonl, remove_file_if_exists, write_jsonl};
use crate::storage::temp::TempFileNamer;

/// Groups written to a temporary file.
///
/// The file is deleted when the header is dropped.
#[derive(Debug)]
pub struct SpilledHeader {
    path: PathBuf,
    groups: usize,
}

impl SpilledHeader {
    pub fn write(namer: &TempFileNamer, rows: &[GroupRow]) -> Result<Self> {
        namer.ensure_directory()?;
        let path = namer.next_path("spill");
        let groups = write_jsonl(&path, rows)?;
        trace!(path = %path.display(), groups, "spilled aggregate table");
        Ok(SpilledHeader { path, groups })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of groups in the file.
    pub fn len(&self) -> usize {
        self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups == 0
    }

    pub fn read(&self) -> Result<Vec<GroupRow>> {
        read_jsonl(&self.path)
    }

    /// Replace the file's contents.
    pub fn rewrite(&mut self, rows: &[GroupRow]) -> Result<()> {
        self.groups = write_jsonl(&self.path, rows)?;
        Ok(())
    }
}

impl Drop for SpilledHeader {
    fn drop(&mut self) {
        if let Err(e) = remove_file_if_exists(&self.path) {
            warn!(path = %self.path.display(), %e, "failed to remove spill file");
        }
    }
}
