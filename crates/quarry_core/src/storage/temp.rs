use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarry_error::{Result, ResultExt};
use uuid::Uuid;

/// Hands out unique file paths inside a directory.
///
/// Used for spilled aggregate tables and on-disk extents.
#[derive(Debug, Clone)]
pub struct TempFileNamer {
    directory: PathBuf,
    prefix: Arc<str>,
}

impl TempFileNamer {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        TempFileNamer {
            directory: directory.into(),
            prefix: "quarry".into(),
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the directory if it doesn't exist yet.
    pub fn ensure_directory(&self) -> Result<()> {
        std::fs::create_dir_all(&self.directory).context_fn(|| {
            format!("Failed to create directory '{}'", self.directory.display())
        })
    }

    /// Next unique path for a file of the given kind.
    pub fn next_path(&self, kind: &str) -> PathBuf {
        self.directory
            .join(format!("{}-{kind}-{}.jsonl", self.prefix, Uuid::new_v4()))
    }
}
