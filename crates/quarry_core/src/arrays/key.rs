use std::fmt;

use quarry_error::{DbError, Result};
use serde::{Deserialize, Serialize};

/// Ordered list of column indices used for joining, grouping and sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Key {
    columns: Vec<usize>,
}

impl Key {
    pub fn new(columns: impl IntoIterator<Item = usize>) -> Self {
        Key {
            columns: columns.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Key {
            columns: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Check that every column is valid for a record of the given arity.
    pub fn validate(&self, arity: usize) -> Result<()> {
        if let Some(&col) = self.columns.iter().find(|&&col| col >= arity) {
            return Err(DbError::new("Key column out of bounds")
                .with_field("column", col)
                .with_field("arity", arity));
        }
        Ok(())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, col) in self.columns.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "#{col}")?;
        }
        write!(f, "]")
    }
}
