use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use quarry_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use super::key::Key;
use super::scalar::ScalarValue;

/// Build a record from a list of values convertible into scalars.
///
/// `record![1, "a", None::<i64>]`
#[macro_export]
macro_rules! record {
    () => {
        $crate::arrays::record::Record::new(::std::iter::empty::<$crate::arrays::scalar::ScalarValue>())
    };
    ($($value:expr),+ $(,)?) => {
        $crate::arrays::record::Record::new([
            $($crate::arrays::scalar::ScalarValue::from($value)),+
        ])
    };
}

/// Immutable tuple of cells.
///
/// Cloning is cheap, the values are shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Record {
    values: Arc<[ScalarValue]>,
}

impl Record {
    pub fn new(values: impl IntoIterator<Item = ScalarValue>) -> Self {
        Record {
            values: values.into_iter().collect(),
        }
    }

    /// Create a record containing `arity` nulls.
    pub fn nulls(arity: usize) -> Self {
        Self::new(std::iter::repeat_n(ScalarValue::Null, arity))
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<&ScalarValue> {
        self.values.get(idx)
    }

    /// Get a value, erroring if the index is out of bounds.
    pub fn value(&self, idx: usize) -> Result<&ScalarValue> {
        self.values.get(idx).ok_or_else(|| {
            DbError::new("Column index out of bounds")
                .with_field("index", idx)
                .with_field("arity", self.arity())
        })
    }

    /// Concatenate two records, `self` values first.
    pub fn concat(&self, other: &Record) -> Record {
        Self::new(self.values.iter().chain(other.values.iter()).cloned())
    }

    /// Extract the values for the key columns.
    ///
    /// Key columns are expected to have been validated against the schema.
    pub fn key_values(&self, key: &Key) -> Vec<ScalarValue> {
        key.columns()
            .iter()
            .map(|&col| self.values.get(col).cloned().unwrap_or_default())
            .collect()
    }

    /// If any of the key columns is null.
    pub fn has_null_key(&self, key: &Key) -> bool {
        key.columns()
            .iter()
            .any(|&col| self.values.get(col).is_none_or(|v| v.is_null()))
    }

    /// Compare two records on their respective keys.
    ///
    /// Keys are compared column by column. A key with fewer columns sorts
    /// first if all shared columns are equal.
    pub fn compare(r1: &Record, key1: &Key, r2: &Record, key2: &Key) -> Ordering {
        for (&c1, &c2) in key1.columns().iter().zip(key2.columns()) {
            let v1 = r1.values.get(c1).unwrap_or(&ScalarValue::Null);
            let v2 = r2.values.get(c2).unwrap_or(&ScalarValue::Null);
            match v1.cmp(v2) {
                Ordering::Equal => (),
                other => return other,
            }
        }
        key1.arity().cmp(&key2.arity())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.iter()).finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, v) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}
