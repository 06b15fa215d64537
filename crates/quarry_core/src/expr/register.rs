use quarry_error::{OptionExt, Result};

use crate::arrays::record::Record;

/// Which register a column reference reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// The "current row" that expressions evaluate against.
///
/// Static use assigns rows explicitly, stream use binds the current row of a
/// reader (see `DatasetReader::bind`).
#[derive(Debug, Clone, Default)]
pub struct Register {
    current: Option<Record>,
}

impl Register {
    pub fn empty() -> Self {
        Register { current: None }
    }

    pub fn assign(&mut self, record: Record) {
        self.current = Some(record);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn is_bound(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Result<&Record> {
        self.current.as_ref().required("register row")
    }
}

/// Pair of registers expressions are evaluated against.
///
/// Single input operations only use the left register.
#[derive(Debug, Clone, Default)]
pub struct RowBinding {
    pub left: Register,
    pub right: Register,
}

impl RowBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, side: Side) -> &Register {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn assign_left(&mut self, record: Record) {
        self.left.assign(record);
    }

    pub fn assign_pair(&mut self, left: Record, right: Record) {
        self.left.assign(left);
        self.right.assign(right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn unbound_register_errors() {
        let mut binding = RowBinding::new();
        let err = binding.register(Side::Right).current().unwrap_err();
        assert_eq!("Missing required value: register row", err.get_msg());

        binding.assign_pair(record![1], record![2]);
        assert_eq!(&record![2], binding.register(Side::Right).current().unwrap());
    }
}
