use quarry_error::Result;

use super::ScalarExpression;
use super::register::RowBinding;
use crate::arrays::record::Record;

/// Set of expressions producing an output record.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    exprs: Vec<ScalarExpression>,
}

impl Projection {
    pub fn new(exprs: impl IntoIterator<Item = ScalarExpression>) -> Self {
        Projection {
            exprs: exprs.into_iter().collect(),
        }
    }

    /// Project the first `arity` columns of the left register.
    pub fn identity(arity: usize) -> Self {
        Self::new((0..arity).map(ScalarExpression::column))
    }

    /// Left columns followed by right columns.
    pub fn concat(left_arity: usize, right_arity: usize) -> Self {
        Self::new(
            (0..left_arity)
                .map(ScalarExpression::column)
                .chain((0..right_arity).map(ScalarExpression::right_column)),
        )
    }

    pub fn arity(&self) -> usize {
        self.exprs.len()
    }

    pub fn exprs(&self) -> &[ScalarExpression] {
        &self.exprs
    }

    pub fn evaluate(&self, binding: &RowBinding) -> Result<Record> {
        let values = self
            .exprs
            .iter()
            .map(|expr| expr.evaluate(binding))
            .collect::<Result<Vec<_>>>()?;
        Ok(Record::new(values))
    }
}
