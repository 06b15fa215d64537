use std::fmt;

use quarry_error::{DbError, Result};

use super::ScalarExpression;
use super::register::RowBinding;
use crate::arrays::key::Key;
use crate::arrays::scalar::ScalarValue;

/// Boolean expression used for filtering and join conditions.
///
/// A null result is treated as false.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    expr: ScalarExpression,
}

impl Predicate {
    pub fn new(expr: ScalarExpression) -> Self {
        Predicate { expr }
    }

    /// Predicate that accepts every row.
    pub fn always_true() -> Self {
        Predicate {
            expr: ScalarExpression::Literal(ScalarValue::Boolean(true)),
        }
    }

    /// Build `left_key[i] = right_key[i]` for every key column, left columns
    /// reading from the left register and right columns from the right.
    pub fn key_equality(left_key: &Key, right_key: &Key) -> Result<Self> {
        if left_key.arity() != right_key.arity() {
            return Err(DbError::new("Join keys have different arities")
                .with_field("left", left_key.arity())
                .with_field("right", right_key.arity()));
        }

        let exprs = left_key
            .columns()
            .iter()
            .zip(right_key.columns())
            .map(|(&l, &r)| {
                ScalarExpression::equals(
                    ScalarExpression::column(l),
                    ScalarExpression::right_column(r),
                )
            });

        Ok(Predicate::new(ScalarExpression::and(exprs)))
    }

    pub fn is_always_true(&self) -> bool {
        matches!(self.expr, ScalarExpression::Literal(ScalarValue::Boolean(true)))
    }

    pub fn expr(&self) -> &ScalarExpression {
        &self.expr
    }

    /// Conjunction of this predicate and another.
    pub fn and(self, other: Predicate) -> Predicate {
        if self.is_always_true() {
            return other;
        }
        if other.is_always_true() {
            return self;
        }
        Predicate::new(ScalarExpression::and([self.expr, other.expr]))
    }

    pub fn evaluate(&self, binding: &RowBinding) -> Result<bool> {
        if self.is_always_true() {
            return Ok(true);
        }
        let v = self.expr.evaluate(binding)?;
        Ok(v.try_as_bool()?.unwrap_or(false))
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::always_true()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}
