pub mod predicate;
pub mod projection;
pub mod register;

use std::cmp::Ordering;
use std::fmt;

use quarry_error::{DbError, Result};
use register::{RowBinding, Side};

use crate::arrays::scalar::{DataType, ScalarValue};
use crate::arrays::schema::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl ComparisonOperator {
    fn matches(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::NotEq => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::LtEq => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::GtEq => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConjunctionOperator {
    And,
    Or,
}

impl fmt::Display for ConjunctionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOperator {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for ArithOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::Div => write!(f, "/"),
        }
    }
}

/// Compiled expression tree evaluated against a row binding.
///
/// Cloning produces a fully independent tree, workers receive their own copy.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpression {
    Column { side: Side, idx: usize },
    Literal(ScalarValue),
    Comparison {
        op: ComparisonOperator,
        left: Box<ScalarExpression>,
        right: Box<ScalarExpression>,
    },
    Conjunction {
        op: ConjunctionOperator,
        exprs: Vec<ScalarExpression>,
    },
    Arith {
        op: ArithOperator,
        left: Box<ScalarExpression>,
        right: Box<ScalarExpression>,
    },
    Not(Box<ScalarExpression>),
    IsNull(Box<ScalarExpression>),
}

impl ScalarExpression {
    /// Column from the left (or only) register.
    pub fn column(idx: usize) -> Self {
        ScalarExpression::Column {
            side: Side::Left,
            idx,
        }
    }

    pub fn right_column(idx: usize) -> Self {
        ScalarExpression::Column {
            side: Side::Right,
            idx,
        }
    }

    pub fn lit(value: impl Into<ScalarValue>) -> Self {
        ScalarExpression::Literal(value.into())
    }

    pub fn compare(op: ComparisonOperator, left: Self, right: Self) -> Self {
        ScalarExpression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equals(left: Self, right: Self) -> Self {
        Self::compare(ComparisonOperator::Eq, left, right)
    }

    pub fn arith(op: ArithOperator, left: Self, right: Self) -> Self {
        ScalarExpression::Arith {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(exprs: impl IntoIterator<Item = Self>) -> Self {
        ScalarExpression::Conjunction {
            op: ConjunctionOperator::And,
            exprs: exprs.into_iter().collect(),
        }
    }

    pub fn or(exprs: impl IntoIterator<Item = Self>) -> Self {
        ScalarExpression::Conjunction {
            op: ConjunctionOperator::Or,
            exprs: exprs.into_iter().collect(),
        }
    }

    pub fn negate(expr: Self) -> Self {
        ScalarExpression::Not(Box::new(expr))
    }

    pub fn is_null(expr: Self) -> Self {
        ScalarExpression::IsNull(Box::new(expr))
    }

    /// Datatype produced by the expression when columns are read from rows
    /// of the given schemas.
    pub fn datatype(&self, left: &Schema, right: &Schema) -> Result<DataType> {
        Ok(match self {
            Self::Column { side, idx } => {
                let schema = match side {
                    Side::Left => left,
                    Side::Right => right,
                };
                match schema.fields().get(*idx) {
                    Some(field) => field.datatype,
                    None => {
                        return Err(DbError::new("Column reference out of range")
                            .with_field("column", self)
                            .with_field("arity", schema.arity()));
                    }
                }
            }
            Self::Literal(v) => v.datatype(),
            Self::Comparison { .. } | Self::Conjunction { .. } | Self::Not(_) | Self::IsNull(_) => {
                DataType::Boolean
            }
            Self::Arith { op, left: l, right: r } => {
                match (l.datatype(left, right)?, r.datatype(left, right)?) {
                    (DataType::Null, _) | (_, DataType::Null) => DataType::Null,
                    (DataType::Int64, DataType::Int64) if *op != ArithOperator::Div => {
                        DataType::Int64
                    }
                    _ => DataType::Float64,
                }
            }
        })
    }

    pub fn evaluate(&self, binding: &RowBinding) -> Result<ScalarValue> {
        match self {
            Self::Column { side, idx } => {
                let record = binding.register(*side).current()?;
                Ok(record.value(*idx)?.clone())
            }
            Self::Literal(v) => Ok(v.clone()),
            Self::Comparison { op, left, right } => {
                let left = left.evaluate(binding)?;
                let right = right.evaluate(binding)?;
                if left.is_null() || right.is_null() {
                    return Ok(ScalarValue::Null);
                }
                Ok(ScalarValue::Boolean(op.matches(left.cmp(&right))))
            }
            Self::Conjunction { op, exprs } => eval_conjunction(*op, exprs, binding),
            Self::Arith { op, left, right } => {
                let left = left.evaluate(binding)?;
                let right = right.evaluate(binding)?;
                eval_arith(*op, &left, &right)
            }
            Self::Not(expr) => match expr.evaluate(binding)?.try_as_bool()? {
                Some(v) => Ok(ScalarValue::Boolean(!v)),
                None => Ok(ScalarValue::Null),
            },
            Self::IsNull(expr) => Ok(ScalarValue::Boolean(expr.evaluate(binding)?.is_null())),
        }
    }
}

/// Three-valued AND/OR.
fn eval_conjunction(
    op: ConjunctionOperator,
    exprs: &[ScalarExpression],
    binding: &RowBinding,
) -> Result<ScalarValue> {
    // Value that short circuits evaluation.
    let short = matches!(op, ConjunctionOperator::Or);
    let mut saw_null = false;

    for expr in exprs {
        match expr.evaluate(binding)?.try_as_bool()? {
            Some(v) if v == short => return Ok(ScalarValue::Boolean(short)),
            Some(_) => (),
            None => saw_null = true,
        }
    }

    if saw_null {
        Ok(ScalarValue::Null)
    } else {
        Ok(ScalarValue::Boolean(!short))
    }
}

fn eval_arith(op: ArithOperator, left: &ScalarValue, right: &ScalarValue) -> Result<ScalarValue> {
    match (left, right) {
        (ScalarValue::Null, _) | (_, ScalarValue::Null) => Ok(ScalarValue::Null),
        (ScalarValue::Int64(a), ScalarValue::Int64(b)) if op != ArithOperator::Div => {
            let v = match op {
                ArithOperator::Add => a.checked_add(*b),
                ArithOperator::Sub => a.checked_sub(*b),
                _ => a.checked_mul(*b),
            };
            v.map(ScalarValue::Int64).ok_or_else(|| {
                DbError::new("Int64 overflow")
                    .with_field("left", a)
                    .with_field("op", op)
                    .with_field("right", b)
            })
        }
        _ => {
            let a = left.try_as_f64()?.unwrap_or_default();
            let b = right.try_as_f64()?.unwrap_or_default();
            let v = match op {
                ArithOperator::Add => a + b,
                ArithOperator::Sub => a - b,
                ArithOperator::Mul => a * b,
                ArithOperator::Div => {
                    if b == 0.0 {
                        return Ok(ScalarValue::Null);
                    }
                    a / b
                }
            };
            Ok(ScalarValue::Float64(v))
        }
    }
}

impl fmt::Display for ScalarExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column { side, idx } => match side {
                Side::Left => write!(f, "l#{idx}"),
                Side::Right => write!(f, "r#{idx}"),
            },
            Self::Literal(v) => write!(f, "{v}"),
            Self::Comparison { op, left, right } => write!(f, "{left} {op} {right}"),
            Self::Arith { op, left, right } => write!(f, "({left} {op} {right})"),
            Self::Conjunction { op, exprs } => {
                write!(f, "(")?;
                for (idx, expr) in exprs.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " {op} ")?;
                    }
                    write!(f, "{expr}")?;
                }
                write!(f, ")")
            }
            Self::Not(expr) => write!(f, "NOT {expr}"),
            Self::IsNull(expr) => write!(f, "{expr} IS NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn binding(left: crate::arrays::record::Record) -> RowBinding {
        let mut binding = RowBinding::new();
        binding.assign_left(left);
        binding
    }

    #[test]
    fn datatypes() {
        use crate::arrays::schema::Field;

        let left = Schema::new([Field::new("a", DataType::Int64, false)]);
        let right = Schema::new([Field::new("b", DataType::Utf8, true)]);

        let col = ScalarExpression::column(0);
        assert_eq!(DataType::Int64, col.datatype(&left, &right).unwrap());
        assert_eq!(
            DataType::Utf8,
            ScalarExpression::right_column(0).datatype(&left, &right).unwrap()
        );
        assert!(ScalarExpression::column(1).datatype(&left, &right).is_err());

        let add = ScalarExpression::arith(ArithOperator::Add, col.clone(), ScalarExpression::lit(1));
        assert_eq!(DataType::Int64, add.datatype(&left, &right).unwrap());
        let div = ScalarExpression::arith(ArithOperator::Div, col.clone(), ScalarExpression::lit(1));
        assert_eq!(DataType::Float64, div.datatype(&left, &right).unwrap());
        assert_eq!(
            DataType::Boolean,
            ScalarExpression::is_null(col).datatype(&left, &right).unwrap()
        );
    }

    #[test]
    fn comparison_with_null_is_null() {
        let b = binding(record![1, None::<i64>]);
        let expr = ScalarExpression::equals(ScalarExpression::column(0), ScalarExpression::column(1));
        assert_eq!(ScalarValue::Null, expr.evaluate(&b).unwrap());
    }

    #[test]
    fn three_valued_and_or() {
        let b = binding(record![None::<bool>]);
        let null = ScalarExpression::column(0);

        let and_false = ScalarExpression::and([null.clone(), ScalarExpression::lit(false)]);
        assert_eq!(ScalarValue::Boolean(false), and_false.evaluate(&b).unwrap());

        let and_true = ScalarExpression::and([null.clone(), ScalarExpression::lit(true)]);
        assert_eq!(ScalarValue::Null, and_true.evaluate(&b).unwrap());

        let or_true = ScalarExpression::or([null.clone(), ScalarExpression::lit(true)]);
        assert_eq!(ScalarValue::Boolean(true), or_true.evaluate(&b).unwrap());

        let empty_and = ScalarExpression::and([]);
        assert_eq!(ScalarValue::Boolean(true), empty_and.evaluate(&b).unwrap());
    }

    #[test]
    fn arith_promotes_and_checks_overflow() {
        let b = binding(record![i64::MAX, 2.5]);

        let add = ScalarExpression::arith(
            ArithOperator::Add,
            ScalarExpression::column(0),
            ScalarExpression::lit(1),
        );
        assert!(add.evaluate(&b).is_err());

        let mul = ScalarExpression::arith(
            ArithOperator::Mul,
            ScalarExpression::column(1),
            ScalarExpression::lit(2),
        );
        assert_eq!(ScalarValue::Float64(5.0), mul.evaluate(&b).unwrap());

        let div = ScalarExpression::arith(
            ArithOperator::Div,
            ScalarExpression::column(1),
            ScalarExpression::lit(0),
        );
        assert_eq!(ScalarValue::Null, div.evaluate(&b).unwrap());
    }

    #[test]
    fn unbound_register_errors() {
        let b = binding(record![1]);
        let expr = ScalarExpression::right_column(0);
        assert!(expr.evaluate(&b).is_err());
    }

    #[test]
    fn display() {
        let expr = ScalarExpression::and([
            ScalarExpression::equals(ScalarExpression::column(0), ScalarExpression::right_column(1)),
            ScalarExpression::negate(ScalarExpression::is_null(ScalarExpression::column(2))),
        ]);
        assert_eq!("(l#0 = r#1 AND NOT l#2 IS NULL)", expr.to_string());
    }
}
