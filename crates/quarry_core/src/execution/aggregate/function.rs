use std::fmt;

use quarry_error::{DbError, Result};

use super::state::{
    AggregateState, CovarFinalize, CovarState, RegrSlopeState, VarianceFinalize, VarianceState,
};
use crate::arrays::scalar::ScalarValue;
use crate::expr::ScalarExpression;
use crate::expr::register::RowBinding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    /// Number of rows, or of non-null values when given an input.
    Count,
    Sum,
    Avg,
    Min,
    Max,
    VarSamp,
    VarPop,
    StddevSamp,
    CovarSamp,
    CovarPop,
    /// Slope of the least squares fit, inputs are `[y, x]`.
    RegrSlope,
}

impl AggregateFunction {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::VarSamp => "var_samp",
            Self::VarPop => "var_pop",
            Self::StddevSamp => "stddev_samp",
            Self::CovarSamp => "covar_samp",
            Self::CovarPop => "covar_pop",
            Self::RegrSlope => "regr_slope",
        }
    }

    /// Number of inputs the function accepts, as an inclusive range.
    const fn input_arity(&self) -> (usize, usize) {
        match self {
            Self::Count => (0, 1),
            Self::CovarSamp | Self::CovarPop | Self::RegrSlope => (2, 2),
            _ => (1, 1),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An aggregate function applied to input expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    function: AggregateFunction,
    inputs: Vec<ScalarExpression>,
}

impl AggregateExpr {
    pub fn try_new(
        function: AggregateFunction,
        inputs: impl IntoIterator<Item = ScalarExpression>,
    ) -> Result<Self> {
        let inputs: Vec<_> = inputs.into_iter().collect();
        let (min, max) = function.input_arity();
        if inputs.len() < min || inputs.len() > max {
            return Err(
                DbError::new("Wrong number of inputs for aggregate function")
                    .with_field("function", function)
                    .with_field("got", inputs.len())
                    .with_field("expected_min", min)
                    .with_field("expected_max", max),
            );
        }
        Ok(AggregateExpr { function, inputs })
    }

    /// `count(*)`
    pub fn count_star() -> Self {
        AggregateExpr {
            function: AggregateFunction::Count,
            inputs: Vec::new(),
        }
    }

    /// Single input aggregate reading a column.
    pub fn on_column(function: AggregateFunction, column: usize) -> Result<Self> {
        Self::try_new(function, [ScalarExpression::column(column)])
    }

    pub fn function(&self) -> AggregateFunction {
        self.function
    }

    pub fn inputs(&self) -> &[ScalarExpression] {
        &self.inputs
    }

    /// Fresh state for a new group.
    pub fn new_state(&self) -> AggregateState {
        match self.function {
            AggregateFunction::Count => AggregateState::Count {
                count: 0,
                skip_nulls: !self.inputs.is_empty(),
            },
            AggregateFunction::Sum => AggregateState::Sum { sum: None },
            AggregateFunction::Avg => AggregateState::Avg { sum: 0.0, count: 0 },
            AggregateFunction::Min => AggregateState::Min { value: None },
            AggregateFunction::Max => AggregateState::Max { value: None },
            AggregateFunction::VarSamp => variance(VarianceFinalize::Sample),
            AggregateFunction::VarPop => variance(VarianceFinalize::Population),
            AggregateFunction::StddevSamp => variance(VarianceFinalize::StddevSample),
            AggregateFunction::CovarSamp => covar(CovarFinalize::Sample),
            AggregateFunction::CovarPop => covar(CovarFinalize::Population),
            AggregateFunction::RegrSlope => AggregateState::RegrSlope {
                state: RegrSlopeState::default(),
            },
        }
    }

    /// Evaluate the inputs for the row bound to the left register.
    pub fn evaluate_inputs(&self, binding: &RowBinding) -> Result<Vec<ScalarValue>> {
        self.inputs
            .iter()
            .map(|expr| expr.evaluate(binding))
            .collect()
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        if self.inputs.is_empty() && self.function == AggregateFunction::Count {
            write!(f, "*")?;
        }
        for (idx, input) in self.inputs.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{input}")?;
        }
        write!(f, ")")
    }
}

fn variance(finalize: VarianceFinalize) -> AggregateState {
    AggregateState::Variance {
        finalize,
        state: VarianceState::default(),
    }
}

fn covar(finalize: CovarFinalize) -> AggregateState {
    AggregateState::Covar {
        finalize,
        state: CovarState::default(),
    }
}
