//! Mergeable aggregate states.
//!
//! States are serializable so grouping tables can be spilled to disk and
//! read back for consolidation.

use quarry_error::{DbError, OptionExt, Result};
use serde::{Deserialize, Serialize};

use crate::arrays::scalar::{ScalarValue, lossless_f64};

/// Running moments for variance and standard deviation (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VarianceState {
    pub count: i64,
    #[serde(with = "lossless_f64")]
    pub mean: f64,
    #[serde(with = "lossless_f64")]
    pub m2: f64,
}

impl VarianceState {
    pub fn update(&mut self, input: f64) {
        self.count += 1;
        let delta = input - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = input - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn merge(&mut self, other: &VarianceState) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }

        let self_count = self.count as f64;
        let other_count = other.count as f64;
        let total_count = self_count + other_count;

        let new_mean = (self_count * self.mean + other_count * other.mean) / total_count;
        let delta = self.mean - other.mean;

        self.m2 = self.m2 + other.m2 + delta * delta * self_count * other_count / total_count;
        self.mean = new_mean;
        self.count += other.count;
    }

    pub fn sample(&self) -> Option<f64> {
        match self.count {
            0 | 1 => None,
            n => Some(self.m2 / (n - 1) as f64),
        }
    }

    pub fn population(&self) -> Option<f64> {
        match self.count {
            0 => None,
            n => Some(self.m2 / n as f64),
        }
    }
}

/// Running co-moment for covariance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CovarState {
    pub count: i64,
    #[serde(with = "lossless_f64")]
    pub meanx: f64,
    #[serde(with = "lossless_f64")]
    pub meany: f64,
    #[serde(with = "lossless_f64")]
    pub co_moment: f64,
}

impl CovarState {
    pub fn update(&mut self, y: f64, x: f64) {
        self.count += 1;
        let n = self.count as f64;

        let dx = x - self.meanx;
        let meanx = self.meanx + dx / n;

        let dy = y - self.meany;
        let meany = self.meany + dy / n;

        self.co_moment += dx * (y - meany);
        self.meanx = meanx;
        self.meany = meany;
    }

    pub fn merge(&mut self, other: &CovarState) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }

        let count = self.count + other.count;
        let meanx =
            (other.count as f64 * other.meanx + self.count as f64 * self.meanx) / count as f64;
        let meany =
            (other.count as f64 * other.meany + self.count as f64 * self.meany) / count as f64;

        let deltax = self.meanx - other.meanx;
        let deltay = self.meany - other.meany;

        self.co_moment = other.co_moment
            + self.co_moment
            + deltax * deltay * other.count as f64 * self.count as f64 / count as f64;
        self.meanx = meanx;
        self.meany = meany;
        self.count = count;
    }

    pub fn sample(&self) -> Option<f64> {
        match self.count {
            0 | 1 => None,
            n => Some(self.co_moment / (n - 1) as f64),
        }
    }

    pub fn population(&self) -> Option<f64> {
        match self.count {
            0 => None,
            n => Some(self.co_moment / n as f64),
        }
    }
}

/// Slope of the least squares fit of y on x.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegrSlopeState {
    pub cov: CovarState,
    /// Variance of x.
    pub var: VarianceState,
}

impl RegrSlopeState {
    pub fn update(&mut self, y: f64, x: f64) {
        self.cov.update(y, x);
        self.var.update(x);
    }

    pub fn merge(&mut self, other: &RegrSlopeState) {
        self.cov.merge(&other.cov);
        self.var.merge(&other.var);
    }

    pub fn finalize(&self) -> Option<f64> {
        let cov = self.cov.population()?;
        let var = self.var.population()?;
        if var == 0.0 {
            return None;
        }
        Some(cov / var)
    }
}

/// Running total for a sum.
///
/// Integer totals are held in 128 bits so that whether a sum overflows
/// doesn't depend on the order rows are added or partial sums are merged. A
/// total that doesn't fit in an Int64 is rendered as a Float64.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SumValue {
    Int(i128),
    Float(#[serde(with = "lossless_f64")] f64),
}

impl SumValue {
    pub fn try_from_scalar(value: &ScalarValue) -> Result<Self> {
        match value {
            ScalarValue::Int64(v) => Ok(SumValue::Int(*v as i128)),
            ScalarValue::Float64(v) => Ok(SumValue::Float(*v)),
            other => Err(DbError::new("Cannot sum non-numeric value")
                .with_field("datatype", other.datatype())),
        }
    }

    pub fn add(self, other: SumValue) -> Result<Self> {
        Ok(match (self, other) {
            (SumValue::Int(a), SumValue::Int(b)) => {
                SumValue::Int(a.checked_add(b).required("sum within 128 bits")?)
            }
            (SumValue::Int(a), SumValue::Float(b)) | (SumValue::Float(b), SumValue::Int(a)) => {
                SumValue::Float(a as f64 + b)
            }
            (SumValue::Float(a), SumValue::Float(b)) => SumValue::Float(a + b),
        })
    }

    pub fn finalize(&self) -> ScalarValue {
        match *self {
            SumValue::Int(v) => match i64::try_from(v) {
                Ok(v) => ScalarValue::Int64(v),
                Err(_) => ScalarValue::Float64(v as f64),
            },
            SumValue::Float(v) => ScalarValue::Float64(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarianceFinalize {
    Sample,
    Population,
    StddevSample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CovarFinalize {
    Sample,
    Population,
}

/// Accumulator for a single aggregate within a single group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregateState {
    /// Counts rows, or non-null values when `skip_nulls` is set.
    Count { count: i64, skip_nulls: bool },
    /// Integer until a float is seen.
    Sum { sum: Option<SumValue> },
    Avg {
        #[serde(with = "lossless_f64")]
        sum: f64,
        count: i64,
    },
    Min { value: Option<ScalarValue> },
    Max { value: Option<ScalarValue> },
    Variance {
        finalize: VarianceFinalize,
        state: VarianceState,
    },
    Covar {
        finalize: CovarFinalize,
        state: CovarState,
    },
    RegrSlope { state: RegrSlopeState },
}

impl AggregateState {
    /// Update with the evaluated inputs for one row.
    ///
    /// Rows with a null input are ignored, except when counting rows.
    pub fn update(&mut self, inputs: &[ScalarValue]) -> Result<()> {
        if let AggregateState::Count { count, skip_nulls } = self {
            if !*skip_nulls || inputs.iter().all(|v| !v.is_null()) {
                *count += 1;
            }
            return Ok(());
        }

        if inputs.iter().any(|v| v.is_null()) {
            return Ok(());
        }

        match self {
            AggregateState::Count { .. } => (),
            AggregateState::Sum { sum } => {
                let input = SumValue::try_from_scalar(first(inputs)?)?;
                *sum = Some(match sum.take() {
                    Some(current) => current.add(input)?,
                    None => input,
                });
            }
            AggregateState::Avg { sum, count } => {
                *sum += require_f64(first(inputs)?)?;
                *count += 1;
            }
            AggregateState::Min { value } => {
                let input = first(inputs)?;
                if value.as_ref().is_none_or(|v| input < v) {
                    *value = Some(input.clone());
                }
            }
            AggregateState::Max { value } => {
                let input = first(inputs)?;
                if value.as_ref().is_none_or(|v| input > v) {
                    *value = Some(input.clone());
                }
            }
            AggregateState::Variance { state, .. } => {
                state.update(require_f64(first(inputs)?)?);
            }
            AggregateState::Covar { state, .. } => {
                let (y, x) = pair(inputs)?;
                state.update(y, x);
            }
            AggregateState::RegrSlope { state } => {
                let (y, x) = pair(inputs)?;
                state.update(y, x);
            }
        }

        Ok(())
    }

    /// Merge another state for the same aggregate into this one.
    pub fn merge(&mut self, other: &AggregateState) -> Result<()> {
        match (self, other) {
            (AggregateState::Count { count, .. }, AggregateState::Count { count: other, .. }) => {
                *count += other;
            }
            (AggregateState::Sum { sum }, AggregateState::Sum { sum: other }) => {
                if let Some(other) = other {
                    *sum = Some(match sum.take() {
                        Some(current) => current.add(*other)?,
                        None => *other,
                    });
                }
            }
            (
                AggregateState::Avg { sum, count },
                AggregateState::Avg {
                    sum: other_sum,
                    count: other_count,
                },
            ) => {
                *sum += other_sum;
                *count += other_count;
            }
            (AggregateState::Min { value }, AggregateState::Min { value: Some(other) }) => {
                if value.as_ref().is_none_or(|v| other < v) {
                    *value = Some(other.clone());
                }
            }
            (AggregateState::Max { value }, AggregateState::Max { value: Some(other) }) => {
                if value.as_ref().is_none_or(|v| other > v) {
                    *value = Some(other.clone());
                }
            }
            (AggregateState::Min { .. }, AggregateState::Min { value: None })
            | (AggregateState::Max { .. }, AggregateState::Max { value: None }) => (),
            (
                AggregateState::Variance { state, finalize },
                AggregateState::Variance {
                    state: other,
                    finalize: other_finalize,
                },
            ) if *finalize == *other_finalize => state.merge(other),
            (
                AggregateState::Covar { state, finalize },
                AggregateState::Covar {
                    state: other,
                    finalize: other_finalize,
                },
            ) if *finalize == *other_finalize => state.merge(other),
            (AggregateState::RegrSlope { state }, AggregateState::RegrSlope { state: other }) => {
                state.merge(other)
            }
            (this, other) => {
                return Err(DbError::new("Cannot merge mismatched aggregate states")
                    .with_field("state", format!("{this:?}"))
                    .with_field("other", format!("{other:?}")));
            }
        }
        Ok(())
    }

    /// Produce the final value.
    pub fn finalize(&self) -> ScalarValue {
        match self {
            AggregateState::Count { count, .. } => ScalarValue::Int64(*count),
            AggregateState::Sum { sum } => match sum {
                Some(sum) => sum.finalize(),
                None => ScalarValue::Null,
            },
            AggregateState::Avg { sum, count } => {
                if *count == 0 {
                    ScalarValue::Null
                } else {
                    ScalarValue::Float64(sum / *count as f64)
                }
            }
            AggregateState::Min { value } | AggregateState::Max { value } => {
                value.clone().unwrap_or(ScalarValue::Null)
            }
            AggregateState::Variance { finalize, state } => {
                let v = match finalize {
                    VarianceFinalize::Sample => state.sample(),
                    VarianceFinalize::Population => state.population(),
                    VarianceFinalize::StddevSample => state.sample().map(f64::sqrt),
                };
                v.into()
            }
            AggregateState::Covar { finalize, state } => {
                let v = match finalize {
                    CovarFinalize::Sample => state.sample(),
                    CovarFinalize::Population => state.population(),
                };
                v.into()
            }
            AggregateState::RegrSlope { state } => state.finalize().into(),
        }
    }
}

fn first(inputs: &[ScalarValue]) -> Result<&ScalarValue> {
    inputs.first().required("aggregate input")
}

fn pair(inputs: &[ScalarValue]) -> Result<(f64, f64)> {
    match inputs {
        [y, x] => Ok((require_f64(y)?, require_f64(x)?)),
        _ => Err(DbError::new("Aggregate expected two input values").with_field("got", inputs.len())),
    }
}

fn require_f64(v: &ScalarValue) -> Result<f64> {
    v.try_as_f64()?.required("non-null aggregate input")
}
