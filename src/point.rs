//! Grid points, their integral results, and generations.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::IntegralStatus;

/// Unique identifier of an intrinsic point within one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PointId(pub u64);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One point of the intrinsic grid.
///
/// Points are immutable once created: the store owns them and the
/// scheduler and integrator only ever read them.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntrinsicPoint {
    /// The unique identifier for this point.
    pub id: PointId,
    /// Intrinsic parameter values, in the order of the run's
    /// [`IntrinsicSpace`](crate::space::IntrinsicSpace).
    pub params: Vec<f64>,
    /// Index of the generation that produced this point.
    pub generation: u32,
    /// The point this one was jittered from, if any.
    pub parent: Option<PointId>,
}

impl IntrinsicPoint {
    /// Creates a new point.
    #[must_use]
    pub fn new(id: PointId, params: Vec<f64>, generation: u32, parent: Option<PointId>) -> Self {
        Self {
            id,
            params,
            generation,
            parent,
        }
    }
}

/// The evidence integral of one intrinsic point.
///
/// Invariants: `effective_samples <= samples_drawn`, `relative_error >= 0`,
/// and `status == Converged` only if `relative_error` met the tolerance the
/// integrator was configured with.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntegralResult {
    /// Outcome of the integration.
    pub status: IntegralStatus,
    /// Natural log of the marginal likelihood estimate. Negative infinity
    /// when no sample carried weight.
    #[cfg_attr(feature = "serde", serde(with = "lenient_f64"))]
    pub log_evidence: f64,
    /// Relative standard error of the (linear) evidence estimate. Infinite
    /// when fewer than one nonzero weight was seen.
    #[cfg_attr(feature = "serde", serde(with = "lenient_f64"))]
    pub relative_error: f64,
    /// Kish effective sample size of the importance weights.
    pub effective_samples: f64,
    /// Total extrinsic samples drawn, including zero-weight ones.
    pub samples_drawn: u64,
    /// Samples that carried a positive, finite weight.
    pub nonzero_samples: u64,
    /// Number of batches drawn.
    pub batches: u32,
    /// Likelihood values that came back non-finite and were excluded.
    pub nonfinite_count: u64,
    /// Likelihood calls that reported a domain error.
    pub domain_error_count: u64,
    /// Free-form note for failed or degraded results.
    #[cfg_attr(feature = "serde", serde(default))]
    pub message: Option<String>,
}

impl IntegralResult {
    /// A placeholder result for a point that has not been integrated.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: IntegralStatus::Pending,
            log_evidence: f64::NEG_INFINITY,
            relative_error: f64::INFINITY,
            effective_samples: 0.0,
            samples_drawn: 0,
            nonzero_samples: 0,
            batches: 0,
            nonfinite_count: 0,
            domain_error_count: 0,
            message: None,
        }
    }

    /// Standard error of `log_evidence` (first-order, equal to the
    /// relative error of the linear estimate).
    #[must_use]
    pub fn log_evidence_error(&self) -> f64 {
        self.relative_error
    }
}

/// A point together with its (possibly pending) result. This is the unit
/// the store keeps and the journal persists.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridRecord {
    /// The grid point.
    pub point: IntrinsicPoint,
    /// Its integral result.
    pub result: IntegralResult,
}

impl GridRecord {
    /// Creates a record with a pending result.
    #[must_use]
    pub fn pending(point: IntrinsicPoint) -> Self {
        Self {
            point,
            result: IntegralResult::pending(),
        }
    }

    /// Shorthand for `self.result.status`.
    #[must_use]
    pub fn status(&self) -> IntegralStatus {
        self.result.status
    }
}

/// The points emitted together by one scheduler step.
#[derive(Clone, Debug, PartialEq)]
pub struct Generation {
    /// Generation index (0 for the initial design).
    pub index: u32,
    /// The new points, already inserted in the store.
    pub points: Vec<IntrinsicPoint>,
    /// How many points were asked for.
    pub requested: usize,
}

impl Generation {
    /// Returns `true` if deduplication or bounds rejection left the
    /// generation smaller than requested.
    #[must_use]
    pub fn is_shrunk(&self) -> bool {
        self.points.len() < self.requested
    }

    /// Number of points in the generation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the generation has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Serde adapter writing non-finite floats as strings, since JSON has no
/// representation for infinities or NaN.
#[cfg(feature = "serde")]
mod lenient_f64 {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(f64),
        Text(String),
    }

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub(super) fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("nan")
        } else if value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Num(v) => Ok(v),
            Repr::Text(s) => match s.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(serde::de::Error::custom(format!(
                    "expected a number, \"inf\", \"-inf\" or \"nan\", got \"{other}\""
                ))),
            },
        }
    }
}
