//! Evidence surfaces over the intrinsic space.
//!
//! The scheduler ranks candidate points with a continuous estimate of
//! `ln Z(θ)` built from the resolved points. How that estimate is built is
//! a strategy: implement [`SurfaceFitter`] to plug in another regression.
//!
//! Two fitters ship with the crate:
//!
//! | Fitter | Technique | Feature |
//! |--------|-----------|---------|
//! | [`GpFitter`] | Gaussian process, Matérn 5/2 kernel, per-point noise | `gp` |
//! | [`KernelRegressionFitter`] | Nadaraya-Watson, Scott's-rule bandwidth | always |
//!
//! Fitters work in normalized coordinates (every intrinsic dimension mapped
//! onto `[0, 1]`), so one bandwidth or lengthscale scale fits all
//! dimensions regardless of their physical units.

#[cfg(feature = "gp")]
mod gp;
mod kernel;

#[cfg(feature = "gp")]
pub use gp::{GpFitter, GpFitterBuilder};
pub use kernel::KernelRegressionFitter;

use crate::error::Result;
use crate::point::GridRecord;
use crate::space::IntrinsicSpace;
use crate::types::IntegralStatus;

/// Variance floor for one observation, in nats².
const MIN_OBSERVATION_VARIANCE: f64 = 1e-6;
/// Variance assigned when the integrator reported no usable error bar.
const UNKNOWN_OBSERVATION_VARIANCE: f64 = 1.0;

/// One resolved point as seen by a fitter.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    /// Intrinsic parameters mapped onto the unit cube.
    pub x: Vec<f64>,
    /// Log evidence at the point.
    pub log_evidence: f64,
    /// Variance of `log_evidence` in nats².
    pub variance: f64,
}

impl Observation {
    /// Builds an observation from a resolved record.
    ///
    /// Returns `None` for records that must not shape the surface:
    /// pending or failed points, and non-finite evidence. Low-confidence
    /// points are kept with their variance multiplied by
    /// `low_confidence_penalty`.
    #[must_use]
    pub fn from_record(
        record: &GridRecord,
        space: &IntrinsicSpace,
        low_confidence_penalty: f64,
    ) -> Option<Self> {
        let result = &record.result;
        if !result.status.is_usable() || !result.log_evidence.is_finite() {
            return None;
        }
        let rel = result.relative_error;
        let mut variance = if rel.is_finite() {
            (rel * rel).max(MIN_OBSERVATION_VARIANCE)
        } else {
            UNKNOWN_OBSERVATION_VARIANCE
        };
        if result.status == IntegralStatus::LowConfidence {
            variance *= low_confidence_penalty;
        }
        Some(Self {
            x: space.normalize(&record.point.params),
            log_evidence: result.log_evidence,
            variance,
        })
    }
}

/// Predicted log evidence and its standard deviation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    /// Predicted `ln Z`.
    pub mean: f64,
    /// Predictive standard deviation of `ln Z`.
    pub std: f64,
}

impl Prediction {
    /// Upper confidence bound `mean + kappa * std`.
    #[must_use]
    pub fn upper_bound(&self, kappa: f64) -> f64 {
        self.mean + kappa * self.std
    }
}

/// A fitted surface. Inputs are normalized intrinsic coordinates.
pub trait Surface: Send + Sync {
    /// Predicts the log evidence at `x`.
    fn predict(&self, x: &[f64]) -> Prediction;
}

/// Builds a [`Surface`] from observations.
///
/// Implementations must be deterministic: the same observations in the
/// same order always produce the same surface.
pub trait SurfaceFitter: Send + Sync {
    /// Short name used in log events.
    fn name(&self) -> &'static str;

    /// Fits a surface.
    ///
    /// # Errors
    ///
    /// Returns `Error::SurfaceFit` when the observations cannot support a
    /// surface (none at all, or a numerically singular system).
    fn fit(&self, observations: &[Observation]) -> Result<Box<dyn Surface>>;
}

/// The fitter a scheduler uses when none is configured.
#[must_use]
pub fn default_fitter() -> Box<dyn SurfaceFitter> {
    #[cfg(feature = "gp")]
    {
        Box::new(GpFitter::default())
    }
    #[cfg(not(feature = "gp"))]
    {
        Box::new(KernelRegressionFitter::default())
    }
}

/// Per-dimension population standard deviation of the inputs.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn column_std(observations: &[Observation]) -> Vec<f64> {
    let n = observations.len() as f64;
    let d = observations.first().map_or(0, |o| o.x.len());
    (0..d)
        .map(|j| {
            let mean = observations.iter().map(|o| o.x[j]).sum::<f64>() / n;
            let var = observations
                .iter()
                .map(|o| (o.x[j] - mean).powi(2))
                .sum::<f64>()
                / n;
            var.sqrt()
        })
        .collect()
}
