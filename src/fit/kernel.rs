//! Nadaraya-Watson kernel regression of log evidence.
//!
//! The prediction at `x` is a Gaussian-kernel weighted average of the
//! observed log evidences, each observation also weighted by its inverse
//! variance:
//!
//! `m(x) = Σ wᵢ yᵢ / Σ wᵢ`, with `wᵢ = K((x - xᵢ) / h) / σᵢ²`.
//!
//! The bandwidth follows Scott's rule in `d` dimensions,
//! `h = n^(-1/(d+4)) · σ̄`, where `σ̄` is the mean per-dimension standard
//! deviation of the inputs. The reported spread combines the weighted
//! scatter of the neighbours with `1 / Σ wᵢ`, so it grows away from data.

use super::{Observation, Prediction, Surface, SurfaceFitter, column_std};
use crate::error::{Error, Result};

/// Bandwidth used when every input coincides.
const DEGENERATE_BANDWIDTH: f64 = 0.1;
const MIN_BANDWIDTH: f64 = 0.01;
/// Cap on the reported standard deviation, in nats.
const MAX_STD: f64 = 1e3;

/// Kernel-regression [`SurfaceFitter`].
///
/// Cheaper than the Gaussian process and always available; useful for
/// large histories or when the `gp` feature is disabled.
#[derive(Clone, Debug, Default)]
pub struct KernelRegressionFitter {
    bandwidth: Option<f64>,
}

impl KernelRegressionFitter {
    /// Creates a fitter that picks its bandwidth with Scott's rule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fitter with a fixed bandwidth in normalized units.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `bandwidth` is not positive.
    pub fn with_bandwidth(bandwidth: f64) -> Result<Self> {
        if !(bandwidth > 0.0 && bandwidth.is_finite()) {
            return Err(Error::InvalidConfig {
                name: "bandwidth",
                reason: format!("must be positive, got {bandwidth}"),
            });
        }
        Ok(Self {
            bandwidth: Some(bandwidth),
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn scotts_rule(observations: &[Observation]) -> f64 {
        let stds = column_std(observations);
        if stds.is_empty() {
            return DEGENERATE_BANDWIDTH;
        }
        let mean_std = stds.iter().sum::<f64>() / stds.len() as f64;
        if mean_std < f64::EPSILON {
            return DEGENERATE_BANDWIDTH;
        }
        let n = observations.len() as f64;
        let d = stds.len() as f64;
        (n.powf(-1.0 / (d + 4.0)) * mean_std).max(MIN_BANDWIDTH)
    }
}

impl SurfaceFitter for KernelRegressionFitter {
    fn name(&self) -> &'static str {
        "kernel-regression"
    }

    fn fit(&self, observations: &[Observation]) -> Result<Box<dyn Surface>> {
        if observations.is_empty() {
            return Err(Error::SurfaceFit("no observations to fit"));
        }
        let bandwidth = self
            .bandwidth
            .unwrap_or_else(|| Self::scotts_rule(observations));
        Ok(Box::new(KernelSurface {
            observations: observations.to_vec(),
            bandwidth,
        }))
    }
}

struct KernelSurface {
    observations: Vec<Observation>,
    bandwidth: f64,
}

impl Surface for KernelSurface {
    fn predict(&self, x: &[f64]) -> Prediction {
        let inv_h_sq = 1.0 / (self.bandwidth * self.bandwidth);
        let log_k: Vec<f64> = self
            .observations
            .iter()
            .map(|o| {
                let r_sq: f64 = o.x.iter().zip(x).map(|(a, b)| (a - b).powi(2)).sum();
                -0.5 * r_sq * inv_h_sq
            })
            .collect();
        // Kernels far from every observation underflow; work relative to the nearest.
        let max_log_k = log_k.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut sum_w = 0.0;
        let mut sum_wy = 0.0;
        for (o, &lk) in self.observations.iter().zip(&log_k) {
            let w = (lk - max_log_k).exp() / o.variance;
            sum_w += w;
            sum_wy += w * o.log_evidence;
        }
        let mean = sum_wy / sum_w;
        let scatter = self
            .observations
            .iter()
            .zip(&log_k)
            .map(|(o, &lk)| (lk - max_log_k).exp() / o.variance * (o.log_evidence - mean).powi(2))
            .sum::<f64>()
            / sum_w;
        // 1 / Σ wᵢ on the absolute kernel scale.
        let sparsity = (-max_log_k).exp() / sum_w;
        let std = (scatter + sparsity).sqrt().min(MAX_STD);
        Prediction { mean, std }
    }
}
