//! Closed-form test likelihood.
//!
//! [`GaussianLikelihood`] is an isotropic Gaussian in both the intrinsic
//! and the extrinsic parameters. Over a uniform extrinsic prior its
//! evidence has a closed form ([`GaussianLikelihood::analytic_log_evidence`]),
//! which makes it the reference for integrator accuracy tests, benchmarks,
//! and the demo.

use crate::likelihood::{Likelihood, LikelihoodError};
use crate::space::Bounds;

/// `ln L = -½ Σ ((θ - μθ)/σθ)² - ½ Σ ((φ - μφ)/σφ)²`.
///
/// The peak value is `ln L = 0`.
#[derive(Clone, Debug)]
pub struct GaussianLikelihood {
    intrinsic_mean: Vec<f64>,
    intrinsic_sigma: f64,
    extrinsic_mean: Vec<f64>,
    extrinsic_sigma: f64,
}

impl GaussianLikelihood {
    /// Creates the likelihood. Both widths must be positive.
    #[must_use]
    pub fn new(
        intrinsic_mean: Vec<f64>,
        intrinsic_sigma: f64,
        extrinsic_mean: Vec<f64>,
        extrinsic_sigma: f64,
    ) -> Self {
        Self {
            intrinsic_mean,
            intrinsic_sigma,
            extrinsic_mean,
            extrinsic_sigma,
        }
    }

    /// Location of the intrinsic peak.
    #[must_use]
    pub fn intrinsic_mean(&self) -> &[f64] {
        &self.intrinsic_mean
    }

    fn intrinsic_term(&self, intrinsic: &[f64]) -> f64 {
        -0.5 * intrinsic
            .iter()
            .zip(&self.intrinsic_mean)
            .map(|(x, m)| ((x - m) / self.intrinsic_sigma).powi(2))
            .sum::<f64>()
    }

    /// Exact `ln Z(θ)` when every extrinsic dimension has a uniform prior
    /// over the matching entry of `bounds`.
    #[must_use]
    pub fn analytic_log_evidence(&self, intrinsic: &[f64], bounds: &[Bounds]) -> f64 {
        let s = self.extrinsic_sigma;
        let extrinsic: f64 = self
            .extrinsic_mean
            .iter()
            .zip(bounds)
            .map(|(&m, b)| {
                let mass = norm_cdf((b.high - m) / s) - norm_cdf((b.low - m) / s);
                (s * (2.0 * core::f64::consts::PI).sqrt() * mass / b.width()).ln()
            })
            .sum();
        self.intrinsic_term(intrinsic) + extrinsic
    }
}

impl Likelihood for GaussianLikelihood {
    fn log_likelihood(&self, intrinsic: &[f64], extrinsic: &[f64]) -> Result<f64, LikelihoodError> {
        if extrinsic.len() != self.extrinsic_mean.len() {
            return Err(LikelihoodError::Domain(format!(
                "expected {} extrinsic values, got {}",
                self.extrinsic_mean.len(),
                extrinsic.len()
            )));
        }
        let outer = -0.5
            * extrinsic
                .iter()
                .zip(&self.extrinsic_mean)
                .map(|(x, m)| ((x - m) / self.extrinsic_sigma).powi(2))
                .sum::<f64>();
        Ok(self.intrinsic_term(intrinsic) + outer)
    }

    fn check(&self) -> Result<(), LikelihoodError> {
        if self.intrinsic_sigma > 0.0 && self.extrinsic_sigma > 0.0 {
            Ok(())
        } else {
            Err(LikelihoodError::Unusable(
                "widths must be positive".to_string(),
            ))
        }
    }
}

/// Standard normal CDF (Abramowitz and Stegun 26.2.17).
fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }
    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let poly = t
        * (0.319_381_530
            + t * (-0.356_563_782 + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    let pdf = (-0.5 * x * x).exp() / (2.0 * core::f64::consts::PI).sqrt();
    let upper = pdf * poly;
    if x >= 0.0 { 1.0 - upper } else { upper }
}
