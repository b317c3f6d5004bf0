//! Aggregate evidence over the whole intrinsic prior.
//!
//! The global convergence test compares, between successive generations,
//! an estimate of `ln ∫ Z(θ) π(θ) dθ` with `π` uniform over the intrinsic
//! bounds. The integrand is the fitted evidence surface, evaluated on a
//! fixed set of probe points in the unit cube:
//!
//! `ln Ẑ = logsumexp(ln Ẑ(pⱼ)) - ln M`.
//!
//! Probes are drawn once per scheduler, so two generations are always
//! compared on the same quadrature nodes.

use crate::rng_util;

/// Monte Carlo quadrature over fixed probe points.
pub(crate) struct ProbeSet {
    probes: Vec<Vec<f64>>,
}

impl ProbeSet {
    pub(crate) fn new(n_probes: usize, n_dims: usize, rng: &mut fastrand::Rng) -> Self {
        let probes = (0..n_probes)
            .map(|_| (0..n_dims).map(|_| rng.f64()).collect())
            .collect();
        Self { probes }
    }

    /// Integrates `exp(log_evidence)` over the unit cube, in log space.
    /// Returns `None` without probes.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn log_evidence(&self, log_evidence: impl Fn(&[f64]) -> f64) -> Option<f64> {
        if self.probes.is_empty() {
            return None;
        }
        let values: Vec<f64> = self.probes.iter().map(|p| log_evidence(p)).collect();
        Some(rng_util::log_sum_exp(&values) - (values.len() as f64).ln())
    }
}
