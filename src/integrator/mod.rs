//! Adaptive importance-sampling integrator for one intrinsic point.
//!
//! The integrator estimates the marginal likelihood
//!
//! `Z(θ) = ∫ L(θ, φ) π(φ) dφ`
//!
//! over the extrinsic parameters `φ` at a fixed intrinsic point `θ`.
//!
//! # Algorithm overview
//!
//! 1. **Proposal**: a fresh [`ProposalState`] is built from the prior:
//!    one adaptive histogram per extrinsic dimension.
//! 2. **Batch**: `batch_size` extrinsic vectors are drawn from the
//!    proposal and weighted by `w = L · π / q`. Non-finite likelihoods
//!    and domain errors become zero weights and are counted.
//! 3. **Accumulate**: each batch keeps its own streaming log-space sums.
//!    The estimate pools a window of batches, giving the evidence, its
//!    relative standard error, and the Kish effective sample size. Batches
//!    at the front of the window whose mean lies well below the rest were
//!    drawn before the proposal found the weight mass; they are dropped as
//!    burn-in.
//! 4. **Refine**: the proposal is pulled toward the batch's weight mass,
//!    with a floor that keeps every bin of the prior support alive.
//! 5. **Stop**: once the relative error meets the tolerance (with at least
//!    `min_converged_ess` effective samples) or the effective sample size
//!    meets its minimum, or the batch, sample, or wall-clock budget runs
//!    out, or the point is cancelled.
//!
//! A batch in which no sample carries weight does not refine the proposal
//! and counts toward `max_empty_batches`; exceeding it fails the point if
//! nothing was ever found. Its draws count against the sample budget, and
//! it stays in the estimate unless it falls to burn-in.
//!
//! A point cancelled before its first batch returns [`Error::Cancelled`]
//! and has no result at all.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `batch_size` | 1000 | Samples per batch |
//! | `min_batches` | 2 | Batches in the estimate before stopping rules apply |
//! | `max_batches` | 100 | Hard cap on batches |
//! | `max_samples` | `batch_size * max_batches` | Hard cap on draws |
//! | `relative_tolerance` | 0.05 | Target relative standard error |
//! | `min_effective_samples` | 1000 | ESS that also ends integration |
//! | `min_converged_ess` | 100 | ESS a converged result needs |
//! | `n_bins` | 50 | Histogram bins per extrinsic dimension |
//! | `adaptation_rate` | 0.5 | How far each batch moves the proposal |
//! | `proposal_floor` | 0.05 | Uniform mixture weight in every histogram |
//! | `max_empty_batches` | 10 | Consecutive all-zero batches tolerated |
//! | `time_budget` | none | Wall-clock limit per point |
//! | `seed` | random | Base seed; each point gets its own stream |
//!
//! # Examples
//!
//! ```
//! use rapid_pe::integrator::{IntegratorConfig, MonteCarloIntegrator};
//! use rapid_pe::prior::{ExtrinsicPrior, PriorDimension};
//! use rapid_pe::{IntegralStatus, IntrinsicPoint, LikelihoodError, PointId};
//!
//! let prior = ExtrinsicPrior::builder()
//!     .dimension("x", PriorDimension::uniform(-5.0, 5.0).unwrap())
//!     .build()
//!     .unwrap();
//! let lnl = |_: &[f64], x: &[f64]| -> Result<f64, LikelihoodError> { Ok(-0.5 * x[0] * x[0]) };
//!
//! let integrator = MonteCarloIntegrator::new(
//!     IntegratorConfig::builder().batch_size(500).seed(7).build().unwrap(),
//! );
//! let point = IntrinsicPoint::new(PointId(0), vec![1.4], 0, None);
//! let result = integrator.integrate(&point, &lnl, &prior).unwrap();
//!
//! // ∫ exp(-x²/2) dx / 10 ≈ √(2π) / 10
//! let expected = ((2.0 * std::f64::consts::PI).sqrt() / 10.0).ln();
//! assert_eq!(result.status, IntegralStatus::Converged);
//! assert!((result.log_evidence - expected).abs() < 5.0 * result.relative_error + 1e-3);
//! ```

mod accumulator;
mod cancel;

use core::time::Duration;
use std::time::Instant;

pub use cancel::CancelToken;

use self::accumulator::{BatchWindow, Estimate, WeightAccumulator};
use crate::error::{Error, Result};
use crate::likelihood::{Likelihood, LikelihoodError};
use crate::point::{IntegralResult, IntrinsicPoint};
use crate::prior::Prior;
use crate::proposal::ProposalState;
use crate::rng_util;
use crate::types::IntegralStatus;

/// Default number of samples per batch.
const DEFAULT_BATCH_SIZE: usize = 1000;
/// Default number of batches before stopping rules are consulted.
const DEFAULT_MIN_BATCHES: u32 = 2;
/// Default cap on batches.
const DEFAULT_MAX_BATCHES: u32 = 100;
/// Default target relative standard error.
const DEFAULT_RELATIVE_TOLERANCE: f64 = 0.05;
/// Default effective sample size that ends integration.
const DEFAULT_MIN_EFFECTIVE_SAMPLES: f64 = 1000.0;
/// Default effective sample size below which a result is never converged.
const DEFAULT_MIN_CONVERGED_ESS: f64 = 100.0;
/// Default histogram bins per extrinsic dimension.
const DEFAULT_N_BINS: usize = 50;
/// Default proposal adaptation rate.
const DEFAULT_ADAPTATION_RATE: f64 = 0.5;
/// Default uniform mixture weight in each histogram.
const DEFAULT_PROPOSAL_FLOOR: f64 = 0.05;
/// Default number of consecutive all-zero batches tolerated.
const DEFAULT_MAX_EMPTY_BATCHES: u32 = 10;

/// Numerical knobs of the integrator. Build with [`IntegratorConfig::builder`].
#[derive(Clone, Debug, PartialEq)]
pub struct IntegratorConfig {
    /// Samples per batch.
    pub batch_size: usize,
    /// Batches in the estimate before stopping rules apply.
    pub min_batches: u32,
    /// Hard cap on batches.
    pub max_batches: u32,
    /// Hard cap on draws.
    pub max_samples: u64,
    /// Target relative standard error of the evidence.
    pub relative_tolerance: f64,
    /// Effective sample size that also ends integration.
    pub min_effective_samples: f64,
    /// Effective sample size a converged result needs.
    pub min_converged_ess: f64,
    /// Histogram bins per extrinsic dimension.
    pub n_bins: usize,
    /// Fraction of the way each batch moves the proposal toward its weights.
    pub adaptation_rate: f64,
    /// Uniform mixture weight kept in every histogram.
    pub proposal_floor: f64,
    /// Consecutive all-zero batches tolerated before giving up.
    pub max_empty_batches: u32,
    /// Wall-clock limit per point.
    pub time_budget: Option<Duration>,
    /// Base seed; point `id` uses an independent stream derived from it.
    pub seed: Option<u64>,
}

impl IntegratorConfig {
    /// Returns a builder with every option at its default.
    #[must_use]
    pub fn builder() -> IntegratorConfigBuilder {
        IntegratorConfigBuilder::default()
    }
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            min_batches: DEFAULT_MIN_BATCHES,
            max_batches: DEFAULT_MAX_BATCHES,
            max_samples: DEFAULT_BATCH_SIZE as u64 * u64::from(DEFAULT_MAX_BATCHES),
            relative_tolerance: DEFAULT_RELATIVE_TOLERANCE,
            min_effective_samples: DEFAULT_MIN_EFFECTIVE_SAMPLES,
            min_converged_ess: DEFAULT_MIN_CONVERGED_ESS,
            n_bins: DEFAULT_N_BINS,
            adaptation_rate: DEFAULT_ADAPTATION_RATE,
            proposal_floor: DEFAULT_PROPOSAL_FLOOR,
            max_empty_batches: DEFAULT_MAX_EMPTY_BATCHES,
            time_budget: None,
            seed: None,
        }
    }
}

/// Builder for [`IntegratorConfig`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use rapid_pe::integrator::IntegratorConfig;
///
/// let config = IntegratorConfig::builder()
///     .batch_size(2000)
///     .relative_tolerance(0.02)
///     .time_budget(Duration::from_secs(600))
///     .seed(42)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_samples, 2000 * 100);
/// ```
#[derive(Debug, Clone, Default)]
pub struct IntegratorConfigBuilder {
    batch_size: Option<usize>,
    min_batches: Option<u32>,
    max_batches: Option<u32>,
    max_samples: Option<u64>,
    relative_tolerance: Option<f64>,
    min_effective_samples: Option<f64>,
    min_converged_ess: Option<f64>,
    n_bins: Option<usize>,
    adaptation_rate: Option<f64>,
    proposal_floor: Option<f64>,
    max_empty_batches: Option<u32>,
    time_budget: Option<Duration>,
    seed: Option<u64>,
}

impl IntegratorConfigBuilder {
    /// Sets the number of samples per batch.
    ///
    /// Default: 1000.
    #[must_use]
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n);
        self
    }

    /// Sets how many batches the estimate must hold before the stopping
    /// rules are consulted.
    ///
    /// Default: 2.
    #[must_use]
    pub fn min_batches(mut self, n: u32) -> Self {
        self.min_batches = Some(n);
        self
    }

    /// Sets the hard cap on batches.
    ///
    /// Default: 100.
    #[must_use]
    pub fn max_batches(mut self, n: u32) -> Self {
        self.max_batches = Some(n);
        self
    }

    /// Sets the hard cap on total draws.
    ///
    /// Default: `batch_size * max_batches`.
    #[must_use]
    pub fn max_samples(mut self, n: u64) -> Self {
        self.max_samples = Some(n);
        self
    }

    /// Sets the target relative standard error. Zero disables the rule.
    ///
    /// Default: 0.05.
    #[must_use]
    pub fn relative_tolerance(mut self, tol: f64) -> Self {
        self.relative_tolerance = Some(tol);
        self
    }

    /// Sets the effective sample size that ends integration. Infinity
    /// disables the rule.
    ///
    /// Default: 1000.
    #[must_use]
    pub fn min_effective_samples(mut self, ess: f64) -> Self {
        self.min_effective_samples = Some(ess);
        self
    }

    /// Sets the effective sample size a result needs to count as
    /// converged, however small its relative error.
    ///
    /// Default: 100.
    #[must_use]
    pub fn min_converged_ess(mut self, ess: f64) -> Self {
        self.min_converged_ess = Some(ess);
        self
    }

    /// Sets the number of histogram bins per extrinsic dimension.
    ///
    /// Default: 50.
    #[must_use]
    pub fn n_bins(mut self, n: usize) -> Self {
        self.n_bins = Some(n);
        self
    }

    /// Sets the proposal adaptation rate in `(0, 1]`.
    ///
    /// Default: 0.5.
    #[must_use]
    pub fn adaptation_rate(mut self, rate: f64) -> Self {
        self.adaptation_rate = Some(rate);
        self
    }

    /// Sets the uniform mixture weight in `(0, 1]` kept in every histogram.
    ///
    /// Default: 0.05.
    #[must_use]
    pub fn proposal_floor(mut self, floor: f64) -> Self {
        self.proposal_floor = Some(floor);
        self
    }

    /// Sets how many consecutive all-zero batches are tolerated.
    ///
    /// Default: 10.
    #[must_use]
    pub fn max_empty_batches(mut self, n: u32) -> Self {
        self.max_empty_batches = Some(n);
        self
    }

    /// Sets a wall-clock budget per point.
    ///
    /// Default: unlimited.
    #[must_use]
    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Sets the base random seed for reproducibility.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first invalid option.
    pub fn build(self) -> Result<IntegratorConfig> {
        let defaults = IntegratorConfig::default();
        let batch_size = self.batch_size.unwrap_or(defaults.batch_size);
        let min_batches = self.min_batches.unwrap_or(defaults.min_batches);
        let max_batches = self.max_batches.unwrap_or(defaults.max_batches);
        let max_samples = self
            .max_samples
            .unwrap_or(batch_size as u64 * u64::from(max_batches));
        let relative_tolerance = self
            .relative_tolerance
            .unwrap_or(defaults.relative_tolerance);
        let min_effective_samples = self
            .min_effective_samples
            .unwrap_or(defaults.min_effective_samples);
        let min_converged_ess = self
            .min_converged_ess
            .unwrap_or(defaults.min_converged_ess);
        let adaptation_rate = self.adaptation_rate.unwrap_or(defaults.adaptation_rate);
        let proposal_floor = self.proposal_floor.unwrap_or(defaults.proposal_floor);

        if batch_size < 2 {
            return Err(invalid("batch_size", "must be at least 2"));
        }
        if max_batches == 0 || min_batches > max_batches {
            return Err(invalid(
                "max_batches",
                format!("must be positive and >= min_batches ({min_batches})"),
            ));
        }
        if max_samples < batch_size as u64 {
            return Err(invalid("max_samples", "must allow at least one batch"));
        }
        if relative_tolerance.is_nan() || relative_tolerance < 0.0 {
            return Err(invalid("relative_tolerance", "must be non-negative"));
        }
        if min_effective_samples.is_nan() || min_effective_samples <= 0.0 {
            return Err(invalid("min_effective_samples", "must be positive"));
        }
        if !(min_converged_ess >= 0.0 && min_converged_ess.is_finite()) {
            return Err(invalid("min_converged_ess", "must be non-negative and finite"));
        }
        if !(adaptation_rate > 0.0 && adaptation_rate <= 1.0) {
            return Err(invalid("adaptation_rate", "must be in (0, 1]"));
        }
        if !(proposal_floor > 0.0 && proposal_floor <= 1.0) {
            return Err(invalid("proposal_floor", "must be in (0, 1]"));
        }

        Ok(IntegratorConfig {
            batch_size,
            min_batches,
            max_batches,
            max_samples,
            relative_tolerance,
            min_effective_samples,
            min_converged_ess,
            n_bins: self.n_bins.unwrap_or(defaults.n_bins).max(1),
            adaptation_rate,
            proposal_floor,
            max_empty_batches: self.max_empty_batches.unwrap_or(defaults.max_empty_batches),
            time_budget: self.time_budget,
            seed: self.seed,
        })
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidConfig {
        name,
        reason: reason.into(),
    }
}

/// Why the batch loop ended.
enum Halt {
    /// Tolerance or effective-sample target met.
    Target,
    /// Batch or sample cap reached.
    Budget,
    /// Wall-clock budget exhausted.
    Timeout,
    /// Cancelled through a [`CancelToken`].
    Cancelled,
    /// Too many consecutive all-zero batches.
    Empty,
}

/// Importance-sampling integrator over the extrinsic parameters.
///
/// Holds only configuration; every call to [`integrate`](Self::integrate)
/// builds and owns its own proposal, so one integrator can serve many
/// points concurrently.
#[derive(Clone, Debug, Default)]
pub struct MonteCarloIntegrator {
    config: IntegratorConfig,
}

impl MonteCarloIntegrator {
    /// Creates an integrator with the given configuration.
    #[must_use]
    pub fn new(config: IntegratorConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Integrates the likelihood over the extrinsic prior at `point`.
    ///
    /// # Errors
    ///
    /// Returns `Error::LikelihoodUnusable` if the evaluator reports
    /// [`LikelihoodError::Unusable`]; point-level problems are reported
    /// through the result's status instead.
    pub fn integrate(
        &self,
        point: &IntrinsicPoint,
        likelihood: &dyn Likelihood,
        prior: &dyn Prior,
    ) -> Result<IntegralResult> {
        self.integrate_with(point, likelihood, prior, None)
    }

    /// Like [`integrate`](Self::integrate), polling `cancel` between batches.
    ///
    /// A point cancelled after its first batch resolves with what it has.
    ///
    /// # Errors
    ///
    /// Returns `Error::LikelihoodUnusable` if the evaluator reports
    /// [`LikelihoodError::Unusable`], or `Error::Cancelled` if `cancel`
    /// fired before a single sample was drawn. The point should then stay
    /// pending.
    #[allow(clippy::too_many_lines)]
    pub fn integrate_with(
        &self,
        point: &IntrinsicPoint,
        likelihood: &dyn Likelihood,
        prior: &dyn Prior,
        cancel: Option<&CancelToken>,
    ) -> Result<IntegralResult> {
        let cfg = &self.config;

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("integrate", point = point.id.0).entered();

        let mut proposal =
            ProposalState::from_prior(prior, cfg.n_bins, cfg.adaptation_rate, cfg.proposal_floor)?;
        let mut rng = rng_util::stream_rng(cfg.seed, point.id.0);
        let deadline = cfg.time_budget.map(|budget| Instant::now() + budget);

        let n_dims = prior.n_dims();
        let mut samples: Vec<Vec<f64>> = vec![Vec::with_capacity(n_dims); cfg.batch_size];
        let mut log_q = vec![0.0; cfg.batch_size];
        let mut log_w = vec![0.0; cfg.batch_size];
        let mut weights = vec![0.0; cfg.batch_size];

        let mut window = BatchWindow::new();
        let mut batches: u32 = 0;
        let mut empty_streak: u32 = 0;
        let mut nonfinite_count: u64 = 0;
        let mut domain_error_count: u64 = 0;

        let halt = loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                if batches == 0 {
                    trace_debug!(point = point.id.0, "cancelled before the first batch");
                    return Err(Error::Cancelled);
                }
                break Halt::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Halt::Timeout;
            }
            if batches >= cfg.max_batches
                || window.count() + cfg.batch_size as u64 > cfg.max_samples
            {
                break Halt::Budget;
            }

            // Draw the whole batch before evaluating so the random stream
            // does not depend on evaluation order.
            for (x, q) in samples.iter_mut().zip(log_q.iter_mut()) {
                *q = proposal.sample_into(&mut rng, x);
            }

            for ((x, &q), lw) in samples.iter().zip(&log_q).zip(log_w.iter_mut()) {
                *lw = match likelihood.log_likelihood(&point.params, x) {
                    Ok(lnl) if lnl == f64::NEG_INFINITY => f64::NEG_INFINITY,
                    Ok(lnl) if lnl.is_finite() => {
                        let value = lnl + prior.log_density(x) - q;
                        if value.is_nan() || value == f64::INFINITY {
                            nonfinite_count += 1;
                            f64::NEG_INFINITY
                        } else {
                            value
                        }
                    }
                    Ok(_) => {
                        nonfinite_count += 1;
                        f64::NEG_INFINITY
                    }
                    Err(LikelihoodError::Domain(_)) => {
                        domain_error_count += 1;
                        f64::NEG_INFINITY
                    }
                    Err(LikelihoodError::Unusable(reason)) => {
                        return Err(Error::LikelihoodUnusable(reason));
                    }
                };
            }

            batches += 1;
            let mut batch = WeightAccumulator::new();
            batch.extend(&log_w);
            let empty = batch.nonzero() == 0;
            window.push(batch);

            if empty {
                empty_streak += 1;
                trace_debug!(
                    point = point.id.0,
                    batch = batches,
                    empty_streak,
                    "batch carried no weight"
                );
                if empty_streak > cfg.max_empty_batches {
                    break Halt::Empty;
                }
                continue;
            }
            empty_streak = 0;

            let batch_max = log_w.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            for (w, &lw) in weights.iter_mut().zip(&log_w) {
                *w = (lw - batch_max).exp();
            }
            proposal.refine(&samples, &weights);

            let estimate = window.estimate();
            trace_debug!(
                point = point.id.0,
                batch = batches,
                log_evidence = estimate.log_evidence,
                relative_error = estimate.relative_error,
                effective_samples = estimate.effective_samples,
                burn_in = window.discarded(),
                "batch complete"
            );

            if window.len() >= cfg.min_batches as usize
                && (self.meets_tolerance(&estimate)
                    || estimate.effective_samples >= cfg.min_effective_samples)
            {
                break Halt::Target;
            }
        };

        let estimate = window.estimate();
        let relative_error = estimate.relative_error;
        let (status, message) = if window.nonzero() == 0 {
            let reason = if domain_error_count == window.count() && window.count() > 0 {
                "likelihood reported a domain error for every sample".to_string()
            } else {
                format!(
                    "no sample carried weight in {batches} batch(es) ({nonfinite_count} non-finite, {domain_error_count} domain errors)"
                )
            };
            (IntegralStatus::Failed, Some(reason))
        } else if self.meets_tolerance(&estimate) {
            (IntegralStatus::Converged, None)
        } else if relative_error <= cfg.relative_tolerance {
            (
                IntegralStatus::LowConfidence,
                Some("effective sample size below the convergence floor".to_string()),
            )
        } else {
            let reason = match halt {
                Halt::Target => "effective sample target met above tolerance",
                Halt::Budget => "sample budget exhausted before tolerance",
                Halt::Timeout => "time budget exhausted before tolerance",
                Halt::Cancelled => "cancelled before tolerance",
                Halt::Empty => "weight vanished in consecutive batches",
            };
            (IntegralStatus::LowConfidence, Some(reason.to_string()))
        };

        if nonfinite_count > 0 {
            trace_debug!(
                point = point.id.0,
                nonfinite_count,
                "excluded non-finite likelihood values"
            );
        }

        let result = IntegralResult {
            status,
            log_evidence: estimate.log_evidence,
            relative_error,
            effective_samples: estimate.effective_samples,
            samples_drawn: window.count(),
            nonzero_samples: window.nonzero(),
            batches,
            nonfinite_count,
            domain_error_count,
            message,
        };

        match status {
            IntegralStatus::Converged => trace_info!(
                point = point.id.0,
                log_evidence = result.log_evidence,
                relative_error,
                samples = result.samples_drawn,
                "point converged"
            ),
            _ => trace_warn!(
                point = point.id.0,
                status = %status,
                relative_error,
                samples = result.samples_drawn,
                "point did not converge"
            ),
        }

        Ok(result)
    }

    fn meets_tolerance(&self, estimate: &Estimate) -> bool {
        estimate.relative_error <= self.config.relative_tolerance
            && estimate.effective_samples >= self.config.min_converged_ess
    }
}
