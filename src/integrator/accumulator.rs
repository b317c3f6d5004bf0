//! Streaming importance-weight statistics in log space.
//!
//! Weights are kept as `exp(lw - max_log)` sums so that log-likelihoods of
//! a few hundred (routine for loud signals) neither overflow nor lose the
//! small weights entirely. When a larger weight arrives, the running sums
//! are rescaled to the new maximum.
//!
//! Each batch gets its own [`WeightAccumulator`]. A [`BatchWindow`] pools
//! the batches that form the estimate and drops burn-in batches from its
//! front: a batch drawn from an early proposal that missed most of the
//! weight mass sits far below what the adapted proposal produces, and its
//! own spread cannot reveal that.

/// Batch means this many standard errors below the rest of the window are
/// burn-in.
const BURN_IN_SIGMAS: f64 = 3.0;

/// Running sums of importance weights for one batch.
#[derive(Clone, Debug)]
pub(crate) struct WeightAccumulator {
    /// All draws, including zero-weight ones.
    count: u64,
    /// Draws with a positive, finite weight.
    nonzero: u64,
    /// Largest log weight seen so far.
    max_log: f64,
    /// `Σ exp(lw - max_log)`.
    sum: f64,
    /// `Σ exp(2 (lw - max_log))`.
    sum_sq: f64,
}

impl WeightAccumulator {
    pub(crate) fn new() -> Self {
        Self {
            count: 0,
            nonzero: 0,
            max_log: f64::NEG_INFINITY,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Adds one log weight. Negative infinity is a zero weight.
    pub(crate) fn push(&mut self, log_weight: f64) {
        self.count += 1;
        if log_weight == f64::NEG_INFINITY {
            return;
        }
        if log_weight > self.max_log {
            let shift = self.max_log - log_weight;
            self.sum *= shift.exp();
            self.sum_sq *= (2.0 * shift).exp();
            self.max_log = log_weight;
        }
        let r = (log_weight - self.max_log).exp();
        self.sum += r;
        self.sum_sq += r * r;
        self.nonzero += 1;
    }

    pub(crate) fn extend(&mut self, log_weights: &[f64]) {
        for &lw in log_weights {
            self.push(lw);
        }
    }

    #[cfg(test)]
    fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn nonzero(&self) -> u64 {
        self.nonzero
    }

    /// Sums rescaled to a common `max_log`.
    #[allow(clippy::cast_precision_loss)]
    fn moments(&self, max_log: f64) -> Moments {
        let n = self.count as f64;
        if self.nonzero == 0 {
            return Moments {
                count: n,
                ..Moments::default()
            };
        }
        let scale = (self.max_log - max_log).exp();
        let sum = self.sum * scale;
        let sum_sq = self.sum_sq * scale * scale;
        let spread = if self.count < 2 {
            0.0
        } else {
            let mean = sum / n;
            ((sum_sq / n - mean * mean) * n / (n - 1.0)).max(0.0) * n
        };
        Moments {
            count: n,
            sum,
            sum_sq,
            spread,
        }
    }
}

/// Weight sums of several batches on a common scale.
#[derive(Clone, Copy, Debug, Default)]
struct Moments {
    count: f64,
    sum: f64,
    sum_sq: f64,
    /// `Σ_b n_b s_b²` with `s_b²` the within-batch sample variance.
    spread: f64,
}

impl Moments {
    fn merge(self, other: Self) -> Self {
        Self {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
            spread: self.spread + other.spread,
        }
    }

    fn mean(&self) -> f64 {
        self.sum / self.count
    }

    /// Variance of the pooled mean. Batches are independent given their
    /// proposals, so only within-batch spread enters.
    fn mean_variance(&self) -> f64 {
        self.spread / (self.count * self.count)
    }

    /// Pooled per-draw variance.
    fn draw_variance(&self) -> f64 {
        self.spread / self.count
    }
}

/// The batches that currently form the estimate.
#[derive(Clone, Debug)]
pub(crate) struct BatchWindow {
    batches: Vec<WeightAccumulator>,
    start: usize,
    count: u64,
    nonzero: u64,
}

impl BatchWindow {
    pub(crate) fn new() -> Self {
        Self {
            batches: Vec::new(),
            start: 0,
            count: 0,
            nonzero: 0,
        }
    }

    /// Appends a finished batch and drops any burn-in batches it exposes.
    pub(crate) fn push(&mut self, batch: WeightAccumulator) {
        self.count += batch.count;
        self.nonzero += batch.nonzero;
        self.batches.push(batch);
        self.trim();
    }

    fn trim(&mut self) {
        while self.batches.len() - self.start >= 2 {
            let window = &self.batches[self.start..];
            let max_log = common_max(window);
            if max_log == f64::NEG_INFINITY {
                return;
            }
            let first = window[0].moments(max_log);
            let rest = pool(&window[1..], max_log);
            // Under the hypothesis that the first batch is as good as the
            // rest, its mean scatters by at least the rest's per-draw spread.
            let first_variance = first
                .mean_variance()
                .max(rest.draw_variance() / first.count);
            let noise = (first_variance + rest.mean_variance()).sqrt();
            let gap = rest.mean() - first.mean();
            if gap > BURN_IN_SIGMAS * noise && gap > 1e-12 * rest.mean() {
                self.start += 1;
            } else {
                return;
            }
        }
    }

    /// Draws over every batch, discarded or not.
    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    /// Positive-weight draws over every batch.
    pub(crate) fn nonzero(&self) -> u64 {
        self.nonzero
    }

    /// Batches in the estimate.
    pub(crate) fn len(&self) -> usize {
        self.batches.len() - self.start
    }

    /// Batches dropped as burn-in.
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) fn discarded(&self) -> usize {
        self.start
    }

    /// Statistics of the pooled window.
    pub(crate) fn estimate(&self) -> Estimate {
        let window = &self.batches[self.start..];
        let max_log = common_max(window);
        if max_log == f64::NEG_INFINITY {
            return Estimate::EMPTY;
        }
        let m = pool(window, max_log);
        let log_evidence = max_log + m.sum.ln() - m.count.ln();
        let relative_error = if m.count < 2.0 {
            f64::INFINITY
        } else {
            m.mean_variance().sqrt() / m.mean()
        };
        Estimate {
            log_evidence,
            relative_error,
            effective_samples: m.sum * m.sum / m.sum_sq,
        }
    }
}

fn common_max(batches: &[WeightAccumulator]) -> f64 {
    batches
        .iter()
        .filter(|b| b.nonzero > 0)
        .map(|b| b.max_log)
        .fold(f64::NEG_INFINITY, f64::max)
}

fn pool(batches: &[WeightAccumulator], max_log: f64) -> Moments {
    batches
        .iter()
        .map(|b| b.moments(max_log))
        .fold(Moments::default(), Moments::merge)
}

/// Evidence estimate of a window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Estimate {
    /// `ln(mean weight)`.
    pub(crate) log_evidence: f64,
    /// Standard error of the mean weight divided by the mean weight.
    pub(crate) relative_error: f64,
    /// Kish effective sample size `(Σw)² / Σw²`.
    pub(crate) effective_samples: f64,
}

impl Estimate {
    const EMPTY: Self = Self {
        log_evidence: f64::NEG_INFINITY,
        relative_error: f64::INFINITY,
        effective_samples: 0.0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(log_weights: &[f64]) -> WeightAccumulator {
        let mut acc = WeightAccumulator::new();
        acc.extend(log_weights);
        acc
    }

    fn window(batches: &[&[f64]]) -> BatchWindow {
        let mut w = BatchWindow::new();
        for b in batches {
            w.push(batch(b));
        }
        w
    }

    #[test]
    fn test_equal_weights() {
        let est = window(&[&[2.0_f64.ln(); 100]]).estimate();
        assert!((est.log_evidence - 2.0_f64.ln()).abs() < 1e-12);
        assert!(est.relative_error < 1e-6);
        assert!((est.effective_samples - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weights_dilute_mean() {
        let acc = batch(&[0.0, f64::NEG_INFINITY]);
        assert_eq!(acc.count(), 2);
        assert_eq!(acc.nonzero(), 1);
        let est = window(&[&[0.0, f64::NEG_INFINITY]]).estimate();
        assert!((est.log_evidence - 0.5_f64.ln()).abs() < 1e-12);
        assert!((est.effective_samples - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rescaling_matches_direct_sum() {
        let log_weights = [-700.0, 10.0, 500.0, 499.0, -3.0];
        let est = window(&[&log_weights]).estimate();
        let direct = crate::rng_util::log_sum_exp(&log_weights) - 5.0_f64.ln();
        assert!((est.log_evidence - direct).abs() < 1e-12);
        // Two weights dominate, in ratio e:1.
        let e = core::f64::consts::E;
        let expected_ess = (e + 1.0).powi(2) / (e * e + 1.0);
        assert!((est.effective_samples - expected_ess).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window() {
        let est = BatchWindow::new().estimate();
        assert_eq!(est.log_evidence, f64::NEG_INFINITY);
        assert_eq!(est.relative_error, f64::INFINITY);
        assert_eq!(est.effective_samples, 0.0);
    }

    #[test]
    fn test_relative_error_matches_sample_formula() {
        let weights = [1.0_f64, 2.0, 3.0, 4.0];
        let est = window(&[&weights.map(f64::ln)]).estimate();
        let n = 4.0;
        let mean = 2.5;
        let var = weights.iter().map(|w| (w - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let expected = (var / n).sqrt() / mean;
        assert!((est.relative_error - expected).abs() < 1e-12);
    }

    #[test]
    fn test_consistent_batches_are_pooled() {
        let a = [1.0_f64, 2.0, 3.0, 4.0].map(f64::ln);
        let b = [4.0_f64, 3.0, 2.0, 1.0].map(f64::ln);
        let w = window(&[&a, &b]);
        assert_eq!(w.len(), 2);
        assert_eq!(w.discarded(), 0);
        assert!((w.estimate().log_evidence - 2.5_f64.ln()).abs() < 1e-12);
        // Between-batch spread is not counted twice.
        let expected = (2.0 * 4.0 * (5.0 / 3.0) / 64.0_f64).sqrt() / 2.5;
        assert!((w.estimate().relative_error - expected).abs() < 1e-12);
    }

    #[test]
    fn test_batch_that_missed_the_mass_is_burn_in() {
        // The first batch saw only the tail of the integrand.
        let missed: Vec<f64> = (0..100).map(|i| -10.0 - f64::from(i) * 0.01).collect();
        let found: Vec<f64> = (0..100).map(|i| f64::from(i % 5) * 0.01).collect();
        let w = window(&[&missed, &found, &found]);
        assert_eq!(w.discarded(), 1);
        assert_eq!(w.len(), 2);
        assert_eq!(w.count(), 300);
        assert!(w.estimate().log_evidence > -0.01);
    }

    #[test]
    fn test_empty_batch_before_mass_is_burn_in() {
        let found = [0.0; 50];
        let w = window(&[&[f64::NEG_INFINITY; 50], &found, &found]);
        assert_eq!(w.discarded(), 1);
        assert_eq!(w.nonzero(), 100);
        assert!(w.estimate().log_evidence.abs() < 1e-12);
    }

    #[test]
    fn test_sparse_support_keeps_unlucky_batches() {
        // One draw in fifty carries weight; a batch without a hit is
        // ordinary scatter, not burn-in.
        let mut sparse = vec![f64::NEG_INFINITY; 50];
        sparse[7] = 0.0;
        let w = window(&[&[f64::NEG_INFINITY; 50], &sparse, &sparse, &sparse]);
        assert_eq!(w.discarded(), 0);
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn test_nothing_found_keeps_every_batch() {
        let w = window(&[&[f64::NEG_INFINITY; 10], &[f64::NEG_INFINITY; 10]]);
        assert_eq!(w.len(), 2);
        assert_eq!(w.nonzero(), 0);
        assert_eq!(w.estimate(), Estimate::EMPTY);
    }
}
