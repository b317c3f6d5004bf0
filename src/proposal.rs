//! Adaptive importance-sampling proposal over the extrinsic parameters.
//!
//! Each extrinsic dimension gets an independent piecewise-constant density
//! (a histogram with equal-width bins over the prior support). The joint
//! proposal is the product of the per-dimension densities.
//!
//! After each batch, every histogram is pulled toward the marginal of the
//! importance-weight mass it observed, so bins that contributed most of
//! the integral get sampled more often. A floor mixes a uniform component
//! back in, so no bin ever drops to zero density and no mode inside the
//! prior support can be starved of samples.

use crate::error::{Error, Result};
use crate::prior::Prior;

/// Per-point adaptive proposal state.
///
/// Owned by exactly one integration; created fresh for each point and
/// dropped when the point resolves.
#[derive(Clone, Debug)]
pub struct ProposalState {
    dims: Vec<AdaptiveHistogram>,
    adaptation_rate: f64,
    floor: f64,
}

impl ProposalState {
    /// Builds a proposal whose histograms start at the prior density
    /// (evaluated at bin centres, then floored).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for zero bins, an adaptation rate
    /// outside `(0, 1]`, or a floor outside `(0, 1]`.
    pub fn from_prior(
        prior: &dyn Prior,
        n_bins: usize,
        adaptation_rate: f64,
        floor: f64,
    ) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::InvalidConfig {
                name: "n_bins",
                reason: "at least one bin is required".into(),
            });
        }
        if !(adaptation_rate > 0.0 && adaptation_rate <= 1.0) {
            return Err(Error::InvalidConfig {
                name: "adaptation_rate",
                reason: format!("must be in (0, 1], got {adaptation_rate}"),
            });
        }
        if !(floor > 0.0 && floor <= 1.0) {
            return Err(Error::InvalidConfig {
                name: "proposal_floor",
                reason: format!("must be in (0, 1], got {floor}"),
            });
        }

        let dims = (0..prior.n_dims())
            .map(|d| AdaptiveHistogram::from_density(prior, d, n_bins, floor))
            .collect();
        Ok(Self {
            dims,
            adaptation_rate,
            floor,
        })
    }

    /// Number of dimensions.
    #[must_use]
    pub fn n_dims(&self) -> usize {
        self.dims.len()
    }

    /// Draws one extrinsic vector into `out`, returning its joint log
    /// proposal density.
    pub fn sample_into(&self, rng: &mut fastrand::Rng, out: &mut Vec<f64>) -> f64 {
        out.clear();
        let mut log_q = 0.0;
        for hist in &self.dims {
            let (x, q) = hist.sample(rng);
            out.push(x);
            log_q += q.ln();
        }
        log_q
    }

    /// Joint log density at `x`.
    #[must_use]
    pub fn log_density(&self, x: &[f64]) -> f64 {
        self.dims
            .iter()
            .zip(x)
            .map(|(h, &v)| h.density(v).ln())
            .sum()
    }

    /// Smallest bin probability across all dimensions.
    #[must_use]
    pub fn min_bin_probability(&self) -> f64 {
        self.dims
            .iter()
            .flat_map(|h| h.probs.iter().copied())
            .fold(f64::INFINITY, f64::min)
    }

    /// Pulls every histogram toward the weight mass of one batch.
    ///
    /// `samples[i]` is an extrinsic vector and `weights[i]` its importance
    /// weight on any common scale (only ratios matter). Batches with no
    /// positive weight leave the proposal unchanged.
    pub fn refine(&mut self, samples: &[Vec<f64>], weights: &[f64]) {
        let total: f64 = weights.iter().filter(|w| w.is_finite()).sum();
        if total <= 0.0 || !total.is_finite() {
            return;
        }
        for (d, hist) in self.dims.iter_mut().enumerate() {
            let mut mass = vec![0.0; hist.probs.len()];
            for (x, &w) in samples.iter().zip(weights) {
                if w > 0.0 && w.is_finite() {
                    mass[hist.bin_of(x[d])] += w / total;
                }
            }
            hist.blend(&mass, self.adaptation_rate, self.floor);
        }
    }
}

/// Equal-width histogram density over one dimension's support.
#[derive(Clone, Debug)]
struct AdaptiveHistogram {
    low: f64,
    high: f64,
    width: f64,
    probs: Vec<f64>,
    cdf: Vec<f64>,
}

impl AdaptiveHistogram {
    #[allow(clippy::cast_precision_loss)]
    fn from_density(prior: &dyn Prior, dim: usize, n_bins: usize, floor: f64) -> Self {
        let bounds = prior.bounds(dim);
        let width = bounds.width() / n_bins as f64;
        let raw: Vec<f64> = (0..n_bins)
            .map(|i| {
                let centre = bounds.low + (i as f64 + 0.5) * width;
                let p = prior.density(dim, centre);
                if p.is_finite() && p > 0.0 { p } else { 0.0 }
            })
            .collect();
        let mut hist = Self {
            low: bounds.low,
            high: bounds.high,
            width,
            probs: vec![1.0 / n_bins as f64; n_bins],
            cdf: Vec::new(),
        };
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            let target: Vec<f64> = raw.iter().map(|p| p / total).collect();
            hist.blend(&target, 1.0, floor);
        } else {
            hist.rebuild_cdf();
        }
        hist
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn bin_of(&self, x: f64) -> usize {
        let i = ((x - self.low) / self.width).floor();
        if i <= 0.0 {
            0
        } else {
            (i as usize).min(self.probs.len() - 1)
        }
    }

    fn density(&self, x: f64) -> f64 {
        if x < self.low || x > self.high {
            return 0.0;
        }
        self.probs[self.bin_of(x)] / self.width
    }

    /// Returns the draw and its density.
    #[allow(clippy::cast_precision_loss)]
    fn sample(&self, rng: &mut fastrand::Rng) -> (f64, f64) {
        let u = rng.f64();
        let bin = self
            .cdf
            .partition_point(|&c| c <= u)
            .min(self.probs.len() - 1);
        let x = (self.low + (bin as f64 + rng.f64()) * self.width).min(self.high);
        (x, self.probs[bin] / self.width)
    }

    /// `p <- (1 - floor) * ((1 - rate) * p + rate * target) + floor / n`
    #[allow(clippy::cast_precision_loss)]
    fn blend(&mut self, target: &[f64], rate: f64, floor: f64) {
        let uniform = 1.0 / self.probs.len() as f64;
        for (p, &t) in self.probs.iter_mut().zip(target) {
            let mixed = (1.0 - rate) * *p + rate * t;
            *p = (1.0 - floor) * mixed + floor * uniform;
        }
        let total: f64 = self.probs.iter().sum();
        for p in &mut self.probs {
            *p /= total;
        }
        self.rebuild_cdf();
    }

    fn rebuild_cdf(&mut self) {
        let mut acc = 0.0;
        self.cdf = self
            .probs
            .iter()
            .map(|p| {
                acc += p;
                acc
            })
            .collect();
        if let Some(last) = self.cdf.last_mut() {
            *last = 1.0;
        }
    }
}
