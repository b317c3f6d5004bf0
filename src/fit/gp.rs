//! Gaussian-process evidence surface.
//!
//! Log evidences are shifted so the lowest observation sits at zero, scaled
//! to unit variance and regressed with a **Matérn 5/2 kernel** with ARD
//! lengthscales, set to the per-dimension standard deviation of the
//! training inputs. Away from the data the surface falls back to the lowest
//! observed log evidence. Each observation carries its own noise term,
//! taken from the integral's error bar, so low-confidence points pull on
//! the surface less than converged ones.
//!
//! Fitting is `O(n³)`; at most `max_points` observations are used, keeping
//! the ones with the highest evidence since those shape the region the
//! scheduler exploits.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `max_points` | 200 | Training observations kept |
//! | `noise_variance` | 1e-6 | Jitter added to every diagonal entry |
//!
//! # Examples
//!
//! ```
//! use rapid_pe::fit::{GpFitter, Observation, SurfaceFitter};
//!
//! let observations: Vec<Observation> = (0..5)
//!     .map(|i| {
//!         let x = f64::from(i) / 4.0;
//!         Observation { x: vec![x], log_evidence: -(x - 0.5).powi(2), variance: 1e-4 }
//!     })
//!     .collect();
//! let surface = GpFitter::builder().max_points(50).build().fit(&observations).unwrap();
//! let p = surface.predict(&[0.5]);
//! assert!(p.mean.abs() < 0.05);
//! ```

use nalgebra::{DMatrix, DVector};

use super::{Observation, Prediction, Surface, SurfaceFitter, column_std};
use crate::error::{Error, Result};

const DEFAULT_MAX_POINTS: usize = 200;
const DEFAULT_NOISE_VARIANCE: f64 = 1e-6;
const MIN_LENGTHSCALE: f64 = 0.01;
const SQRT_5: f64 = 2.236_067_977_499_79;

/// Gaussian-process [`SurfaceFitter`].
#[derive(Clone, Debug)]
pub struct GpFitter {
    max_points: usize,
    noise_variance: f64,
}

impl GpFitter {
    /// Creates a fitter with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for configuring a `GpFitter`.
    #[must_use]
    pub fn builder() -> GpFitterBuilder {
        GpFitterBuilder::default()
    }
}

impl Default for GpFitter {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            noise_variance: DEFAULT_NOISE_VARIANCE,
        }
    }
}

/// Builder for [`GpFitter`].
#[derive(Clone, Debug, Default)]
pub struct GpFitterBuilder {
    max_points: Option<usize>,
    noise_variance: Option<f64>,
}

impl GpFitterBuilder {
    /// Sets how many observations are used for fitting.
    ///
    /// Default: 200.
    #[must_use]
    pub fn max_points(mut self, n: usize) -> Self {
        self.max_points = Some(n);
        self
    }

    /// Sets the jitter added to the kernel diagonal (standardized units).
    ///
    /// Default: 1e-6.
    #[must_use]
    pub fn noise_variance(mut self, v: f64) -> Self {
        self.noise_variance = Some(v);
        self
    }

    /// Builds the fitter.
    #[must_use]
    pub fn build(self) -> GpFitter {
        GpFitter {
            max_points: self.max_points.unwrap_or(DEFAULT_MAX_POINTS).max(1),
            noise_variance: self
                .noise_variance
                .unwrap_or(DEFAULT_NOISE_VARIANCE)
                .max(0.0),
        }
    }
}

impl SurfaceFitter for GpFitter {
    fn name(&self) -> &'static str {
        "gaussian-process"
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&self, observations: &[Observation]) -> Result<Box<dyn Surface>> {
        if observations.is_empty() {
            return Err(Error::SurfaceFit("no observations to fit"));
        }

        let mut train = observations.to_vec();
        if train.len() > self.max_points {
            // stable: ties keep input order
            train.sort_by(|a, b| b.log_evidence.total_cmp(&a.log_evidence));
            train.truncate(self.max_points);
        }
        let n = train.len();

        // Scale y
        let y_min = train
            .iter()
            .map(|o| o.log_evidence)
            .fold(f64::INFINITY, f64::min);
        let y_mean = train.iter().map(|o| o.log_evidence).sum::<f64>() / n as f64;
        let y_var = if n > 1 {
            train
                .iter()
                .map(|o| (o.log_evidence - y_mean).powi(2))
                .sum::<f64>()
                / (n - 1) as f64
        } else {
            1.0
        };
        let y_std = y_var.sqrt().max(1e-10);
        let y = DVector::from_iterator(n, train.iter().map(|o| (o.log_evidence - y_min) / y_std));

        let lengthscales: Vec<f64> = column_std(&train)
            .into_iter()
            .map(|s| s.max(MIN_LENGTHSCALE))
            .collect();
        let x_train: Vec<Vec<f64>> = train.iter().map(|o| o.x.clone()).collect();

        let signal_var = 1.0;
        let y_std_sq = y_std * y_std;
        let k = DMatrix::from_fn(n, n, |i, j| {
            let kij = matern52(&x_train[i], &x_train[j], &lengthscales, signal_var);
            if i == j {
                kij + self.noise_variance + train[i].variance / y_std_sq
            } else {
                kij
            }
        });
        let cholesky = nalgebra::linalg::Cholesky::new(k)
            .ok_or(Error::SurfaceFit("kernel matrix is not positive definite"))?;
        let alpha = cholesky.solve(&y);

        Ok(Box::new(GpSurface {
            cholesky,
            alpha,
            x_train,
            lengthscales,
            signal_var,
            y_min,
            y_std,
        }))
    }
}

/// A fitted GP posterior.
struct GpSurface {
    /// Cholesky factor of `K + Σ`.
    cholesky: nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>,
    /// `α = (K + Σ)⁻¹ y`.
    alpha: DVector<f64>,
    x_train: Vec<Vec<f64>>,
    lengthscales: Vec<f64>,
    signal_var: f64,
    y_min: f64,
    y_std: f64,
}

impl Surface for GpSurface {
    fn predict(&self, x: &[f64]) -> Prediction {
        let k_star = DVector::from_fn(self.x_train.len(), |i, _| {
            matern52(x, &self.x_train[i], &self.lengthscales, self.signal_var)
        });
        let mean = k_star.dot(&self.alpha);
        let v = self.cholesky.solve(&k_star);
        let var = (self.signal_var - k_star.dot(&v)).max(0.0);
        Prediction {
            mean: mean * self.y_std + self.y_min,
            std: var.sqrt() * self.y_std,
        }
    }
}

/// `k(x1, x2) = σ² (1 + √5 r + 5/3 r²) exp(-√5 r)`
fn matern52(x1: &[f64], x2: &[f64], lengthscales: &[f64], signal_var: f64) -> f64 {
    let r_sq: f64 = x1
        .iter()
        .zip(x2)
        .zip(lengthscales)
        .map(|((a, b), l)| ((a - b) / l).powi(2))
        .sum();
    let sqrt5_r = SQRT_5 * r_sq.sqrt();
    signal_var * (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn quadratic(n: usize) -> Vec<Observation> {
        (0..n)
            .map(|i| {
                let x = i as f64 / (n - 1) as f64;
                Observation {
                    x: vec![x, 0.5],
                    log_evidence: -10.0 * (x - 0.3).powi(2),
                    variance: 1e-4,
                }
            })
            .collect()
    }

    #[test]
    fn test_interpolates_training_points() {
        let obs = quadratic(9);
        let surface = GpFitter::new().fit(&obs).unwrap();
        for o in &obs {
            let p = surface.predict(&o.x);
            assert!((p.mean - o.log_evidence).abs() < 0.05, "{p:?} vs {}", o.log_evidence);
        }
    }

    #[test]
    fn test_uncertainty_grows_away_from_data() {
        let obs: Vec<Observation> = quadratic(9)
            .into_iter()
            .filter(|o| o.x[0] < 0.5)
            .collect();
        let surface = GpFitter::new().fit(&obs).unwrap();
        let near = surface.predict(&[0.25, 0.5]);
        let far = surface.predict(&[1.0, 0.5]);
        assert!(far.std > near.std);
    }

    #[test]
    fn test_noisy_points_pull_less() {
        let mut obs = quadratic(5);
        obs.push(Observation {
            x: vec![0.5, 0.5],
            log_evidence: 5.0,
            variance: 100.0,
        });
        let surface = GpFitter::new().fit(&obs).unwrap();
        assert!(surface.predict(&[0.5, 0.5]).mean < 2.0);
    }

    #[test]
    fn test_max_points_keeps_best() {
        let obs = quadratic(20);
        let surface = GpFitter::builder().max_points(5).build().fit(&obs).unwrap();
        let p = surface.predict(&[0.3, 0.5]);
        assert!(p.mean.abs() < 0.2);
    }

    #[test]
    fn test_far_from_data_reverts_to_lowest_evidence() {
        let obs = vec![
            Observation {
                x: vec![0.1],
                log_evidence: -1.0,
                variance: 1e-4,
            },
            Observation {
                x: vec![0.12],
                log_evidence: -1.5,
                variance: 1e-4,
            },
            Observation {
                x: vec![0.14],
                log_evidence: -4.0,
                variance: 1e-4,
            },
        ];
        let surface = GpFitter::new().fit(&obs).unwrap();
        let far = surface.predict(&[0.9]);
        assert!((far.mean + 4.0).abs() < 1e-6, "{far:?}");
    }

    #[test]
    fn test_empty_is_error() {
        assert!(GpFitter::new().fit(&[]).is_err());
    }
}
