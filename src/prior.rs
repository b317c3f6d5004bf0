//! Extrinsic prior model.
//!
//! The integrator needs, for every extrinsic dimension independently, a
//! normalized density and a way to draw from it. The [`Prior`] trait is
//! that contract; [`ExtrinsicPrior`] implements it with the shapes used in
//! compact-binary inference:
//!
//! | Shape | Density | Typical parameter |
//! |-------|---------|-------------------|
//! | [`Uniform`](PriorDimension::Uniform) | flat | right ascension, polarization, phase, time |
//! | [`Cosine`](PriorDimension::Cosine) | `∝ cos x` | declination |
//! | [`Sine`](PriorDimension::Sine) | `∝ sin x` | inclination |
//! | [`PowerLaw`](PriorDimension::PowerLaw) | `∝ x^k` | distance (`k = 2`, uniform in volume) |

use core::f64::consts::{FRAC_PI_2, PI};

use crate::error::{Error, Result};
use crate::space::Bounds;

/// Per-dimension prior over the extrinsic parameters.
///
/// Dimensions are independent: the joint density is the product of
/// [`density`](Prior::density) over dimensions.
pub trait Prior: Send + Sync {
    /// Number of extrinsic dimensions.
    fn n_dims(&self) -> usize;

    /// Support of dimension `dim`.
    fn bounds(&self, dim: usize) -> Bounds;

    /// Normalized density of dimension `dim` at `x` (zero outside the support).
    fn density(&self, dim: usize, x: f64) -> f64;

    /// Draws one value of dimension `dim`.
    fn sample(&self, dim: usize, rng: &mut fastrand::Rng) -> f64;

    /// Called once before a run starts.
    ///
    /// # Errors
    ///
    /// Return `Error::InvalidPrior` to abort the run.
    fn validate(&self) -> Result<()> {
        if self.n_dims() == 0 {
            return Err(Error::InvalidPrior("prior has no dimensions".into()));
        }
        Ok(())
    }

    /// Joint log density of a full extrinsic vector.
    fn log_density(&self, x: &[f64]) -> f64 {
        x.iter()
            .enumerate()
            .map(|(d, &v)| self.density(d, v).ln())
            .sum()
    }
}

/// The shape of one extrinsic dimension's prior.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PriorDimension {
    /// Flat on `[low, high]`.
    Uniform(Bounds),
    /// `∝ cos x` on a sub-interval of `[-π/2, π/2]`.
    Cosine(Bounds),
    /// `∝ sin x` on a sub-interval of `[0, π]`.
    Sine(Bounds),
    /// `∝ x^index` on a positive interval; `index = -1` is log-uniform.
    PowerLaw {
        /// Support.
        bounds: Bounds,
        /// Exponent.
        index: f64,
    },
}

impl PriorDimension {
    /// Flat prior on `[low, high]`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBounds` for a malformed interval.
    pub fn uniform(low: f64, high: f64) -> Result<Self> {
        Ok(Self::Uniform(Bounds::new(low, high)?))
    }

    /// Cosine prior, the sky-uniform declination prior on `[-π/2, π/2]`
    /// when called with those bounds.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBounds` unless `[low, high] ⊂ [-π/2, π/2]`.
    pub fn cosine(low: f64, high: f64) -> Result<Self> {
        let bounds = Bounds::new(low, high)?;
        if low < -FRAC_PI_2 - 1e-12 || high > FRAC_PI_2 + 1e-12 {
            return Err(Error::InvalidBounds { low, high });
        }
        Ok(Self::Cosine(bounds))
    }

    /// Sine prior, the isotropic inclination prior on `[0, π]` when called
    /// with those bounds.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBounds` unless `[low, high] ⊂ [0, π]`.
    pub fn sine(low: f64, high: f64) -> Result<Self> {
        let bounds = Bounds::new(low, high)?;
        if low < -1e-12 || high > PI + 1e-12 {
            return Err(Error::InvalidBounds { low, high });
        }
        Ok(Self::Sine(bounds))
    }

    /// Power-law prior `∝ x^index`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBounds` unless `0 < low < high`, and
    /// `Error::InvalidConfig` for a non-finite index.
    pub fn power_law(low: f64, high: f64, index: f64) -> Result<Self> {
        let bounds = Bounds::new(low, high)?;
        if low <= 0.0 {
            return Err(Error::InvalidBounds { low, high });
        }
        if !index.is_finite() {
            return Err(Error::InvalidConfig {
                name: "index",
                reason: format!("power-law index must be finite, got {index}"),
            });
        }
        Ok(Self::PowerLaw { bounds, index })
    }

    /// Support of the dimension.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        match *self {
            Self::Uniform(b) | Self::Cosine(b) | Self::Sine(b) => b,
            Self::PowerLaw { bounds, .. } => bounds,
        }
    }

    /// Normalized density at `x`.
    #[must_use]
    pub fn density(&self, x: f64) -> f64 {
        let b = self.bounds();
        if !b.contains(x) {
            return 0.0;
        }
        match *self {
            Self::Uniform(b) => 1.0 / b.width(),
            Self::Cosine(b) => x.cos() / (b.high.sin() - b.low.sin()),
            Self::Sine(b) => x.sin() / (b.low.cos() - b.high.cos()),
            Self::PowerLaw { bounds, index } => {
                if is_log_uniform(index) {
                    1.0 / (x * (bounds.high / bounds.low).ln())
                } else {
                    let k1 = index + 1.0;
                    k1 * x.powf(index) / (bounds.high.powf(k1) - bounds.low.powf(k1))
                }
            }
        }
    }

    /// Draws by inverting the CDF.
    pub fn sample(&self, rng: &mut fastrand::Rng) -> f64 {
        let u = rng.f64();
        let x = match *self {
            Self::Uniform(b) => b.from_unit(u),
            Self::Cosine(b) => {
                let (s0, s1) = (b.low.sin(), b.high.sin());
                (s0 + u * (s1 - s0)).clamp(-1.0, 1.0).asin()
            }
            Self::Sine(b) => {
                let (c0, c1) = (b.low.cos(), b.high.cos());
                (c0 - u * (c0 - c1)).clamp(-1.0, 1.0).acos()
            }
            Self::PowerLaw { bounds, index } => {
                if is_log_uniform(index) {
                    bounds.low * (bounds.high / bounds.low).powf(u)
                } else {
                    let k1 = index + 1.0;
                    let (a, c) = (bounds.low.powf(k1), bounds.high.powf(k1));
                    (a + u * (c - a)).powf(1.0 / k1)
                }
            }
        };
        let b = self.bounds();
        // round-off in the inverse CDF can step just outside the support
        x.clamp(b.low, b.high)
    }
}

fn is_log_uniform(index: f64) -> bool {
    (index + 1.0).abs() < 1e-12
}

/// A product prior over named extrinsic dimensions.
///
/// # Examples
///
/// ```
/// use rapid_pe::prior::{ExtrinsicPrior, Prior, PriorDimension};
///
/// let prior = ExtrinsicPrior::builder()
///     .dimension("distance", PriorDimension::power_law(1.0, 500.0, 2.0).unwrap())
///     .dimension("polarization", PriorDimension::uniform(0.0, std::f64::consts::PI).unwrap())
///     .build()
///     .unwrap();
/// assert_eq!(prior.n_dims(), 2);
/// assert_eq!(prior.names()[0], "distance");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ExtrinsicPrior {
    names: Vec<String>,
    dims: Vec<PriorDimension>,
}

impl ExtrinsicPrior {
    /// Returns a builder for declaring dimensions one at a time.
    #[must_use]
    pub fn builder() -> ExtrinsicPriorBuilder {
        ExtrinsicPriorBuilder::default()
    }

    /// The standard seven-dimensional extrinsic prior: isotropic sky
    /// position and orientation, distance uniform in volume up to
    /// `distance_max`, and coalescence time uniform in
    /// `[-time_window, time_window]` around the trigger.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBounds` when `distance_max <= 1` or
    /// `time_window <= 0`.
    pub fn sky_and_orientation(distance_max: f64, time_window: f64) -> Result<Self> {
        Self::builder()
            .dimension("right_ascension", PriorDimension::uniform(0.0, 2.0 * PI)?)
            .dimension("declination", PriorDimension::cosine(-FRAC_PI_2, FRAC_PI_2)?)
            .dimension("inclination", PriorDimension::sine(0.0, PI)?)
            .dimension("polarization", PriorDimension::uniform(0.0, PI)?)
            .dimension("phase", PriorDimension::uniform(0.0, 2.0 * PI)?)
            .dimension("distance", PriorDimension::power_law(1.0, distance_max, 2.0)?)
            .dimension("time", PriorDimension::uniform(-time_window, time_window)?)
            .build()
    }

    /// Dimension names, in parameter order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Dimension shapes, in parameter order.
    #[must_use]
    pub fn dimensions(&self) -> &[PriorDimension] {
        &self.dims
    }
}

impl Prior for ExtrinsicPrior {
    fn n_dims(&self) -> usize {
        self.dims.len()
    }

    fn bounds(&self, dim: usize) -> Bounds {
        self.dims[dim].bounds()
    }

    fn density(&self, dim: usize, x: f64) -> f64 {
        self.dims[dim].density(x)
    }

    fn sample(&self, dim: usize, rng: &mut fastrand::Rng) -> f64 {
        self.dims[dim].sample(rng)
    }
}

/// Builder for [`ExtrinsicPrior`].
#[derive(Clone, Debug, Default)]
pub struct ExtrinsicPriorBuilder {
    names: Vec<String>,
    dims: Vec<PriorDimension>,
}

impl ExtrinsicPriorBuilder {
    /// Appends a named dimension.
    #[must_use]
    pub fn dimension(mut self, name: impl Into<String>, shape: PriorDimension) -> Self {
        self.names.push(name.into());
        self.dims.push(shape);
        self
    }

    /// Builds the prior.
    ///
    /// # Errors
    ///
    /// Returns `Error::ZeroDimensions` when no dimension was declared.
    pub fn build(self) -> Result<ExtrinsicPrior> {
        if self.dims.is_empty() {
            return Err(Error::ZeroDimensions);
        }
        Ok(ExtrinsicPrior {
            names: self.names,
            dims: self.dims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrate(dim: &PriorDimension, n: u32) -> f64 {
        let b = dim.bounds();
        let dx = b.width() / f64::from(n);
        (0..n)
            .map(|i| dim.density(b.low + (f64::from(i) + 0.5) * dx) * dx)
            .sum()
    }

    #[test]
    fn test_densities_normalized() {
        let shapes = [
            PriorDimension::uniform(-2.0, 3.0).unwrap(),
            PriorDimension::cosine(-FRAC_PI_2, FRAC_PI_2).unwrap(),
            PriorDimension::sine(0.0, PI).unwrap(),
            PriorDimension::power_law(1.0, 100.0, 2.0).unwrap(),
            PriorDimension::power_law(1.0, 100.0, -1.0).unwrap(),
        ];
        for shape in &shapes {
            let total = integrate(shape, 20_000);
            assert!((total - 1.0).abs() < 1e-3, "{shape:?} integrates to {total}");
        }
    }

    #[test]
    fn test_samples_follow_density() {
        // Fraction of power-law (k=2) mass below the midpoint of [0.5, 1.5]
        // is (1 - 0.125) / (3.375 - 0.125).
        let shape = PriorDimension::power_law(0.5, 1.5, 2.0).unwrap();
        let mut rng = fastrand::Rng::with_seed(11);
        let n = 40_000;
        let below = (0..n).filter(|_| shape.sample(&mut rng) < 1.0).count();
        #[allow(clippy::cast_precision_loss)]
        let frac = below as f64 / f64::from(n);
        let expected = (1.0 - 0.125) / (3.375 - 0.125);
        assert!((frac - expected).abs() < 0.01, "frac = {frac}");
    }

    #[test]
    fn test_samples_in_support() {
        let prior = ExtrinsicPrior::sky_and_orientation(400.0, 0.05).unwrap();
        let mut rng = fastrand::Rng::with_seed(5);
        for d in 0..prior.n_dims() {
            for _ in 0..500 {
                let x = prior.sample(d, &mut rng);
                assert!(prior.bounds(d).contains(x));
                assert!(prior.density(d, x) >= 0.0);
            }
        }
    }

    #[test]
    fn test_density_zero_outside_support() {
        let shape = PriorDimension::uniform(0.0, 1.0).unwrap();
        assert_eq!(shape.density(1.5), 0.0);
        assert_eq!(shape.density(-0.1), 0.0);
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        assert!(PriorDimension::cosine(-2.0, 0.0).is_err());
        assert!(PriorDimension::sine(0.0, 4.0).is_err());
        assert!(PriorDimension::power_law(0.0, 10.0, 2.0).is_err());
        assert!(PriorDimension::power_law(1.0, 10.0, f64::NAN).is_err());
        assert!(matches!(
            ExtrinsicPrior::builder().build(),
            Err(Error::ZeroDimensions)
        ));
    }
}
