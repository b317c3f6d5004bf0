//! Intrinsic parameter space: named dimensions with prior bounds.
//!
//! Distances between intrinsic points are measured in coordinates
//! normalized to `[0, 1]` by each dimension's prior width, so one minimum
//! separation applies uniformly to masses, spins and anything else.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rng_util;

/// A closed interval `[low, high]` with `low < high`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    /// Lower bound (inclusive).
    pub low: f64,
    /// Upper bound (inclusive).
    pub high: f64,
}

impl Bounds {
    /// Creates validated bounds.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBounds` unless both ends are finite and
    /// `low < high`.
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !(low.is_finite() && high.is_finite()) || low >= high {
            return Err(Error::InvalidBounds { low, high });
        }
        Ok(Self { low, high })
    }

    /// Width of the interval.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    /// Returns `true` if `x` lies inside the interval.
    #[must_use]
    pub fn contains(&self, x: f64) -> bool {
        (self.low..=self.high).contains(&x)
    }

    /// Maps `x` to `[0, 1]`.
    #[must_use]
    pub fn to_unit(&self, x: f64) -> f64 {
        (x - self.low) / self.width()
    }

    /// Maps a unit coordinate back into the interval.
    #[must_use]
    pub fn from_unit(&self, u: f64) -> f64 {
        self.low + u * self.width()
    }
}

/// The intrinsic parameter space of a run.
///
/// # Examples
///
/// ```
/// use rapid_pe::space::IntrinsicSpace;
///
/// let space = IntrinsicSpace::builder()
///     .dimension("mass1", 1.0, 2.0)
///     .dimension("mass2", 1.0, 2.0)
///     .build()
///     .unwrap();
///
/// assert!(space.contains(&[1.4, 1.3]));
/// assert!(!space.contains(&[2.1, 1.3]));
/// assert!((space.distance(&[1.0, 1.0], &[2.0, 1.0]) - 1.0).abs() < 1e-12);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntrinsicSpace {
    names: Vec<String>,
    bounds: Vec<Bounds>,
}

impl IntrinsicSpace {
    /// Returns a builder for declaring dimensions one at a time.
    #[must_use]
    pub fn builder() -> IntrinsicSpaceBuilder {
        IntrinsicSpaceBuilder::default()
    }

    /// Number of intrinsic dimensions.
    #[must_use]
    pub fn n_dims(&self) -> usize {
        self.bounds.len()
    }

    /// Dimension names, in parameter order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Dimension bounds, in parameter order.
    #[must_use]
    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    /// Checks that `values` has one entry per dimension.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` otherwise.
    pub fn check_dims(&self, values: &[f64]) -> Result<()> {
        if values.len() == self.n_dims() {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.n_dims(),
                got: values.len(),
            })
        }
    }

    /// Returns `true` if every component lies within its bounds.
    ///
    /// A vector of the wrong length is never contained.
    #[must_use]
    pub fn contains(&self, values: &[f64]) -> bool {
        values.len() == self.n_dims()
            && self
                .bounds
                .iter()
                .zip(values)
                .all(|(b, &x)| b.contains(x))
    }

    /// Maps a parameter vector to the unit cube.
    #[must_use]
    pub fn normalize(&self, values: &[f64]) -> Vec<f64> {
        self.bounds
            .iter()
            .zip(values)
            .map(|(b, &x)| b.to_unit(x))
            .collect()
    }

    /// Maps a unit-cube vector back to parameter values.
    #[must_use]
    pub fn denormalize(&self, unit: &[f64]) -> Vec<f64> {
        self.bounds
            .iter()
            .zip(unit)
            .map(|(b, &u)| b.from_unit(u))
            .collect()
    }

    /// Euclidean distance between two points in normalized coordinates.
    #[must_use]
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self.bounds
            .iter()
            .zip(a.iter().zip(b))
            .map(|(bd, (&x, &y))| ((x - y) / bd.width()).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Draws a point uniformly from the bounds.
    pub fn sample_uniform(&self, rng: &mut fastrand::Rng) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|b| rng_util::f64_range(rng, b.low, b.high))
            .collect()
    }
}

/// Builder for [`IntrinsicSpace`].
#[derive(Clone, Debug, Default)]
pub struct IntrinsicSpaceBuilder {
    dims: Vec<(String, f64, f64)>,
}

impl IntrinsicSpaceBuilder {
    /// Appends a dimension with the given name and bounds.
    #[must_use]
    pub fn dimension(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.dims.push((name.into(), low, high));
        self
    }

    /// Builds the space.
    ///
    /// # Errors
    ///
    /// Returns `Error::ZeroDimensions` when no dimension was declared and
    /// `Error::InvalidBounds` for any malformed interval.
    pub fn build(self) -> Result<IntrinsicSpace> {
        if self.dims.is_empty() {
            return Err(Error::ZeroDimensions);
        }
        let mut names = Vec::with_capacity(self.dims.len());
        let mut bounds = Vec::with_capacity(self.dims.len());
        for (name, low, high) in self.dims {
            bounds.push(Bounds::new(low, high)?);
            names.push(name);
        }
        Ok(IntrinsicSpace { names, bounds })
    }
}
