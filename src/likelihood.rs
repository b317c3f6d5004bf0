//! The [`Likelihood`] trait is the seam to the waveform and overlap code.
//!
//! The core never generates waveforms or touches strain data; it only
//! asks for `ln L(intrinsic, extrinsic)`. Plain closures work through a
//! blanket impl:
//!
//! ```
//! use rapid_pe::{Likelihood, LikelihoodError};
//!
//! let lnl = |_intrinsic: &[f64], extrinsic: &[f64]| -> Result<f64, LikelihoodError> {
//!     Ok(-0.5 * extrinsic.iter().map(|x| x * x).sum::<f64>())
//! };
//! assert_eq!(lnl.log_likelihood(&[1.4, 1.3], &[0.0]).unwrap(), 0.0);
//! ```
//!
//! Implement the trait on a struct when the evaluator owns conditioned
//! data or needs a start-up [`check`](Likelihood::check).

/// Failure of a single likelihood evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LikelihoodError {
    /// The parameters are unphysical for this evaluator. Treated as zero
    /// likelihood by the integrator.
    #[error("unphysical parameters: {0}")]
    Domain(String),

    /// The evaluator cannot be used at all (missing data, broken waveform
    /// backend). Aborts the run.
    #[error("likelihood evaluator unusable: {0}")]
    Unusable(String),
}

/// Log-likelihood of the data given intrinsic and extrinsic parameters.
///
/// Implementations must be pure with respect to their inputs and safe to
/// call from several threads at once: distinct grid points are integrated
/// concurrently against one shared evaluator.
pub trait Likelihood: Send + Sync {
    /// Natural log of the likelihood.
    ///
    /// # Errors
    ///
    /// [`LikelihoodError::Domain`] for unphysical inputs;
    /// [`LikelihoodError::Unusable`] when the evaluator itself is broken.
    fn log_likelihood(&self, intrinsic: &[f64], extrinsic: &[f64]) -> Result<f64, LikelihoodError>;

    /// Called once before a run starts.
    ///
    /// Default: always usable.
    ///
    /// # Errors
    ///
    /// Return [`LikelihoodError::Unusable`] to abort the run before any
    /// point is integrated.
    fn check(&self) -> Result<(), LikelihoodError> {
        Ok(())
    }
}

impl<F> Likelihood for F
where
    F: Fn(&[f64], &[f64]) -> Result<f64, LikelihoodError> + Send + Sync,
{
    fn log_likelihood(&self, intrinsic: &[f64], extrinsic: &[f64]) -> Result<f64, LikelihoodError> {
        self(intrinsic, extrinsic)
    }
}
