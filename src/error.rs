use crate::point::PointId;

/// Errors returned by this crate.
///
/// Point-level trouble (non-finite likelihoods, exhausted budgets) never
/// shows up here; it is reported through the status of an
/// [`IntegralResult`](crate::IntegralResult). Errors are reserved for bad
/// configuration, broken collaborators, storage failures, and
/// [`Error::Cancelled`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the lower bound is not strictly less than the upper bound.
    #[error("invalid bounds: low ({low}) must be less than high ({high})")]
    InvalidBounds {
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when a configuration value is outside its valid range.
    #[error("invalid configuration for '{name}': {reason}")]
    InvalidConfig {
        /// The name of the offending option.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Returned when a parameter space or prior is built with no dimensions.
    #[error("at least one dimension is required")]
    ZeroDimensions,

    /// Returned when a parameter vector has the wrong number of components.
    #[error("dimension mismatch: expected {expected} parameters but got {got}")]
    DimensionMismatch {
        /// The expected number of parameters.
        expected: usize,
        /// The actual number of parameters.
        got: usize,
    },

    /// Returned when a supplied point lies outside the intrinsic bounds.
    #[error("point {values:?} lies outside the intrinsic prior bounds")]
    OutOfBounds {
        /// The offending parameter values.
        values: Vec<f64>,
    },

    /// Returned when a result refers to a point the store has never seen.
    #[error("unknown point {0}")]
    UnknownPoint(PointId),

    /// Returned when the next generation is requested before the current
    /// one has fully resolved.
    #[error("generation {generation} still has {pending} pending point(s)")]
    UnresolvedGeneration {
        /// The generation index.
        generation: u32,
        /// Number of points without a result.
        pending: usize,
    },

    /// Returned when the store holds no generation yet.
    #[error("the grid store holds no points")]
    EmptyStore,

    /// Returned when the store already holds points and a fresh initial
    /// generation was requested.
    #[error("the grid store already holds generation {0}")]
    AlreadySeeded(u32),

    /// Returned when an evidence surface cannot be fitted.
    #[error("surface fit failed: {0}")]
    SurfaceFit(&'static str),

    /// Returned when the likelihood evaluator cannot be used at all.
    #[error("likelihood evaluator unusable: {0}")]
    LikelihoodUnusable(String),

    /// Returned when the prior model is malformed.
    #[error("invalid prior: {0}")]
    InvalidPrior(String),

    /// Returned when a run is built without a required component.
    #[error("run is missing its {0}")]
    MissingComponent(&'static str),

    /// Returned when a point is cancelled before its first sample. The
    /// point has no result and stays pending.
    #[error("integration cancelled before the first sample")]
    Cancelled,

    /// Returned when an async task fails.
    #[cfg(feature = "async")]
    #[error("async task error: {0}")]
    TaskError(String),

    /// Returned when a storage operation fails.
    #[cfg(feature = "journal")]
    #[error("storage error: {0}")]
    Storage(String),
}

/// A convenience alias for `Result<T, rapid_pe::Error>`.
///
/// # Examples
///
/// ```
/// use rapid_pe::space::IntrinsicSpace;
///
/// fn unit_mass_space() -> rapid_pe::Result<IntrinsicSpace> {
///     IntrinsicSpace::builder().dimension("mass1", 1.0, 2.0).build()
/// }
///
/// assert_eq!(unit_mass_space().unwrap().n_dims(), 1);
/// ```
pub type Result<T> = core::result::Result<T, Error>;
