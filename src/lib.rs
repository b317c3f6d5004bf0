#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Rapid parameter estimation for compact-binary gravitational-wave sources.
//!
//! The crate estimates the posterior over intrinsic source parameters
//! (component masses, spins) by computing, for each point of a discrete grid,
//! the likelihood marginalized over the extrinsic parameters (sky location,
//! distance, time, polarization, orientation), and then refining the grid
//! toward regions of high evidence, generation by generation.
//!
//! # Getting Started
//!
//! ```
//! use rapid_pe::prelude::*;
//! use rapid_pe::toy::GaussianLikelihood;
//!
//! let space = IntrinsicSpace::builder()
//!     .dimension("mass1", 1.0, 2.0)
//!     .dimension("mass2", 1.0, 2.0)
//!     .build()
//!     .unwrap();
//! let prior = ExtrinsicPrior::builder()
//!     .dimension("x", PriorDimension::uniform(-5.0, 5.0).unwrap())
//!     .build()
//!     .unwrap();
//! let likelihood = GaussianLikelihood::new(vec![1.4, 1.4], 0.1, vec![0.0], 0.5);
//!
//! let run = Run::builder()
//!     .space(space)
//!     .prior(prior)
//!     .likelihood(likelihood)
//!     .integrator(IntegratorConfig::builder().batch_size(200).seed(1).build().unwrap())
//!     .scheduler(
//!         SchedulerConfig::builder()
//!             .generation_size(6)
//!             .max_generations(2)
//!             .seed(1)
//!             .build()
//!             .unwrap(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let summary = run.execute().unwrap();
//! assert_eq!(summary.generations, 2);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`IntrinsicPoint`] | One grid point: intrinsic parameters, generation, parent. |
//! | [`IntegralResult`] | Evidence estimate, relative error, effective samples, status. |
//! | [`MonteCarloIntegrator`](integrator::MonteCarloIntegrator) | Adaptive importance sampling over the extrinsic parameters of one point. |
//! | [`RefinementScheduler`](scheduler::RefinementScheduler) | Turns a resolved generation into the next one, or declares convergence. |
//! | [`GridStore`](store::GridStore) | Cumulative point history shared by the scheduler and the run driver. |
//! | [`Run`] | Drives the generation loop end to end. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `gp` | [`GpFitter`](fit::GpFitter) Gaussian-process evidence surface (adds `nalgebra`) | on |
//! | `journal` | [`JournalStore`](store::JournalStore) JSONL persistence with file locking (enables `serde`) | on |
//! | `serde` | `Serialize`/`Deserialize` on the data model | on (via `journal`) |
//! | `async` | [`Run::execute_parallel`] on tokio | on |
//! | `sobol` | Scrambled Sobol initial design | on |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) | on |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

mod error;
pub mod fit;
pub mod integrator;
pub mod likelihood;
pub mod point;
pub mod prior;
pub mod proposal;
mod rng_util;
pub mod run;
pub mod scheduler;
pub mod space;
pub mod store;
pub mod toy;
mod types;

pub use error::{Error, Result};
pub use likelihood::{Likelihood, LikelihoodError};
pub use point::{Generation, GridRecord, IntegralResult, IntrinsicPoint, PointId};
pub use run::{Run, RunBuilder, RunSummary};
pub use types::{DedupScope, InitialDesign, IntegralStatus, StopReason};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use rapid_pe::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    #[cfg(feature = "gp")]
    pub use crate::fit::GpFitter;
    pub use crate::fit::{KernelRegressionFitter, Surface, SurfaceFitter};
    pub use crate::integrator::{CancelToken, IntegratorConfig, MonteCarloIntegrator};
    pub use crate::likelihood::{Likelihood, LikelihoodError};
    pub use crate::point::{Generation, GridRecord, IntegralResult, IntrinsicPoint, PointId};
    pub use crate::prior::{ExtrinsicPrior, Prior, PriorDimension};
    pub use crate::run::{Run, RunBuilder, RunSummary};
    pub use crate::scheduler::{GenerationOutcome, RefinementScheduler, SchedulerConfig};
    pub use crate::space::{Bounds, IntrinsicSpace};
    #[cfg(feature = "journal")]
    pub use crate::store::JournalStore;
    pub use crate::store::{GridStore, MemoryStore};
    pub use crate::types::{DedupScope, InitialDesign, IntegralStatus, StopReason};
}
