use std::sync::Arc;

use super::Run;
use crate::error::{Error, Result};
use crate::fit::SurfaceFitter;
use crate::integrator::{CancelToken, IntegratorConfig, MonteCarloIntegrator};
use crate::likelihood::Likelihood;
use crate::prior::Prior;
use crate::scheduler::{RefinementScheduler, SchedulerConfig};
use crate::space::IntrinsicSpace;
use crate::store::{GridStore, MemoryStore};

/// A builder for [`Run`] instances.
///
/// Created via [`Run::builder()`]. The intrinsic space, the prior, and the
/// likelihood are required; everything else has a default.
///
/// # Defaults
///
/// - Integrator: [`IntegratorConfig::default()`]
/// - Scheduler: [`SchedulerConfig::default()`]
/// - Surface fitter: [`default_fitter`](crate::fit::default_fitter)
/// - Store: [`MemoryStore`]
/// - Initial generation: the scheduler's initial design
#[derive(Default)]
pub struct RunBuilder {
    space: Option<IntrinsicSpace>,
    prior: Option<Arc<dyn Prior>>,
    likelihood: Option<Arc<dyn Likelihood>>,
    integrator: Option<IntegratorConfig>,
    scheduler: Option<SchedulerConfig>,
    fitter: Option<Box<dyn SurfaceFitter>>,
    store: Option<Arc<dyn GridStore>>,
    cancel: Option<CancelToken>,
    initial_points: Option<Vec<Vec<f64>>>,
}

impl RunBuilder {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Set the intrinsic parameter space.
    #[must_use]
    pub fn space(mut self, space: IntrinsicSpace) -> Self {
        self.space = Some(space);
        self
    }

    /// Set the extrinsic prior.
    #[must_use]
    pub fn prior(mut self, prior: impl Prior + 'static) -> Self {
        self.prior = Some(Arc::new(prior));
        self
    }

    /// Set the likelihood evaluator.
    #[must_use]
    pub fn likelihood(mut self, likelihood: impl Likelihood + 'static) -> Self {
        self.likelihood = Some(Arc::new(likelihood));
        self
    }

    /// Share a likelihood evaluator with other runs.
    #[must_use]
    pub fn shared_likelihood(mut self, likelihood: Arc<dyn Likelihood>) -> Self {
        self.likelihood = Some(likelihood);
        self
    }

    /// Set the per-point integrator configuration.
    #[must_use]
    pub fn integrator(mut self, config: IntegratorConfig) -> Self {
        self.integrator = Some(config);
        self
    }

    /// Set the scheduler configuration.
    #[must_use]
    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = Some(config);
        self
    }

    /// Set the evidence-surface fitter.
    #[must_use]
    pub fn fitter(mut self, fitter: impl SurfaceFitter + 'static) -> Self {
        self.fitter = Some(Box::new(fitter));
        self
    }

    /// Set the grid store. Pass a store that already holds points to resume.
    #[must_use]
    pub fn store(mut self, store: impl GridStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set a cancel token shared with the caller.
    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Use these intrinsic points as generation 0 instead of the
    /// configured initial design.
    #[must_use]
    pub fn initial_points(mut self, points: Vec<Vec<f64>>) -> Self {
        self.initial_points = Some(points);
        self
    }

    /// Assembles the run.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingComponent` if the space, prior, or likelihood
    /// was not set, `Error::DimensionMismatch` if initial points do not
    /// match the space, or `Error::InvalidConfig` if the initial design
    /// cannot cover the space.
    pub fn build(self) -> Result<Run> {
        let space = self.space.ok_or(Error::MissingComponent("intrinsic space"))?;
        let prior = self.prior.ok_or(Error::MissingComponent("prior"))?;
        let likelihood = self
            .likelihood
            .ok_or(Error::MissingComponent("likelihood"))?;

        if let Some(points) = &self.initial_points {
            for p in points {
                space.check_dims(p)?;
            }
        }

        let config = self.scheduler.unwrap_or_default();
        let scheduler = match self.fitter {
            Some(fitter) => RefinementScheduler::with_fitter(space, config, fitter),
            None => RefinementScheduler::new(space, config),
        };
        if self.initial_points.is_none() {
            scheduler.check_initial_design()?;
        }

        Ok(Run {
            likelihood,
            prior,
            integrator: MonteCarloIntegrator::new(self.integrator.unwrap_or_default()),
            scheduler,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            cancel: self.cancel.unwrap_or_default(),
            initial_points: self.initial_points,
        })
    }
}
