//! The end-to-end generation loop.
//!
//! A [`Run`] owns every collaborator of one parameter-estimation run: the
//! intrinsic space, the extrinsic prior, the likelihood, the integrator,
//! the scheduler, and the grid store. [`Run::execute`] alternates two
//! phases until the scheduler reports convergence:
//!
//! 1. integrate every pending point and resolve it in the store;
//! 2. ask the scheduler for the next generation.
//!
//! With the `async` feature, [`Run::execute_parallel`] integrates the
//! points of a generation concurrently.
//!
//! # Resuming
//!
//! All progress lives in the store. Executing a run over a store that
//! already holds points skips the initial design, integrates whatever is
//! still pending, and continues from the latest generation. With a
//! [`JournalStore`](crate::store::JournalStore) this resumes a crashed run
//! at the generation level.
//!
//! Cancelling through the run's [`CancelToken`] resolves the points already
//! under way with whatever they sampled. Points that had not started stay
//! pending, so executing the run again later integrates them.

#[cfg(feature = "async")]
mod async_impl;
mod builder;

use std::sync::Arc;

pub use builder::RunBuilder;

use crate::error::{Error, Result};
use crate::integrator::{CancelToken, MonteCarloIntegrator};
use crate::likelihood::{Likelihood, LikelihoodError};
use crate::point::{GridRecord, IntrinsicPoint};
use crate::prior::Prior;
use crate::scheduler::{GenerationOutcome, RefinementScheduler};
use crate::space::IntrinsicSpace;
use crate::store::GridStore;
use crate::types::{IntegralStatus, StopReason};

/// One parameter-estimation run. Build with [`Run::builder`].
pub struct Run {
    likelihood: Arc<dyn Likelihood>,
    prior: Arc<dyn Prior>,
    integrator: MonteCarloIntegrator,
    scheduler: RefinementScheduler,
    store: Arc<dyn GridStore>,
    cancel: CancelToken,
    initial_points: Option<Vec<Vec<f64>>>,
}

/// Outcome of a completed run.
///
/// Soft degradations are counted here rather than raised as errors: a
/// run with failed or low-confidence points, or with shrunk generations,
/// still completes.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Generations in the store, including generation 0.
    pub generations: u32,
    /// Points in the store.
    pub points: usize,
    /// Points whose integral met the tolerance.
    pub converged: usize,
    /// Points that ran out of budget before the tolerance.
    pub low_confidence: usize,
    /// Points without a usable result.
    pub failed: usize,
    /// Points left unintegrated by a cancelled run.
    pub pending: usize,
    /// Generations emitted smaller than requested during this execution.
    pub shrunk_generations: usize,
    /// Why the run stopped.
    pub stop_reason: StopReason,
    /// Aggregate log evidence over the intrinsic prior.
    pub log_evidence: Option<f64>,
    /// Last change of the aggregate log evidence between generations.
    pub change: Option<f64>,
    /// The usable point with the highest evidence.
    pub best: Option<GridRecord>,
}

impl RunSummary {
    /// Returns `true` if the aggregate evidence settled below the
    /// tolerance.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.stop_reason == StopReason::EvidenceConverged
    }

    /// Returns `true` if any soft degradation occurred.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.low_confidence > 0 || self.failed > 0 || self.shrunk_generations > 0
    }
}

impl Run {
    /// Returns a builder for a run.
    #[must_use]
    pub fn builder() -> RunBuilder {
        RunBuilder::new()
    }

    /// The intrinsic space of this run.
    #[must_use]
    pub fn space(&self) -> &IntrinsicSpace {
        self.scheduler.space()
    }

    /// The store holding this run's points.
    #[must_use]
    pub fn store(&self) -> &dyn GridStore {
        &*self.store
    }

    /// A handle that aborts in-flight integrations and stops the run.
    /// Points that had not started stay pending.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Runs the generation loop to completion, integrating points one after
    /// another.
    ///
    /// # Errors
    ///
    /// Returns `Error::LikelihoodUnusable` or `Error::InvalidPrior` if a
    /// collaborator is unusable, and propagates scheduler and storage
    /// errors. Point-level problems never abort the run.
    pub fn execute(&self) -> Result<RunSummary> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("run", dims = self.space().n_dims()).entered();

        let mut shrunk = self.start()?;
        loop {
            for point in self.pending_points() {
                match self.integrator.integrate_with(
                    &point,
                    &*self.likelihood,
                    &*self.prior,
                    Some(&self.cancel),
                ) {
                    Ok(result) => {
                        self.store.resolve(point.id, result)?;
                    }
                    // The rest of the generation stays pending.
                    Err(Error::Cancelled) => break,
                    Err(e) => return Err(e),
                }
            }
            if let Some(summary) = self.advance(&mut shrunk)? {
                return Ok(summary);
            }
        }
    }

    /// Checks the collaborators and lays out generation 0 unless the store
    /// already holds points. Returns 1 if generation 0 came out shrunk.
    fn start(&self) -> Result<usize> {
        self.likelihood.check().map_err(|e| match e {
            LikelihoodError::Unusable(msg) | LikelihoodError::Domain(msg) => {
                Error::LikelihoodUnusable(msg)
            }
        })?;
        self.prior.validate()?;

        self.store.refresh();
        if let Some(latest) = self.store().latest_generation() {
            trace_info!(
                generation = latest,
                points = self.store().len(),
                "resuming from stored points"
            );
            return Ok(0);
        }
        let generation = match &self.initial_points {
            Some(points) => self
                .scheduler
                .seed_generation(self.store(), points.clone())?,
            None => self.scheduler.initial_generation(self.store())?,
        };
        Ok(usize::from(generation.is_shrunk()))
    }

    fn pending_points(&self) -> Vec<IntrinsicPoint> {
        self.store
            .records_arc()
            .read()
            .iter()
            .filter(|r| !r.status().is_resolved())
            .map(|r| r.point.clone())
            .collect()
    }

    /// Moves past a fully resolved generation. Returns the summary once the
    /// run is over.
    fn advance(&self, shrunk: &mut usize) -> Result<Option<RunSummary>> {
        if self.cancel.is_cancelled() {
            trace_warn!("run cancelled");
            return Ok(Some(self.summarize(StopReason::Cancelled, None, *shrunk)));
        }
        match self.scheduler.next_generation(self.store())? {
            GenerationOutcome::Next(generation) => {
                if generation.is_shrunk() {
                    *shrunk += 1;
                }
                Ok(None)
            }
            GenerationOutcome::Converged(report) => {
                Ok(Some(self.summarize(report.reason, report.change, *shrunk)))
            }
        }
    }

    fn summarize(&self, stop_reason: StopReason, change: Option<f64>, shrunk: usize) -> RunSummary {
        let store = self.store();
        let latest = store.latest_generation();
        let summary = RunSummary {
            generations: latest.map_or(0, |g| g + 1),
            points: store.len(),
            converged: store.count_status(IntegralStatus::Converged),
            low_confidence: store.count_status(IntegralStatus::LowConfidence),
            failed: store.count_status(IntegralStatus::Failed),
            pending: store.count_status(IntegralStatus::Pending),
            shrunk_generations: shrunk,
            stop_reason,
            log_evidence: latest.and_then(|g| self.scheduler.aggregate_log_evidence(store, g)),
            change,
            best: store.best(),
        };
        trace_info!(
            generations = summary.generations,
            points = summary.points,
            failed = summary.failed,
            pending = summary.pending,
            low_confidence = summary.low_confidence,
            reason = ?summary.stop_reason,
            "run finished"
        );
        summary
    }
}
