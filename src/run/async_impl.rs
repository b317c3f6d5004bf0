use std::sync::Arc;

use super::{Run, RunSummary};
use crate::error::{Error, Result};
use crate::point::{IntegralResult, IntrinsicPoint};

impl Run {
    /// Runs the generation loop, integrating up to `concurrency` points of
    /// each generation at once.
    ///
    /// Each integration runs in [`spawn_blocking`](tokio::task::spawn_blocking);
    /// results are resolved in the store as they arrive via a
    /// [`JoinSet`](tokio::task::JoinSet). Every point draws from its own
    /// seeded stream, so a seeded run produces the same records as
    /// [`execute`](Self::execute).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `concurrency` is zero,
    /// `Error::TaskError` if a worker task panics or the semaphore closes,
    /// and otherwise the same errors as [`execute`](Self::execute).
    ///
    /// # Examples
    ///
    /// ```
    /// use rapid_pe::prelude::*;
    /// use rapid_pe::toy::GaussianLikelihood;
    ///
    /// # #[cfg(feature = "async")]
    /// # async fn example() -> rapid_pe::Result<()> {
    /// let run = Run::builder()
    ///     .space(IntrinsicSpace::builder().dimension("mass1", 1.0, 2.0).build()?)
    ///     .prior(
    ///         ExtrinsicPrior::builder()
    ///             .dimension("x", PriorDimension::uniform(-3.0, 3.0)?)
    ///             .build()?,
    ///     )
    ///     .likelihood(GaussianLikelihood::new(vec![1.5], 0.2, vec![0.0], 1.0))
    ///     .scheduler(SchedulerConfig::builder().max_generations(3).build()?)
    ///     .build()?;
    ///
    /// let summary = run.execute_parallel(4).await?;
    /// assert!(summary.generations <= 3);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_parallel(&self, concurrency: usize) -> Result<RunSummary> {
        if concurrency == 0 {
            return Err(Error::InvalidConfig {
                name: "concurrency",
                reason: "must be at least 1".into(),
            });
        }
        trace_info!(concurrency, dims = self.space().n_dims(), "parallel run started");

        let mut shrunk = self.start()?;
        loop {
            self.integrate_parallel(self.pending_points(), concurrency)
                .await?;
            if let Some(summary) = self.advance(&mut shrunk)? {
                return Ok(summary);
            }
        }
    }

    async fn integrate_parallel(&self, points: Vec<IntrinsicPoint>, concurrency: usize) -> Result<()> {
        use tokio::sync::Semaphore;
        use tokio::task::JoinSet;

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut join_set: JoinSet<Result<(IntrinsicPoint, IntegralResult)>> = JoinSet::new();

        for point in points {
            if self.cancel.is_cancelled() {
                break;
            }
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::TaskError(e.to_string()))?;

            let integrator = self.integrator.clone();
            let likelihood = Arc::clone(&self.likelihood);
            let prior = Arc::clone(&self.prior);
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                let outcome = tokio::task::spawn_blocking(move || {
                    integrator
                        .integrate_with(&point, &*likelihood, &*prior, Some(&cancel))
                        .map(|result| (point, result))
                })
                .await
                .map_err(|e| Error::TaskError(e.to_string()));
                drop(permit);
                outcome?
            });

            // Resolve whatever has already finished so the store stays current.
            while let Some(done) = join_set.try_join_next() {
                self.resolve_joined(done)?;
            }
        }

        while let Some(done) = join_set.join_next().await {
            self.resolve_joined(done)?;
        }
        Ok(())
    }

    fn resolve_joined(
        &self,
        done: core::result::Result<Result<(IntrinsicPoint, IntegralResult)>, tokio::task::JoinError>,
    ) -> Result<()> {
        match done.map_err(|e| Error::TaskError(e.to_string()))? {
            Ok((point, result)) => self.store.resolve(point.id, result).map(|_| ()),
            // Cancelled before its first sample; the point stays pending.
            Err(Error::Cancelled) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
