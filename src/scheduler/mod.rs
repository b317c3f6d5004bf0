//! Generation-by-generation refinement of the intrinsic grid.
//!
//! The [`RefinementScheduler`] turns a fully resolved generation into the
//! next one, or declares that the run has converged.
//!
//! # Algorithm overview
//!
//! 1. **Barrier**: the latest generation must be fully resolved;
//!    otherwise [`Error::UnresolvedGeneration`] is returned.
//! 2. **Convergence**: the aggregate log evidence (the evidence surface
//!    fitted to the history up to the latest generation, integrated over
//!    fixed probes) is compared with the one before it. A change below
//!    `evidence_tolerance`, or reaching `max_generations`, ends the run.
//! 3. **Fit**: failed points are dropped; converged and low-confidence
//!    points (the latter with inflated variance) feed a
//!    [`SurfaceFitter`].
//! 4. **Exploit**: for each exploitation slot, a parent is taken from the
//!    top `exploitation_pool` fraction of points, `n_candidates` Gaussian
//!    jitters of it are drawn, and the one with the best upper confidence
//!    bound on the surface is kept.
//! 5. **Explore**: the remaining `exploration_fraction` of slots are
//!    uniform draws from the intrinsic bounds.
//! 6. **Deduplicate**: draws outside the bounds or closer than
//!    `min_separation` to a claimed point are redrawn; a slot that runs out
//!    of redraws is dropped and the generation is emitted smaller.
//!
//! Distances are Euclidean in coordinates normalized by each dimension's
//! width, so `min_separation` and `jitter_scale` are fractions of the
//! prior range.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `generation_size` | 20 | Points requested per refinement generation |
//! | `initial_size` | `generation_size` | Points in generation 0 |
//! | `exploration_fraction` | 0.2 | Share of slots drawn uniformly |
//! | `jitter_scale` | 0.05 | Jitter standard deviation (normalized) |
//! | `min_separation` | 0.01 | Minimum distance between points (normalized) |
//! | `dedup_scope` | `History` | Which points a new point must avoid |
//! | `max_redraws` | 100 | Rejected draws tolerated per slot |
//! | `n_candidates` | 32 | Jitters scored per exploitation slot |
//! | `exploitation_pool` | 0.25 | Top fraction of points used as parents |
//! | `ucb_kappa` | 1.0 | Weight of surface uncertainty when ranking |
//! | `low_confidence_penalty` | 4.0 | Variance inflation of low-confidence points |
//! | `evidence_tolerance` | 0.1 | Aggregate log-evidence change that ends the run |
//! | `max_generations` | 10 | Cap on generations, including generation 0 |
//! | `n_probes` | 1024 | Probe points for the aggregate evidence |
//! | `initial_design` | `Random` | Layout of generation 0 |
//! | `seed` | random | RNG seed for reproducibility |

mod convergence;
mod design;
mod propose;
mod separation;

use self::convergence::ProbeSet;
use self::propose::ProposalPlan;
use self::separation::SeparationIndex;
use crate::error::{Error, Result};
use crate::fit::{self, KernelRegressionFitter, Observation, Surface, SurfaceFitter};
use crate::point::{Generation, GridRecord, IntrinsicPoint, PointId};
use crate::rng_util;
use crate::space::IntrinsicSpace;
use crate::store::GridStore;
use crate::types::{DedupScope, InitialDesign, StopReason};

const DEFAULT_GENERATION_SIZE: usize = 20;
const DEFAULT_EXPLORATION_FRACTION: f64 = 0.2;
const DEFAULT_JITTER_SCALE: f64 = 0.05;
const DEFAULT_MIN_SEPARATION: f64 = 0.01;
const DEFAULT_MAX_REDRAWS: usize = 100;
const DEFAULT_N_CANDIDATES: usize = 32;
const DEFAULT_EXPLOITATION_POOL: f64 = 0.25;
const DEFAULT_UCB_KAPPA: f64 = 1.0;
const DEFAULT_LOW_CONFIDENCE_PENALTY: f64 = 4.0;
const DEFAULT_EVIDENCE_TOLERANCE: f64 = 0.1;
const DEFAULT_MAX_GENERATIONS: u32 = 10;
const DEFAULT_N_PROBES: usize = 1024;

/// Stream of the scheduler's random draws, kept apart from the
/// integrator's per-point streams.
const SCHEDULER_STREAM: u64 = 0x5CED_0000_0000_0001;
const PROBE_STREAM: u64 = u64::MAX;

/// Policy knobs of the scheduler. Build with [`SchedulerConfig::builder`].
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Points requested per refinement generation.
    pub generation_size: usize,
    /// Points requested for generation 0.
    pub initial_size: usize,
    /// Share of slots drawn uniformly from the bounds.
    pub exploration_fraction: f64,
    /// Standard deviation of exploitation jitter, normalized units.
    pub jitter_scale: f64,
    /// Minimum distance between points, normalized units.
    pub min_separation: f64,
    /// Which points a new point must keep its distance from.
    pub dedup_scope: DedupScope,
    /// Rejected draws tolerated per slot before it is dropped.
    pub max_redraws: usize,
    /// Jitters scored per exploitation slot.
    pub n_candidates: usize,
    /// Top fraction of usable points eligible as parents.
    pub exploitation_pool: f64,
    /// Weight of predictive standard deviation in the ranking score.
    pub ucb_kappa: f64,
    /// Variance multiplier for low-confidence points in the surface fit.
    pub low_confidence_penalty: f64,
    /// Aggregate log-evidence change, in nats, that ends the run.
    pub evidence_tolerance: f64,
    /// Cap on generations, including generation 0.
    pub max_generations: u32,
    /// Probe points for the aggregate evidence.
    pub n_probes: usize,
    /// Layout of generation 0.
    pub initial_design: InitialDesign,
    /// RNG seed.
    pub seed: Option<u64>,
}

impl SchedulerConfig {
    /// Returns a builder with every option at its default.
    #[must_use]
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            generation_size: DEFAULT_GENERATION_SIZE,
            initial_size: DEFAULT_GENERATION_SIZE,
            exploration_fraction: DEFAULT_EXPLORATION_FRACTION,
            jitter_scale: DEFAULT_JITTER_SCALE,
            min_separation: DEFAULT_MIN_SEPARATION,
            dedup_scope: DedupScope::default(),
            max_redraws: DEFAULT_MAX_REDRAWS,
            n_candidates: DEFAULT_N_CANDIDATES,
            exploitation_pool: DEFAULT_EXPLOITATION_POOL,
            ucb_kappa: DEFAULT_UCB_KAPPA,
            low_confidence_penalty: DEFAULT_LOW_CONFIDENCE_PENALTY,
            evidence_tolerance: DEFAULT_EVIDENCE_TOLERANCE,
            max_generations: DEFAULT_MAX_GENERATIONS,
            n_probes: DEFAULT_N_PROBES,
            initial_design: InitialDesign::default(),
            seed: None,
        }
    }
}

/// Builder for [`SchedulerConfig`].
///
/// # Examples
///
/// ```
/// use rapid_pe::scheduler::SchedulerConfig;
/// use rapid_pe::DedupScope;
///
/// let config = SchedulerConfig::builder()
///     .generation_size(40)
///     .initial_size(100)
///     .exploration_fraction(0.1)
///     .dedup_scope(DedupScope::History)
///     .seed(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_generations, 10);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SchedulerConfigBuilder {
    generation_size: Option<usize>,
    initial_size: Option<usize>,
    exploration_fraction: Option<f64>,
    jitter_scale: Option<f64>,
    min_separation: Option<f64>,
    dedup_scope: Option<DedupScope>,
    max_redraws: Option<usize>,
    n_candidates: Option<usize>,
    exploitation_pool: Option<f64>,
    ucb_kappa: Option<f64>,
    low_confidence_penalty: Option<f64>,
    evidence_tolerance: Option<f64>,
    max_generations: Option<u32>,
    n_probes: Option<usize>,
    initial_design: Option<InitialDesign>,
    seed: Option<u64>,
}

impl SchedulerConfigBuilder {
    /// Points requested per refinement generation. Default: 20.
    #[must_use]
    pub fn generation_size(mut self, n: usize) -> Self {
        self.generation_size = Some(n);
        self
    }

    /// Points requested for generation 0. Default: `generation_size`.
    #[must_use]
    pub fn initial_size(mut self, n: usize) -> Self {
        self.initial_size = Some(n);
        self
    }

    /// Share of slots drawn uniformly, in `[0, 1]`. Default: 0.2.
    #[must_use]
    pub fn exploration_fraction(mut self, f: f64) -> Self {
        self.exploration_fraction = Some(f);
        self
    }

    /// Jitter standard deviation as a fraction of each range. Default: 0.05.
    #[must_use]
    pub fn jitter_scale(mut self, s: f64) -> Self {
        self.jitter_scale = Some(s);
        self
    }

    /// Minimum normalized distance between points. Default: 0.01.
    #[must_use]
    pub fn min_separation(mut self, d: f64) -> Self {
        self.min_separation = Some(d);
        self
    }

    /// Which points a new point must avoid. Default: `History`.
    #[must_use]
    pub fn dedup_scope(mut self, scope: DedupScope) -> Self {
        self.dedup_scope = Some(scope);
        self
    }

    /// Rejected draws tolerated per slot. Default: 100.
    #[must_use]
    pub fn max_redraws(mut self, n: usize) -> Self {
        self.max_redraws = Some(n);
        self
    }

    /// Jitters scored per exploitation slot. Default: 32.
    #[must_use]
    pub fn n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = Some(n);
        self
    }

    /// Top fraction of points eligible as parents, in `(0, 1]`. Default: 0.25.
    #[must_use]
    pub fn exploitation_pool(mut self, f: f64) -> Self {
        self.exploitation_pool = Some(f);
        self
    }

    /// Weight of surface uncertainty when ranking. Default: 1.0.
    #[must_use]
    pub fn ucb_kappa(mut self, k: f64) -> Self {
        self.ucb_kappa = Some(k);
        self
    }

    /// Variance inflation for low-confidence points, at least 1. Default: 4.0.
    #[must_use]
    pub fn low_confidence_penalty(mut self, p: f64) -> Self {
        self.low_confidence_penalty = Some(p);
        self
    }

    /// Aggregate log-evidence change that ends the run. Default: 0.1.
    #[must_use]
    pub fn evidence_tolerance(mut self, tol: f64) -> Self {
        self.evidence_tolerance = Some(tol);
        self
    }

    /// Cap on generations, including generation 0. Default: 10.
    #[must_use]
    pub fn max_generations(mut self, n: u32) -> Self {
        self.max_generations = Some(n);
        self
    }

    /// Probe points for the aggregate evidence. Default: 1024.
    #[must_use]
    pub fn n_probes(mut self, n: usize) -> Self {
        self.n_probes = Some(n);
        self
    }

    /// Layout of generation 0. Default: `Random`.
    #[must_use]
    pub fn initial_design(mut self, design: InitialDesign) -> Self {
        self.initial_design = Some(design);
        self
    }

    /// RNG seed for reproducibility.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first invalid option.
    pub fn build(self) -> Result<SchedulerConfig> {
        let d = SchedulerConfig::default();
        let generation_size = self.generation_size.unwrap_or(d.generation_size);
        let config = SchedulerConfig {
            generation_size,
            initial_size: self.initial_size.unwrap_or(generation_size),
            exploration_fraction: self.exploration_fraction.unwrap_or(d.exploration_fraction),
            jitter_scale: self.jitter_scale.unwrap_or(d.jitter_scale),
            min_separation: self.min_separation.unwrap_or(d.min_separation),
            dedup_scope: self.dedup_scope.unwrap_or(d.dedup_scope),
            max_redraws: self.max_redraws.unwrap_or(d.max_redraws),
            n_candidates: self.n_candidates.unwrap_or(d.n_candidates),
            exploitation_pool: self.exploitation_pool.unwrap_or(d.exploitation_pool),
            ucb_kappa: self.ucb_kappa.unwrap_or(d.ucb_kappa),
            low_confidence_penalty: self
                .low_confidence_penalty
                .unwrap_or(d.low_confidence_penalty),
            evidence_tolerance: self.evidence_tolerance.unwrap_or(d.evidence_tolerance),
            max_generations: self.max_generations.unwrap_or(d.max_generations),
            n_probes: self.n_probes.unwrap_or(d.n_probes),
            initial_design: self.initial_design.unwrap_or(d.initial_design),
            seed: self.seed,
        };

        let invalid = |name: &'static str, reason: &str| {
            Err(Error::InvalidConfig {
                name,
                reason: reason.to_string(),
            })
        };
        if config.generation_size == 0 {
            return invalid("generation_size", "must be positive");
        }
        if config.initial_size == 0 {
            return invalid("initial_size", "must be positive");
        }
        if !(0.0..=1.0).contains(&config.exploration_fraction) {
            return invalid("exploration_fraction", "must be in [0, 1]");
        }
        if !(config.jitter_scale > 0.0 && config.jitter_scale.is_finite()) {
            return invalid("jitter_scale", "must be positive");
        }
        if !(config.min_separation >= 0.0 && config.min_separation.is_finite()) {
            return invalid("min_separation", "must be non-negative");
        }
        if config.n_candidates == 0 {
            return invalid("n_candidates", "must be positive");
        }
        if !(config.exploitation_pool > 0.0 && config.exploitation_pool <= 1.0) {
            return invalid("exploitation_pool", "must be in (0, 1]");
        }
        if !(config.ucb_kappa >= 0.0 && config.ucb_kappa.is_finite()) {
            return invalid("ucb_kappa", "must be non-negative");
        }
        if !(config.low_confidence_penalty >= 1.0 && config.low_confidence_penalty.is_finite()) {
            return invalid("low_confidence_penalty", "must be at least 1");
        }
        if config.evidence_tolerance.is_nan() || config.evidence_tolerance < 0.0 {
            return invalid("evidence_tolerance", "must be non-negative");
        }
        if config.max_generations == 0 {
            return invalid("max_generations", "must be positive");
        }
        if config.n_probes == 0 {
            return invalid("n_probes", "must be positive");
        }
        Ok(config)
    }
}

/// Why and where the run stopped.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceReport {
    /// Index of the last generation.
    pub generation: u32,
    /// Which criterion fired.
    pub reason: StopReason,
    /// Aggregate log evidence after the last generation, if any point was
    /// usable.
    pub log_evidence: Option<f64>,
    /// Change of the aggregate log evidence from the previous generation.
    pub change: Option<f64>,
}

/// Result of [`RefinementScheduler::next_generation`].
///
/// A refinement step that cannot place a single point ends the run with
/// [`StopReason::GridExhausted`] instead of emitting an empty generation.
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationOutcome {
    /// A new generation was emitted and inserted in the store.
    Next(Generation),
    /// No further generation will be issued.
    Converged(ConvergenceReport),
}

/// Proposes generations of intrinsic points from a [`GridStore`].
///
/// The scheduler itself is immutable: all run state lives in the store it
/// is handed, so one scheduler can drive independent runs and a restarted
/// run continues from whatever the store holds.
///
/// # Examples
///
/// ```
/// use rapid_pe::scheduler::{GenerationOutcome, RefinementScheduler, SchedulerConfig};
/// use rapid_pe::space::IntrinsicSpace;
/// use rapid_pe::store::{GridStore, MemoryStore};
/// use rapid_pe::{IntegralResult, IntegralStatus};
///
/// let space = IntrinsicSpace::builder().dimension("mass1", 1.0, 2.0).build().unwrap();
/// let config = SchedulerConfig::builder().generation_size(5).seed(1).build().unwrap();
/// let scheduler = RefinementScheduler::new(space, config);
/// let store = MemoryStore::new();
///
/// let first = scheduler.initial_generation(&store).unwrap();
/// for p in &first.points {
///     let result = IntegralResult {
///         status: IntegralStatus::Converged,
///         log_evidence: -(p.params[0] - 1.4).powi(2),
///         relative_error: 0.01,
///         ..IntegralResult::pending()
///     };
///     store.resolve(p.id, result).unwrap();
/// }
/// match scheduler.next_generation(&store).unwrap() {
///     GenerationOutcome::Next(generation) => assert_eq!(generation.index, 1),
///     GenerationOutcome::Converged(_) => unreachable!(),
/// }
/// ```
pub struct RefinementScheduler {
    space: IntrinsicSpace,
    config: SchedulerConfig,
    fitter: Box<dyn SurfaceFitter>,
    probes: ProbeSet,
}

impl RefinementScheduler {
    /// Creates a scheduler using the default surface fitter.
    #[must_use]
    pub fn new(space: IntrinsicSpace, config: SchedulerConfig) -> Self {
        Self::with_fitter(space, config, fit::default_fitter())
    }

    /// Creates a scheduler with a custom surface fitter.
    #[must_use]
    pub fn with_fitter(
        space: IntrinsicSpace,
        config: SchedulerConfig,
        fitter: Box<dyn SurfaceFitter>,
    ) -> Self {
        let mut probe_rng = rng_util::stream_rng(config.seed, PROBE_STREAM);
        let probes = ProbeSet::new(config.n_probes, space.n_dims(), &mut probe_rng);
        Self {
            space,
            config,
            fitter,
            probes,
        }
    }

    /// The intrinsic space points are drawn from.
    #[must_use]
    pub fn space(&self) -> &IntrinsicSpace {
        &self.space
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn generation_rng(&self, generation: u32) -> fastrand::Rng {
        let seed = self
            .config
            .seed
            .map(|s| rng_util::mix_seed(s, SCHEDULER_STREAM));
        rng_util::stream_rng(seed, u64::from(generation))
    }

    /// Checks that the configured initial design can lay out this space.
    pub(crate) fn check_initial_design(&self) -> Result<()> {
        design::check_dims(self.config.initial_design, self.space.n_dims())
    }

    /// Lays out generation 0 with the configured initial design and
    /// inserts it into `store`.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadySeeded` if the store already holds points,
    /// `Error::InvalidConfig` if the initial design cannot cover the space,
    /// or a storage error if a point cannot be persisted.
    pub fn initial_generation(&self, store: &dyn GridStore) -> Result<Generation> {
        if let Some(latest) = store.latest_generation() {
            return Err(Error::AlreadySeeded(latest));
        }
        self.check_initial_design()?;
        let mut rng = self.generation_rng(0);
        let mut taken = SeparationIndex::new(self.config.min_separation);
        let unit = design::initial_design(
            self.config.initial_design,
            self.config.initial_size,
            self.space.n_dims(),
            self.config.max_redraws,
            &mut rng,
            &mut taken,
        );
        let params = unit.iter().map(|u| self.space.denormalize(u)).collect();
        emit(store, 0, params, &[], self.config.initial_size)
    }

    /// Uses caller-supplied points as generation 0.
    ///
    /// Points closer than `min_separation` to an earlier supplied point are
    /// skipped, shrinking the generation.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadySeeded` if the store already holds points,
    /// `Error::InvalidConfig` for an empty list,
    /// `Error::DimensionMismatch` or `Error::OutOfBounds` for a malformed
    /// point (points are never clamped), or a storage error.
    pub fn seed_generation(&self, store: &dyn GridStore, points: Vec<Vec<f64>>) -> Result<Generation> {
        if let Some(latest) = store.latest_generation() {
            return Err(Error::AlreadySeeded(latest));
        }
        if points.is_empty() {
            return Err(Error::InvalidConfig {
                name: "initial_points",
                reason: "at least one point is required".into(),
            });
        }
        for p in &points {
            self.space.check_dims(p)?;
            if !self.space.contains(p) {
                return Err(Error::OutOfBounds { values: p.clone() });
            }
        }
        let requested = points.len();
        let mut taken = SeparationIndex::new(self.config.min_separation);
        let mut kept = Vec::with_capacity(requested);
        for p in points {
            let u = self.space.normalize(&p);
            if taken.is_clear(&u) {
                taken.claim(u);
                kept.push(p);
            }
        }
        emit(store, 0, kept, &[], requested)
    }

    /// Aggregate log evidence of every usable point in generations
    /// `0..=generation`: the evidence surface fitted to those points,
    /// integrated over the intrinsic prior. `None` if there is no usable
    /// point.
    #[must_use]
    pub fn aggregate_log_evidence(&self, store: &dyn GridStore, generation: u32) -> Option<f64> {
        let observations: Vec<Observation> = store
            .records_arc()
            .read()
            .iter()
            .filter(|r| r.point.generation <= generation)
            .filter_map(|r| {
                Observation::from_record(r, &self.space, self.config.low_confidence_penalty)
            })
            .collect();
        let surface = self.fit_surface(&observations).ok()??;
        self.probes.log_evidence(|u| surface.predict(u).mean)
    }

    /// Fits the configured surface, falling back to kernel regression when
    /// that fails. `None` without observations.
    fn fit_surface(&self, observations: &[Observation]) -> Result<Option<Box<dyn Surface>>> {
        if observations.is_empty() {
            return Ok(None);
        }
        match self.fitter.fit(observations) {
            Ok(s) => Ok(Some(s)),
            Err(e) => {
                trace_warn!(fitter = self.fitter.name(), error = %e, "surface fit failed, using kernel regression");
                #[cfg(not(feature = "tracing"))]
                let _ = e;
                KernelRegressionFitter::new().fit(observations).map(Some)
            }
        }
    }

    /// Derives the next generation from the fully resolved latest one, or
    /// reports convergence.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyStore` before generation 0 exists,
    /// `Error::UnresolvedGeneration` while the latest generation has
    /// pending points, or a storage error.
    pub fn next_generation(&self, store: &dyn GridStore) -> Result<GenerationOutcome> {
        let latest = store.latest_generation().ok_or(Error::EmptyStore)?;
        let pending = store.pending_in(latest);
        if pending > 0 {
            return Err(Error::UnresolvedGeneration {
                generation: latest,
                pending,
            });
        }

        let current = self.aggregate_log_evidence(store, latest);
        let change = latest
            .checked_sub(1)
            .and_then(|prev| self.aggregate_log_evidence(store, prev))
            .zip(current)
            .map(|(before, now)| (now - before).abs())
            .filter(|c| c.is_finite());

        if let Some(c) = change
            && c < self.config.evidence_tolerance
        {
            trace_info!(
                generation = latest,
                log_evidence = current,
                change = c,
                "aggregate evidence converged"
            );
            return Ok(GenerationOutcome::Converged(ConvergenceReport {
                generation: latest,
                reason: StopReason::EvidenceConverged,
                log_evidence: current,
                change,
            }));
        }
        if latest + 1 >= self.config.max_generations {
            trace_info!(
                generation = latest,
                log_evidence = current,
                "generation cap reached"
            );
            return Ok(GenerationOutcome::Converged(ConvergenceReport {
                generation: latest,
                reason: StopReason::MaxGenerations,
                log_evidence: current,
                change,
            }));
        }

        let generation = self.refine(store, latest + 1)?;
        if generation.is_empty() {
            trace_warn!(generation = latest, "no admissible point left to propose");
            return Ok(GenerationOutcome::Converged(ConvergenceReport {
                generation: latest,
                reason: StopReason::GridExhausted,
                log_evidence: current,
                change,
            }));
        }
        Ok(GenerationOutcome::Next(generation))
    }

    fn refine(&self, store: &dyn GridStore, index: u32) -> Result<Generation> {
        let records = store.records();
        let mut usable: Vec<&GridRecord> = records
            .iter()
            .filter(|r| r.status().is_usable() && r.result.log_evidence.is_finite())
            .collect();

        let observations: Vec<Observation> = usable
            .iter()
            .filter_map(|r| {
                Observation::from_record(r, &self.space, self.config.low_confidence_penalty)
            })
            .collect();
        let surface = self.fit_surface(&observations)?;

        usable.sort_by(|a, b| b.result.log_evidence.total_cmp(&a.result.log_evidence));
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let pool_size = ((usable.len() as f64 * self.config.exploitation_pool).ceil() as usize)
            .clamp(usize::from(!usable.is_empty()), usable.len());
        let parents: Vec<_> = usable[..pool_size]
            .iter()
            .map(|r| (r.point.id, self.space.normalize(&r.point.params)))
            .collect();

        let size = self.config.generation_size;
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let mut n_explore = ((size as f64) * self.config.exploration_fraction).round() as usize;
        if parents.is_empty() {
            n_explore = size;
        }
        let n_exploit = size - n_explore.min(size);

        let mut taken = SeparationIndex::new(self.config.min_separation);
        if self.config.dedup_scope == DedupScope::History {
            for r in &records {
                taken.claim(self.space.normalize(&r.point.params));
            }
        }

        let plan = ProposalPlan {
            parents: &parents,
            surface: surface.as_deref(),
            n_exploit,
            n_explore: size - n_exploit,
            n_dims: self.space.n_dims(),
            jitter_scale: self.config.jitter_scale,
            n_candidates: self.config.n_candidates,
            max_redraws: self.config.max_redraws,
            ucb_kappa: self.config.ucb_kappa,
        };
        let mut rng = self.generation_rng(index);
        let (proposed, stats) = plan.draw(&mut rng, &mut taken);
        trace_debug!(
            generation = index,
            out_of_bounds = stats.out_of_bounds,
            too_close = stats.too_close,
            dropped = stats.dropped_slots,
            "proposal rejections"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = stats;

        let (params, parents): (Vec<_>, Vec<_>) = proposed
            .into_iter()
            .map(|p| (self.space.denormalize(&p.x), p.parent))
            .unzip();
        emit(store, index, params, &parents, size)
    }
}

/// Inserts freshly drawn points as generation `index`.
fn emit(
    store: &dyn GridStore,
    index: u32,
    params: Vec<Vec<f64>>,
    parents: &[Option<PointId>],
    requested: usize,
) -> Result<Generation> {
    let mut points = Vec::with_capacity(params.len());
    for (k, values) in params.into_iter().enumerate() {
        let parent = parents.get(k).copied().flatten();
        let point = IntrinsicPoint::new(store.next_point_id(), values, index, parent);
        store.insert(point.clone())?;
        points.push(point);
    }
    let generation = Generation {
        index,
        points,
        requested,
    };
    if generation.is_shrunk() {
        trace_warn!(
            generation = index,
            emitted = generation.len(),
            requested,
            "generation shrunk by deduplication"
        );
    } else {
        trace_info!(generation = index, emitted = generation.len(), "generation emitted");
    }
    Ok(generation)
}
