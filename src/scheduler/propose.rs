//! Drawing refinement points: jitter around good parents, uniform draws
//! for exploration.
//!
//! All coordinates here are normalized to the unit cube. A draw that
//! leaves the cube is redrawn, never clamped: clamping would pile points
//! up on the boundary and bias the grid.

use super::separation::SeparationIndex;
use crate::fit::Surface;
use crate::point::PointId;
use crate::rng_util;

/// A point chosen for the next generation.
pub(crate) struct Proposed {
    pub(crate) x: Vec<f64>,
    pub(crate) parent: Option<PointId>,
}

/// Rejection bookkeeping of one proposal round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProposalStats {
    pub(crate) out_of_bounds: usize,
    pub(crate) too_close: usize,
    pub(crate) dropped_slots: usize,
}

pub(crate) struct ProposalPlan<'a> {
    /// Exploitation parents in normalized coordinates, best first.
    pub(crate) parents: &'a [(PointId, Vec<f64>)],
    pub(crate) surface: Option<&'a dyn Surface>,
    pub(crate) n_exploit: usize,
    pub(crate) n_explore: usize,
    pub(crate) n_dims: usize,
    pub(crate) jitter_scale: f64,
    pub(crate) n_candidates: usize,
    pub(crate) max_redraws: usize,
    pub(crate) ucb_kappa: f64,
}

impl ProposalPlan<'_> {
    pub(crate) fn draw(
        &self,
        rng: &mut fastrand::Rng,
        taken: &mut SeparationIndex,
    ) -> (Vec<Proposed>, ProposalStats) {
        let mut stats = ProposalStats::default();
        let mut out = Vec::with_capacity(self.n_exploit + self.n_explore);

        if !self.parents.is_empty() {
            for slot in 0..self.n_exploit {
                let (parent_id, parent_x) = &self.parents[slot % self.parents.len()];
                match self.exploit_slot(parent_x, rng, taken, &mut stats) {
                    Some(x) => {
                        taken.claim(x.clone());
                        out.push(Proposed {
                            x,
                            parent: Some(*parent_id),
                        });
                    }
                    None => stats.dropped_slots += 1,
                }
            }
        }

        for _ in 0..self.n_explore {
            match self.explore_slot(rng, taken, &mut stats) {
                Some(x) => {
                    taken.claim(x.clone());
                    out.push(Proposed { x, parent: None });
                }
                None => stats.dropped_slots += 1,
            }
        }

        (out, stats)
    }

    /// Best of up to `n_candidates` admissible jitters by upper confidence
    /// bound on the surface.
    fn exploit_slot(
        &self,
        parent: &[f64],
        rng: &mut fastrand::Rng,
        taken: &SeparationIndex,
        stats: &mut ProposalStats,
    ) -> Option<Vec<f64>> {
        let mut best: Option<(f64, Vec<f64>)> = None;
        let mut admissible = 0;
        let max_attempts = self.n_candidates + self.max_redraws;

        for _ in 0..max_attempts {
            if admissible >= self.n_candidates {
                break;
            }
            let x: Vec<f64> = parent
                .iter()
                .map(|&p| p + self.jitter_scale * rng_util::standard_normal(rng))
                .collect();
            if x.iter().any(|u| !(0.0..=1.0).contains(u)) {
                stats.out_of_bounds += 1;
                continue;
            }
            if !taken.is_clear(&x) {
                stats.too_close += 1;
                continue;
            }
            admissible += 1;

            let score = self.surface.map_or(0.0, |s| {
                let ucb = s.predict(&x).upper_bound(self.ucb_kappa);
                if ucb.is_nan() { f64::NEG_INFINITY } else { ucb }
            });
            if best.as_ref().is_none_or(|(b, _)| score > *b) {
                best = Some((score, x));
            }
        }

        best.map(|(_, x)| x)
    }

    fn explore_slot(
        &self,
        rng: &mut fastrand::Rng,
        taken: &SeparationIndex,
        stats: &mut ProposalStats,
    ) -> Option<Vec<f64>> {
        for _ in 0..=self.max_redraws {
            let x: Vec<f64> = (0..self.n_dims).map(|_| rng.f64()).collect();
            if taken.is_clear(&x) {
                return Some(x);
            }
            stats.too_close += 1;
        }
        None
    }
}
