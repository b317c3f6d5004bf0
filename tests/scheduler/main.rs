#![allow(clippy::cast_precision_loss)]

mod dedup;
mod refinement;

use rapid_pe::space::IntrinsicSpace;
use rapid_pe::store::GridStore;
use rapid_pe::{Generation, IntegralResult, IntegralStatus};

pub(crate) fn mass_space() -> IntrinsicSpace {
    IntrinsicSpace::builder()
        .dimension("mass1", 1.0, 2.0)
        .dimension("mass2", 1.0, 2.0)
        .build()
        .unwrap()
}

pub(crate) fn result(status: IntegralStatus, log_evidence: f64) -> IntegralResult {
    IntegralResult {
        status,
        log_evidence,
        relative_error: 0.02,
        effective_samples: 500.0,
        samples_drawn: 1000,
        nonzero_samples: 1000,
        batches: 1,
        ..IntegralResult::pending()
    }
}

/// Resolves every point of `generation` with a peaked evidence surface.
pub(crate) fn resolve_peaked(store: &dyn GridStore, generation: &Generation, peak: [f64; 2]) {
    for p in &generation.points {
        let d_sq = (p.params[0] - peak[0]).powi(2) + (p.params[1] - peak[1]).powi(2);
        store
            .resolve(p.id, result(IntegralStatus::Converged, -d_sq / (2.0 * 0.05_f64.powi(2))))
            .unwrap();
    }
}
