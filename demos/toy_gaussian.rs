//! A complete run on the closed-form Gaussian likelihood.
//!
//! Integrates a two-dimensional mass grid over the standard seven
//! extrinsic parameters, refines it for a few generations, persists every
//! record to a journal, and exports a CSV next to it. Run it twice to see
//! the second invocation resume from the journal.
//!
//! Run with: `cargo run --example toy_gaussian`
//! More detail: `RUST_LOG=rapid_pe=debug cargo run --example toy_gaussian`

use rapid_pe::prelude::*;
use rapid_pe::toy::GaussianLikelihood;
use tracing_subscriber::EnvFilter;

fn main() -> rapid_pe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rapid_pe=info")),
        )
        .init();

    let journal = std::env::temp_dir().join("rapid_pe_toy_gaussian.jsonl");
    let csv = journal.with_extension("csv");

    let space = IntrinsicSpace::builder()
        .dimension("mass1", 1.0, 2.0)
        .dimension("mass2", 1.0, 2.0)
        .build()?;
    // right ascension, declination, inclination, polarization, phase, distance, time
    let prior = ExtrinsicPrior::sky_and_orientation(40.0, 0.05)?;
    let extrinsic_peak = prior
        .dimensions()
        .iter()
        .map(|d| {
            let b = d.bounds();
            b.low + 0.5 * b.width()
        })
        .collect();
    let likelihood = GaussianLikelihood::new(vec![1.4, 1.35], 0.08, extrinsic_peak, 0.5);

    let run = Run::builder()
        .space(space)
        .prior(prior)
        .likelihood(likelihood)
        .integrator(
            IntegratorConfig::builder()
                .batch_size(2000)
                .relative_tolerance(0.05)
                .seed(2015)
                .build()?,
        )
        .scheduler(
            SchedulerConfig::builder()
                .initial_size(30)
                .generation_size(20)
                .max_generations(6)
                .seed(2015)
                .build()?,
        )
        .store(JournalStore::open(&journal)?)
        .build()?;

    let summary = run.execute()?;
    run.store()
        .export_csv(&csv, run.space().names())
        .map_err(|e| rapid_pe::Error::Storage(e.to_string()))?;

    println!(
        "{} generations, {} points ({} converged, {} low-confidence, {} failed)",
        summary.generations,
        summary.points,
        summary.converged,
        summary.low_confidence,
        summary.failed
    );
    println!("stopped: {:?}", summary.stop_reason);
    if let Some(lz) = summary.log_evidence {
        println!("aggregate ln Z = {lz:.3}");
    }
    if let Some(best) = &summary.best {
        println!(
            "best point {:?}: ln Z = {:.3} ± {:.3}",
            best.point.params,
            best.result.log_evidence,
            best.result.log_evidence_error()
        );
    }
    println!("journal: {}\ncsv: {}", journal.display(), csv.display());
    Ok(())
}
