use rapid_pe::scheduler::{GenerationOutcome, RefinementScheduler, SchedulerConfig};
use rapid_pe::store::{GridStore, MemoryStore};
use rapid_pe::{IntegralStatus, StopReason};

use super::{mass_space, resolve_peaked, result};

#[test]
fn failed_points_never_become_parents() {
    let config = SchedulerConfig::builder()
        .generation_size(12)
        .exploration_fraction(0.0)
        .seed(30)
        .build()
        .unwrap();
    let scheduler = RefinementScheduler::new(mass_space(), config);
    let store = MemoryStore::new();
    let first = scheduler.initial_generation(&store).unwrap();

    // Half the points fail with a spuriously large evidence value attached.
    let mut failed = Vec::new();
    for (k, p) in first.points.iter().enumerate() {
        if k % 2 == 0 {
            store
                .resolve(p.id, result(IntegralStatus::Failed, 100.0))
                .unwrap();
            failed.push(p.id);
        } else {
            store
                .resolve(p.id, result(IntegralStatus::Converged, -p.params[0]))
                .unwrap();
        }
    }

    let GenerationOutcome::Next(second) = scheduler.next_generation(&store).unwrap() else {
        panic!("expected a second generation");
    };
    assert!(!second.is_empty());
    for p in &second.points {
        let parent = p.parent.expect("exploitation points carry a parent");
        assert!(!failed.contains(&parent));
    }
}

#[test]
fn low_confidence_points_still_guide_refinement() {
    let config = SchedulerConfig::builder()
        .generation_size(8)
        .exploration_fraction(0.0)
        .exploitation_pool(0.1)
        .seed(31)
        .build()
        .unwrap();
    let scheduler = RefinementScheduler::new(mass_space(), config);
    let store = MemoryStore::new();
    let first = scheduler.initial_generation(&store).unwrap();
    let best = first
        .points
        .iter()
        .min_by(|a, b| a.params[0].total_cmp(&b.params[0]))
        .unwrap()
        .id;
    for p in &first.points {
        let status = if p.id == best {
            IntegralStatus::LowConfidence
        } else {
            IntegralStatus::Converged
        };
        store.resolve(p.id, result(status, -10.0 * p.params[0])).unwrap();
    }
    let GenerationOutcome::Next(second) = scheduler.next_generation(&store).unwrap() else {
        panic!("expected a second generation");
    };
    assert!(second.points.iter().all(|p| p.parent == Some(best)));
}

#[test]
fn refinement_concentrates_around_peak() {
    let config = SchedulerConfig::builder()
        .generation_size(20)
        .exploration_fraction(0.1)
        .evidence_tolerance(0.0)
        .seed(32)
        .build()
        .unwrap();
    let scheduler = RefinementScheduler::new(mass_space(), config);
    let store = MemoryStore::new();
    let peak = [1.35, 1.65];

    let mut generation = scheduler.initial_generation(&store).unwrap();
    for _ in 0..4 {
        resolve_peaked(&store, &generation, peak);
        let GenerationOutcome::Next(next) = scheduler.next_generation(&store).unwrap() else {
            panic!("tolerance zero never converges early");
        };
        generation = next;
    }
    let near = generation
        .points
        .iter()
        .filter(|p| ((p.params[0] - peak[0]).powi(2) + (p.params[1] - peak[1]).powi(2)).sqrt() < 0.25)
        .count();
    assert!(near as f64 >= 0.6 * generation.len() as f64, "{near} of {}", generation.len());
}

#[test]
fn lineage_is_recorded() {
    let config = SchedulerConfig::builder()
        .generation_size(6)
        .exploration_fraction(0.5)
        .seed(33)
        .build()
        .unwrap();
    let scheduler = RefinementScheduler::new(mass_space(), config);
    let store = MemoryStore::new();
    let first = scheduler.initial_generation(&store).unwrap();
    assert!(first.points.iter().all(|p| p.generation == 0 && p.parent.is_none()));
    resolve_peaked(&store, &first, [1.5, 1.5]);
    let GenerationOutcome::Next(second) = scheduler.next_generation(&store).unwrap() else {
        panic!("expected a second generation");
    };
    let first_ids: Vec<_> = first.points.iter().map(|p| p.id).collect();
    assert_eq!(second.points.iter().filter(|p| p.parent.is_some()).count(), 3);
    for p in &second.points {
        assert_eq!(p.generation, 1);
        assert!(!first_ids.contains(&p.id));
        if let Some(parent) = p.parent {
            assert!(first_ids.contains(&parent));
        }
    }
}

#[test]
fn seeded_scheduler_is_reproducible() {
    let run = || {
        let config = SchedulerConfig::builder()
            .generation_size(10)
            .seed(34)
            .build()
            .unwrap();
        let scheduler = RefinementScheduler::new(mass_space(), config);
        let store = MemoryStore::new();
        let first = scheduler.initial_generation(&store).unwrap();
        resolve_peaked(&store, &first, [1.5, 1.5]);
        scheduler.next_generation(&store).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn aggregate_evidence_reported_on_convergence() {
    let config = SchedulerConfig::builder()
        .generation_size(5)
        .max_generations(2)
        .evidence_tolerance(0.0)
        .seed(35)
        .build()
        .unwrap();
    let scheduler = RefinementScheduler::new(mass_space(), config);
    let store = MemoryStore::new();
    let first = scheduler.initial_generation(&store).unwrap();
    resolve_peaked(&store, &first, [1.5, 1.5]);
    let GenerationOutcome::Next(second) = scheduler.next_generation(&store).unwrap() else {
        panic!("cap is two generations");
    };
    resolve_peaked(&store, &second, [1.5, 1.5]);
    let GenerationOutcome::Converged(report) = scheduler.next_generation(&store).unwrap() else {
        panic!("cap reached");
    };
    assert_eq!(report.reason, StopReason::MaxGenerations);
    assert_eq!(report.generation, 1);
    assert!(report.change.is_some());
    let dyn_store: &dyn GridStore = &store;
    assert_eq!(
        report.log_evidence,
        scheduler.aggregate_log_evidence(dyn_store, 1)
    );
}
