use rapid_pe::scheduler::{GenerationOutcome, RefinementScheduler, SchedulerConfig};
use rapid_pe::store::{GridStore, MemoryStore};
use rapid_pe::{DedupScope, Error};

use super::{mass_space, resolve_peaked};

fn min_distance(space: &rapid_pe::space::IntrinsicSpace, points: &[Vec<f64>]) -> f64 {
    let mut min = f64::INFINITY;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            min = min.min(space.distance(a, b));
        }
    }
    min
}

#[test]
fn history_scope_keeps_every_pair_apart() {
    let space = mass_space();
    let config = SchedulerConfig::builder()
        .generation_size(15)
        .min_separation(0.03)
        .jitter_scale(0.02)
        .dedup_scope(DedupScope::History)
        .seed(21)
        .build()
        .unwrap();
    let scheduler = RefinementScheduler::new(space.clone(), config);
    let store = MemoryStore::new();

    let mut generation = scheduler.initial_generation(&store).unwrap();
    for _ in 0..3 {
        resolve_peaked(&store, &generation, [1.3, 1.6]);
        match scheduler.next_generation(&store).unwrap() {
            GenerationOutcome::Next(next) => generation = next,
            GenerationOutcome::Converged(_) => break,
        }
    }

    let dyn_store: &dyn GridStore = &store;
    let all: Vec<Vec<f64>> = dyn_store
        .records()
        .into_iter()
        .map(|r| r.point.params)
        .collect();
    assert!(all.len() > 15);
    assert!(min_distance(&space, &all) >= 0.03 - 1e-12);
}

#[test]
fn generation_scope_only_separates_within_a_generation() {
    let space = mass_space();
    let config = SchedulerConfig::builder()
        .generation_size(10)
        .min_separation(0.05)
        .dedup_scope(DedupScope::Generation)
        .seed(8)
        .build()
        .unwrap();
    let scheduler = RefinementScheduler::new(space.clone(), config);
    let store = MemoryStore::new();
    let first = scheduler.initial_generation(&store).unwrap();
    resolve_peaked(&store, &first, [1.5, 1.5]);
    let GenerationOutcome::Next(second) = scheduler.next_generation(&store).unwrap() else {
        panic!("expected a second generation");
    };

    let params: Vec<Vec<f64>> = second.points.iter().map(|p| p.params.clone()).collect();
    assert!(min_distance(&space, &params) >= 0.05 - 1e-12);
}

#[test]
fn every_point_stays_in_bounds() {
    let space = mass_space();
    // Peak on the corner pulls jitter over the edge.
    let config = SchedulerConfig::builder()
        .generation_size(20)
        .jitter_scale(0.2)
        .seed(4)
        .build()
        .unwrap();
    let scheduler = RefinementScheduler::new(space.clone(), config);
    let store = MemoryStore::new();
    let mut generation = scheduler.initial_generation(&store).unwrap();
    for _ in 0..3 {
        resolve_peaked(&store, &generation, [2.0, 2.0]);
        match scheduler.next_generation(&store).unwrap() {
            GenerationOutcome::Next(next) => generation = next,
            GenerationOutcome::Converged(_) => break,
        }
    }
    let dyn_store: &dyn GridStore = &store;
    assert!(
        dyn_store
            .records()
            .iter()
            .all(|r| space.contains(&r.point.params))
    );
}

#[test]
fn crowded_space_shrinks_generation_instead_of_failing() {
    let space = rapid_pe::space::IntrinsicSpace::builder()
        .dimension("mass1", 1.0, 2.0)
        .build()
        .unwrap();
    let config = SchedulerConfig::builder()
        .generation_size(6)
        .initial_size(3)
        .min_separation(0.2)
        .max_redraws(20)
        .seed(13)
        .build()
        .unwrap();
    let scheduler = RefinementScheduler::new(space, config);
    let store = MemoryStore::new();
    let first = scheduler.initial_generation(&store).unwrap();
    for p in &first.points {
        store
            .resolve(p.id, super::result(rapid_pe::IntegralStatus::Converged, -p.params[0]))
            .unwrap();
    }
    // At most six points fit 0.2 apart on the unit interval.
    match scheduler.next_generation(&store).unwrap() {
        GenerationOutcome::Next(second) => {
            assert!(second.is_shrunk());
            assert!(second.len() + first.len() <= 6);
        }
        GenerationOutcome::Converged(report) => {
            assert_eq!(report.reason, rapid_pe::StopReason::GridExhausted);
        }
    }
}

#[test]
fn seeded_points_are_validated() {
    let scheduler = RefinementScheduler::new(mass_space(), SchedulerConfig::default());
    let store = MemoryStore::new();
    let err = scheduler
        .seed_generation(&store, vec![vec![1.5, 1.5], vec![0.9, 1.5]])
        .unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { values } if values == vec![0.9, 1.5]));
    let dyn_store: &dyn GridStore = &store;
    assert!(dyn_store.is_empty());
}
