//! Persistence and resume through the JSONL journal.

#![cfg(feature = "journal")]

use std::io::Write;

use rapid_pe::prelude::*;
use rapid_pe::toy::GaussianLikelihood;

fn temp_path() -> std::path::PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let mut path = std::env::temp_dir();
    path.push(format!(
        "rapid_pe_journal_test_{}_{}.jsonl",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    path
}

fn builder(max_generations: u32) -> RunBuilder {
    Run::builder()
        .space(
            IntrinsicSpace::builder()
                .dimension("mass1", 1.0, 2.0)
                .dimension("mass2", 1.0, 2.0)
                .build()
                .unwrap(),
        )
        .prior(
            ExtrinsicPrior::builder()
                .dimension("x", PriorDimension::uniform(-3.0, 3.0).unwrap())
                .build()
                .unwrap(),
        )
        .likelihood(GaussianLikelihood::new(vec![1.4, 1.6], 0.15, vec![0.0], 0.6))
        .integrator(
            IntegratorConfig::builder()
                .batch_size(300)
                .seed(12)
                .build()
                .unwrap(),
        )
        .scheduler(
            SchedulerConfig::builder()
                .generation_size(6)
                .max_generations(max_generations)
                .evidence_tolerance(0.0)
                .seed(12)
                .build()
                .unwrap(),
        )
}

#[test]
fn resumed_run_matches_uninterrupted_run() {
    let path = temp_path();

    let first = builder(2)
        .store(JournalStore::new(&path))
        .build()
        .unwrap();
    assert_eq!(first.execute().unwrap().generations, 2);
    drop(first);

    let resumed = builder(4)
        .store(JournalStore::open(&path).unwrap())
        .build()
        .unwrap();
    let resumed_summary = resumed.execute().unwrap();

    let straight = builder(4).build().unwrap();
    let straight_summary = straight.execute().unwrap();

    assert_eq!(resumed_summary.generations, 4);
    assert_eq!(resumed.store().records(), straight.store().records());
    assert_eq!(resumed_summary.log_evidence, straight_summary.log_evidence);

    std::fs::remove_file(&path).ok();
}

#[test]
fn crash_mid_generation_integrates_only_pending_points() {
    let path = temp_path();
    let space = IntrinsicSpace::builder()
        .dimension("mass1", 1.0, 2.0)
        .dimension("mass2", 1.0, 2.0)
        .build()
        .unwrap();
    let scheduler = RefinementScheduler::new(
        space,
        SchedulerConfig::builder()
            .generation_size(6)
            .seed(12)
            .build()
            .unwrap(),
    );

    // A worker finished two points, then the process died.
    let marker = IntegralResult {
        status: IntegralStatus::LowConfidence,
        log_evidence: -42.0,
        relative_error: 0.5,
        message: Some("from the previous process".into()),
        ..IntegralResult::pending()
    };
    {
        let store = JournalStore::new(&path);
        let generation = scheduler.initial_generation(&store).unwrap();
        for p in &generation.points[..2] {
            store.resolve(p.id, marker.clone()).unwrap();
        }
    }

    let run = builder(1)
        .store(JournalStore::open(&path).unwrap())
        .build()
        .unwrap();
    let summary = run.execute().unwrap();
    assert_eq!(summary.points, 6);
    assert_eq!(summary.generations, 1);

    let records = run.store().records();
    assert_eq!(records[0].result, marker);
    assert_eq!(records[1].result, marker);
    assert!(records[2..].iter().all(|r| r.status().is_resolved()));
    assert!(records[2..].iter().all(|r| r.result != marker));

    // Reloading sees the same final state.
    let reloaded = JournalStore::open(&path).unwrap();
    let reloaded: &dyn GridStore = &reloaded;
    assert_eq!(reloaded.records(), records);

    std::fs::remove_file(&path).ok();
}

#[test]
fn cancelled_run_resumes_unstarted_points() {
    let path = temp_path();

    let cancelled = builder(1)
        .store(JournalStore::new(&path))
        .build()
        .unwrap();
    cancelled.cancel_token().cancel();
    let summary = cancelled.execute().unwrap();
    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.pending, summary.points);
    drop(cancelled);

    let resumed = builder(1)
        .store(JournalStore::open(&path).unwrap())
        .build()
        .unwrap();
    let summary = resumed.execute().unwrap();
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.failed, 0);
    let records = resumed.store().records();
    assert!(records.iter().all(|r| r.point.generation == 0));
    assert!(records.iter().all(|r| r.status().is_usable()));
    assert!(records.iter().all(|r| r.result.samples_drawn > 0));

    // Same points and results as a run that was never cancelled.
    let straight = builder(1).build().unwrap();
    straight.execute().unwrap();
    assert_eq!(records, straight.store().records());

    std::fs::remove_file(&path).ok();
}

#[test]
fn resubmitting_a_resolved_point_is_a_no_op() {
    let path = temp_path();
    let store = JournalStore::new(&path);
    let id = store.next_point_id();
    store
        .insert(IntrinsicPoint::new(id, vec![1.5, 1.5], 0, None))
        .unwrap();
    let done = IntegralResult {
        status: IntegralStatus::Converged,
        log_evidence: -1.0,
        relative_error: 0.01,
        ..IntegralResult::pending()
    };
    assert!(store.resolve(id, done.clone()).unwrap());
    let again = IntegralResult {
        log_evidence: -5.0,
        ..done.clone()
    };
    assert!(!store.resolve(id, again).unwrap());

    let lines = std::fs::read_to_string(&path).unwrap().lines().count();
    assert_eq!(lines, 2);

    let reopened = JournalStore::open(&path).unwrap();
    let reopened: &dyn GridStore = &reopened;
    assert_eq!(reopened.get(id).unwrap().result, done);

    std::fs::remove_file(&path).ok();
}

#[test]
fn non_finite_values_survive_the_journal() {
    let path = temp_path();
    let store = JournalStore::new(&path);
    let id = store.next_point_id();
    store
        .insert(IntrinsicPoint::new(id, vec![1.1], 0, None))
        .unwrap();
    let failed = IntegralResult {
        status: IntegralStatus::Failed,
        message: Some("no weight".into()),
        ..IntegralResult::pending()
    };
    store.resolve(id, failed.clone()).unwrap();

    let reopened = JournalStore::open(&path).unwrap();
    let reopened: &dyn GridStore = &reopened;
    let record = reopened.get(id).unwrap();
    assert_eq!(record.result.log_evidence, f64::NEG_INFINITY);
    assert_eq!(record.result.relative_error, f64::INFINITY);
    assert_eq!(record.result, failed);

    std::fs::remove_file(&path).ok();
}

#[test]
fn corrupt_journal_is_a_storage_error() {
    let path = temp_path();
    {
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
    }
    assert!(matches!(JournalStore::open(&path), Err(Error::Storage(_))));
    std::fs::remove_file(&path).ok();
}

#[test]
fn refresh_picks_up_another_writer() {
    let path = temp_path();
    let reader = JournalStore::new(&path);
    let writer = JournalStore::new(&path);

    let id = writer.next_point_id();
    writer
        .insert(IntrinsicPoint::new(id, vec![1.3], 0, None))
        .unwrap();

    let reader_dyn: &dyn GridStore = &reader;
    assert!(reader_dyn.is_empty());
    assert!(reader.refresh());
    assert_eq!(reader_dyn.len(), 1);
    assert!(!reader.refresh());

    std::fs::remove_file(&path).ok();
}
