use core::time::Duration;

use rapid_pe::integrator::{CancelToken, IntegratorConfig, MonteCarloIntegrator};
use rapid_pe::toy::GaussianLikelihood;
use rapid_pe::{IntegralStatus, Likelihood, LikelihoodError};

use super::{box_prior, point};

fn fixed_budget(max_batches: u32) -> MonteCarloIntegrator {
    MonteCarloIntegrator::new(
        IntegratorConfig::builder()
            .batch_size(200)
            .max_batches(max_batches)
            .relative_tolerance(0.0)
            .min_effective_samples(1e12)
            .seed(5)
            .build()
            .unwrap(),
    )
}

#[test]
fn error_shrinks_with_budget() {
    let likelihood = GaussianLikelihood::new(vec![1.4], 0.1, vec![0.0, 0.0], 0.7);
    let prior = box_prior(2, 3.0);
    let p = point(0, vec![1.4]);

    let small = fixed_budget(2).integrate(&p, &likelihood, &prior).unwrap();
    let large = fixed_budget(40).integrate(&p, &likelihood, &prior).unwrap();

    assert_eq!(small.samples_drawn, 400);
    assert_eq!(large.samples_drawn, 8000);
    assert!(large.relative_error < small.relative_error);
    assert_eq!(small.status, IntegralStatus::LowConfidence);
    assert_eq!(
        small.message.as_deref(),
        Some("sample budget exhausted before tolerance")
    );
}

#[test]
fn max_samples_caps_draws() {
    let likelihood = GaussianLikelihood::new(vec![1.4], 0.1, vec![0.0], 0.7);
    let prior = box_prior(1, 3.0);
    let integrator = MonteCarloIntegrator::new(
        IntegratorConfig::builder()
            .batch_size(100)
            .max_samples(350)
            .relative_tolerance(0.0)
            .min_effective_samples(1e12)
            .seed(1)
            .build()
            .unwrap(),
    );
    let result = integrator
        .integrate(&point(0, vec![1.4]), &likelihood, &prior)
        .unwrap();
    assert_eq!(result.samples_drawn, 300);
    assert_eq!(result.batches, 3);
}

struct Slow;

impl Likelihood for Slow {
    fn log_likelihood(&self, _intrinsic: &[f64], extrinsic: &[f64]) -> Result<f64, LikelihoodError> {
        std::thread::sleep(Duration::from_micros(200));
        Ok(-extrinsic[0] * extrinsic[0])
    }
}

#[test]
fn time_budget_yields_low_confidence() {
    let prior = box_prior(1, 3.0);
    let integrator = MonteCarloIntegrator::new(
        IntegratorConfig::builder()
            .batch_size(20)
            .relative_tolerance(1e-6)
            .min_effective_samples(1e12)
            .time_budget(Duration::from_millis(20))
            .seed(2)
            .build()
            .unwrap(),
    );
    let result = integrator.integrate(&point(0, vec![1.0]), &Slow, &prior).unwrap();
    assert_eq!(result.status, IntegralStatus::LowConfidence);
    assert_eq!(
        result.message.as_deref(),
        Some("time budget exhausted before tolerance")
    );
    assert!(result.batches < 100);
    assert!(result.log_evidence.is_finite());
}

struct CancelAfter {
    token: CancelToken,
    calls: core::sync::atomic::AtomicUsize,
}

impl Likelihood for CancelAfter {
    fn log_likelihood(&self, _intrinsic: &[f64], extrinsic: &[f64]) -> Result<f64, LikelihoodError> {
        let calls = self
            .calls
            .fetch_add(1, core::sync::atomic::Ordering::SeqCst);
        if calls == 250 {
            self.token.cancel();
        }
        Ok(-extrinsic[0] * extrinsic[0])
    }
}

#[test]
fn cancellation_mid_run_keeps_partial_estimate() {
    let token = CancelToken::new();
    let likelihood = CancelAfter {
        token: token.clone(),
        calls: core::sync::atomic::AtomicUsize::new(0),
    };
    let prior = box_prior(1, 3.0);
    let integrator = fixed_budget(100);
    let result = integrator
        .integrate_with(&point(0, vec![1.0]), &likelihood, &prior, Some(&token))
        .unwrap();
    // The token fires during the second batch; the third never starts.
    assert_eq!(result.batches, 2);
    assert_eq!(result.status, IntegralStatus::LowConfidence);
    assert_eq!(result.message.as_deref(), Some("cancelled before tolerance"));
}
