use rapid_pe::integrator::{IntegratorConfig, MonteCarloIntegrator};
use rapid_pe::{Error, IntegralStatus, LikelihoodError};

use super::{box_prior, point};

fn integrator() -> MonteCarloIntegrator {
    MonteCarloIntegrator::new(
        IntegratorConfig::builder()
            .batch_size(100)
            .max_empty_batches(3)
            .seed(11)
            .build()
            .unwrap(),
    )
}

#[test]
fn domain_error_everywhere_fails_the_point() {
    let likelihood = |_: &[f64], _: &[f64]| -> Result<f64, LikelihoodError> {
        Err(LikelihoodError::Domain("component mass below limit".into()))
    };
    let result = integrator()
        .integrate(&point(0, vec![0.1]), &likelihood, &box_prior(2, 1.0))
        .unwrap();
    assert_eq!(result.status, IntegralStatus::Failed);
    assert_eq!(result.nonzero_samples, 0);
    assert_eq!(result.domain_error_count, result.samples_drawn);
    // One more than the tolerated streak of empty batches.
    assert_eq!(result.batches, 4);
    assert!(result.log_evidence.is_infinite() && result.log_evidence < 0.0);
    assert!(result.message.is_some());
}

#[test]
fn zero_likelihood_everywhere_fails_the_point() {
    let likelihood =
        |_: &[f64], _: &[f64]| -> Result<f64, LikelihoodError> { Ok(f64::NEG_INFINITY) };
    let result = integrator()
        .integrate(&point(0, vec![1.0]), &likelihood, &box_prior(1, 1.0))
        .unwrap();
    assert_eq!(result.status, IntegralStatus::Failed);
    assert_eq!(result.nonfinite_count, 0);
}

#[test]
fn non_finite_values_are_excluded_not_fatal() {
    // NaN on the left half of the support, ln L = 0 on the right.
    let likelihood = |_: &[f64], x: &[f64]| -> Result<f64, LikelihoodError> {
        Ok(if x[0] < 0.0 { f64::NAN } else { 0.0 })
    };
    let result = integrator()
        .integrate(&point(0, vec![1.0]), &likelihood, &box_prior(1, 1.0))
        .unwrap();
    assert!(result.status.is_usable());
    assert!(result.nonfinite_count > 0);
    assert!(result.log_evidence.is_finite());
    assert!(result.log_evidence <= 0.0);
}

#[test]
fn sparse_domain_errors_only_reduce_weight() {
    let likelihood = |_: &[f64], x: &[f64]| -> Result<f64, LikelihoodError> {
        if x[0] > 0.9 {
            Err(LikelihoodError::Domain("edge".into()))
        } else {
            Ok(0.0)
        }
    };
    let result = integrator()
        .integrate(&point(0, vec![1.0]), &likelihood, &box_prior(1, 1.0))
        .unwrap();
    assert!(result.status.is_usable());
    assert!(result.domain_error_count > 0);
    // True evidence is 0.95.
    assert!((result.log_evidence - 0.95_f64.ln()).abs() < 0.1);
}

#[test]
fn unusable_evaluator_is_an_error() {
    let likelihood = |_: &[f64], _: &[f64]| -> Result<f64, LikelihoodError> {
        Err(LikelihoodError::Unusable("strain data missing".into()))
    };
    let err = integrator()
        .integrate(&point(0, vec![1.0]), &likelihood, &box_prior(1, 1.0))
        .unwrap_err();
    assert!(matches!(err, Error::LikelihoodUnusable(msg) if msg == "strain data missing"));
}
