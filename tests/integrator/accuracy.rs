use rapid_pe::IntegralStatus;
use rapid_pe::integrator::{IntegratorConfig, MonteCarloIntegrator};
use rapid_pe::space::Bounds;
use rapid_pe::toy::GaussianLikelihood;

use super::{box_prior, point};

fn bounds(n_dims: usize, half_width: f64) -> Vec<Bounds> {
    (0..n_dims)
        .map(|_| Bounds::new(-half_width, half_width).unwrap())
        .collect()
}

#[test]
fn analytic_gaussian_within_error_bars() {
    let likelihood = GaussianLikelihood::new(vec![1.4, 1.3], 0.1, vec![0.5, -0.5], 0.5);
    let prior = box_prior(2, 3.0);
    let integrator = MonteCarloIntegrator::new(
        IntegratorConfig::builder()
            .batch_size(1000)
            .relative_tolerance(0.02)
            .min_effective_samples(1e9)
            .seed(42)
            .build()
            .unwrap(),
    );

    for (id, params) in [vec![1.4, 1.3], vec![1.5, 1.2], vec![1.2, 1.5]]
        .into_iter()
        .enumerate()
    {
        let p = point(id as u64, params);
        let result = integrator.integrate(&p, &likelihood, &prior).unwrap();
        let expected = likelihood.analytic_log_evidence(&p.params, &bounds(2, 3.0));

        assert_eq!(result.status, IntegralStatus::Converged);
        assert!(result.relative_error <= 0.02);
        let tolerance = 5.0 * result.relative_error + 0.01;
        assert!(
            (result.log_evidence - expected).abs() < tolerance,
            "point {id}: estimate {} vs analytic {expected} (tolerance {tolerance})",
            result.log_evidence
        );
    }
}

#[test]
fn adaptation_concentrates_on_narrow_peak() {
    // The peak covers about 1% of the prior box per dimension.
    let likelihood = GaussianLikelihood::new(vec![0.0], 1.0, vec![2.0], 0.05);
    let prior = box_prior(1, 5.0);
    let integrator = MonteCarloIntegrator::new(
        IntegratorConfig::builder()
            .batch_size(500)
            .relative_tolerance(0.03)
            .min_effective_samples(1e9)
            .n_bins(100)
            .seed(7)
            .build()
            .unwrap(),
    );
    let p = point(0, vec![0.0]);
    let result = integrator.integrate(&p, &likelihood, &prior).unwrap();
    let expected = likelihood.analytic_log_evidence(&p.params, &bounds(1, 5.0));

    assert_eq!(result.status, IntegralStatus::Converged);
    assert!((result.log_evidence - expected).abs() < 5.0 * result.relative_error + 0.01);
    // Uniform sampling would need on the order of 10^5 draws for 3%.
    assert!(result.samples_drawn < 50_000, "drew {}", result.samples_drawn);
}

#[test]
fn seeded_integration_is_deterministic() {
    let likelihood = GaussianLikelihood::new(vec![1.4], 0.1, vec![0.0], 0.8);
    let prior = box_prior(1, 4.0);
    let config = IntegratorConfig::builder()
        .batch_size(300)
        .seed(99)
        .build()
        .unwrap();
    let p = point(17, vec![1.45]);

    let a = MonteCarloIntegrator::new(config.clone())
        .integrate(&p, &likelihood, &prior)
        .unwrap();
    let b = MonteCarloIntegrator::new(config)
        .integrate(&p, &likelihood, &prior)
        .unwrap();
    assert_eq!(a, b);

    // A different point id draws from a different stream.
    let other = point(18, vec![1.45]);
    let c = MonteCarloIntegrator::new(
        IntegratorConfig::builder()
            .batch_size(300)
            .seed(99)
            .build()
            .unwrap(),
    )
    .integrate(&other, &likelihood, &prior)
    .unwrap();
    assert_ne!(a.log_evidence, c.log_evidence);
}

#[test]
fn result_invariants_hold() {
    let likelihood = GaussianLikelihood::new(vec![1.4], 0.1, vec![0.0, 0.0, 0.0], 1.0);
    let prior = box_prior(3, 3.0);
    let integrator = MonteCarloIntegrator::new(
        IntegratorConfig::builder()
            .batch_size(200)
            .max_batches(5)
            .seed(3)
            .build()
            .unwrap(),
    );
    let result = integrator
        .integrate(&point(0, vec![1.4]), &likelihood, &prior)
        .unwrap();
    assert!(result.effective_samples <= result.samples_drawn as f64);
    assert!(result.nonzero_samples <= result.samples_drawn);
    assert!(result.relative_error >= 0.0);
    assert!(result.batches <= 5);
    assert_eq!(result.samples_drawn, u64::from(result.batches) * 200);
}

#[test]
fn narrow_peak_error_bars_cover_the_analytic_value() {
    // Early batches miss most of a peak this narrow in three dimensions.
    let likelihood = GaussianLikelihood::new(vec![0.0], 1.0, vec![0.3, -0.2, 0.1], 0.05);
    let prior = box_prior(3, 3.0);
    let p = point(0, vec![0.0]);
    let expected = likelihood.analytic_log_evidence(&p.params, &bounds(3, 3.0));

    let mut covered = 0;
    let mut converged = 0;
    let mut converged_covered = 0;
    for seed in 0..100 {
        let integrator =
            MonteCarloIntegrator::new(IntegratorConfig::builder().seed(seed).build().unwrap());
        let result = integrator.integrate(&p, &likelihood, &prior).unwrap();
        let inside = (result.log_evidence - expected).abs() <= 2.0 * result.relative_error;
        covered += usize::from(inside);
        if result.status == IntegralStatus::Converged {
            converged += 1;
            converged_covered += usize::from(inside);
        }
    }

    assert!(covered >= 88, "{covered}/100 within two standard errors");
    assert!(converged >= 50, "only {converged}/100 converged");
    assert!(
        converged_covered * 10 >= converged * 9,
        "{converged_covered}/{converged} converged results within two standard errors"
    );
}
