//! Distribution-library scenarios: Dirichlet sampling moments and mixture
//! flattening.

use bayonet::dat::Domain;
use bayonet::prob::{Dirichlet, Distrib, Gaussian, Mixture};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn dirichlet_sample_mean_approaches_alpha_over_sum() {
    let domain = Domain::nominal("Tri", &["a", "b", "c"]);
    let dir = Dirichlet::new(domain, vec![2.0, 3.0, 5.0]).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);

    let n = 1_000_000;
    let mut sums = [0.0f64; 3];
    for _ in 0..n {
        let p = dir.sample(&mut rng);
        for (i, sum) in sums.iter_mut().enumerate() {
            *sum += p.get_index(i);
        }
    }
    let expected = [0.2, 0.3, 0.5];
    for i in 0..3 {
        let mean = sums[i] / n as f64;
        assert!(
            (mean - expected[i]).abs() < 1e-2,
            "component {i}: empirical mean {mean} vs {}",
            expected[i]
        );
    }
}

#[test]
fn mixture_of_mixtures_flattens_to_three_components() {
    let g1 = Distrib::Gaussian(Gaussian::new(0.0, 1.0).unwrap());
    let g2 = Distrib::Gaussian(Gaussian::new(1.0, 0.5).unwrap());
    let g3 = Distrib::Gaussian(Gaussian::new(-2.0, 2.5).unwrap());

    let mut m1 = Mixture::new(g1.clone(), 1.0);
    m1.add(g2, 2.5);

    let mut m2 = Mixture::new(Distrib::Mixture(m1), 1.0);
    m2.add(g1, 0.5);
    m2.add(g3, 2.0);

    assert_eq!(m2.len(), 3);
    let weights: Vec<f64> = m2.components().iter().map(|(_, w)| *w).collect();
    assert!((weights[0] - 1.5).abs() < 1e-12);
    assert!((weights[1] - 2.5).abs() < 1e-12);
    assert!((weights[2] - 2.0).abs() < 1e-12);
    assert!(m2
        .components()
        .iter()
        .all(|(d, _)| !matches!(d, Distrib::Mixture(_))));
}

#[test]
fn dirichlet_estimation_converges_from_a_flat_start() {
    // points drawn from a sharply concentrated Dirichlet; refitting from a
    // uniform start must move alpha toward the truth
    let domain = Domain::nominal("Quad", &["w", "x", "y", "z"]);
    let truth = Dirichlet::new(domain.clone(), vec![12.0, 6.0, 3.0, 1.5]).unwrap();
    let mut rng = StdRng::seed_from_u64(77);
    let observed: Vec<_> = (0..800).map(|_| truth.sample(&mut rng)).collect();

    let mut fitted = Dirichlet::symmetric(domain, 1.0).unwrap();
    fitted.fit(&observed).unwrap();

    let fitted_mean = fitted.mean();
    let true_mean = truth.mean();
    for i in 0..4 {
        assert!(
            (fitted_mean.get_index(i) - true_mean.get_index(i)).abs() < 0.04,
            "component {i}"
        );
    }
    // concentration should be recovered within the right order of magnitude
    let total = fitted.concentration();
    assert!(total > 10.0 && total < 50.0, "alpha sum {total}");
}
