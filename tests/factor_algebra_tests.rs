//! Algebraic properties of factor products and marginalisation, checked over
//! randomised factor pools.

use bayonet::dat::{Domain, Variable};
use bayonet::factor::{self, Factor};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A pool of enumerable variables with assorted domain sizes.
fn variable_pool(rng: &mut StdRng, n: usize) -> Vec<Variable> {
    (0..n)
        .map(|i| {
            let size = rng.gen_range(2..=4);
            let values: Vec<String> = (0..size).map(|v| format!("v{v}")).collect();
            let refs: Vec<&str> = values.iter().map(String::as_str).collect();
            Variable::enumerable(&format!("V{i}"), Domain::nominal(&format!("D{i}"), &refs))
        })
        .collect()
}

/// Random factors over random subsets of the pool, dense positive weights.
fn factor_pool(rng: &mut StdRng, vars: &[Variable], count: usize) -> Vec<Factor> {
    (0..count)
        .map(|_| {
            let width = rng.gen_range(1..=4usize);
            let mut chosen: Vec<Variable> = Vec::new();
            while chosen.len() < width {
                let v = &vars[rng.gen_range(0..vars.len())];
                if !chosen.contains(v) {
                    chosen.push(v.clone());
                }
            }
            let mut f = Factor::new(chosen);
            for i in 0..f.size() {
                f.set_weight(i, rng.gen::<f64>().abs() / f.size() as f64);
            }
            f
        })
        .collect()
}

#[test]
fn tree_product_equals_linear_product_over_200_seeds() {
    for seed in 0..200u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let vars = variable_pool(&mut rng, 10);
        let factors = factor_pool(&mut rng, &vars, 8);

        let mut linear = factors[0].clone();
        for f in &factors[1..] {
            linear = factor::product(&linear, f);
        }
        let tree = factor::product_all(&factors).unwrap();

        assert_eq!(linear.enum_vars(), tree.enum_vars(), "seed {seed}");
        for i in 0..linear.size() {
            let l = linear.weight(i);
            let t = tree.weight(i);
            if l == 0.0 && t == 0.0 {
                continue;
            }
            let ratio = t / l;
            assert!(
                (0.999..=1.001).contains(&ratio),
                "seed {seed} cell {i}: ratio {ratio}"
            );
        }
    }
}

#[test]
fn every_operation_leaves_weights_finite_and_non_negative() {
    for seed in 0..50u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let vars = variable_pool(&mut rng, 6);
        let factors = factor_pool(&mut rng, &vars, 4);
        let p = factor::product_all(&factors).unwrap();
        let check = |f: &Factor| {
            assert!(f.sum().is_finite());
            for i in 0..f.size() {
                assert!(f.weight(i) >= 0.0 && f.weight(i).is_finite());
            }
        };
        check(&p);
        if let Some(v) = p.enum_vars().first().cloned() {
            check(&factor::sum_out(&p, &[v.clone()]));
            check(&factor::max_out(&p, &[v]));
        }
    }
}

#[test]
fn sum_out_commutes_across_orderings() {
    for seed in 0..50u64 {
        let mut rng = StdRng::seed_from_u64(1000 + seed);
        let vars = variable_pool(&mut rng, 5);
        let factors = factor_pool(&mut rng, &vars, 4);
        let p = factor::product_all(&factors).unwrap();
        if p.enum_vars().len() < 2 {
            continue;
        }
        let a = p.enum_vars()[0].clone();
        let b = p.enum_vars()[1].clone();
        let ab = factor::sum_out(&factor::sum_out(&p, std::slice::from_ref(&a)), std::slice::from_ref(&b));
        let ba = factor::sum_out(&factor::sum_out(&p, std::slice::from_ref(&b)), std::slice::from_ref(&a));
        assert_eq!(ab.enum_vars(), ba.enum_vars());
        for i in 0..ab.size() {
            assert!((ab.weight(i) - ba.weight(i)).abs() < 1e-9, "seed {seed}");
        }
    }
}

#[test]
fn max_out_never_exceeds_sum_out() {
    for seed in 0..50u64 {
        let mut rng = StdRng::seed_from_u64(2000 + seed);
        let vars = variable_pool(&mut rng, 5);
        let factors = factor_pool(&mut rng, &vars, 3);
        let p = factor::product_all(&factors).unwrap();
        let Some(v) = p.enum_vars().first().cloned() else {
            continue;
        };
        let summed = factor::sum_out(&p, std::slice::from_ref(&v));
        let maxed = factor::max_out(&p, std::slice::from_ref(&v));
        for i in 0..summed.size() {
            assert!(maxed.weight(i) <= summed.weight(i) + 1e-12);
        }
    }
}

proptest! {
    #[test]
    fn product_weight_commutes(seed in 0u64..500) {
        let mut rng = StdRng::seed_from_u64(seed);
        let vars = variable_pool(&mut rng, 6);
        let factors = factor_pool(&mut rng, &vars, 2);
        let xy = factor::product(&factors[0], &factors[1]);
        let yx = factor::product(&factors[1], &factors[0]);
        prop_assert_eq!(xy.enum_vars(), yx.enum_vars());
        for i in 0..xy.size() {
            prop_assert!((xy.weight(i) - yx.weight(i)).abs() < 1e-12);
        }
    }

    #[test]
    fn normalised_factors_sum_to_one(seed in 0u64..500) {
        let mut rng = StdRng::seed_from_u64(seed);
        let vars = variable_pool(&mut rng, 4);
        let factors = factor_pool(&mut rng, &vars, 2);
        let p = factor::product_all(&factors).unwrap();
        if p.sum() > 0.0 {
            let n = factor::normalise(&p).unwrap();
            prop_assert!((n.sum() - 1.0).abs() < 1e-9);
        }
    }
}
