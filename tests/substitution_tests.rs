//! Substitution-kernel properties and end-to-end ancestral reconstruction.

use std::sync::Arc;

use bayonet::asr::{reconstruct, Alignment, PhyloTree, ReconstructOptions, ReconstructionMode};
use bayonet::ctmc::{self, MODEL_NAMES};
use bayonet::dat::Value;

#[test]
fn rows_sum_to_one_across_the_time_range() {
    for name in MODEL_NAMES {
        let model = ctmc::from_name(name).unwrap();
        let k = model.domain().size();
        for t in [0.0, 0.001, 0.05, 0.5, 1.0, 5.0, 25.0, 100.0] {
            let p = model.probs(t);
            for i in 0..k {
                let sum: f64 = (0..k).map(|j| p[i * k + j]).sum();
                assert!((sum - 1.0).abs() < 1e-6, "{name} t={t} row {i}: {sum}");
            }
        }
    }
}

#[test]
fn probs_at_zero_is_the_identity() {
    for name in MODEL_NAMES {
        let model = ctmc::from_name(name).unwrap();
        let k = model.domain().size();
        let p = model.probs(0.0);
        for i in 0..k {
            for j in 0..k {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (p[i * k + j] - expected).abs() < 1e-9,
                    "{name} P(0)[{i}][{j}] = {}",
                    p[i * k + j]
                );
            }
        }
    }
}

#[test]
fn transition_matrices_compose_over_time() {
    for name in ["LG", "WAG", "Yang", "Gap"] {
        let model = ctmc::from_name(name).unwrap();
        let k = model.domain().size();
        let p1 = model.probs(0.4);
        let p2 = model.probs(0.6);
        let p12 = model.probs(1.0);
        for i in 0..k {
            for j in 0..k {
                let composed: f64 = (0..k).map(|s| p1[i * k + s] * p2[s * k + j]).sum();
                assert!(
                    (composed - p12[i * k + j]).abs() < 1e-6,
                    "{name}: P(0.4)P(0.6) != P(1.0) at [{i}][{j}]"
                );
            }
        }
    }
}

#[test]
fn lg_keeps_lysine_at_short_branch_lengths() {
    let model = ctmc::from_name("LG").unwrap();
    let k = Value::Chr('K');
    let p = model.prob(&k, &k, 0.1).unwrap();
    assert!(p >= 0.85, "P(child=K | parent=K, t=0.1) = {p}");
}

#[test]
fn stationary_distribution_is_preserved_by_evolution() {
    // pi P(t) = pi for a reversible model at any time
    let model = ctmc::from_name("WAG").unwrap();
    let k = model.domain().size();
    let p = model.probs(2.5);
    let pi = model.freqs();
    for j in 0..k {
        let evolved: f64 = (0..k).map(|i| pi[i] * p[i * k + j]).sum();
        assert!((evolved - pi[j]).abs() < 1e-8, "state {j}: {evolved} vs {}", pi[j]);
    }
}

fn quartet() -> (PhyloTree, Alignment) {
    // ((A,B)N1,(C,D)N2)N0
    let mut tree = PhyloTree::new();
    let n0 = tree.add_root("N0").unwrap();
    let n1 = tree.add_child(n0, "N1", 0.08).unwrap();
    let n2 = tree.add_child(n0, "N2", 0.08).unwrap();
    tree.add_child(n1, "A", 0.04).unwrap();
    tree.add_child(n1, "B", 0.04).unwrap();
    tree.add_child(n2, "C", 0.04).unwrap();
    tree.add_child(n2, "D", 0.04).unwrap();

    let mut aln = Alignment::new();
    aln.add_sequence("A", "MKVL").unwrap();
    aln.add_sequence("B", "MKVL").unwrap();
    aln.add_sequence("C", "MRVL").unwrap();
    aln.add_sequence("D", "MRVL").unwrap();
    (tree, aln)
}

#[test]
fn joint_reconstruction_recovers_conserved_columns() {
    let (tree, aln) = quartet();
    let model = Arc::new(ctmc::from_name("LG").unwrap());
    let result = reconstruct(&tree, &aln, &model, &ReconstructOptions::default()).unwrap();

    assert_eq!(result.ancestors, vec!["N0", "N1", "N2"]);
    // conserved columns survive to every ancestor
    for label in ["N0", "N1", "N2"] {
        let seq = &result.sequences[label];
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.chars().next(), Some('M'));
        assert_eq!(seq.chars().nth(2), Some('V'));
        assert_eq!(seq.chars().nth(3), Some('L'));
    }
    // the split column keeps each clade's state at the clade ancestor
    assert_eq!(result.sequences["N1"].chars().nth(1), Some('K'));
    assert_eq!(result.sequences["N2"].chars().nth(1), Some('R'));
}

#[test]
fn marginal_reconstruction_at_a_named_branch_point() {
    let (tree, aln) = quartet();
    let model = Arc::new(ctmc::from_name("LG").unwrap());
    let options = ReconstructOptions {
        mode: ReconstructionMode::Marginal,
        marginal_node: Some("N1".into()),
        ..ReconstructOptions::default()
    };
    let result = reconstruct(&tree, &aln, &model, &options).unwrap();
    let marginals = result.marginals.unwrap();
    assert_eq!(marginals.len(), 4);
    for m in &marginals {
        let sum: f64 = m.probs().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
    // at the split column, N1's posterior should strongly favour K
    let p_k = marginals[1].get(&Value::Chr('K')).unwrap();
    let p_r = marginals[1].get(&Value::Chr('R')).unwrap();
    assert!(p_k > p_r, "P(K) = {p_k}, P(R) = {p_r}");
}

#[test]
fn marginal_branch_point_must_exist_and_be_internal() {
    let (tree, aln) = quartet();
    let model = Arc::new(ctmc::from_name("LG").unwrap());
    for bad in ["missing", "A"] {
        let options = ReconstructOptions {
            mode: ReconstructionMode::Marginal,
            marginal_node: Some(bad.into()),
            ..ReconstructOptions::default()
        };
        assert!(reconstruct(&tree, &aln, &model, &options).is_err(), "{bad}");
    }
}

#[test]
fn presence_model_reconstruction_on_binary_traits() {
    // gain/loss reconstruction directly under the two-state model
    let model = Arc::new(ctmc::from_name("Gap").unwrap());
    let mut tree = PhyloTree::new();
    let n0 = tree.add_root("N0").unwrap();
    tree.add_child(n0, "A", 0.1).unwrap();
    tree.add_child(n0, "B", 0.1).unwrap();

    let mut net = bayonet::bn::Network::new();
    let vars: Vec<bayonet::dat::Variable> = (0..tree.len())
        .map(|i| bayonet::dat::Variable::enumerable(tree.label(i), model.domain().clone()))
        .collect();
    net.add_node(bayonet::bn::SubstNode::root(vars[0].clone(), model.clone()).unwrap())
        .unwrap();
    for i in 1..tree.len() {
        net.add_node(
            bayonet::bn::SubstNode::new(vars[i].clone(), vars[0].clone(), model.clone(), 0.1)
                .unwrap(),
        )
        .unwrap();
    }
    net.compile().unwrap();
    for i in 1..3 {
        net.set_evidence(&vars[i], bayonet::prob::Datum::Value(Value::Bool(true)))
            .unwrap();
    }
    let ve = bayonet::infer::VarElim::new(&net).unwrap();
    let (assignment, _) = ve.mpe(std::slice::from_ref(&vars[0])).unwrap();
    assert_eq!(assignment[&vars[0]], Value::Bool(true));
}
