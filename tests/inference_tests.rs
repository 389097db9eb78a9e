//! End-to-end inference scenarios: the classic burglary network, explanation
//! queries on hybrid networks, and driver-level invariants.

use bayonet::bn::{Cpt, Gdt, Network};
use bayonet::dat::{Domain, Value, Variable};
use bayonet::infer::{Gibbs, VarElim};
use bayonet::prob::{Categorical, Datum, Gaussian};

fn t() -> Value {
    Value::Bool(true)
}

fn f() -> Value {
    Value::Bool(false)
}

fn cat(p_false: f64, p_true: f64) -> Categorical {
    Categorical::new(Domain::boolean(), vec![p_false, p_true]).unwrap()
}

/// The Russell & Norvig burglary network.
struct Burglary {
    burglary: Variable,
    earthquake: Variable,
    alarm: Variable,
    john: Variable,
    mary: Variable,
    net: Network,
}

fn burglary_network() -> Burglary {
    let burglary = Variable::boolean("Burglary");
    let earthquake = Variable::boolean("Earthquake");
    let alarm = Variable::boolean("Alarm");
    let john = Variable::boolean("JohnCalls");
    let mary = Variable::boolean("MaryCalls");

    let mut net = Network::new();
    net.add_node(Cpt::prior(burglary.clone(), cat(0.999, 0.001)).unwrap())
        .unwrap();
    net.add_node(Cpt::prior(earthquake.clone(), cat(0.998, 0.002)).unwrap())
        .unwrap();

    let mut alarm_cpt = Cpt::new(alarm.clone(), vec![burglary.clone(), earthquake.clone()]).unwrap();
    alarm_cpt.put(&[f(), f()], cat(0.999, 0.001)).unwrap();
    alarm_cpt.put(&[f(), t()], cat(0.71, 0.29)).unwrap();
    alarm_cpt.put(&[t(), f()], cat(0.06, 0.94)).unwrap();
    alarm_cpt.put(&[t(), t()], cat(0.05, 0.95)).unwrap();
    net.add_node(alarm_cpt).unwrap();

    let mut john_cpt = Cpt::new(john.clone(), vec![alarm.clone()]).unwrap();
    john_cpt.put(&[f()], cat(0.95, 0.05)).unwrap();
    john_cpt.put(&[t()], cat(0.10, 0.90)).unwrap();
    net.add_node(john_cpt).unwrap();

    let mut mary_cpt = Cpt::new(mary.clone(), vec![alarm.clone()]).unwrap();
    mary_cpt.put(&[f()], cat(0.99, 0.01)).unwrap();
    mary_cpt.put(&[t()], cat(0.30, 0.70)).unwrap();
    net.add_node(mary_cpt).unwrap();

    net.compile().unwrap();
    Burglary {
        burglary,
        earthquake,
        alarm,
        john,
        mary,
        net,
    }
}

#[test]
fn burglary_posterior_given_both_calls() {
    let mut b = burglary_network();
    b.net.set_evidence(&b.john, Datum::Value(t())).unwrap();
    b.net.set_evidence(&b.mary, Datum::Value(t())).unwrap();

    let ve = VarElim::new(&b.net).unwrap();
    let posterior = ve.marginal(std::slice::from_ref(&b.burglary)).unwrap();
    let p = posterior.weight_by_key(&[t()]).unwrap();
    assert!((p - 0.2841).abs() < 1e-4, "P(Burglary | calls) = {p}");
}

#[test]
fn burglary_marginal_is_normalised() {
    let mut b = burglary_network();
    b.net.set_evidence(&b.john, Datum::Value(t())).unwrap();
    let ve = VarElim::new(&b.net).unwrap();
    let posterior = ve.marginal(std::slice::from_ref(&b.burglary)).unwrap();
    assert!((posterior.sum() - 1.0).abs() < 1e-9);
}

#[test]
fn burglary_prior_without_evidence() {
    let b = burglary_network();
    let ve = VarElim::new(&b.net).unwrap();
    let prior = ve.marginal(std::slice::from_ref(&b.burglary)).unwrap();
    assert!((prior.weight_by_key(&[t()]).unwrap() - 0.001).abs() < 1e-9);
}

#[test]
fn burglary_joint_marginal_over_two_variables() {
    let mut b = burglary_network();
    b.net.set_evidence(&b.john, Datum::Value(t())).unwrap();
    b.net.set_evidence(&b.mary, Datum::Value(t())).unwrap();
    let ve = VarElim::new(&b.net).unwrap();
    let joint = ve
        .marginal(&[b.burglary.clone(), b.earthquake.clone()])
        .unwrap();
    assert_eq!(joint.enum_vars().len(), 2);
    assert!((joint.sum() - 1.0).abs() < 1e-9);
    // burglary-and-earthquake together is the rarest corner
    let bb = joint.weight_by_key(&[t(), t()]).unwrap();
    let nn = joint.weight_by_key(&[f(), f()]).unwrap();
    assert!(bb < nn);
}

#[test]
fn mpe_trace_weight_equals_product_of_cpt_entries() {
    let mut b = burglary_network();
    b.net.set_evidence(&b.john, Datum::Value(t())).unwrap();
    b.net.set_evidence(&b.mary, Datum::Value(t())).unwrap();

    let ve = VarElim::new(&b.net).unwrap();
    let (assignment, log_prob) = ve
        .mpe(&[b.burglary.clone(), b.earthquake.clone(), b.alarm.clone()])
        .unwrap();

    let bv = assignment[&b.burglary].clone();
    let ev = assignment[&b.earthquake].clone();
    let av = assignment[&b.alarm].clone();
    let read = |var: &Variable, key: &[Value], value: &Value| {
        match b.net.node(var).unwrap().kind() {
            bayonet::bn::NodeKind::Cpt(c) => c.prob(key, value).unwrap(),
            _ => unreachable!("burglary network is all CPTs"),
        }
    };
    let joint = read(&b.burglary, &[], &bv)
        * read(&b.earthquake, &[], &ev)
        * read(&b.alarm, &[bv.clone(), ev.clone()], &av)
        * read(&b.john, std::slice::from_ref(&av), &t())
        * read(&b.mary, std::slice::from_ref(&av), &t());
    assert!((log_prob - joint.ln()).abs() < 1e-9);
}

#[test]
fn gibbs_agrees_with_exact_posterior_on_the_burglary_network() {
    let mut b = burglary_network();
    b.net.set_evidence(&b.john, Datum::Value(t())).unwrap();
    b.net.set_evidence(&b.mary, Datum::Value(t())).unwrap();

    let exact = VarElim::new(&b.net)
        .unwrap()
        .marginal(std::slice::from_ref(&b.alarm))
        .unwrap()
        .weight_by_key(&[t()])
        .unwrap();
    let sampled = Gibbs::new(&b.net)
        .unwrap()
        .with_iterations(20_000, 2_000)
        .query(std::slice::from_ref(&b.alarm), 1234)
        .unwrap()
        .weight_by_key(&[t()])
        .unwrap();
    assert!((exact - sampled).abs() < 0.03, "exact {exact} vs sampled {sampled}");
}

/// Scenario: a two-Gaussian mixture behind a discrete switch. Observing a
/// point near one component's mean must pull the explanation to that switch
/// value.
#[test]
fn hybrid_mpe_follows_the_denser_gaussian() {
    let switch = Variable::boolean("Switch");
    let x = Variable::continuous("X");
    let mut net = Network::new();
    net.add_node(Cpt::prior(switch.clone(), cat(0.5, 0.5)).unwrap())
        .unwrap();
    let mut gdt = Gdt::new(x.clone(), vec![switch.clone()]).unwrap();
    gdt.put(&[f()], Gaussian::new(0.0, 1.0).unwrap()).unwrap();
    gdt.put(&[t()], Gaussian::new(5.0, 1.0).unwrap()).unwrap();
    net.add_node(gdt).unwrap();
    net.compile().unwrap();

    net.set_evidence(&x, Datum::Real(4.6)).unwrap();
    let ve = VarElim::new(&net).unwrap();
    let (assignment, _) = ve.mpe(std::slice::from_ref(&switch)).unwrap();
    assert_eq!(assignment[&switch], t());

    net.set_evidence(&x, Datum::Real(0.3)).unwrap();
    let ve = VarElim::new(&net).unwrap();
    let (assignment, _) = ve.mpe(std::slice::from_ref(&switch)).unwrap();
    assert_eq!(assignment[&switch], f());
}

#[test]
fn hybrid_marginal_mixes_the_unobserved_gaussian() {
    let switch = Variable::boolean("Switch");
    let x = Variable::continuous("X");
    let mut net = Network::new();
    net.add_node(Cpt::prior(switch.clone(), cat(0.25, 0.75)).unwrap())
        .unwrap();
    let mut gdt = Gdt::new(x.clone(), vec![switch.clone()]).unwrap();
    gdt.put(&[f()], Gaussian::new(0.0, 1.0).unwrap()).unwrap();
    gdt.put(&[t()], Gaussian::new(5.0, 1.0).unwrap()).unwrap();
    net.add_node(gdt).unwrap();
    net.compile().unwrap();

    // marginalising the switch leaves an atomic factor whose fragment is the
    // prior-weighted mixture of the two Gaussians
    let ve = VarElim::new(&net).unwrap();
    let m = ve.marginal(std::slice::from_ref(&x)).unwrap();
    assert!(m.is_atomic());
    let jdf = m.jdf(0).expect("fragment survives marginalisation");
    match jdf.get(&x).unwrap() {
        bayonet::prob::Distrib::Mixture(mix) => {
            assert_eq!(mix.len(), 2);
            let weights: Vec<f64> = mix.components().iter().map(|(_, w)| *w).collect();
            assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!((weights[0] - 0.25).abs() < 1e-9);
        }
        other => panic!("expected mixture fragment, got {other:?}"),
    }
}

#[test]
fn log_likelihood_matches_hand_computed_value() {
    let mut b = burglary_network();
    b.net.set_evidence(&b.john, Datum::Value(t())).unwrap();
    b.net.set_evidence(&b.mary, Datum::Value(t())).unwrap();
    let ve = VarElim::new(&b.net).unwrap();
    let ll = ve.log_likelihood().unwrap();
    // P(j, m) = 0.00208419... in the canonical network
    assert!((ll.exp() - 0.002084).abs() < 1e-5, "P(evidence) = {}", ll.exp());
}
