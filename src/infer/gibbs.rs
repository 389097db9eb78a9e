//! Approximate inference by Gibbs sampling over Markov blankets.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::bn::{Network, Node};
use crate::dat::{Value, Variable};
use crate::errors::{BayonetError, Result};
use crate::factor::{self, Factor};
use crate::infer::CancelToken;
use crate::prob::{Categorical, Datum};

/// How the sampler accumulates its answer.
///
/// The two bookkeeping schemes answer subtly different questions and are kept
/// as an explicit choice rather than folded into one:
///
/// - [`GibbsMode::PerQueryCount`] counts occurrences of the *joint* query
///   tuple per kept sweep; the returned factor estimates the joint posterior
///   over the query variables, including their correlations.
/// - [`GibbsMode::PerNodeFactor`] counts each query variable separately and
///   returns the independent product of the per-variable marginals; faster
///   to mix and smoother for wide queries, but it discards correlations
///   between query variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GibbsMode {
    #[default]
    PerQueryCount,
    PerNodeFactor,
}

/// The Gibbs sampler.
///
/// Each sweep resamples every unevidenced enumerable variable from its
/// Markov-blanket conditional: the node's own conditional row multiplied by
/// each child's conditional restricted to the child's current value,
/// normalised. Continuous nodes must be evidenced; sampling them is not
/// supported.
#[derive(Debug)]
pub struct Gibbs<'a> {
    net: &'a Network,
    iterations: usize,
    burn_in: usize,
    mode: GibbsMode,
    cancel: CancelToken,
}

impl<'a> Gibbs<'a> {
    /// Creates a sampler for a compiled network with default settings
    /// (500 sweeps, 10% burn-in, joint counting).
    pub fn new(net: &'a Network) -> Result<Self> {
        if !net.is_compiled() {
            return Err(BayonetError::IncompleteNetwork(
                "network must be compiled before sampling".into(),
            ));
        }
        Ok(Gibbs {
            net,
            iterations: 500,
            burn_in: 50,
            mode: GibbsMode::default(),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_iterations(mut self, iterations: usize, burn_in: usize) -> Self {
        self.iterations = iterations;
        self.burn_in = burn_in.min(iterations);
        self
    }

    pub fn with_mode(mut self, mode: GibbsMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Estimates the posterior over the query variables with a caller-seeded
    /// chain, so runs are reproducible.
    pub fn query(&self, query: &[Variable], seed: u64) -> Result<Factor> {
        for q in query {
            if !q.is_enumerable() {
                return Err(BayonetError::Unfactorisable(format!(
                    "Gibbs query variable '{}' must be enumerable",
                    q.name()
                )));
            }
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let evidence = self.net.evidence();

        // unevidenced enumerable nodes, in topological order
        let free: Vec<&Node> = self
            .net
            .topological_order()
            .filter(|n| !evidence.contains_key(n.variable()))
            .collect();
        for node in &free {
            if !node.variable().is_enumerable() {
                return Err(BayonetError::Unfactorisable(format!(
                    "continuous variable '{}' must be evidenced for Gibbs sampling",
                    node.variable().name()
                )));
            }
        }

        // current state: evidence plus a forward-sampled initialisation
        let mut state: FxHashMap<Variable, Value> = evidence
            .iter()
            .filter_map(|(v, d)| match d {
                Datum::Value(value) => Some((v.clone(), value.clone())),
                _ => None,
            })
            .collect();
        for node in &free {
            let parents = parent_values(node, &state)?;
            let value = node.conditional(&parents)?.sample(&mut rng);
            state.insert(node.variable().clone(), value);
        }

        let mut joint_counts: FxHashMap<Vec<Value>, f64> = FxHashMap::default();
        let mut single_counts: Vec<FxHashMap<Value, f64>> =
            vec![FxHashMap::default(); query.len()];

        for sweep in 0..self.iterations {
            self.cancel.check()?;
            for node in &free {
                let distrib = self.blanket_conditional(node, &state)?;
                state.insert(node.variable().clone(), distrib.sample(&mut rng));
            }
            if sweep < self.burn_in {
                continue;
            }
            match self.mode {
                GibbsMode::PerQueryCount => {
                    let tuple: Vec<Value> =
                        query.iter().map(|q| state[q].clone()).collect();
                    *joint_counts.entry(tuple).or_insert(0.0) += 1.0;
                }
                GibbsMode::PerNodeFactor => {
                    for (i, q) in query.iter().enumerate() {
                        *single_counts[i].entry(state[q].clone()).or_insert(0.0) += 1.0;
                    }
                }
            }
        }
        debug!(sweeps = self.iterations, burn_in = self.burn_in, "chain finished");

        let answer = match self.mode {
            GibbsMode::PerQueryCount => {
                let mut f = Factor::new(query.iter().cloned());
                for (tuple, count) in &joint_counts {
                    // factor variables are sorted; re-align the tuple
                    let key: Vec<Value> = f
                        .enum_vars()
                        .iter()
                        .map(|v| {
                            let at = query.iter().position(|q| q == v).expect("query var");
                            tuple[at].clone()
                        })
                        .collect();
                    let index = f.index_of(&key)?;
                    f.set_weight(index, f.weight(index) + count);
                }
                f
            }
            GibbsMode::PerNodeFactor => {
                let mut parts = Vec::with_capacity(query.len());
                for (q, counts) in query.iter().zip(&single_counts) {
                    let mut f = Factor::new(vec![q.clone()]);
                    for (value, count) in counts {
                        f.set_weight_by_key(std::slice::from_ref(value), *count)?;
                    }
                    parts.push(f);
                }
                factor::product_all(&parts).unwrap_or_else(|| Factor::scalar(1.0))
            }
        };
        factor::normalise(&answer)
    }

    /// The Markov-blanket conditional of a node: its own conditional row
    /// multiplied by each child's conditional restricted to the child's
    /// current value, normalised.
    fn blanket_conditional(
        &self,
        node: &Node,
        state: &FxHashMap<Variable, Value>,
    ) -> Result<Categorical> {
        let var = node.variable();
        let domain = var.domain().expect("free nodes are enumerable").clone();
        let own = node.conditional(&parent_values(node, state)?)?;
        let children = self.net.children(var);

        let mut weights = Vec::with_capacity(domain.size());
        for value in domain.values() {
            let mut w = own.get(value)?;
            if w > 0.0 {
                for child in &children {
                    // sampled value for enumerable children, the observation
                    // for evidenced density children
                    let child_value = match state.get(child.variable()) {
                        Some(v) => Datum::Value(v.clone()),
                        None => self.net.evidence()[child.variable()].clone(),
                    };
                    let mut parents = Vec::with_capacity(child.parents().len());
                    for p in child.parents() {
                        parents.push(if p == var {
                            value.clone()
                        } else {
                            state[p].clone()
                        });
                    }
                    w *= child.likelihood(&child_value, &parents)?;
                    if w == 0.0 {
                        break;
                    }
                }
            }
            weights.push(w);
        }
        Categorical::new(domain, weights)
    }
}

/// The node's parent values under the current state.
fn parent_values(node: &Node, state: &FxHashMap<Variable, Value>) -> Result<Vec<Value>> {
    node.parents()
        .iter()
        .map(|p| {
            state.get(p).cloned().ok_or_else(|| {
                BayonetError::IncompleteNetwork(format!(
                    "parent '{}' has no sampled value",
                    p.name()
                ))
            })
        })
        .collect()
}
