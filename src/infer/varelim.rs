//! Exact inference by variable elimination.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::bn::Network;
use crate::dat::{Value, Variable};
use crate::errors::{BayonetError, Result};
use crate::factor::{self, Factor};
use crate::infer::CancelToken;

/// Whether an elimination step sums or maximises over the variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EliminateMode {
    Sum,
    Max,
}

/// The variable-elimination driver.
///
/// Compiles the relevant part of a network into factors, eliminates
/// non-query variables one at a time (cheapest first by the min-weight
/// heuristic), and reads off marginals, the most-probable explanation, or
/// the evidence log-likelihood. One driver serves one network; independent
/// queries may run on separate drivers in parallel.
#[derive(Debug)]
pub struct VarElim<'a> {
    net: &'a Network,
    cancel: CancelToken,
}

impl<'a> VarElim<'a> {
    /// Creates a driver for a compiled network.
    pub fn new(net: &'a Network) -> Result<Self> {
        Self::with_cancel(net, CancelToken::new())
    }

    /// Creates a driver sharing an external cancellation token.
    pub fn with_cancel(net: &'a Network, cancel: CancelToken) -> Result<Self> {
        if !net.is_compiled() {
            return Err(BayonetError::IncompleteNetwork(
                "network must be compiled before querying".into(),
            ));
        }
        Ok(VarElim { net, cancel })
    }

    /// The posterior marginal over the query variables, normalised.
    pub fn marginal(&self, query: &[Variable]) -> Result<Factor> {
        let compiled = self.compile_query(query)?;
        match self.run(&compiled.factors, &compiled.eliminate, EliminateMode::Sum) {
            Ok(f) => factor::normalise(&f),
            Err(BayonetError::EvidenceImpossible(_)) => {
                // one retry on a rescaled pool before giving up
                let (rescaled, _) = rescale_pool(&compiled.factors);
                let f = self.run(&rescaled, &compiled.eliminate, EliminateMode::Sum)?;
                factor::normalise(&f)
            }
            Err(e) => Err(e),
        }
    }

    /// The most-probable explanation: an assignment to every unevidenced
    /// enumerable variable relevant to the query, and its log-probability
    /// jointly with the evidence.
    pub fn mpe(&self, query: &[Variable]) -> Result<(FxHashMap<Variable, Value>, f64)> {
        let compiled = self.compile_query(query)?;
        let mut all: Vec<Variable> = compiled.eliminate.clone();
        all.extend(query.iter().cloned());

        let (answer, log_scale) =
            match self.run(&compiled.factors, &all, EliminateMode::Max) {
                Ok(f) if f.value() > 0.0 => (f, 0.0),
                Ok(_) | Err(BayonetError::EvidenceImpossible(_)) => {
                    let (rescaled, log_scale) = rescale_pool(&compiled.factors);
                    let f = self.run(&rescaled, &all, EliminateMode::Max)?;
                    (f, log_scale)
                }
                Err(e) => return Err(e),
            };
        if !answer.is_atomic() {
            return Err(BayonetError::IncompleteNetwork(
                "explanation query left unresolved variables".into(),
            ));
        }
        if answer.value() <= 0.0 {
            return Err(BayonetError::EvidenceImpossible(
                "no assignment has positive probability under the evidence".into(),
            ));
        }
        let assignment: FxHashMap<Variable, Value> = answer
            .trace(0)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default();
        Ok((assignment, answer.value().ln() + log_scale))
    }

    /// The log-likelihood of the current evidence.
    pub fn log_likelihood(&self) -> Result<f64> {
        let evidence_vars: Vec<Variable> = self.net.evidence().keys().cloned().collect();
        if evidence_vars.is_empty() {
            return Ok(0.0);
        }
        let compiled = self.compile_query(&[])?;
        let (answer, log_scale) =
            match self.run(&compiled.factors, &compiled.eliminate, EliminateMode::Sum) {
                Ok(f) if f.sum() > 0.0 => (f, 0.0),
                Ok(_) | Err(BayonetError::EvidenceImpossible(_)) => {
                    let (rescaled, log_scale) = rescale_pool(&compiled.factors);
                    let f = self.run(&rescaled, &compiled.eliminate, EliminateMode::Sum)?;
                    (f, log_scale)
                }
                Err(e) => return Err(e),
            };
        let total = answer.sum();
        if total <= 0.0 {
            return Err(BayonetError::EvidenceImpossible(
                "evidence has probability zero".into(),
            ));
        }
        Ok(total.ln() + log_scale)
    }

    fn compile_query(&self, query: &[Variable]) -> Result<CompiledQuery> {
        let relevant = self.net.relevant(query)?;
        let evidence = self.net.evidence();
        let mut factors = Vec::new();
        for node in self.net.nodes() {
            if !relevant.contains(node.variable()) {
                continue;
            }
            factors.push(node.make_factor(evidence, &relevant)?);
        }
        // eliminate everything the factors mention except the query variables
        let mut eliminate: Vec<Variable> = Vec::new();
        for f in &factors {
            for v in f.enum_vars() {
                if !query.contains(v) && !eliminate.contains(v) {
                    eliminate.push(v.clone());
                }
            }
        }
        eliminate.sort();
        debug!(
            factors = factors.len(),
            eliminate = eliminate.len(),
            "query compiled"
        );
        Ok(CompiledQuery { factors, eliminate })
    }

    /// Eliminates variables one at a time, multiplying only the factors that
    /// mention each variable (tree-ordered), then reduces what remains.
    fn run(
        &self,
        factors: &[Factor],
        eliminate: &[Variable],
        mode: EliminateMode,
    ) -> Result<Factor> {
        let mut pool: Vec<Factor> = factors.to_vec();
        let mut remaining: Vec<Variable> = eliminate.to_vec();
        while !remaining.is_empty() {
            self.cancel.check()?;
            let v = next_to_eliminate(&remaining, &pool);
            remaining.retain(|r| r != &v);
            let (touching, rest): (Vec<Factor>, Vec<Factor>) = pool
                .into_iter()
                .partition(|f| f.enum_vars().contains(&v));
            pool = rest;
            if touching.is_empty() {
                continue;
            }
            let joint = factor::product_all(&touching).expect("touching is non-empty");
            let reduced = match mode {
                EliminateMode::Sum => factor::sum_out(&joint, &[v.clone()]),
                EliminateMode::Max => factor::max_out(&joint, &[v.clone()]),
            };
            trace!(variable = v.name(), cells = reduced.size(), "eliminated");
            pool.push(reduced);
        }
        self.cancel.check()?;
        let answer = factor::product_all(&pool).unwrap_or_else(|| Factor::scalar(1.0));
        if answer.sum() <= 0.0 && !self.net.evidence().is_empty() {
            return Err(BayonetError::EvidenceImpossible(
                "all weights vanished during elimination".into(),
            ));
        }
        Ok(answer)
    }
}

struct CompiledQuery {
    factors: Vec<Factor>,
    eliminate: Vec<Variable>,
}

/// Min-weight heuristic: eliminate next the variable whose joint factor
/// (the product of all factors mentioning it) would be smallest. Candidates
/// are pre-sorted, so ties fall to the lowest canonical index.
fn next_to_eliminate(candidates: &[Variable], pool: &[Factor]) -> Variable {
    let mut best = candidates[0].clone();
    let mut best_cost = usize::MAX;
    for v in candidates {
        let mut joined: Vec<Variable> = Vec::new();
        for f in pool {
            if f.enum_vars().contains(v) {
                for u in f.enum_vars() {
                    if !joined.contains(u) {
                        joined.push(u.clone());
                    }
                }
            }
        }
        let cost = joined
            .iter()
            .fold(1usize, |acc, u| acc.saturating_mul(u.size()));
        if cost < best_cost {
            best_cost = cost;
            best = v.clone();
        }
    }
    best
}

/// Rescales every factor to a maximum weight of one, returning the pool and
/// the total log-scale taken out. Used for the single scaled retry after a
/// numerical underflow.
fn rescale_pool(factors: &[Factor]) -> (Vec<Factor>, f64) {
    let mut log_scale = 0.0;
    let rescaled = factors
        .iter()
        .map(|f| {
            let max = f.max_weight();
            if max > 0.0 && max.is_finite() {
                let mut g = f.clone();
                g.rescale(1.0 / max);
                log_scale += max.ln();
                g
            } else {
                f.clone()
            }
        })
        .collect();
    (rescaled, log_scale)
}
