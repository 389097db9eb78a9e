//! Joint density fragments: per-cell densities over non-enumerable variables.

use crate::dat::Variable;
use crate::prob::{Distrib, Mixture};

/// A mapping from non-enumerable variables to their conditional distributions,
/// carried inside a factor cell.
///
/// Fragments combine in two ways: [`Jdf::combine`] forms the independent
/// product of two fragments over disjoint variables (a factor product), and
/// [`Jdf::mix_weighted`] forms the per-variable weighted mixture of several
/// fragments (collapsing cells during marginalisation).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Jdf {
    entries: Vec<(Variable, Distrib)>,
}

impl Jdf {
    pub fn new() -> Self {
        Jdf::default()
    }

    pub fn singleton(var: Variable, distrib: Distrib) -> Self {
        Jdf {
            entries: vec![(var, distrib)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.entries.iter().map(|(v, _)| v)
    }

    pub fn entries(&self) -> &[(Variable, Distrib)] {
        &self.entries
    }

    pub fn get(&self, var: &Variable) -> Option<&Distrib> {
        self.entries
            .iter()
            .find(|(v, _)| v == var)
            .map(|(_, d)| d)
    }

    /// Sets the distribution for a variable, keeping entries sorted by
    /// canonical index.
    pub fn set(&mut self, var: Variable, distrib: Distrib) {
        match self.entries.binary_search_by(|(v, _)| v.cmp(&var)) {
            Ok(i) => self.entries[i].1 = distrib,
            Err(i) => self.entries.insert(i, (var, distrib)),
        }
    }

    /// Independent product of two fragments: the union of their entries.
    /// The variable sets are disjoint in a well-formed factor product.
    pub fn combine(x: &Jdf, y: &Jdf) -> Jdf {
        let mut out = x.clone();
        for (v, d) in &y.entries {
            out.set(v.clone(), d.clone());
        }
        out
    }

    /// Weighted mixture of fragments, per variable.
    ///
    /// With a single part the fragment passes through unchanged; otherwise
    /// each variable's distribution becomes a flat mixture of the parts that
    /// define it, weighted by the part weights.
    pub fn mix_weighted(parts: &[(&Jdf, f64)]) -> Jdf {
        if parts.len() == 1 {
            return parts[0].0.clone();
        }
        let mut vars: Vec<Variable> = Vec::new();
        for (jdf, _) in parts {
            for v in jdf.variables() {
                if !vars.contains(v) {
                    vars.push(v.clone());
                }
            }
        }
        vars.sort();
        let mut out = Jdf::new();
        for v in vars {
            let mut mixture: Option<Mixture> = None;
            for (jdf, w) in parts {
                if let Some(d) = jdf.get(&v) {
                    match &mut mixture {
                        Some(m) => m.add(d.clone(), *w),
                        None => mixture = Some(Mixture::new(d.clone(), *w)),
                    }
                }
            }
            if let Some(m) = mixture {
                out.set(v, Distrib::Mixture(m));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prob::Gaussian;

    fn gauss(mean: f64) -> Distrib {
        Distrib::Gaussian(Gaussian::new(mean, 1.0).unwrap())
    }

    #[test]
    fn combine_unions_disjoint_entries() {
        let x = Variable::continuous("x");
        let y = Variable::continuous("y");
        let a = Jdf::singleton(x.clone(), gauss(0.0));
        let b = Jdf::singleton(y.clone(), gauss(1.0));
        let c = Jdf::combine(&a, &b);
        assert!(c.get(&x).is_some());
        assert!(c.get(&y).is_some());
        assert_eq!(c.entries().len(), 2);
    }

    #[test]
    fn entries_stay_sorted_by_canonical_index() {
        let x = Variable::continuous("x");
        let y = Variable::continuous("y");
        let mut j = Jdf::new();
        j.set(y.clone(), gauss(1.0));
        j.set(x.clone(), gauss(0.0));
        let order: Vec<&Variable> = j.variables().collect();
        assert_eq!(order, vec![&x, &y]);
    }

    #[test]
    fn single_part_mix_passes_through() {
        let x = Variable::continuous("x");
        let a = Jdf::singleton(x, gauss(0.0));
        let mixed = Jdf::mix_weighted(&[(&a, 1.0)]);
        assert_eq!(mixed, a);
    }

    #[test]
    fn mix_builds_per_variable_mixtures() {
        let x = Variable::continuous("x");
        let a = Jdf::singleton(x.clone(), gauss(0.0));
        let b = Jdf::singleton(x.clone(), gauss(5.0));
        let mixed = Jdf::mix_weighted(&[(&a, 0.25), (&b, 0.75)]);
        match mixed.get(&x).unwrap() {
            Distrib::Mixture(m) => {
                assert_eq!(m.len(), 2);
                assert!((m.total_weight() - 1.0).abs() < 1e-12);
            }
            other => panic!("expected mixture, got {other:?}"),
        }
    }
}
