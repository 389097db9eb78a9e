//! Dense factor storage.

use smallvec::SmallVec;

use crate::dat::table::strides_for;
use crate::dat::{Value, Variable};
use crate::errors::{BayonetError, Result};
use crate::factor::Jdf;

/// An ordered set of variable/value bindings accumulated by
/// max-marginalisation, later read off as the most-probable explanation.
pub type Trace = Vec<(Variable, Value)>;

/// One factor cell: a non-negative weight, optionally a joint density
/// fragment over the factor's non-enumerable variables, optionally a trace.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub(crate) weight: f64,
    pub(crate) jdf: Option<Jdf>,
    pub(crate) trace: Option<Trace>,
}

/// A factor: a dense table over enumerable key variables whose cells carry
/// weights and, for hybrid networks, joint density fragments.
///
/// Key variables are sorted by canonical index at construction, which makes
/// the cell layout of two factors over the same variables identical. A factor
/// with no enumerable variables is *atomic*: a single cell holding a scalar.
#[derive(Debug, Clone)]
pub struct Factor {
    evars: Vec<Variable>,
    nvars: Vec<Variable>,
    strides: Vec<usize>,
    cells: Vec<Cell>,
    traced: bool,
    evidenced: bool,
}

/// Sorts by canonical index and removes duplicates.
pub(crate) fn sorted_unique(mut vars: Vec<Variable>) -> Vec<Variable> {
    vars.sort();
    vars.dedup();
    vars
}

impl Factor {
    /// Creates a zero factor over the given variables.
    ///
    /// Enumerable variables become key variables (sorted by canonical index);
    /// the rest become the factor's non-enumerable variables.
    pub fn new<I: IntoIterator<Item = Variable>>(vars: I) -> Self {
        let (evars, nvars): (Vec<_>, Vec<_>) =
            vars.into_iter().partition(Variable::is_enumerable);
        let evars = sorted_unique(evars);
        let nvars = sorted_unique(nvars);
        let (strides, size) = strides_for(&evars);
        Factor {
            evars,
            nvars,
            strides,
            cells: vec![Cell::default(); size],
            traced: false,
            evidenced: false,
        }
    }

    /// An atomic factor holding a single weight.
    pub fn scalar(weight: f64) -> Self {
        let mut f = Factor::new(std::iter::empty::<Variable>());
        f.cells[0].weight = weight;
        f
    }

    pub fn enum_vars(&self) -> &[Variable] {
        &self.evars
    }

    pub fn non_enum_vars(&self) -> &[Variable] {
        &self.nvars
    }

    pub fn has_enum_vars(&self) -> bool {
        !self.evars.is_empty()
    }

    /// True when the factor has no enumerable variables: one cell, one weight.
    pub fn is_atomic(&self) -> bool {
        self.evars.is_empty()
    }

    /// Number of cells, `Π |Dom(Ei)|`, or 1 when atomic.
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn is_traced(&self) -> bool {
        self.traced
    }

    pub fn set_traced(&mut self, traced: bool) {
        self.traced = traced;
    }

    pub fn is_evidenced(&self) -> bool {
        self.evidenced
    }

    pub fn set_evidenced(&mut self, evidenced: bool) {
        self.evidenced = evidenced;
    }

    pub fn weight(&self, index: usize) -> f64 {
        self.cells[index].weight
    }

    pub fn set_weight(&mut self, index: usize, weight: f64) {
        self.cells[index].weight = weight;
    }

    /// The weight of the single cell of an atomic factor.
    pub fn value(&self) -> f64 {
        debug_assert!(self.is_atomic());
        self.cells[0].weight
    }

    pub fn jdf(&self, index: usize) -> Option<&Jdf> {
        self.cells[index].jdf.as_ref()
    }

    pub fn set_jdf(&mut self, index: usize, jdf: Jdf) {
        self.cells[index].jdf = Some(jdf);
    }

    /// Sets the distribution of one non-enumerable variable in a cell's
    /// fragment, creating the fragment when absent.
    pub fn set_distrib(&mut self, index: usize, var: Variable, distrib: crate::prob::Distrib) {
        self.cells[index]
            .jdf
            .get_or_insert_with(Jdf::new)
            .set(var, distrib);
    }

    pub fn trace(&self, index: usize) -> Option<&Trace> {
        self.cells[index].trace.as_ref()
    }

    /// Appends bindings to a cell's trace. No-op unless the factor is traced.
    pub fn add_assign<I: IntoIterator<Item = (Variable, Value)>>(
        &mut self,
        index: usize,
        bindings: I,
    ) {
        if !self.traced {
            return;
        }
        self.cells[index]
            .trace
            .get_or_insert_with(Vec::new)
            .extend(bindings);
    }

    pub(crate) fn cell(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    /// Linearises a key over the factor's enumerable variables (in their
    /// sorted order) into a cell index.
    pub fn index_of(&self, key: &[Value]) -> Result<usize> {
        if key.len() != self.evars.len() {
            return Err(BayonetError::InvalidDomain(format!(
                "invalid key: expected {} positions, got {}",
                self.evars.len(),
                key.len()
            )));
        }
        let mut index = 0;
        for (i, value) in key.iter().enumerate() {
            let domain = self.evars[i].domain().expect("key variables are enumerable");
            index += domain.require_index(value)? * self.strides[i];
        }
        Ok(index)
    }

    /// Reconstructs the key tuple for a cell index.
    pub fn key(&self, index: usize) -> SmallVec<[Value; 4]> {
        let mut key = SmallVec::with_capacity(self.evars.len());
        let mut remainder = index;
        for (i, v) in self.evars.iter().enumerate() {
            let pos = remainder / self.strides[i];
            remainder %= self.strides[i];
            key.push(v.domain().expect("enumerable").value(pos).clone());
        }
        key
    }

    /// The digit (value index) of variable position `pos` within cell `index`.
    pub(crate) fn digit(&self, index: usize, pos: usize) -> usize {
        (index / self.strides[pos]) % self.evars[pos].size()
    }

    /// Weight lookup by key.
    pub fn weight_by_key(&self, key: &[Value]) -> Result<f64> {
        Ok(self.cells[self.index_of(key)?].weight)
    }

    pub fn set_weight_by_key(&mut self, key: &[Value], weight: f64) -> Result<()> {
        let index = self.index_of(key)?;
        self.cells[index].weight = weight;
        Ok(())
    }

    /// All cell indices whose digits agree with the fixed positions.
    /// Walks strides so the cost is proportional to the number of matches.
    pub(crate) fn indices_matching_digits(&self, fixed: &[(usize, usize)]) -> Vec<usize> {
        let mut base = 0usize;
        let mut is_fixed = vec![false; self.evars.len()];
        for &(pos, digit) in fixed {
            base += digit * self.strides[pos];
            is_fixed[pos] = true;
        }
        let mut indices = vec![base];
        for (pos, fixed_here) in is_fixed.iter().enumerate() {
            if *fixed_here {
                continue;
            }
            let size = self.evars[pos].size();
            let stride = self.strides[pos];
            let mut expanded = Vec::with_capacity(indices.len() * size);
            for &idx in &indices {
                for d in 0..size {
                    expanded.push(idx + d * stride);
                }
            }
            indices = expanded;
        }
        indices
    }

    /// Whether a cell's digits agree with the fixed positions; the scan-side
    /// counterpart of [`Factor::indices_matching_digits`].
    pub(crate) fn matches_digits(&self, index: usize, fixed: &[(usize, usize)]) -> bool {
        fixed
            .iter()
            .all(|&(pos, digit)| self.digit(index, pos) == digit)
    }

    /// Maps a cell index to the index of a factor over a subset of this
    /// factor's variables. `projection[j]` is the position (in this factor)
    /// of the target's j-th variable.
    pub(crate) fn project_index(&self, index: usize, projection: &[usize], strides: &[usize]) -> usize {
        let mut out = 0;
        for (j, &pos) in projection.iter().enumerate() {
            out += self.digit(index, pos) * strides[j];
        }
        out
    }

    pub(crate) fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Sum of all cell weights.
    pub fn sum(&self) -> f64 {
        self.cells.iter().map(|c| c.weight).sum()
    }

    /// Largest cell weight.
    pub fn max_weight(&self) -> f64 {
        self.cells
            .iter()
            .map(|c| c.weight)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Rescales every weight by the factor `scale`. Used by the driver's
    /// log-scaled underflow retry; fragments and traces are untouched.
    pub fn rescale(&mut self, scale: f64) {
        for c in &mut self.cells {
            c.weight *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::Domain;

    #[test]
    fn variables_are_sorted_and_split() {
        let b = Variable::boolean("B");
        let x = Variable::continuous("x");
        let a = Variable::boolean("A");
        let f = Factor::new(vec![a.clone(), x.clone(), b.clone()]);
        // canonical (creation) order decides the sort, not the name
        assert_eq!(f.enum_vars(), &[b, a]);
        assert_eq!(f.non_enum_vars(), &[x]);
        assert_eq!(f.size(), 4);
    }

    #[test]
    fn duplicates_collapse() {
        let a = Variable::boolean("A");
        let f = Factor::new(vec![a.clone(), a.clone()]);
        assert_eq!(f.enum_vars().len(), 1);
        assert_eq!(f.size(), 2);
    }

    #[test]
    fn atomic_factor_has_one_cell() {
        let f = Factor::scalar(0.25);
        assert!(f.is_atomic());
        assert_eq!(f.size(), 1);
        assert!((f.value() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn key_index_round_trip() {
        let a = Variable::boolean("A");
        let c = Variable::enumerable("C", Domain::nominal("Tri", &["x", "y", "z"]));
        let f = Factor::new(vec![c, a]);
        for i in 0..f.size() {
            let key = f.key(i);
            assert_eq!(f.index_of(&key).unwrap(), i);
        }
    }

    #[test]
    fn digit_matches_key_position() {
        let a = Variable::boolean("A");
        let c = Variable::enumerable("C", Domain::nominal("Tri", &["x", "y", "z"]));
        let f = Factor::new(vec![a, c]);
        for i in 0..f.size() {
            let key = f.key(i);
            for pos in 0..2 {
                let domain = f.enum_vars()[pos].domain().unwrap();
                assert_eq!(f.digit(i, pos), domain.index_of(&key[pos]).unwrap());
            }
        }
    }

    #[test]
    fn trace_requires_traced_flag() {
        let a = Variable::boolean("A");
        let mut f = Factor::new(vec![a.clone()]);
        f.add_assign(0, vec![(a.clone(), Value::Bool(false))]);
        assert!(f.trace(0).is_none());
        f.set_traced(true);
        f.add_assign(0, vec![(a, Value::Bool(false))]);
        assert_eq!(f.trace(0).unwrap().len(), 1);
    }

    #[test]
    fn digit_walk_matches_scan() {
        let a = Variable::boolean("A");
        let c = Variable::enumerable("C", Domain::nominal("Tri", &["x", "y", "z"]));
        let f = Factor::new(vec![a, c]);
        let fixed = [(1usize, 2usize)]; // C = z
        let walked = f.indices_matching_digits(&fixed);
        let scanned: Vec<usize> = (0..f.size())
            .filter(|&i| f.matches_digits(i, &fixed))
            .collect();
        assert_eq!(walked, scanned);
    }
}
