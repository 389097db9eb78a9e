//! Dense tables keyed by tuples of enumerable-variable values.
//!
//! An [`EnumTable`] maps every combination of its variables' values to an
//! optional payload. Storage is a flat vector addressed by mixed-radix
//! arithmetic: the first variable has the largest stride, the last varies
//! fastest. [`CountTable`] and [`SampleTable`] reuse the same addressing for
//! training bookkeeping.

use smallvec::SmallVec;

use crate::dat::{Value, Variable};
use crate::errors::{BayonetError, Result};

/// A key tuple; most tables have a handful of parents.
pub type Key = SmallVec<[Value; 4]>;

/// Dense rectangular map from a tuple of enumerable values to a payload.
#[derive(Debug, Clone)]
pub struct EnumTable<T> {
    vars: Vec<Variable>,
    strides: Vec<usize>,
    cells: Vec<Option<T>>,
}

/// Computes mixed-radix strides for a variable list; the last variable
/// varies fastest. Returns the total size alongside.
pub(crate) fn strides_for(vars: &[Variable]) -> (Vec<usize>, usize) {
    let mut strides = vec![0usize; vars.len()];
    let mut size = 1usize;
    for (i, v) in vars.iter().enumerate().rev() {
        strides[i] = size;
        size *= v.size().max(1);
    }
    (strides, size)
}

impl<T> EnumTable<T> {
    /// Creates an empty table over the given enumerable variables.
    ///
    /// Fails with [`BayonetError::InvalidDomain`] if any variable is
    /// continuous.
    pub fn new(vars: Vec<Variable>) -> Result<Self> {
        for v in &vars {
            if !v.is_enumerable() {
                return Err(BayonetError::InvalidDomain(format!(
                    "variable '{}' is continuous and cannot key a table",
                    v.name()
                )));
            }
        }
        let (strides, size) = strides_for(&vars);
        let mut cells = Vec::with_capacity(size);
        cells.resize_with(size, || None);
        Ok(EnumTable {
            vars,
            strides,
            cells,
        })
    }

    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    /// Total number of cells, `Π |Dom(Vi)|`.
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Linearises a full key into a cell index.
    pub fn index_of(&self, key: &[Value]) -> Result<usize> {
        if key.len() != self.vars.len() {
            return Err(BayonetError::InvalidDomain(format!(
                "invalid key: expected {} positions, got {}",
                self.vars.len(),
                key.len()
            )));
        }
        let mut index = 0;
        for (i, value) in key.iter().enumerate() {
            let domain = self.vars[i].domain().expect("table variables are enumerable");
            index += domain.require_index(value)? * self.strides[i];
        }
        Ok(index)
    }

    /// Reconstructs the key tuple for a cell index.
    pub fn key(&self, index: usize) -> Key {
        let mut key = Key::with_capacity(self.vars.len());
        let mut remainder = index;
        for (i, v) in self.vars.iter().enumerate() {
            let pos = remainder / self.strides[i];
            remainder %= self.strides[i];
            key.push(v.domain().expect("enumerable").value(pos).clone());
        }
        key
    }

    pub fn value(&self, index: usize) -> Option<&T> {
        self.cells[index].as_ref()
    }

    pub fn set_value(&mut self, index: usize, value: T) {
        self.cells[index] = Some(value);
    }

    pub fn value_by_key(&self, key: &[Value]) -> Result<Option<&T>> {
        Ok(self.cells[self.index_of(key)?].as_ref())
    }

    pub fn set_by_key(&mut self, key: &[Value], value: T) -> Result<()> {
        let index = self.index_of(key)?;
        self.cells[index] = Some(value);
        Ok(())
    }

    pub fn has_value(&self, index: usize) -> bool {
        self.cells[index].is_some()
    }

    /// Iterates populated cells as `(index, payload)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|v| (i, v)))
    }

    /// All cell indices whose key matches the partial key: `None` positions
    /// are wildcards, `Some` positions must agree. Walks strides rather than
    /// scanning every cell, so the cost is proportional to the number of
    /// matches.
    pub fn indices_matching(&self, partial: &[Option<Value>]) -> Result<Vec<usize>> {
        if partial.len() != self.vars.len() {
            return Err(BayonetError::InvalidDomain(format!(
                "invalid key: expected {} positions, got {}",
                self.vars.len(),
                partial.len()
            )));
        }
        let mut base = 0usize;
        let mut free: Vec<usize> = Vec::new();
        for (i, slot) in partial.iter().enumerate() {
            match slot {
                Some(value) => {
                    let domain = self.vars[i].domain().expect("enumerable");
                    base += domain.require_index(value)? * self.strides[i];
                }
                None => free.push(i),
            }
        }
        let mut indices = vec![base];
        for &i in &free {
            let size = self.vars[i].size();
            let stride = self.strides[i];
            let mut expanded = Vec::with_capacity(indices.len() * size);
            for &idx in &indices {
                for pos in 0..size {
                    expanded.push(idx + pos * stride);
                }
            }
            indices = expanded;
        }
        Ok(indices)
    }
}

/// Weighted occurrence counts keyed like an [`EnumTable`], accumulated during
/// training and flushed into a distribution by maximum likelihood.
#[derive(Debug, Clone)]
pub struct CountTable {
    table: EnumTable<f64>,
}

impl CountTable {
    pub fn new(vars: Vec<Variable>) -> Result<Self> {
        Ok(CountTable {
            table: EnumTable::new(vars)?,
        })
    }

    pub fn size(&self) -> usize {
        self.table.size()
    }

    pub fn count(&mut self, key: &[Value], weight: f64) -> Result<()> {
        let index = self.table.index_of(key)?;
        let total = self.table.value(index).copied().unwrap_or(0.0) + weight;
        self.table.set_value(index, total);
        Ok(())
    }

    pub fn get(&self, index: usize) -> f64 {
        self.table.value(index).copied().unwrap_or(0.0)
    }

    pub fn index_of(&self, key: &[Value]) -> Result<usize> {
        self.table.index_of(key)
    }

    pub fn indices_matching(&self, partial: &[Option<Value>]) -> Result<Vec<usize>> {
        self.table.indices_matching(partial)
    }
}

/// Per-row weighted observation lists, used to train density tables where
/// individual samples (not just counts) are needed.
#[derive(Debug, Clone)]
pub struct SampleTable<T> {
    vars: Vec<Variable>,
    strides: Vec<usize>,
    rows: Vec<Vec<(T, f64)>>,
}

impl<T> SampleTable<T> {
    pub fn new(vars: Vec<Variable>) -> Result<Self> {
        for v in &vars {
            if !v.is_enumerable() {
                return Err(BayonetError::InvalidDomain(format!(
                    "variable '{}' is continuous and cannot key a sample table",
                    v.name()
                )));
            }
        }
        let (strides, size) = strides_for(&vars);
        let mut rows = Vec::with_capacity(size);
        rows.resize_with(size, Vec::new);
        Ok(SampleTable {
            vars,
            strides,
            rows,
        })
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn index_of(&self, key: &[Value]) -> Result<usize> {
        if key.len() != self.vars.len() {
            return Err(BayonetError::InvalidDomain(format!(
                "invalid key: expected {} positions, got {}",
                self.vars.len(),
                key.len()
            )));
        }
        let mut index = 0;
        for (i, value) in key.iter().enumerate() {
            let domain = self.vars[i].domain().expect("enumerable");
            index += domain.require_index(value)? * self.strides[i];
        }
        Ok(index)
    }

    pub fn observe(&mut self, key: &[Value], sample: T, weight: f64) -> Result<()> {
        let index = self.index_of(key)?;
        self.rows[index].push((sample, weight));
        Ok(())
    }

    pub fn row(&self, index: usize) -> &[(T, f64)] {
        &self.rows[index]
    }

    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.clear();
        }
    }
}
