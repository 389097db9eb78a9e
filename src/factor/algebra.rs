//! The factor algebra: products, marginalisation and normalisation.
//!
//! Products branch on how the two factors' enumerable variables relate
//! (identical, contained, disjoint, general overlap); most of the code here
//! handles one of those cases, and only a fraction of it runs for any given
//! product. Multi-factor products are ordered into a greedy binary tree that
//! minimises intermediate table sizes.

use std::time::Instant;

use crate::dat::Variable;
use crate::errors::{BayonetError, Result};
use crate::factor::dense::{sorted_unique, Cell};
use crate::factor::{Factor, Jdf};

/// Cross-references two sorted variable lists.
///
/// Returns `(x_to_y, y_to_x, overlap)`: for each position in one list, the
/// position of the same variable in the other (or `None`), and the number of
/// shared variables.
pub fn crossref(
    xvars: &[Variable],
    yvars: &[Variable],
) -> (Vec<Option<usize>>, Vec<Option<usize>>, usize) {
    let mut x_to_y = vec![None; xvars.len()];
    let mut y_to_x = vec![None; yvars.len()];
    let mut overlap = 0;
    for (i, x) in xvars.iter().enumerate() {
        if let Some(j) = yvars.iter().position(|y| y == x) {
            x_to_y[i] = Some(j);
            y_to_x[j] = Some(i);
            overlap += 1;
        }
    }
    (x_to_y, y_to_x, overlap)
}

/// Gauges the computational cost of multiplying two tables: the product of
/// domain sizes over the union of their variables. Shared variables count
/// once when `include_join` is set and not at all otherwise. Saturates
/// rather than overflowing on pathological variable sets.
pub fn complexity(xvars: &[Variable], yvars: &[Variable], include_join: bool) -> usize {
    let mut x = 0;
    let mut y = 0;
    let mut cost = 1usize;
    while x < xvars.len() && y < yvars.len() {
        if xvars[x] == yvars[y] {
            if include_join {
                cost = cost.saturating_mul(xvars[x].size());
            }
            x += 1;
            y += 1;
        } else if xvars[x] < yvars[y] {
            cost = cost.saturating_mul(xvars[x].size());
            x += 1;
        } else {
            cost = cost.saturating_mul(yvars[y].size());
            y += 1;
        }
    }
    while x < xvars.len() {
        cost = cost.saturating_mul(xvars[x].size());
        x += 1;
    }
    while y < yvars.len() {
        cost = cost.saturating_mul(yvars[y].size());
        y += 1;
    }
    cost
}

/// Copies the product of two source cells into a destination cell:
/// multiplied weights, independently combined fragments, concatenated traces.
fn fill_product_cell(dt: &mut Factor, index: usize, x: &Cell, x_traced: bool, y: &Cell, y_traced: bool) {
    dt.set_weight(index, x.weight * y.weight);
    match (&x.jdf, &y.jdf) {
        (Some(a), Some(b)) => dt.set_jdf(index, Jdf::combine(a, b)),
        (Some(a), None) => dt.set_jdf(index, a.clone()),
        (None, Some(b)) => dt.set_jdf(index, b.clone()),
        (None, None) => {}
    }
    if x_traced {
        if let Some(t) = &x.trace {
            dt.add_assign(index, t.iter().cloned());
        }
    }
    if y_traced {
        if let Some(t) = &y.trace {
            dt.add_assign(index, t.iter().cloned());
        }
    }
}

fn product_shell(x: &Factor, y: &Factor) -> Factor {
    let vars = x
        .enum_vars()
        .iter()
        .chain(y.enum_vars())
        .chain(x.non_enum_vars())
        .chain(y.non_enum_vars())
        .cloned();
    let mut dt = Factor::new(vars);
    if x.is_traced() || y.is_traced() {
        dt.set_traced(true);
    }
    if x.is_evidenced() || y.is_evidenced() {
        dt.set_evidenced(true);
    }
    dt
}

/// Positions (in `sub`) of each of `sup`'s shared variables; `None` where a
/// `sup` variable is missing from `sub`.
fn positions_in(sup: &[Variable], sub: &[Variable]) -> Vec<Option<usize>> {
    sup.iter()
        .map(|v| sub.iter().position(|s| s == v))
        .collect()
}

/// The factor product `X · Y`.
///
/// The resulting factor spans the union of both factors' variables. Cell
/// weights multiply, joint density fragments combine as independent
/// products, traces concatenate, and the `evidenced` flag is the OR of the
/// inputs. Cells with weight zero on either side are skipped.
pub fn product(x: &Factor, y: &Factor) -> Factor {
    // Cases without enumerable variables on one or both sides.
    if x.is_atomic() && y.is_atomic() {
        let mut dt = product_shell(x, y);
        fill_product_cell(&mut dt, 0, x.cell(0), x.is_traced(), y.cell(0), y.is_traced());
        return dt;
    }
    if x.is_atomic() {
        let mut dt = product_shell(x, y);
        for j in 0..y.size() {
            fill_product_cell(&mut dt, j, x.cell(0), x.is_traced(), y.cell(j), y.is_traced());
        }
        return dt;
    }
    if y.is_atomic() {
        let mut dt = product_shell(x, y);
        for i in 0..x.size() {
            fill_product_cell(&mut dt, i, x.cell(i), x.is_traced(), y.cell(0), y.is_traced());
        }
        return dt;
    }

    let (x_to_y, y_to_x, overlap) = crossref(x.enum_vars(), y.enum_vars());

    // One variable set contained in the other. Since key variables are sorted
    // by canonical index, the shared variables appear in the same relative
    // order, so the smaller table's index follows from digit projection.
    if overlap == x.enum_vars().len().min(y.enum_vars().len()) {
        if x.enum_vars().len() == y.enum_vars().len() {
            // Identical sets: identical layouts, indices coincide.
            let mut dt = product_shell(x, y);
            for i in 0..x.size() {
                if x.weight(i) == 0.0 || y.weight(i) == 0.0 {
                    continue;
                }
                fill_product_cell(&mut dt, i, x.cell(i), x.is_traced(), y.cell(i), y.is_traced());
            }
            return dt;
        }
        let (big, small, small_positions, swap) = if x.enum_vars().len() > y.enum_vars().len() {
            // every Y variable maps into X
            let positions: Vec<usize> = y_to_x.iter().map(|p| p.expect("contained")).collect();
            (x, y, positions, false)
        } else {
            let positions: Vec<usize> = x_to_y.iter().map(|p| p.expect("contained")).collect();
            (y, x, positions, true)
        };
        let mut dt = product_shell(x, y);
        for i in 0..big.size() {
            if big.weight(i) == 0.0 {
                continue;
            }
            let j = big.project_index(i, &small_positions, small.strides());
            if small.weight(j) == 0.0 {
                continue;
            }
            let (xc, yc) = if swap {
                (small.cell(j), big.cell(i))
            } else {
                (big.cell(i), small.cell(j))
            };
            fill_product_cell(&mut dt, i, xc, x.is_traced(), yc, y.is_traced());
        }
        return dt;
    }

    // The amalgamated table and projections from X and Y into it.
    let mut dt = product_shell(x, y);
    let dt_strides = dt.strides().to_vec();
    let x_in_dt: Vec<usize> = positions_in(x.enum_vars(), dt.enum_vars())
        .into_iter()
        .map(|p| p.expect("x variables are in the product"))
        .collect();
    let y_in_dt: Vec<usize> = positions_in(y.enum_vars(), dt.enum_vars())
        .into_iter()
        .map(|p| p.expect("y variables are in the product"))
        .collect();

    let dt_index = |x_idx: usize, y_idx: usize| -> usize {
        let mut idx = 0;
        for (i, &pos) in x_in_dt.iter().enumerate() {
            idx += x.digit(x_idx, i) * dt_strides[pos];
        }
        for (j, &pos) in y_in_dt.iter().enumerate() {
            if y_to_x[j].is_none() {
                idx += y.digit(y_idx, j) * dt_strides[pos];
            }
        }
        idx
    };

    // Nothing in common: plain Cartesian product of cells.
    if overlap == 0 {
        for i in 0..x.size() {
            if x.weight(i) == 0.0 {
                continue;
            }
            for j in 0..y.size() {
                if y.weight(j) == 0.0 {
                    continue;
                }
                let idx = dt_index(i, j);
                fill_product_cell(&mut dt, idx, x.cell(i), x.is_traced(), y.cell(j), y.is_traced());
            }
        }
        return dt;
    }

    // General case: partial overlap. For each X row the matching Y cells can
    // be enumerated by a stride walk or found by scanning all of Y with a
    // digit predicate; which is faster depends on the footprint of the shared
    // variables, so the first two rows measure one strategy each and the
    // faster one runs the remainder.
    let shared: Vec<(usize, usize)> = x_to_y
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.map(|j| (i, j)))
        .collect();
    let mut option: Option<ProductStrategy> = None;
    let mut walk_nanos = 0u128;
    let mut scan_nanos = 0u128;

    for i in 0..x.size() {
        if x.weight(i) == 0.0 {
            continue;
        }
        let fixed: Vec<(usize, usize)> = shared
            .iter()
            .map(|&(xpos, ypos)| (ypos, x.digit(i, xpos)))
            .collect();

        let (strategy, timed) = match option {
            Some(s) => (s, false),
            None if walk_nanos == 0 => (ProductStrategy::StrideWalk, true),
            None => (ProductStrategy::FullScan, true),
        };
        let started = timed.then(Instant::now);

        match strategy {
            ProductStrategy::StrideWalk => {
                for j in y.indices_matching_digits(&fixed) {
                    if y.weight(j) == 0.0 {
                        continue;
                    }
                    let idx = dt_index(i, j);
                    fill_product_cell(&mut dt, idx, x.cell(i), x.is_traced(), y.cell(j), y.is_traced());
                }
            }
            ProductStrategy::FullScan => {
                for j in 0..y.size() {
                    if y.weight(j) == 0.0 || !y.matches_digits(j, &fixed) {
                        continue;
                    }
                    let idx = dt_index(i, j);
                    fill_product_cell(&mut dt, idx, x.cell(i), x.is_traced(), y.cell(j), y.is_traced());
                }
            }
        }

        if let Some(start) = started {
            let elapsed = start.elapsed().as_nanos().max(1);
            match strategy {
                ProductStrategy::StrideWalk => walk_nanos = elapsed,
                ProductStrategy::FullScan => {
                    scan_nanos = elapsed;
                    option = Some(if walk_nanos <= scan_nanos {
                        ProductStrategy::StrideWalk
                    } else {
                        ProductStrategy::FullScan
                    });
                }
            }
        }
    }
    dt
}

/// How the general product case locates matching cells in the right table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProductStrategy {
    /// Enumerate matching indices by walking strides of the unshared
    /// dimensions.
    StrideWalk,
    /// Scan every cell and test the shared digits.
    FullScan,
}

/// A binary tree over a pool of factors defining the product order.
#[derive(Debug)]
enum ProductTree {
    Leaf(usize),
    Node(Box<ProductTree>, Box<ProductTree>, Vec<Variable>),
}

impl ProductTree {
    fn enum_vars<'a>(&'a self, factors: &'a [Factor]) -> &'a [Variable] {
        match self {
            ProductTree::Leaf(i) => factors[*i].enum_vars(),
            ProductTree::Node(_, _, evars) => evars,
        }
    }

    fn join(a: ProductTree, b: ProductTree, factors: &[Factor]) -> ProductTree {
        let mut evars: Vec<Variable> = a.enum_vars(factors).to_vec();
        evars.extend_from_slice(b.enum_vars(factors));
        let evars = sorted_unique(evars);
        ProductTree::Node(Box::new(a), Box::new(b), evars)
    }

    fn evaluate(&self, factors: &[Factor]) -> Factor {
        match self {
            ProductTree::Leaf(i) => factors[*i].clone(),
            ProductTree::Node(a, b, _) => {
                let fa = a.evaluate(factors);
                let fb = b.evaluate(factors);
                product(&fa, &fb)
            }
        }
    }
}

/// Multiplies a pool of factors, ordering the pairwise products greedily: at
/// each step the pair with the smallest joined complexity is multiplied
/// first, keeping intermediate tables small. Returns `None` for an empty
/// pool.
pub fn product_all(factors: &[Factor]) -> Option<Factor> {
    match factors.len() {
        0 => return None,
        1 => return Some(factors[0].clone()),
        _ => {}
    }
    let mut pool: Vec<ProductTree> = (0..factors.len()).map(ProductTree::Leaf).collect();
    while pool.len() > 1 {
        let mut best = (0, 1);
        let mut lowest = usize::MAX;
        for i in 0..pool.len() {
            for j in (i + 1)..pool.len() {
                let cost = complexity(
                    pool[i].enum_vars(factors),
                    pool[j].enum_vars(factors),
                    true,
                );
                if cost < lowest {
                    lowest = cost;
                    best = (i, j);
                }
            }
        }
        // remove j before i so i's position is untouched
        let b = pool.remove(best.1);
        let a = pool.remove(best.0);
        pool.push(ProductTree::join(a, b, factors));
    }
    Some(pool.pop().expect("pool has one node").evaluate(factors))
}

/// Variables of `vars` that key `x`, as `(position in x, variable)` pairs.
fn removable_positions(x: &Factor, vars: &[Variable]) -> Vec<usize> {
    let unique = sorted_unique(vars.to_vec());
    unique
        .iter()
        .filter_map(|v| x.enum_vars().iter().position(|e| e == v))
        .collect()
}

fn margin_shell(x: &Factor, removed: &[usize]) -> Factor {
    let kept = x
        .enum_vars()
        .iter()
        .enumerate()
        .filter(|(i, _)| !removed.contains(i))
        .map(|(_, v)| v.clone());
    Factor::new(kept.chain(x.non_enum_vars().iter().cloned()))
}

/// Positions in `x` of the destination factor's enumerable variables.
fn kept_positions(x: &Factor, dest: &Factor) -> Vec<usize> {
    dest.enum_vars()
        .iter()
        .map(|v| {
            x.enum_vars()
                .iter()
                .position(|e| e == v)
                .expect("destination variables come from the source")
        })
        .collect()
}

/// Sum-marginalises the named enumerable variables out of a factor.
///
/// Destination weights are the sums of the projecting source cells; the
/// destination fragment is the weight-normalised mixture of the source
/// fragments (zero-weight sources contribute nothing). Traces do not survive
/// the mixing and are dropped.
pub fn sum_out(x: &Factor, vars: &[Variable]) -> Factor {
    if !x.has_enum_vars() {
        return x.clone();
    }
    let removed = removable_positions(x, vars);
    let mut y = margin_shell(x, &removed);
    let kept = kept_positions(x, &y);

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); y.size()];
    for i in 0..x.size() {
        let dest = x.project_index(i, &kept, y.strides());
        groups[dest].push(i);
    }
    for (dest, sources) in groups.iter().enumerate() {
        let sum: f64 = sources.iter().map(|&i| x.weight(i)).sum();
        y.set_weight(dest, sum);
        if sum > 0.0 {
            let parts: Vec<(&Jdf, f64)> = sources
                .iter()
                .filter(|&&i| x.weight(i) != 0.0)
                .filter_map(|&i| x.jdf(i).map(|j| (j, x.weight(i) / sum)))
                .collect();
            if !parts.is_empty() {
                y.set_jdf(dest, Jdf::mix_weighted(&parts));
            }
        }
    }
    y
}

/// Max-marginalises the named enumerable variables out of a factor, tracing
/// the assignments that won.
///
/// Each destination cell takes the weight and fragment of its maximum-weight
/// source cell (ties resolve to the lowest linearised source index), carries
/// any trace that source already had, and extends it with the bindings of the
/// variables being removed.
pub fn max_out(x: &Factor, vars: &[Variable]) -> Factor {
    if !x.has_enum_vars() {
        return x.clone();
    }
    let removed = removable_positions(x, vars);
    let mut y = margin_shell(x, &removed);
    y.set_traced(true);
    let kept = kept_positions(x, &y);

    let mut winners: Vec<Option<usize>> = vec![None; y.size()];
    for i in 0..x.size() {
        let dest = x.project_index(i, &kept, y.strides());
        match winners[dest] {
            Some(w) if x.weight(i) <= x.weight(w) => {}
            _ => winners[dest] = Some(i),
        }
    }
    for (dest, winner) in winners.iter().enumerate() {
        let i = winner.expect("every destination has at least one source");
        y.set_weight(dest, x.weight(i));
        if let Some(jdf) = x.jdf(i) {
            y.set_jdf(dest, jdf.clone());
        }
        if x.is_traced() {
            if let Some(t) = x.trace(i) {
                y.add_assign(dest, t.iter().cloned());
            }
        }
        let bindings: Vec<_> = removed
            .iter()
            .map(|&pos| {
                let var = x.enum_vars()[pos].clone();
                let value = var
                    .domain()
                    .expect("enumerable")
                    .value(x.digit(i, pos))
                    .clone();
                (var, value)
            })
            .collect();
        y.add_assign(dest, bindings);
    }
    y
}

/// Returns a normalised copy whose weights sum to one.
///
/// A factor whose total weight is zero cannot be normalised; under evidence
/// this means the observed configuration is impossible.
pub fn normalise(x: &Factor) -> Result<Factor> {
    let sum = x.sum();
    if sum <= 0.0 || !sum.is_finite() {
        return Err(BayonetError::EvidenceImpossible(format!(
            "factor over {} variables has total weight {sum}",
            x.enum_vars().len()
        )));
    }
    let mut y = x.clone();
    y.rescale(1.0 / sum);
    Ok(y)
}
