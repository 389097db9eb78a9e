//! Enumerable domains and the values they contain.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::{BayonetError, Result};

/// A value an enumerable variable can take.
///
/// Values are cheap to clone and hashable so they can serve as table keys.
/// Character values cover substitution alphabets; symbols cover nominal
/// domains such as `{low, medium, high}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Bool(bool),
    Chr(char),
    Int(i64),
    Sym(Arc<str>),
}

impl Value {
    /// Parses a value from its display form, used by the per-node text
    /// persistence hooks.
    pub fn parse(text: &str) -> Value {
        match text {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int(i);
        }
        let mut chars = text.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Value::Chr(c);
        }
        Value::Sym(Arc::from(text))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Chr(c) => write!(f, "{c}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Sym(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Chr(c)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Sym(Arc::from(s))
    }
}

/// An ordered finite set of values.
///
/// The order is significant: it defines value indices, table strides, and the
/// row/column layout of substitution matrices. Domains are cheap to clone and
/// compare equal when they have the same name and the same value order.
#[derive(Debug, Clone)]
pub struct Domain {
    inner: Arc<DomainInner>,
}

#[derive(Debug)]
struct DomainInner {
    name: Arc<str>,
    values: Vec<Value>,
    index: FxHashMap<Value, usize>,
}

impl Domain {
    /// Creates a domain from an ordered list of distinct values.
    pub fn new(name: &str, values: Vec<Value>) -> Self {
        let index = values
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i))
            .collect();
        Domain {
            inner: Arc::new(DomainInner {
                name: Arc::from(name),
                values,
                index,
            }),
        }
    }

    /// The two-valued boolean domain, `false` before `true`.
    pub fn boolean() -> Self {
        Domain::new("Boolean", vec![Value::Bool(false), Value::Bool(true)])
    }

    /// A nominal domain over the given symbols, in the given order.
    pub fn nominal(name: &str, symbols: &[&str]) -> Self {
        Domain::new(name, symbols.iter().map(|s| Value::from(*s)).collect())
    }

    /// A domain over a character alphabet, in the given order.
    pub fn alphabet(name: &str, chars: &str) -> Self {
        Domain::new(name, chars.chars().map(Value::Chr).collect())
    }

    /// The 20 amino acids in the canonical substitution-matrix order.
    pub fn amino_acids() -> Self {
        Domain::alphabet("AminoAcid", "ARNDCQEGHILKMFPSTWYV")
    }

    /// The four nucleic-acid bases.
    pub fn nucleic_acids() -> Self {
        Domain::alphabet("NucleicAcid", "ACGT")
    }

    /// The two-state presence/absence domain used by gap and gain/loss
    /// models: absent before present.
    pub fn presence() -> Self {
        Domain::new("Presence", vec![Value::Bool(false), Value::Bool(true)])
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of values in the domain.
    pub fn size(&self) -> usize {
        self.inner.values.len()
    }

    /// The value at the given position.
    pub fn value(&self, index: usize) -> &Value {
        &self.inner.values[index]
    }

    pub fn values(&self) -> &[Value] {
        &self.inner.values
    }

    /// The position of a value, or `None` if the domain does not contain it.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.inner.index.get(value).copied()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.inner.index.contains_key(value)
    }

    /// The position of a value, failing with [`BayonetError::InvalidDomain`]
    /// when the value is foreign.
    pub fn require_index(&self, value: &Value) -> Result<usize> {
        self.index_of(value).ok_or_else(|| {
            BayonetError::InvalidDomain(format!(
                "value '{}' is not in domain '{}'",
                value,
                self.name()
            ))
        })
    }
}

impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.name == other.inner.name && self.inner.values == other.inner.values)
    }
}

impl Eq for Domain {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips() {
        let d = Domain::nominal("Size", &["small", "medium", "large"]);
        assert_eq!(d.size(), 3);
        for i in 0..d.size() {
            assert_eq!(d.index_of(d.value(i)), Some(i));
        }
    }

    #[test]
    fn foreign_value_is_rejected() {
        let d = Domain::boolean();
        assert!(d.require_index(&Value::from("maybe")).is_err());
        assert!(d.require_index(&Value::Bool(true)).is_ok());
    }

    #[test]
    fn amino_acid_alphabet_has_twenty_states() {
        let d = Domain::amino_acids();
        assert_eq!(d.size(), 20);
        assert_eq!(d.index_of(&Value::Chr('A')), Some(0));
        assert_eq!(d.index_of(&Value::Chr('V')), Some(19));
    }

    #[test]
    fn equal_by_name_and_values() {
        let a = Domain::nominal("D", &["x", "y"]);
        let b = Domain::nominal("D", &["x", "y"]);
        let c = Domain::nominal("D", &["y", "x"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn value_parse_round_trips_display() {
        for v in [
            Value::Bool(true),
            Value::Chr('K'),
            Value::Int(-3),
            Value::from("medium"),
        ] {
            assert_eq!(Value::parse(&v.to_string()), v);
        }
    }
}
