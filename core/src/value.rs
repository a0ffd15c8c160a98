//! Converted argument values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An exact fraction with a positive denominator, always kept in lowest
/// terms.
///
/// # Examples
///
/// ```
/// use tooltree_core::Rational;
///
/// let half = Rational::new(2, -4).unwrap();
/// assert_eq!((half.numer(), half.denom()), (-1, 2));
/// assert!(Rational::new(1, 0).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    numer: i64,
    denom: i64,
}

impl Rational {
    /// Creates a reduced fraction. Returns `None` for a zero denominator or
    /// when normalizing the sign would overflow.
    pub fn new(numer: i64, denom: i64) -> Option<Self> {
        if denom == 0 {
            return None;
        }
        let divisor = gcd(numer.unsigned_abs(), denom.unsigned_abs()).max(1);
        let divisor = i64::try_from(divisor).ok()?;
        let (mut numer, mut denom) = (numer / divisor, denom / divisor);
        if denom < 0 {
            numer = numer.checked_neg()?;
            denom = denom.checked_neg()?;
        }
        Some(Self { numer, denom })
    }

    pub fn numer(&self) -> i64 {
        self.numer
    }

    pub fn denom(&self) -> i64 {
        self.denom
    }

    /// Returns the value as a float.
    pub fn to_f64(&self) -> f64 {
        self.numer as f64 / self.denom as f64
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer, self.denom)
    }
}

/// A value bound to a context key by a flag, a positional argument, or a
/// declared default.
///
/// Serializes untagged, so it maps naturally onto JSON and YAML scalars and
/// sequences.
///
/// # Examples
///
/// ```
/// use tooltree_core::Value;
///
/// let v: Value = serde_json::from_str(r#"["a", 1, true, null]"#).unwrap();
/// assert_eq!(
///     v,
///     Value::List(vec![Value::from("a"), Value::Int(1), Value::Bool(true), Value::Null]),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Rational(Rational),
    String(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns `true` when a default of this shape implies that a flag
    /// carries a value (anything other than null or a boolean).
    pub fn implies_flag_value(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Rational(r) => write!(f, "{r}"),
            Self::String(s) => f.write_str(s),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<Rational> for Value {
    fn from(r: Rational) -> Self {
        Self::Rational(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_reduces_and_normalizes_sign() {
        let r = Rational::new(6, -8).unwrap();
        assert_eq!(r.numer(), -3);
        assert_eq!(r.denom(), 4);
        assert_eq!(r.to_string(), "-3/4");
    }

    #[test]
    fn test_rational_zero() {
        let r = Rational::new(0, 5).unwrap();
        assert_eq!((r.numer(), r.denom()), (0, 1));
    }

    #[test]
    fn test_value_display() {
        let v = Value::List(vec![Value::from("a"), Value::Int(2)]);
        assert_eq!(v.to_string(), "a,2");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn test_implies_flag_value() {
        assert!(!Value::Null.implies_flag_value());
        assert!(!Value::Bool(false).implies_flag_value());
        assert!(Value::from("x").implies_flag_value());
        assert!(Value::Int(3).implies_flag_value());
    }
}
