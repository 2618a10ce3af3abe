//! Arithmetic over report cells that may hold an `ERROR` marker.

use std::fmt;

/// A numeric report cell, or the `ERROR` marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Figure {
    Value(f64),
    Error,
}

/// Result of comparing a delta against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffFlag {
    Error,
    Diff,
    Same,
}

impl fmt::Display for DiffFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffFlag::Error => write!(f, "ERROR"),
            DiffFlag::Diff => write!(f, "Diff"),
            DiffFlag::Same => Ok(()),
        }
    }
}

impl From<f64> for Figure {
    fn from(v: f64) -> Self {
        Figure::Value(v)
    }
}

impl fmt::Display for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Figure::Value(v) => write!(f, "{}", v),
            Figure::Error => write!(f, "ERROR"),
        }
    }
}

fn round_to(value: f64, decimal_places: u32) -> f64 {
    let factor = 10f64.powi(decimal_places as i32);
    (value * factor).round() / factor
}

impl Figure {
    /// Parses a cell; the literal `ERROR` maps to [`Figure::Error`].
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == "ERROR" {
            return Some(Figure::Error);
        }
        raw.parse().ok().map(Figure::Value)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Figure::Error)
    }

    /// A zero operand wins over an error operand.
    pub fn multiply(self, other: Figure) -> Figure {
        match (self, other) {
            (Figure::Value(x), _) if x == 0.0 => Figure::Value(0.0),
            (_, Figure::Value(y)) if y == 0.0 => Figure::Value(0.0),
            (Figure::Value(x), Figure::Value(y)) => Figure::Value(x * y),
            _ => Figure::Error,
        }
    }

    pub fn add(self, other: Figure) -> Figure {
        match (self, other) {
            (Figure::Value(x), Figure::Value(y)) => Figure::Value(x + y),
            _ => Figure::Error,
        }
    }

    pub fn subtract(self, other: Figure) -> Figure {
        match (self, other) {
            (Figure::Value(x), Figure::Value(y)) => Figure::Value(x - y),
            _ => Figure::Error,
        }
    }

    /// `0 / 0` is 0, any other zero denominator is an error.
    pub fn divide(self, other: Figure, decimal_places: u32) -> Figure {
        match (self, other) {
            (Figure::Value(x), Figure::Value(y)) if x == 0.0 && y == 0.0 => Figure::Value(0.0),
            (Figure::Value(_), Figure::Value(y)) if y == 0.0 => Figure::Error,
            (Figure::Value(x), Figure::Value(y)) => Figure::Value(round_to(x / y, decimal_places)),
            _ => Figure::Error,
        }
    }

    pub fn abs(self) -> Figure {
        match self {
            Figure::Value(x) => Figure::Value(x.abs()),
            Figure::Error => Figure::Error,
        }
    }

    /// Flags a delta whose magnitude exceeds `threshold`.
    pub fn diff_flag(self, threshold: f64) -> DiffFlag {
        match self {
            Figure::Error => DiffFlag::Error,
            Figure::Value(x) if x.abs() > threshold => DiffFlag::Diff,
            Figure::Value(_) => DiffFlag::Same,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiply_zero_beats_error() {
        assert_eq!(Figure::Value(0.0).multiply(Figure::Error), Figure::Value(0.0));
        assert_eq!(Figure::Error.multiply(Figure::Value(0.0)), Figure::Value(0.0));
        assert_eq!(Figure::Error.multiply(Figure::Value(2.0)), Figure::Error);
        assert_eq!(Figure::Value(3.0).multiply(Figure::Value(2.0)), Figure::Value(6.0));
    }

    #[test]
    fn test_divide_rules() {
        assert_eq!(Figure::Value(0.0).divide(Figure::Value(0.0), 0), Figure::Value(0.0));
        assert_eq!(Figure::Value(1.0).divide(Figure::Value(0.0), 0), Figure::Error);
        assert_eq!(Figure::Error.divide(Figure::Value(2.0), 0), Figure::Error);
        assert_eq!(Figure::Value(10.0).divide(Figure::Value(3.0), 0), Figure::Value(3.0));
        assert_eq!(Figure::Value(10.0).divide(Figure::Value(3.0), 2), Figure::Value(3.33));
    }

    #[test]
    fn test_add_subtract_abs_propagate_error() {
        assert_eq!(Figure::Value(1.0).add(Figure::Error), Figure::Error);
        assert_eq!(Figure::Value(1.0).subtract(Figure::Value(3.0)).abs(), Figure::Value(2.0));
        assert!(Figure::Error.abs().is_error());
    }

    #[test]
    fn test_diff_flag() {
        assert_eq!(Figure::Value(-0.2).diff_flag(0.1), DiffFlag::Diff);
        assert_eq!(Figure::Value(0.05).diff_flag(0.1), DiffFlag::Same);
        assert_eq!(Figure::Error.diff_flag(0.1), DiffFlag::Error);
        assert_eq!(DiffFlag::Same.to_string(), "");
    }

    #[test]
    fn test_parse() {
        assert_eq!(Figure::parse("ERROR"), Some(Figure::Error));
        assert_eq!(Figure::parse(" 2.5 "), Some(Figure::Value(2.5)));
        assert_eq!(Figure::parse("x"), None);
    }
}
