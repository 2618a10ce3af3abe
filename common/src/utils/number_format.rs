//! Number coercion and formatting helpers for spreadsheet-style values.

use crate::errors::{AppError, AppResult};

/// Outcome of [`force_to_number`].
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Number(f64),
    Text(String),
}

fn parse_f64(raw: &str) -> AppResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AppError::Validation(format!("cannot parse '{}' as a number", raw)))
}

/// Strips `%` and normalises to a fraction when the value is out of range.
///
/// `""` yields `None`, `"-%"` yields `0`. A parsed value above both `0.5`
/// and `max_expected` is divided by 100.
pub fn remove_percent(value: &str, max_expected: f64) -> AppResult<Option<f64>> {
    if value.is_empty() {
        return Ok(None);
    }
    if value == "-%" {
        return Ok(Some(0.0));
    }
    let mut parsed = parse_f64(value.trim_matches('%'))?;
    if parsed > 0.5 && parsed > max_expected {
        parsed /= 100.0;
    }
    Ok(Some(parsed))
}

/// Converts `"12.5%"` to `0.125` and `"12.5"` to `12.5`. Blank and `"-%"` are 0.
pub fn remove_percent_safe(value: &str) -> AppResult<f64> {
    if value.is_empty() || value == "-%" {
        return Ok(0.0);
    }
    if value.contains('%') {
        Ok(parse_f64(&value.replace('%', ""))? / 100.0)
    } else {
        parse_f64(value)
    }
}

/// Strips `%` without dividing. `"-%"` is 0; unparsable input is `None`.
pub fn strip_percent(value: &str) -> Option<f64> {
    if value == "-%" {
        return Some(0.0);
    }
    value.trim_matches('%').trim().parse().ok()
}

/// Best-effort numeric coercion.
///
/// Blank cells and `#VALUE!` become 0, thousands separators and `$` are
/// removed; anything still unparsable is returned as text.
pub fn force_to_number(value: &str) -> Coerced {
    if matches!(value, "" | " " | "#VALUE!") {
        return Coerced::Number(0.0);
    }
    let cleaned = value.replace([',', '$'], "");
    match cleaned.trim().parse::<f64>() {
        Ok(n) => Coerced::Number(n),
        Err(_) => Coerced::Text(cleaned),
    }
}

/// Division that yields 0 for a zero denominator.
pub fn divide_blank(x: f64, y: f64) -> f64 {
    if y == 0.0 {
        0.0
    } else {
        x / y
    }
}

/// Formats with thousands separators and a fixed number of decimals.
///
/// ```
/// use common::utils::number_format::format_number;
/// assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
/// ```
pub fn format_number(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.*}", precision, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    let mut out = String::new();
    if value < 0.0 && !is_zero {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Formats a fraction as a percentage, e.g. `0.1234` → `"12.3%"` at precision 1.
pub fn format_percent(fraction: f64, precision: usize) -> String {
    format!("{}%", format_number(fraction * 100.0, precision))
}
