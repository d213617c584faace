//! Small shared helpers: date parsing, text normalization, quantiles,
//! decimal rounding.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::DataType;

/// Canonical date format used in artifacts and the store.
///
/// ISO-formatted date strings sort in chronological order, so columns kept
/// in this format never need a dedicated date dtype for ordering or min/max.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// Parse a date string in one of the accepted formats.
///
/// Datetime strings (`YYYY-MM-DD HH:MM:SS`) are accepted and truncated to
/// their date part, since SQLite and CSV round-trips sometimes widen dates.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

/// Re-render a date string in the canonical `YYYY-MM-DD` format.
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_date(raw).map(|date| date.format(DATE_FORMAT).to_string())
}

/// Title-case a string: first letter of every alphabetic run uppercased,
/// the rest lowercased. Any non-alphabetic character is a word boundary.
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;
    for ch in raw.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

/// Lower-interpolation quantile over an ascending-sorted slice: the element
/// at index floor((n - 1) * q). Returns `None` for an empty slice.
pub fn quantile_lower(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() - 1) as f64 * q).floor() as usize;
    sorted.get(idx).copied()
}

/// Median with linear interpolation between the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}
