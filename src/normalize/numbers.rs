//! Quantity and currency coercion
//!
//! Cells on the report pages carry rupee signs, thousands separators and
//! stray whitespace. None of that is an error: anything that doesn't reduce
//! to a number becomes zero.

/// Normalizes a numeric or currency string to a float
///
/// Keeps digits, `.` and `-`, then parses. Empty or unparseable input yields
/// `0.0`.
///
/// # Example
///
/// ```
/// use procure_sync::normalize::normalize_number;
///
/// assert_eq!(normalize_number("₹1,234.50"), 1234.50);
/// assert_eq!(normalize_number(""), 0.0);
/// assert_eq!(normalize_number("abc"), 0.0);
/// ```
pub fn normalize_number(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if cleaned.is_empty() {
        return 0.0;
    }

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            tracing::debug!("Number normalization fell back to 0 for '{}'", raw);
            0.0
        }
    }
}

/// Normalizes an integer string, keeping only digits
///
/// Empty, digit-free, or overflowing input yields `0`.
pub fn normalize_integer(raw: &str) -> u32 {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if cleaned.is_empty() {
        return 0;
    }

    cleaned.parse::<u32>().unwrap_or_else(|_| {
        tracing::debug!("Integer normalization fell back to 0 for '{}'", raw);
        0
    })
}
