//! Date coercion between the site's display format and storage keys

use chrono::NaiveDate;

/// The date format printed on the report pages
pub const SITE_DATE_FORMAT: &str = "%d/%m/%Y";

/// The date format used for storage keys (sorts lexicographically)
pub const STORAGE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Formats accepted from user input, in priority order
const ACCEPTED_FORMATS: [&str; 4] = [SITE_DATE_FORMAT, STORAGE_DATE_FORMAT, "%d-%m-%Y", "%m/%d/%Y"];

/// Parses a date exactly as the site prints it (`DD/MM/YYYY`)
pub fn parse_site_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), SITE_DATE_FORMAT).ok()
}

/// Parses a date in any accepted format; the first format that matches wins
///
/// Ambiguous inputs such as `03/04/2025` resolve as day-first.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let parsed = ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok());

    if parsed.is_none() {
        tracing::debug!("Unable to parse date '{}'", raw);
    }
    parsed
}

/// Formats a date the way the site prints it
pub fn format_site_date(date: NaiveDate) -> String {
    date.format(SITE_DATE_FORMAT).to_string()
}

/// Formats a date as a storage key
pub fn to_storage_key(date: NaiveDate) -> String {
    date.format(STORAGE_DATE_FORMAT).to_string()
}

/// Parses a storage key back into a date
pub fn from_storage_key(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, STORAGE_DATE_FORMAT).ok()
}
