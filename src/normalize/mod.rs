//! Normalizers for values scraped from report cells

mod dates;
mod numbers;

pub use dates::{
    format_site_date, from_storage_key, normalize_date, parse_site_date, to_storage_key,
    SITE_DATE_FORMAT, STORAGE_DATE_FORMAT,
};
pub use numbers::{normalize_integer, normalize_number};
