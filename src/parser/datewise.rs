//! Date-wise summary page extraction

use chrono::NaiveDate;
use scraper::Html;
use url::Url;

use super::table::{
    cell_link, element_text, find_by_id, locate_data_rows, panel_value, TableLayout, TableScan,
    HEADER_PANEL_ID,
};
use crate::normalize::{normalize_integer, normalize_number, parse_site_date};

/// Row geometry of the date-wise summary report
pub const DATEWISE_LAYOUT: TableLayout = TableLayout {
    header_token: "तिथि",
    fallback_start: 10,
    min_cells: 5,
};

pub(crate) const CENTRE_LABEL: &str = "क्रय केंद्र का नाम";
pub(crate) const DISTRICT_LABEL: &str = "जनपद";

/// One date row of a centre's summary
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub date: NaiveDate,
    pub farmer_count: u32,
    pub quantity: f64,
    pub amount: f64,

    /// Link to the farmer detail page, present once the date is published
    pub details_url: Option<String>,
}

/// Parsed date-wise summary page
#[derive(Debug, Clone)]
pub struct DatewisePage {
    pub centre_name: Option<String>,
    pub district: Option<String>,
    pub rows: Vec<SummaryRow>,
    pub scan: TableScan,
}

impl DatewisePage {
    /// Summed quantity and amount over the data rows
    pub fn totals(&self) -> (f64, f64) {
        self.rows.iter().fold((0.0, 0.0), |(quantity, amount), row| {
            (quantity + row.quantity, amount + row.amount)
        })
    }
}

/// Parses a centre's date-wise summary page
///
/// Rows whose date cell isn't `DD/MM/YYYY` are skipped with a warning.
pub fn parse_datewise_summary(html: &str, base_url: &Url) -> DatewisePage {
    let document = Html::parse_document(html);

    let (centre_name, district) = match find_by_id(&document, "div", HEADER_PANEL_ID) {
        Some(panel) => (
            panel_value(&panel, CENTRE_LABEL, &[DISTRICT_LABEL]),
            panel_value(&panel, DISTRICT_LABEL, &[CENTRE_LABEL])
                .and_then(|d| d.split(':').next().map(|s| s.trim().to_string()))
                .filter(|d| !d.is_empty()),
        ),
        None => (None, None),
    };

    let located = locate_data_rows(&document, &DATEWISE_LAYOUT);
    let mut scan = located.scan;
    let mut rows = Vec::with_capacity(located.rows.len());

    for cells in &located.rows {
        let date_text = element_text(&cells[1]);
        let Some(date) = parse_site_date(&date_text) else {
            tracing::warn!("Skipping summary row with invalid date '{}'", date_text);
            scan.skipped_rows += 1;
            continue;
        };

        rows.push(SummaryRow {
            date,
            farmer_count: normalize_integer(&element_text(&cells[2])),
            quantity: normalize_number(&element_text(&cells[3])),
            amount: normalize_number(&element_text(&cells[4])),
            details_url: cell_link(&cells[1], base_url),
        });
    }

    if !scan.table_found {
        tracing::warn!("Date-wise summary table not found at {}", base_url);
    }

    DatewisePage {
        centre_name,
        district,
        rows,
        scan,
    }
}
