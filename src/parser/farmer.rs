//! Farmer detail page extraction

use chrono::NaiveDate;
use scraper::Html;

use super::table::{
    element_text, find_by_id, locate_data_rows, panel_value, TableLayout, TableScan,
    HEADER_PANEL_ID,
};
use crate::normalize::{normalize_number, parse_site_date};

/// Row geometry of the farmer detail report
pub const FARMER_LAYOUT: TableLayout = TableLayout {
    header_token: "किसान का नाम",
    fallback_start: 8,
    min_cells: 7,
};

pub(crate) const PURCHASE_DATE_LABEL: &str = "क्रय दिनांक";

/// One farmer-level purchase row
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    /// Registration id as published (partially masked by the site)
    pub farmer_id: String,
    pub farmer_name: String,
    pub village: String,
    pub quantity: f64,
    pub amount: f64,
    pub transaction_time: String,
}

/// Parsed farmer detail page
#[derive(Debug, Clone)]
pub struct FarmerDetailsPage {
    /// Purchase date from the header panel, if present and valid
    pub date: Option<NaiveDate>,
    pub transactions: Vec<TransactionRow>,
    pub scan: TableScan,
}

/// Parses a farmer detail page
pub fn parse_farmer_details(html: &str) -> FarmerDetailsPage {
    let document = Html::parse_document(html);

    let date = find_by_id(&document, "div", HEADER_PANEL_ID)
        .and_then(|panel| panel_value(&panel, PURCHASE_DATE_LABEL, &[]))
        .and_then(|value| {
            let token = value.split_whitespace().next()?.to_string();
            let parsed = parse_site_date(&token);
            if parsed.is_none() {
                tracing::warn!("Invalid purchase date in detail header: '{}'", token);
            }
            parsed
        });

    let located = locate_data_rows(&document, &FARMER_LAYOUT);
    let transactions = located
        .rows
        .iter()
        .map(|cells| TransactionRow {
            farmer_id: element_text(&cells[1]),
            farmer_name: element_text(&cells[2]),
            village: element_text(&cells[3]),
            quantity: normalize_number(&element_text(&cells[4])),
            amount: normalize_number(&element_text(&cells[5])),
            transaction_time: element_text(&cells[6]),
        })
        .collect();

    if !located.scan.table_found {
        tracing::warn!("Farmer details table not found");
    }

    FarmerDetailsPage {
        date,
        transactions,
        scan: located.scan,
    }
}
