//! Centre list page extraction

use scraper::{Html, Selector};
use url::Url;

use super::table::{element_text, locate_data_rows, TableLayout, TableScan};

/// Row geometry of the centre list report
pub const CENTRE_LIST_LAYOUT: TableLayout = TableLayout {
    header_token: "क्रय केंद्र का नाम",
    fallback_start: 9,
    min_cells: 6,
};

/// A centre discovered on the list page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentreLink {
    pub name: String,

    /// Absolute link to the centre's date-wise summary page
    pub url: String,
}

/// Parsed centre list page
#[derive(Debug, Clone)]
pub struct CentreListPage {
    pub centres: Vec<CentreLink>,
    pub scan: TableScan,
}

/// Parses the centre list page
///
/// Only rows whose name cell carries a followable link produce a centre.
/// Rows without one are counted in `scan.skipped_rows`.
pub fn parse_centre_list(html: &str, base_url: &Url) -> CentreListPage {
    let document = Html::parse_document(html);
    let located = locate_data_rows(&document, &CENTRE_LIST_LAYOUT);
    let mut scan = located.scan;

    let Ok(anchor) = Selector::parse("a[href]") else {
        return CentreListPage {
            centres: Vec::new(),
            scan,
        };
    };

    let mut centres = Vec::new();
    for cells in &located.rows {
        let name_cell = &cells[1];

        let link = name_cell.select(&anchor).find_map(|a| {
            let href = a.value().attr("href")?;
            let url = super::table::resolve_href(href, base_url)?;
            Some((element_text(&a), url))
        });

        match link {
            Some((name, url)) if !name.is_empty() => centres.push(CentreLink { name, url }),
            _ => scan.skipped_rows += 1,
        }
    }

    if !scan.table_found {
        tracing::warn!("Centre list table not found at {}", base_url);
    }

    CentreListPage { centres, scan }
}
