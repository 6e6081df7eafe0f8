//! Data table location shared by the three page parsers
//!
//! Every report page renders its rows inside one table. The header row is
//! found by scanning for a known label; data starts two rows below it (the
//! header row is followed by a row of column numbers). When the label is
//! missing the locator falls back to a fixed row offset observed on the live
//! site. A template change on the site silently degrades to that fallback,
//! which is why the start position is reported back to callers.

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Id of the table holding data rows on all three page templates
pub const DATA_TABLE_ID: &str = "tblSample";

/// Id of the panel carrying the page's context fields (centre, district, date)
pub const HEADER_PANEL_ID: &str = "ctl00_ContentPlaceHolder1_PnlHeader";

/// Row geometry of one page template
#[derive(Debug, Clone, Copy)]
pub struct TableLayout {
    /// Label whose presence marks the header row
    pub header_token: &'static str,

    /// First data row when the header row can't be found
    pub fallback_start: usize,

    /// Rows with fewer `<td>` cells are skipped
    pub min_cells: usize,
}

/// How the first data row was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStart {
    /// Header row found at the given index; data starts two rows later
    Anchored { header_index: usize },

    /// Header row missing; the layout's fixed offset was used
    Fallback,
}

/// Diagnostics from scanning a page's data table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableScan {
    /// Whether the data table was present at all
    pub table_found: bool,

    /// How the start row was chosen
    pub start: RowStart,

    /// Rows skipped for having too few cells or unparseable keys
    pub skipped_rows: usize,
}

impl TableScan {
    pub(crate) fn missing() -> Self {
        Self {
            table_found: false,
            start: RowStart::Fallback,
            skipped_rows: 0,
        }
    }

    /// True if the page parsed through the header anchor
    pub fn is_anchored(&self) -> bool {
        matches!(self.start, RowStart::Anchored { .. })
    }
}

/// Data rows of a located table, totals row already excluded
pub(crate) struct DataRows<'a> {
    pub rows: Vec<Vec<ElementRef<'a>>>,
    pub scan: TableScan,
}

/// Finds the data table and returns its data rows as `<td>` cell lists
///
/// Rows shorter than `layout.min_cells` are dropped and counted. The last
/// row of the table is the totals row and is always excluded by position.
pub(crate) fn locate_data_rows<'a>(document: &'a Html, layout: &TableLayout) -> DataRows<'a> {
    let Some(table) = find_by_id(document, "table", DATA_TABLE_ID) else {
        return DataRows {
            rows: Vec::new(),
            scan: TableScan::missing(),
        };
    };

    let (Ok(tr), Ok(cell_sel), Ok(td)) = (
        Selector::parse("tr"),
        Selector::parse("td, th"),
        Selector::parse("td"),
    ) else {
        return DataRows {
            rows: Vec::new(),
            scan: TableScan::missing(),
        };
    };

    let all_rows: Vec<ElementRef<'a>> = table.select(&tr).collect();

    let header_index = all_rows.iter().position(|row| {
        let joined: String = row.select(&cell_sel).map(|c| element_text(&c)).collect();
        joined.contains(layout.header_token)
    });

    let (start, data_start) = match header_index {
        Some(i) => (RowStart::Anchored { header_index: i }, i + 2),
        None => (RowStart::Fallback, layout.fallback_start),
    };

    let last = all_rows.len().saturating_sub(1);
    let mut rows = Vec::new();
    let mut skipped_rows = 0;

    for (i, row) in all_rows.iter().enumerate().skip(data_start) {
        if i == last {
            continue;
        }

        let cells: Vec<ElementRef<'a>> = row.select(&td).collect();
        if cells.len() < layout.min_cells {
            skipped_rows += 1;
            continue;
        }
        rows.push(cells);
    }

    DataRows {
        rows,
        scan: TableScan {
            table_found: true,
            start,
            skipped_rows,
        },
    }
}

/// Returns the first `tag#id` element in the document
pub(crate) fn find_by_id<'a>(document: &'a Html, tag: &str, id: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(&format!("{}#{}", tag, id)).ok()?;
    document.select(&selector).next()
}

/// Collects an element's text with each fragment trimmed, joined by spaces
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts the value following `label` in a header panel
///
/// The value is the rest of the fragment holding the label or, if that is
/// empty, the next fragment. It is cut at the first of `stop_labels`.
pub(crate) fn panel_value(
    panel: &ElementRef<'_>,
    label: &str,
    stop_labels: &[&str],
) -> Option<String> {
    let fragments: Vec<&str> = panel
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let position = fragments.iter().position(|f| f.contains(label))?;
    let (_, after) = fragments[position].split_once(label)?;

    let mut value = strip_separator(after).to_string();
    if value.is_empty() {
        value = fragments[position + 1..]
            .iter()
            .map(|f| strip_separator(f))
            .find(|f| !f.is_empty())?
            .to_string();
    }

    for stop in stop_labels {
        if let Some((head, _)) = value.split_once(stop) {
            value = head.to_string();
        }
    }

    let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn strip_separator(s: &str) -> &str {
    s.trim_start().trim_start_matches(':').trim()
}

/// Resolves the first anchor inside `cell` against `base_url`
///
/// Returns None if the cell has no usable link. Script, mail, telephone,
/// data and fragment-only hrefs are never followed.
pub(crate) fn cell_link(cell: &ElementRef<'_>, base_url: &Url) -> Option<String> {
    let selector = Selector::parse("a[href]").ok()?;
    cell.select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| resolve_href(href, base_url))
}

/// Resolves a link href to an absolute URL and validates it
pub(crate) fn resolve_href(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}
