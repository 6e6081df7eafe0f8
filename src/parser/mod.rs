//! Extractors for the three report page templates
//!
//! Parsers never fail: malformed cells normalize to zero, short rows are
//! skipped, and a missing table yields an empty result. Each result carries
//! a [`TableScan`] so callers can log when a page degraded to the fallback
//! row offset.

mod centre_list;
mod datewise;
mod detect;
mod farmer;
mod table;

pub use centre_list::{parse_centre_list, CentreLink, CentreListPage, CENTRE_LIST_LAYOUT};
pub use datewise::{parse_datewise_summary, DatewisePage, SummaryRow, DATEWISE_LAYOUT};
pub use detect::{detect_page_type, PageType};
pub use farmer::{parse_farmer_details, FarmerDetailsPage, TransactionRow, FARMER_LAYOUT};
pub use table::{RowStart, TableLayout, TableScan, DATA_TABLE_ID, HEADER_PANEL_ID};
