//! Page type detection

use scraper::{Html, Selector};

use super::centre_list::CENTRE_LIST_LAYOUT;
use super::datewise::DATEWISE_LAYOUT;
use super::farmer::FARMER_LAYOUT;
use super::table::{element_text, find_by_id, DATA_TABLE_ID};

const CENTRE_GRID_ID: &str = "ctl00_ContentPlaceHolder1_gvCenterName";
const DATEWISE_GRID_ID: &str = "ctl00_ContentPlaceHolder1_gvDateWise";
const FARMER_GRID_ID: &str = "ctl00_ContentPlaceHolder1_gvFarmerDetails";

/// The report templates the site publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    CentreList,
    DatewiseSummary,
    FarmerDetails,
    Unknown,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CentreList => "centre_list",
            Self::DatewiseSummary => "datewise_summary",
            Self::FarmerDetails => "farmer_details",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a page by the grid it renders
///
/// Grid ids are checked first. Pages using the generic data table are
/// classified by their header label, most specific template first, since the
/// farmer page header also mentions the centre.
pub fn detect_page_type(html: &str) -> PageType {
    let document = Html::parse_document(html);

    let grids = [
        (CENTRE_GRID_ID, PageType::CentreList),
        (DATEWISE_GRID_ID, PageType::DatewiseSummary),
        (FARMER_GRID_ID, PageType::FarmerDetails),
    ];
    for (id, page_type) in grids {
        if find_by_id(&document, "table", id).is_some() {
            return page_type;
        }
    }

    let Some(table) = find_by_id(&document, "table", DATA_TABLE_ID) else {
        return PageType::Unknown;
    };

    let header_text = match Selector::parse("th, td") {
        Ok(cells) => table
            .select(&cells)
            .map(|c| element_text(&c))
            .collect::<Vec<_>>()
            .join(" "),
        Err(_) => return PageType::Unknown,
    };

    let templates = [
        (FARMER_LAYOUT.header_token, PageType::FarmerDetails),
        (DATEWISE_LAYOUT.header_token, PageType::DatewiseSummary),
        (CENTRE_LIST_LAYOUT.header_token, PageType::CentreList),
    ];
    templates
        .into_iter()
        .find(|(token, _)| header_text.contains(token))
        .map(|(_, page_type)| page_type)
        .unwrap_or(PageType::Unknown)
}
