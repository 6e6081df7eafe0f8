/// Age bucket of a procurement date
///
/// Derived from the calendar distance between a summary's date and today. It
/// is recomputed on every access and never treated as stored history.
use std::fmt;

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataState {
    /// Today (or a future date): the site is still adding purchases
    Open,

    /// One to six days old: late corrections still appear
    Closing,

    /// A week or older: settled
    Closed,
}

impl DataState {
    /// Buckets `date` relative to `today`
    pub fn for_date(date: NaiveDate, today: NaiveDate) -> Self {
        let age_days = (today - date).num_days();
        if age_days < 1 {
            Self::Open
        } else if age_days < 7 {
            Self::Closing
        } else {
            Self::Closed
        }
    }

    /// Returns true if the site may still change data for this date
    pub fn is_volatile(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        }
    }

    /// Returns None if the string doesn't match any known state
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "CLOSING" => Some(Self::Closing),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for DataState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
