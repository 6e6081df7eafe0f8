//! Per-request scope and flags
//!
//! A context is never invalid: anything under-specified resolves to `All`.

use chrono::NaiveDate;

/// Which centres a request covers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    All,
    Centre(String),
    Selected(Vec<String>),
}

/// Which dates a request covers, as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateScope {
    #[default]
    All,
    Single(NaiveDate),
    Range {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    Latest,
    Batch(Vec<NaiveDate>),
}

/// A date scope after resolution; ranges are closed and batches non-empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedDates {
    All,
    Single(NaiveDate),
    Range(NaiveDate, NaiveDate),
    Latest,
    Batch(Vec<NaiveDate>),
}

impl ResolvedDates {
    /// True if every listed date must have a stored summary
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Single(_) | Self::Batch(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Single(_) => "single",
            Self::Range(..) => "range",
            Self::Latest => "latest",
            Self::Batch(_) => "batch",
        }
    }
}

/// What a caller asks the router for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub scope: Scope,
    pub date_scope: DateScope,

    /// Sync even when the cache is fresh
    pub force_refresh: bool,

    /// Sync when the cache is missing or stale; otherwise report missing data
    pub sync_if_missing: bool,

    /// Carry farmer transactions and refresh detail pages for in-scope dates
    pub include_details: bool,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            scope: Scope::All,
            date_scope: DateScope::All,
            force_refresh: false,
            sync_if_missing: true,
            include_details: false,
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn centre(mut self, name: impl Into<String>) -> Self {
        self.scope = Scope::Centre(name.into());
        self
    }

    pub fn centres<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.scope = Scope::Selected(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn all_centres(mut self) -> Self {
        self.scope = Scope::All;
        self
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date_scope = DateScope::Single(date);
        self
    }

    pub fn range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_scope = DateScope::Range { from, to };
        self
    }

    pub fn latest(mut self) -> Self {
        self.date_scope = DateScope::Latest;
        self
    }

    pub fn dates(mut self, dates: Vec<NaiveDate>) -> Self {
        self.date_scope = DateScope::Batch(dates);
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn sync_if_missing(mut self, sync: bool) -> Self {
        self.sync_if_missing = sync;
        self
    }

    pub fn include_details(mut self, include: bool) -> Self {
        self.include_details = include;
        self
    }

    /// Effective centre scope
    ///
    /// Blank names are dropped and duplicates removed; nothing left means
    /// `All`.
    pub fn resolve_scope(&self) -> Scope {
        match &self.scope {
            Scope::All => Scope::All,
            Scope::Centre(name) => {
                let name = name.trim();
                if name.is_empty() {
                    Scope::All
                } else {
                    Scope::Centre(name.to_string())
                }
            }
            Scope::Selected(names) => {
                let mut cleaned: Vec<String> = Vec::with_capacity(names.len());
                for name in names {
                    let name = name.trim();
                    if !name.is_empty() && !cleaned.iter().any(|seen| seen == name) {
                        cleaned.push(name.to_string());
                    }
                }
                if cleaned.is_empty() {
                    Scope::All
                } else {
                    Scope::Selected(cleaned)
                }
            }
        }
    }

    /// Effective date scope
    ///
    /// Half-open ranges and empty batches resolve to `All`; a reversed range
    /// is swapped.
    pub fn resolve_date_scope(&self) -> ResolvedDates {
        match &self.date_scope {
            DateScope::All => ResolvedDates::All,
            DateScope::Single(date) => ResolvedDates::Single(*date),
            DateScope::Range {
                from: Some(from),
                to: Some(to),
            } => {
                if from <= to {
                    ResolvedDates::Range(*from, *to)
                } else {
                    ResolvedDates::Range(*to, *from)
                }
            }
            DateScope::Range { .. } => ResolvedDates::All,
            DateScope::Latest => ResolvedDates::Latest,
            DateScope::Batch(dates) => {
                let mut dates = dates.clone();
                dates.sort();
                dates.dedup();
                if dates.is_empty() {
                    ResolvedDates::All
                } else {
                    ResolvedDates::Batch(dates)
                }
            }
        }
    }
}

/// Names covered by a resolved scope, or `None` for every centre
pub fn scope_names(scope: &Scope) -> Option<Vec<String>> {
    match scope {
        Scope::All => None,
        Scope::Centre(name) => Some(vec![name.clone()]),
        Scope::Selected(names) => Some(names.clone()),
    }
}
