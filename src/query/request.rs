//! Query requests as received from callers
//!
//! Fields stay raw strings until the engine validates them, so the order in
//! which problems are reported is fixed by the engine, not by the caller.

use crate::query::params::DEFAULT_LIMIT;

/// Single-day listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DayRequest {
    pub kind: String,
    pub date: String,
    pub language: Option<String>,
}

impl DayRequest {
    pub fn new(kind: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            date: date.into(),
            language: None,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Ranking over an inclusive date range
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeRequest {
    pub kind: String,
    pub start: String,
    pub end: String,
    pub language: Option<String>,
    pub include_all_languages: bool,
    pub limit: usize,
}

impl RangeRequest {
    pub fn new(kind: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            start: start.into(),
            end: end.into(),
            language: None,
            include_all_languages: false,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn include_all_languages(mut self, include: bool) -> Self {
        self.include_all_languages = include;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Reappearance ranking
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReappearingRequest {
    pub range: RangeRequest,
    pub presence: String,
}

impl ReappearingRequest {
    pub fn new(kind: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            range: RangeRequest::new(kind, start, end),
            presence: "day".to_string(),
        }
    }

    pub fn presence(mut self, presence: impl Into<String>) -> Self {
        self.presence = presence.into();
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.range = self.range.language(language);
        self
    }

    pub fn include_all_languages(mut self, include: bool) -> Self {
        self.range = self.range.include_all_languages(include);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.range = self.range.limit(limit);
        self
    }
}

/// Owner ranking (repositories only)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnersRequest {
    pub start: String,
    pub end: String,
    pub language: Option<String>,
    pub include_all_languages: bool,
    pub limit: usize,
}

impl OwnersRequest {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            language: None,
            include_all_languages: false,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn include_all_languages(mut self, include: bool) -> Self {
        self.include_all_languages = include;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Language ranking, one kind or both
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguagesRequest {
    pub start: String,
    pub end: String,
    pub kind: Option<String>,
    pub include_all_languages: bool,
    pub limit: usize,
}

impl LanguagesRequest {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            kind: None,
            include_all_languages: false,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn include_all_languages(mut self, include: bool) -> Self {
        self.include_all_languages = include;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}
