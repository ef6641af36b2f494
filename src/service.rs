//! Cached query service
//!
//! Owns the result cache and the query engine for the serving layer:
//!
//! ```text
//! Request → CacheKey → hit? → Arc<QueryOutput>
//!                    → miss → blocking pool → engine → cache → Arc<QueryOutput>
//!                                                     ↳ day listing: prewarm next day (background)
//! ```
//!
//! Prewarm tasks never delay or fail the request that triggered them.

use crate::cache::{CacheKey, ResultCache};
use crate::query::params::parse_date;
use crate::query::{
    AnalyticsError, AnalyticsResult, DayRequest, LanguageFilter, LanguageRow, LanguagesRequest,
    NewcomerRow, OwnerRow, OwnersRequest, Presence, RangeRequest, RankedEntry, ReappearingRequest,
    ReappearingRow, StreakRow, TrendQueries,
};
use crate::storage::Kind;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// Any cached query result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Day(Vec<RankedEntry>),
    Reappearing(Vec<ReappearingRow>),
    Owners(Vec<OwnerRow>),
    Languages(Vec<LanguageRow>),
    Newcomers(Vec<NewcomerRow>),
    Streaks(Vec<StreakRow>),
}

impl QueryOutput {
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Day(rows) => rows.len(),
            QueryOutput::Reappearing(rows) => rows.len(),
            QueryOutput::Owners(rows) => rows.len(),
            QueryOutput::Languages(rows) => rows.len(),
            QueryOutput::Newcomers(rows) => rows.len(),
            QueryOutput::Streaks(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Keys are built from parsed values so equivalent spellings of one query
// share an entry. Input that does not parse keys verbatim; the engine
// rejects it and errors are never cached.

fn kind_param(kind: &str) -> String {
    kind.parse::<Kind>()
        .map(|kind| kind.as_str().to_string())
        .unwrap_or_else(|_| kind.to_string())
}

fn date_param(date: &str) -> String {
    parse_date(date)
        .map(|date| date.to_string())
        .unwrap_or_else(|_| date.to_string())
}

fn presence_param(presence: &str) -> String {
    presence
        .parse::<Presence>()
        .map(|presence| presence.as_str().to_string())
        .unwrap_or_else(|_| presence.to_string())
}

fn with_language(key: CacheKey, filter: &LanguageFilter) -> CacheKey {
    key.param("language", filter.language())
        .param("include_absent", filter.includes_absent())
}

fn day_key(request: &DayRequest) -> String {
    let key = CacheKey::new("day")
        .param("kind", kind_param(&request.kind))
        .param("date", date_param(&request.date));
    with_language(key, &LanguageFilter::for_day(request.language.as_deref())).to_string()
}

fn range_key(op: &str, request: &RangeRequest) -> CacheKey {
    let key = CacheKey::new(op)
        .param("kind", kind_param(&request.kind))
        .param("start", date_param(&request.start))
        .param("end", date_param(&request.end))
        .param("limit", request.limit);
    let filter =
        LanguageFilter::from_params(request.language.as_deref(), request.include_all_languages);
    with_language(key, &filter)
}

/// Query engine behind a shared result cache
pub struct TrendService {
    queries: Arc<dyn TrendQueries>,
    cache: Arc<ResultCache<QueryOutput>>,
    prewarm: bool,
    prewarm_tasks: Mutex<JoinSet<()>>,
}

impl TrendService {
    pub fn new(queries: Arc<dyn TrendQueries>, cache: Arc<ResultCache<QueryOutput>>) -> Self {
        Self {
            queries,
            cache,
            prewarm: true,
            prewarm_tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Enable or disable next-day prewarming after day listings
    pub fn with_prewarm(mut self, enabled: bool) -> Self {
        self.prewarm = enabled;
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache<QueryOutput>> {
        &self.cache
    }

    pub fn queries(&self) -> &Arc<dyn TrendQueries> {
        &self.queries
    }

    pub fn list_dates(&self, kind: &str) -> AnalyticsResult<Vec<NaiveDate>> {
        self.queries.list_dates(kind)
    }

    pub fn list_languages(&self, kind: &str) -> AnalyticsResult<Vec<Option<String>>> {
        self.queries.list_languages(kind)
    }

    /// Serve `key` from the cache or run `query` on the blocking pool
    async fn cached<F>(&self, key: String, query: F) -> AnalyticsResult<Arc<QueryOutput>>
    where
        F: FnOnce(&dyn TrendQueries) -> AnalyticsResult<QueryOutput> + Send + 'static,
    {
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(key = %key, "Cache hit");
            return Ok(hit);
        }

        let queries = Arc::clone(&self.queries);
        let output = tokio::task::spawn_blocking(move || query(queries.as_ref()))
            .await
            .map_err(|e| AnalyticsError::Internal(format!("query task failed: {}", e)))??;

        let output = Arc::new(output);
        self.cache.set(key, Arc::clone(&output));
        Ok(output)
    }

    pub async fn get_day(&self, request: DayRequest) -> AnalyticsResult<Arc<QueryOutput>> {
        let key = day_key(&request);
        let owned = request.clone();
        let output = self
            .cached(key, move |q| q.get_day(&owned).map(QueryOutput::Day))
            .await?;

        if self.prewarm {
            self.spawn_prewarm(&request);
        }
        Ok(output)
    }

    pub async fn top_reappearing(&self, request: ReappearingRequest) -> AnalyticsResult<Arc<QueryOutput>> {
        let key = range_key("top_reappearing", &request.range)
            .param("presence", presence_param(&request.presence))
            .to_string();
        self.cached(key, move |q| q.top_reappearing(&request).map(QueryOutput::Reappearing))
            .await
    }

    pub async fn top_owners(&self, request: OwnersRequest) -> AnalyticsResult<Arc<QueryOutput>> {
        let key = CacheKey::new("top_owners")
            .param("start", date_param(&request.start))
            .param("end", date_param(&request.end))
            .param("limit", request.limit);
        let filter =
            LanguageFilter::from_params(request.language.as_deref(), request.include_all_languages);
        let key = with_language(key, &filter).to_string();
        self.cached(key, move |q| q.top_owners(&request).map(QueryOutput::Owners))
            .await
    }

    pub async fn top_languages(&self, request: LanguagesRequest) -> AnalyticsResult<Arc<QueryOutput>> {
        let key = CacheKey::new("top_languages")
            .param("start", date_param(&request.start))
            .param("end", date_param(&request.end))
            .param("kind", request.kind.as_deref().map(kind_param))
            .param("include_all_languages", request.include_all_languages)
            .param("limit", request.limit)
            .to_string();
        self.cached(key, move |q| q.top_languages(&request).map(QueryOutput::Languages))
            .await
    }

    pub async fn top_newcomers(&self, request: RangeRequest) -> AnalyticsResult<Arc<QueryOutput>> {
        let key = range_key("top_newcomers", &request).to_string();
        self.cached(key, move |q| q.top_newcomers(&request).map(QueryOutput::Newcomers))
            .await
    }

    pub async fn top_streaks(&self, request: RangeRequest) -> AnalyticsResult<Arc<QueryOutput>> {
        let key = range_key("top_streaks", &request).to_string();
        self.cached(key, move |q| q.top_streaks(&request).map(QueryOutput::Streaks))
            .await
    }

    /// Queue the same listing for the next day if the manifest has it
    fn spawn_prewarm(&self, request: &DayRequest) {
        let (Ok(kind), Ok(date)) = (request.kind.parse::<Kind>(), parse_date(&request.date)) else {
            return;
        };
        let Some(next) = self
            .queries
            .manifest()
            .kind(kind)
            .ok()
            .and_then(|manifest_kind| manifest_kind.next_date_after(date))
        else {
            tracing::trace!(kind = %kind, date = %date, "No next day to prewarm");
            return;
        };

        let next_request = DayRequest {
            date: next.to_string(),
            ..request.clone()
        };
        let key = day_key(&next_request);
        if self.cache.contains(&key) {
            return;
        }

        let queries = Arc::clone(&self.queries);
        let cache = Arc::clone(&self.cache);
        let mut tasks = self
            .prewarm_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            let result = tokio::task::spawn_blocking(move || queries.get_day(&next_request)).await;
            match result {
                Ok(Ok(rows)) => {
                    cache.set(key, QueryOutput::Day(rows));
                    cache.record_prewarm(true);
                    tracing::debug!(date = %next, "Prewarmed day listing");
                }
                Ok(Err(err)) => {
                    cache.record_prewarm(false);
                    tracing::warn!(date = %next, error = %err, "Prewarm failed");
                }
                Err(err) => {
                    cache.record_prewarm(false);
                    tracing::warn!(date = %next, error = %err, "Prewarm task aborted");
                }
            }
        });
    }

    /// Wait for every queued prewarm task
    pub async fn drain_prewarm(&self) {
        let mut tasks = {
            let mut guard = self
                .prewarm_tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                tracing::warn!(error = %err, "Prewarm task join failed");
            }
        }
    }
}

impl std::fmt::Debug for TrendService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendService")
            .field("cache", &self.cache)
            .field("prewarm", &self.prewarm)
            .finish()
    }
}
