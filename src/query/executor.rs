//! Query Executor
//!
//! Validates requests against the manifest, then answers them from the
//! entry log or, when eligible, from the presence rollup:
//!
//! ```text
//! Request → Validate (kind, dates, language, limit) → Rollup? → Entry log → Rank
//! ```
//!
//! The rollup is an optimization only. Any failure reading it discards the
//! attempt and the same question is answered from the entry log.

use crate::manifest::Manifest;
use crate::query::aggregate;
use crate::query::error::{AnalyticsError, AnalyticsResult};
use crate::query::params::{parse_date, validate_limit, LanguageFilter, Presence};
use crate::query::request::{
    DayRequest, LanguagesRequest, OwnersRequest, RangeRequest, ReappearingRequest,
};
use crate::query::rows::{
    LanguageRow, NewcomerRow, OwnerRow, RankedEntry, ReappearingRow, StreakRow,
};
use crate::storage::{DateRange, Entry, EntryLog, Kind, RollupStore, StorageResult};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// The read-only analytical operations
///
/// Implemented by [`QueryEngine`]; the service layer holds it as a trait
/// object so other implementations can be substituted.
pub trait TrendQueries: Send + Sync {
    fn manifest(&self) -> &Manifest;

    fn list_dates(&self, kind: &str) -> AnalyticsResult<Vec<NaiveDate>>;

    fn list_languages(&self, kind: &str) -> AnalyticsResult<Vec<Option<String>>>;

    fn get_day(&self, request: &DayRequest) -> AnalyticsResult<Vec<RankedEntry>>;

    fn top_reappearing(&self, request: &ReappearingRequest) -> AnalyticsResult<Vec<ReappearingRow>>;

    fn top_owners(&self, request: &OwnersRequest) -> AnalyticsResult<Vec<OwnerRow>>;

    fn top_languages(&self, request: &LanguagesRequest) -> AnalyticsResult<Vec<LanguageRow>>;

    fn top_newcomers(&self, request: &RangeRequest) -> AnalyticsResult<Vec<NewcomerRow>>;

    fn top_streaks(&self, request: &RangeRequest) -> AnalyticsResult<Vec<StreakRow>>;
}

/// Query engine configuration
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub analytics_root: PathBuf,
    pub use_rollups: bool,
    /// Preloaded manifest; read from `log/manifest.json` when absent
    pub manifest: Option<Manifest>,
}

impl QueryConfig {
    pub fn new(analytics_root: impl Into<PathBuf>) -> Self {
        Self {
            analytics_root: analytics_root.into(),
            use_rollups: true,
            manifest: None,
        }
    }

    pub fn use_rollups(mut self, enabled: bool) -> Self {
        self.use_rollups = enabled;
        self
    }

    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }
}

/// Validated parameters shared by range operations
struct RangeQuery {
    range: DateRange,
    filter: LanguageFilter,
    limit: usize,
}

/// Stateless query engine over one analytics root
#[derive(Debug)]
pub struct QueryEngine {
    log: EntryLog,
    manifest: Manifest,
    use_rollups: bool,
}

impl QueryEngine {
    /// Create an engine, loading the manifest eagerly
    pub fn new(config: QueryConfig) -> AnalyticsResult<Self> {
        let log = EntryLog::open(&config.analytics_root);
        let manifest = match config.manifest {
            Some(manifest) => manifest,
            None => Manifest::load(log.manifest_path())?,
        };

        tracing::info!(
            root = %config.analytics_root.display(),
            use_rollups = config.use_rollups,
            kinds = manifest.kinds.len(),
            "Query engine ready"
        );

        Ok(Self {
            log,
            manifest,
            use_rollups: config.use_rollups,
        })
    }

    pub fn analytics_root(&self) -> &Path {
        self.log.analytics_root()
    }

    /// Check a specific language against the manifest
    ///
    /// With `date`, the language must have been recorded on that day (when
    /// the manifest tracks per-day languages).
    fn validate_language(
        &self,
        kind: Kind,
        filter: &LanguageFilter,
        date: Option<NaiveDate>,
    ) -> AnalyticsResult<()> {
        let Some(language) = filter.language() else {
            return Ok(());
        };
        if self.manifest.kind(kind)?.has_language(Some(language), date) {
            return Ok(());
        }
        Err(AnalyticsError::InvalidRequest(match date {
            Some(date) => format!("Unsupported language for {}: {}", date, language),
            None => format!("Unsupported language: {}", language),
        }))
    }

    fn range_query(
        &self,
        kind: Kind,
        start: &str,
        end: &str,
        language: Option<&str>,
        include_all_languages: bool,
        limit: usize,
    ) -> AnalyticsResult<RangeQuery> {
        let range = DateRange::parse(start, end)?;
        let filter = LanguageFilter::from_params(language, include_all_languages);
        self.validate_language(kind, &filter, None)?;
        Ok(RangeQuery {
            range,
            filter,
            limit: validate_limit(limit)?,
        })
    }

    /// Entry log rows of `kind` in `range` passing `filter`
    fn scan(
        &self,
        kind: Kind,
        range: Option<&DateRange>,
        filter: &LanguageFilter,
    ) -> AnalyticsResult<Vec<Entry>> {
        let mut entries = self.log.scan(kind, range)?;
        entries.retain(|entry| filter.matches(entry));
        Ok(entries)
    }

    /// Run `query` against the rollup if it is enabled and present
    ///
    /// `None` means the caller must answer from the entry log.
    fn try_rollup<T>(
        &self,
        op: &'static str,
        kind: Kind,
        query: impl FnOnce(&RollupStore) -> StorageResult<T>,
    ) -> Option<T> {
        if !self.use_rollups {
            return None;
        }
        let store = RollupStore::open(self.analytics_root())?;

        match query(&store) {
            Ok(rows) => {
                tracing::debug!(op, kind = %kind, "Served from rollup");
                Some(rows)
            }
            Err(err) if err.is_recoverable() => {
                tracing::debug!(op, kind = %kind, error = %err, "Rollup unusable, reading entry log");
                None
            }
            Err(err) => {
                tracing::warn!(op, kind = %kind, error = %err, "Rollup read failed, reading entry log");
                None
            }
        }
    }

    fn finish<T>(op: &'static str, started: Instant, rows: Vec<T>) -> Vec<T> {
        tracing::debug!(
            op,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query complete"
        );
        rows
    }
}

impl TrendQueries for QueryEngine {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn list_dates(&self, kind: &str) -> AnalyticsResult<Vec<NaiveDate>> {
        let kind: Kind = kind.parse()?;
        Ok(self.manifest.kind(kind)?.dates.iter().copied().collect())
    }

    fn list_languages(&self, kind: &str) -> AnalyticsResult<Vec<Option<String>>> {
        let kind: Kind = kind.parse()?;
        Ok(self.manifest.kind(kind)?.languages.iter().cloned().collect())
    }

    fn get_day(&self, request: &DayRequest) -> AnalyticsResult<Vec<RankedEntry>> {
        let started = Instant::now();
        let kind: Kind = request.kind.parse()?;
        let date = parse_date(&request.date)?;
        if !self.manifest.kind(kind)?.has_date(date) {
            return Err(AnalyticsError::NotFound(format!(
                "Date {} not found for kind={}",
                date, kind
            )));
        }
        let filter = LanguageFilter::for_day(request.language.as_deref());
        self.validate_language(kind, &filter, Some(date))?;

        let entries = self.log.scan(kind, Some(&DateRange::single(date)))?;
        let rows = aggregate::day_listing(entries.iter().filter(|e| filter.matches_day(e)));
        Ok(Self::finish("get_day", started, rows))
    }

    fn top_reappearing(&self, request: &ReappearingRequest) -> AnalyticsResult<Vec<ReappearingRow>> {
        let started = Instant::now();
        let req = &request.range;
        let kind: Kind = req.kind.parse()?;
        let presence: Presence = request.presence.parse()?;
        let q = self.range_query(
            kind,
            &req.start,
            &req.end,
            req.language.as_deref(),
            req.include_all_languages,
            req.limit,
        )?;

        if presence == Presence::Day && q.filter.language().is_none() {
            let include_all = q.filter.includes_absent();
            let served = self.try_rollup("top_reappearing", kind, |store| {
                let log_years = self.log.partition_years(kind)?;
                let rows = store.scan(kind, &q.range, &log_years)?;
                let points = aggregate::rollup_points(&rows, include_all)?;
                Ok(aggregate::reappearing_from_points(&points, q.limit))
            });
            if let Some(rows) = served {
                return Ok(Self::finish("top_reappearing", started, rows));
            }
        }

        let entries = self.scan(kind, Some(&q.range), &q.filter)?;
        let rows = aggregate::reappearing(&entries, presence, q.limit);
        Ok(Self::finish("top_reappearing", started, rows))
    }

    fn top_owners(&self, request: &OwnersRequest) -> AnalyticsResult<Vec<OwnerRow>> {
        let started = Instant::now();
        let q = self.range_query(
            Kind::Repository,
            &request.start,
            &request.end,
            request.language.as_deref(),
            request.include_all_languages,
            request.limit,
        )?;

        let entries = self.scan(Kind::Repository, Some(&q.range), &q.filter)?;
        let rows = aggregate::owners(&entries, q.limit);
        Ok(Self::finish("top_owners", started, rows))
    }

    fn top_languages(&self, request: &LanguagesRequest) -> AnalyticsResult<Vec<LanguageRow>> {
        let started = Instant::now();
        let range = DateRange::parse(&request.start, &request.end)?;
        let kinds = match request.kind.as_deref() {
            Some(kind) => vec![kind.parse::<Kind>()?],
            None => Kind::all().to_vec(),
        };
        let limit = validate_limit(request.limit)?;

        let mut entries = Vec::new();
        for kind in kinds {
            entries.extend(self.log.scan(kind, Some(&range))?);
        }
        let rows = aggregate::languages(&entries, request.include_all_languages, limit);
        Ok(Self::finish("top_languages", started, rows))
    }

    fn top_newcomers(&self, request: &RangeRequest) -> AnalyticsResult<Vec<NewcomerRow>> {
        let started = Instant::now();
        let kind: Kind = request.kind.parse()?;
        let q = self.range_query(
            kind,
            &request.start,
            &request.end,
            request.language.as_deref(),
            request.include_all_languages,
            request.limit,
        )?;

        // First appearance is judged against all history, not the range
        let entries = self.scan(kind, None, &q.filter)?;
        let rows = aggregate::newcomers(&entries, &q.range, q.limit);
        Ok(Self::finish("top_newcomers", started, rows))
    }

    fn top_streaks(&self, request: &RangeRequest) -> AnalyticsResult<Vec<StreakRow>> {
        let started = Instant::now();
        let kind: Kind = request.kind.parse()?;
        let q = self.range_query(
            kind,
            &request.start,
            &request.end,
            request.language.as_deref(),
            request.include_all_languages,
            request.limit,
        )?;

        if q.filter.language().is_none() {
            let include_all = q.filter.includes_absent();
            let served = self.try_rollup("top_streaks", kind, |store| {
                let log_years = self.log.partition_years(kind)?;
                let rows = store.scan(kind, &q.range, &log_years)?;
                let points = aggregate::rollup_points(&rows, include_all)?;
                Ok(aggregate::streaks(&points, q.limit))
            });
            if let Some(rows) = served {
                return Ok(Self::finish("top_streaks", started, rows));
            }
        }

        let entries = self.scan(kind, Some(&q.range), &q.filter)?;
        let rows = aggregate::streaks(&aggregate::day_points(&entries), q.limit);
        Ok(Self::finish("top_streaks", started, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::testing::{build_fixture, day};
    use crate::storage::build_rollup;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn engine(use_rollups: bool) -> (TempDir, QueryEngine) {
        let dir = tempdir().unwrap();
        build_fixture(dir.path());
        let engine = QueryEngine::new(QueryConfig::new(dir.path()).use_rollups(use_rollups)).unwrap();
        (dir, engine)
    }

    fn names<T>(rows: &[T], name: impl Fn(&T) -> &str) -> Vec<String> {
        rows.iter().map(|r| name(r).to_string()).collect()
    }

    #[test]
    fn test_presence_day_vs_occurrence() {
        let (_dir, engine) = engine(false);
        let base = ReappearingRequest::new("repository", "2025-01-01", "2025-01-02")
            .include_all_languages(true)
            .limit(10);

        let by_day = engine.top_reappearing(&base).unwrap();
        let by_row = engine
            .top_reappearing(&base.clone().presence("occurrence"))
            .unwrap();

        let alpha = |rows: &[ReappearingRow]| {
            rows.iter()
                .find(|r| r.identity.name() == "alpha/one")
                .map(|r| r.days_present)
        };
        assert_eq!(alpha(&by_day), Some(2));
        assert_eq!(alpha(&by_row), Some(5));
    }

    #[test]
    fn test_reappearing_order_and_absent_bucket() {
        let (_dir, engine) = engine(false);

        let with_absent = engine
            .top_reappearing(
                &ReappearingRequest::new("repository", "2025-01-01", "2025-01-02")
                    .include_all_languages(true),
            )
            .unwrap();
        assert_eq!(
            names(&with_absent, |r| r.identity.name()),
            vec!["alpha/one", "gamma/three", "omega/all", "beta/two"]
        );

        let named_only = engine
            .top_reappearing(&ReappearingRequest::new("repository", "2025-01-01", "2025-01-02"))
            .unwrap();
        assert!(named_only.iter().all(|r| r.identity.name() != "omega/all"));
    }

    #[test]
    fn test_get_day_all_languages() {
        let (_dir, engine) = engine(false);
        let rows = engine
            .get_day(&DayRequest::new("repository", "2025-01-01").language("__all__"))
            .unwrap();
        assert_eq!(names(&rows, |r| r.identity.name()), vec!["omega/all", "alpha/one"]);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[1].repo.as_deref(), Some("one"));

        let python = engine
            .get_day(&DayRequest::new("repository", "2025-01-01").language("python"))
            .unwrap();
        assert_eq!(names(&python, |r| r.identity.name()), vec!["alpha/one", "beta/two"]);
    }

    #[test]
    fn test_invalid_date_format() {
        let (_dir, engine) = engine(false);
        let err = engine
            .get_day(&DayRequest::new("repository", "2025-13-01").language("python"))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest(_)));
    }

    #[test]
    fn test_missing_date() {
        let (_dir, engine) = engine(false);
        let err = engine
            .get_day(&DayRequest::new("repository", "2025-01-05").language("python"))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::NotFound(_)));
    }

    #[test]
    fn test_injection_language_rejected() {
        let (_dir, engine) = engine(false);
        let err = engine
            .get_day(&DayRequest::new("repository", "2025-01-01").language("python' OR 1=1 --"))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest(_)));

        let err = engine
            .top_streaks(&RangeRequest::new("repository", "2025-01-01", "2025-01-02").language("\"; DROP"))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest(_)));
    }

    #[test]
    fn test_language_scoped_to_day() {
        let (_dir, engine) = engine(false);
        // go exists for repositories, but not on 2025-01-01
        let err = engine
            .get_day(&DayRequest::new("repository", "2025-01-01").language("go"))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest(_)));
    }

    #[test]
    fn test_kind_errors() {
        let (dir, engine) = engine(false);
        let err = engine
            .get_day(&DayRequest::new("organization", "2025-01-01"))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest(_)));

        let mut manifest = engine.manifest().clone();
        manifest.kinds.remove(&Kind::Developer);
        let engine = QueryEngine::new(QueryConfig::new(dir.path()).manifest(manifest)).unwrap();
        let err = engine
            .get_day(&DayRequest::new("developer", "2025-01-01"))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::NotFound(_)));
    }

    #[test]
    fn test_inverted_range_is_invalid() {
        let (_dir, engine) = engine(false);
        // Neither date is in the manifest; the order check still wins
        let err = engine
            .top_newcomers(&RangeRequest::new("repository", "2030-02-01", "2030-01-01"))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest(_)));

        let err = engine
            .top_owners(&OwnersRequest::new("2025-01-02", "2025-01-01"))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest(_)));
    }

    #[test]
    fn test_limit_validation() {
        let (_dir, engine) = engine(false);
        let err = engine
            .top_streaks(&RangeRequest::new("developer", "2025-01-01", "2025-01-05").limit(0))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRequest(_)));
    }

    #[test]
    fn test_owners_languages_newcomers() {
        let (_dir, engine) = engine(false);

        let owners = engine
            .top_owners(&OwnersRequest::new("2025-01-01", "2025-01-02"))
            .unwrap();
        assert_eq!(names(&owners, |r| r.owner.as_str()), vec!["alpha", "gamma", "beta"]);

        let repo_langs = engine
            .top_languages(&LanguagesRequest::new("2025-01-01", "2025-01-02").kind("repository"))
            .unwrap();
        assert_eq!(repo_langs[0].language.as_deref(), Some("python"));
        assert_eq!(repo_langs[0].entries, 3);

        let all_langs = engine
            .top_languages(&LanguagesRequest::new("2025-01-01", "2025-01-05"))
            .unwrap();
        assert_eq!(all_langs[0].language.as_deref(), Some("rust"));
        assert_eq!(all_langs[0].entries, 7);

        let newcomers = engine
            .top_newcomers(&RangeRequest::new("repository", "2025-01-02", "2025-01-02"))
            .unwrap();
        assert_eq!(names(&newcomers, |r| r.identity.name()), vec!["gamma/three"]);
    }

    #[test]
    fn test_streaks() {
        let (_dir, engine) = engine(false);
        let rows = engine
            .top_streaks(&RangeRequest::new("developer", "2025-01-01", "2025-01-05"))
            .unwrap();

        assert_eq!(rows[0].identity.name(), "octocat");
        assert_eq!(rows[0].streak_len, 3);
        assert_eq!(rows[0].streak_start, day("2025-01-01"));
        assert_eq!(rows[0].streak_end, day("2025-01-03"));

        assert_eq!(rows[1].identity.name(), "hubot");
        assert_eq!(rows[1].streak_start, day("2025-01-03"));
    }

    #[test]
    fn test_rollup_matches_entry_log() {
        let (dir, raw) = engine(false);
        build_rollup(dir.path(), Kind::Repository, None).unwrap();
        build_rollup(dir.path(), Kind::Developer, None).unwrap();
        let fast = QueryEngine::new(QueryConfig::new(dir.path())).unwrap();

        for include_all in [true, false] {
            let reappearing = ReappearingRequest::new("repository", "2025-01-01", "2025-01-02")
                .include_all_languages(include_all);
            assert_eq!(
                fast.top_reappearing(&reappearing).unwrap(),
                raw.top_reappearing(&reappearing).unwrap()
            );

            let streaks = RangeRequest::new("developer", "2025-01-01", "2025-01-05")
                .include_all_languages(include_all);
            assert_eq!(
                fast.top_streaks(&streaks).unwrap(),
                raw.top_streaks(&streaks).unwrap()
            );
        }
    }

    #[test]
    fn test_corrupt_rollup_falls_back() {
        let (dir, engine) = engine(true);
        build_rollup(dir.path(), Kind::Repository, None).unwrap();

        let request = ReappearingRequest::new("repository", "2025-01-01", "2025-01-02")
            .include_all_languages(true);
        let streaks = RangeRequest::new("repository", "2025-01-01", "2025-01-02");
        let expected = engine.top_reappearing(&request).unwrap();
        let expected_streaks = engine.top_streaks(&streaks).unwrap();

        let rollup_path = RollupStore::at(dir.path()).partition_path(Kind::Repository, 2025);
        std::fs::write(&rollup_path, b"this is not a rollup segment at all").unwrap();

        assert_eq!(engine.top_reappearing(&request).unwrap(), expected);
        assert_eq!(engine.top_streaks(&streaks).unwrap(), expected_streaks);
    }

    #[test]
    fn test_unexpected_rollup_error_falls_back() {
        let (dir, engine) = engine(true);
        build_rollup(dir.path(), Kind::Repository, None).unwrap();

        let denied = || {
            crate::storage::StorageError::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            ))
        };
        assert!(!denied().is_recoverable());

        let mut attempted = false;
        let served: Option<Vec<crate::storage::RollupRow>> =
            engine.try_rollup("top_reappearing", Kind::Repository, |_| {
                attempted = true;
                Err(denied())
            });
        assert!(attempted);
        assert!(served.is_none());

        // The public query still answers, identical to the entry log
        let raw = QueryEngine::new(QueryConfig::new(dir.path()).use_rollups(false)).unwrap();
        let request = ReappearingRequest::new("repository", "2025-01-01", "2025-01-02")
            .include_all_languages(true);
        assert_eq!(
            engine.top_reappearing(&request).unwrap(),
            raw.top_reappearing(&request).unwrap()
        );
    }

    #[test]
    fn test_list_dates_and_languages() {
        let (_dir, engine) = engine(false);
        assert_eq!(
            engine.list_dates("repository").unwrap(),
            vec![day("2025-01-01"), day("2025-01-02")]
        );
        let languages = engine.list_languages("developer").unwrap();
        assert_eq!(languages, vec![None, Some("rust".to_string())]);
        assert!(engine.list_dates("team").is_err());
    }

    #[test]
    fn test_concurrent_queries() {
        let (_dir, engine) = engine(true);
        let engine = Arc::new(engine);
        let request = ReappearingRequest::new("repository", "2025-01-01", "2025-01-02")
            .include_all_languages(true)
            .limit(5);

        let counts: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let engine = Arc::clone(&engine);
                    let request = request.clone();
                    scope.spawn(move || engine.top_reappearing(&request).unwrap().len())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(counts.iter().all(|&count| count > 0));
    }
}
