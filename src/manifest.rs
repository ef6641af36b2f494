//! Catalog of which dates and languages exist per kind
//!
//! The manifest is the only source of truth for "does this slice exist";
//! requests are checked against it before the entry log is touched.

use crate::query::{AnalyticsError, AnalyticsResult};
use crate::storage::Kind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Dates and languages recorded for one kind
///
/// A language of `None` is the absent-language ("all languages") bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestKind {
    #[serde(default)]
    pub dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub languages: BTreeSet<Option<String>>,
    #[serde(default)]
    pub languages_by_date: BTreeMap<NaiveDate, BTreeSet<Option<String>>>,
}

impl ManifestKind {
    /// Register that `date` has data in the `language` bucket
    pub fn record(&mut self, date: NaiveDate, language: Option<&str>) {
        let language = language.map(str::to_string);
        self.dates.insert(date);
        self.languages.insert(language.clone());
        self.languages_by_date.entry(date).or_default().insert(language);
    }

    pub fn has_date(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    /// Whether `language` is known, scoped to `date` when per-date sets exist
    pub fn has_language(&self, language: Option<&str>, date: Option<NaiveDate>) -> bool {
        let language = language.map(str::to_string);
        match date {
            Some(date) if !self.languages_by_date.is_empty() => self
                .languages_by_date
                .get(&date)
                .is_some_and(|langs| langs.contains(&language)),
            _ => self.languages.contains(&language),
        }
    }

    /// The day after `date`, if the manifest has it
    pub fn next_date_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        date.succ_opt().filter(|next| self.has_date(*next))
    }
}

/// Per-kind catalog loaded from `log/manifest.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub kinds: BTreeMap<Kind, ManifestKind>,
}

impl Manifest {
    /// Load the manifest from a JSON file
    pub fn load(path: impl AsRef<Path>) -> AnalyticsResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AnalyticsError::Manifest(format!("{}: {}", path.display(), e)))?;
        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| AnalyticsError::Manifest(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(
            path = %path.display(),
            kinds = manifest.kinds.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Write the manifest as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> AnalyticsResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AnalyticsError::Manifest(format!("{}: {}", parent.display(), e)))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AnalyticsError::Manifest(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| AnalyticsError::Manifest(format!("{}: {}", path.display(), e)))
    }

    /// Section for `kind`; `NotFound` when the manifest has none
    pub fn kind(&self, kind: Kind) -> AnalyticsResult<&ManifestKind> {
        self.kinds
            .get(&kind)
            .ok_or_else(|| AnalyticsError::NotFound(format!("No manifest data for kind: {}", kind)))
    }

    /// Mutable section for `kind`, created on first use
    pub fn kind_mut(&mut self, kind: Kind) -> &mut ManifestKind {
        self.kinds.entry(kind).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_json_shape() {
        let json = r#"{"kinds": {"repository": {
            "dates": ["2025-01-01", "2025-01-02"],
            "languages": [null, "python"],
            "languages_by_date": {"2025-01-01": [null, "python"], "2025-01-02": [null]}
        }}}"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();

        let repo = manifest.kind(Kind::Repository).unwrap();
        assert!(repo.has_date(day("2025-01-02")));
        assert!(repo.has_language(None, Some(day("2025-01-02"))));
        assert!(repo.has_language(Some("python"), None));
        assert!(!repo.has_language(Some("python"), Some(day("2025-01-02"))));

        let err = manifest.kind(Kind::Developer).unwrap_err();
        assert!(matches!(err, AnalyticsError::NotFound(_)));
    }

    #[test]
    fn test_language_scope_without_per_date_sets() {
        let mut kind = ManifestKind::default();
        kind.dates.insert(day("2025-01-01"));
        kind.languages.insert(Some("rust".to_string()));

        assert!(kind.has_language(Some("rust"), Some(day("2025-03-01"))));
        assert!(!kind.has_language(Some("go"), None));
    }

    #[test]
    fn test_next_date_after() {
        let mut kind = ManifestKind::default();
        kind.record(day("2025-01-01"), None);
        kind.record(day("2025-01-02"), Some("python"));
        kind.record(day("2025-01-05"), None);

        assert_eq!(kind.next_date_after(day("2025-01-01")), Some(day("2025-01-02")));
        assert_eq!(kind.next_date_after(day("2025-01-02")), None);
        assert_eq!(kind.next_date_after(day("2025-01-05")), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log").join("manifest.json");

        let mut manifest = Manifest::default();
        manifest.kind_mut(Kind::Developer).record(day("2025-01-01"), Some("rust"));
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["kinds"]["developer"]["dates"][0], "2025-01-01");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = Manifest::load(dir.path().join("manifest.json")).unwrap_err();
        assert!(matches!(err, AnalyticsError::Manifest(_)));
    }
}
