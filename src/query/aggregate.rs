//! Ranking algorithms over entry log and rollup rows
//!
//! Every ranking ends in a total order: counts descending, best rank
//! ascending, then name ascending, so ties never depend on map iteration.

use crate::query::params::Presence;
use crate::query::rows::{
    LanguageRow, NewcomerRow, OwnerRow, RankedEntry, ReappearingRow, StreakRow,
};
use crate::storage::{DateRange, Entry, Identity, RollupRow, StorageError, StorageResult};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// One identity on one day with its best rank that day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayPoint {
    pub identity: Identity,
    pub date: NaiveDate,
    pub rank: u32,
}

fn min_rank(current: Option<u32>, rank: u32) -> Option<u32> {
    Some(current.map_or(rank, |r| r.min(rank)))
}

fn top<T>(mut rows: Vec<T>, limit: usize, order: impl Fn(&T, &T) -> Ordering) -> Vec<T> {
    rows.sort_by(order);
    rows.truncate(limit);
    rows
}

/// Entries of one day ordered by rank
pub fn day_listing<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<RankedEntry> {
    let mut rows: Vec<RankedEntry> = entries
        .into_iter()
        .map(|e| RankedEntry::new(e.rank, e.identity.clone()))
        .collect();
    rows.sort_by(|a, b| {
        a.rank
            .cmp(&b.rank)
            .then_with(|| a.identity.name().cmp(b.identity.name()))
    });
    rows
}

#[derive(Default)]
struct Presences {
    days: BTreeSet<NaiveDate>,
    rows: u64,
    best_rank: Option<u32>,
}

fn reappearing_order(a: &ReappearingRow, b: &ReappearingRow) -> Ordering {
    b.days_present
        .cmp(&a.days_present)
        .then(a.best_rank.cmp(&b.best_rank))
        .then_with(|| a.identity.name().cmp(b.identity.name()))
}

/// Reappearance counts from already-filtered entries
pub fn reappearing<'a>(
    entries: impl IntoIterator<Item = &'a Entry>,
    presence: Presence,
    limit: usize,
) -> Vec<ReappearingRow> {
    let mut by_identity: HashMap<&Identity, Presences> = HashMap::new();
    for entry in entries {
        let acc = by_identity.entry(&entry.identity).or_default();
        acc.days.insert(entry.date);
        acc.rows += 1;
        acc.best_rank = min_rank(acc.best_rank, entry.rank);
    }

    let rows = by_identity
        .into_iter()
        .filter_map(|(identity, acc)| {
            Some(ReappearingRow {
                identity: identity.clone(),
                days_present: match presence {
                    Presence::Day => acc.days.len() as u64,
                    Presence::Occurrence => acc.rows,
                },
                best_rank: acc.best_rank?,
            })
        })
        .collect();

    top(rows, limit, reappearing_order)
}

/// Rollup rows as day points, honoring the absent-language flag
///
/// Without `include_all_languages`, days seen only in the absent-language
/// bucket are dropped and the best language-specific rank is used.
pub fn rollup_points<'a>(
    rows: impl IntoIterator<Item = &'a RollupRow>,
    include_all_languages: bool,
) -> StorageResult<Vec<DayPoint>> {
    let mut points = Vec::new();
    for row in rows {
        if !include_all_languages && row.non_null_languages == 0 {
            continue;
        }
        let rank = if include_all_languages {
            row.best_rank_any
        } else {
            row.best_rank_non_null.ok_or_else(|| {
                StorageError::Corruption(format!(
                    "rollup row for {} on {} has languages but no language rank",
                    row.identity.name(),
                    row.date
                ))
            })?
        };
        points.push(DayPoint {
            identity: row.identity.clone(),
            date: row.date,
            rank,
        });
    }
    Ok(points)
}

/// Day-presence counts from rollup points (one point per identity per day)
pub fn reappearing_from_points(points: &[DayPoint], limit: usize) -> Vec<ReappearingRow> {
    let mut by_identity: HashMap<&Identity, (u64, u32)> = HashMap::new();
    for point in points {
        let acc = by_identity.entry(&point.identity).or_insert((0, point.rank));
        acc.0 += 1;
        acc.1 = acc.1.min(point.rank);
    }

    let rows = by_identity
        .into_iter()
        .map(|(identity, (days_present, best_rank))| ReappearingRow {
            identity: identity.clone(),
            days_present,
            best_rank,
        })
        .collect();

    top(rows, limit, reappearing_order)
}

/// Owners by number of distinct repositories that appeared
pub fn owners<'a>(entries: impl IntoIterator<Item = &'a Entry>, limit: usize) -> Vec<OwnerRow> {
    let mut by_owner: HashMap<&str, (HashSet<&str>, u32)> = HashMap::new();
    for entry in entries {
        let Some(owner) = entry.identity.owner() else {
            continue;
        };
        let acc = by_owner
            .entry(owner)
            .or_insert_with(|| (HashSet::new(), entry.rank));
        acc.0.insert(entry.identity.name());
        acc.1 = acc.1.min(entry.rank);
    }

    let rows = by_owner
        .into_iter()
        .map(|(owner, (repos, best_rank))| OwnerRow {
            owner: owner.to_string(),
            repos_present: repos.len() as u64,
            best_rank,
        })
        .collect();

    top(rows, limit, |a, b| {
        b.repos_present
            .cmp(&a.repos_present)
            .then(a.best_rank.cmp(&b.best_rank))
            .then_with(|| a.owner.cmp(&b.owner))
    })
}

/// Named languages first, then the absent-language bucket
fn language_order(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Entry counts per language bucket
pub fn languages<'a>(
    entries: impl IntoIterator<Item = &'a Entry>,
    include_all_languages: bool,
    limit: usize,
) -> Vec<LanguageRow> {
    let mut counts: HashMap<Option<&str>, u64> = HashMap::new();
    for entry in entries {
        let language = entry.language.as_deref();
        if language.is_none() && !include_all_languages {
            continue;
        }
        *counts.entry(language).or_default() += 1;
    }

    let rows = counts
        .into_iter()
        .map(|(language, entries)| LanguageRow {
            language: language.map(str::to_string),
            entries,
        })
        .collect();

    top(rows, limit, |a, b| {
        b.entries
            .cmp(&a.entries)
            .then_with(|| language_order(&a.language, &b.language))
    })
}

/// Identities whose first appearance in all history falls inside `range`
///
/// `entries` must be the whole log under the language filter, not just the
/// range.
pub fn newcomers<'a>(
    entries: impl IntoIterator<Item = &'a Entry>,
    range: &DateRange,
    limit: usize,
) -> Vec<NewcomerRow> {
    let mut first_seen: HashMap<&Identity, (NaiveDate, u32)> = HashMap::new();
    for entry in entries {
        let acc = first_seen
            .entry(&entry.identity)
            .or_insert((entry.date, entry.rank));
        acc.0 = acc.0.min(entry.date);
        acc.1 = acc.1.min(entry.rank);
    }

    let rows = first_seen
        .into_iter()
        .filter(|(_, (date, _))| range.contains(*date))
        .map(|(identity, (first_seen, best_rank))| NewcomerRow {
            identity: identity.clone(),
            first_seen,
            best_rank,
        })
        .collect();

    top(rows, limit, |a, b| {
        b.first_seen
            .cmp(&a.first_seen)
            .then(a.best_rank.cmp(&b.best_rank))
            .then_with(|| a.identity.name().cmp(b.identity.name()))
    })
}

/// Collapse multi-language entries to one point per identity per day
pub fn day_points<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<DayPoint> {
    let mut best: HashMap<(&Identity, NaiveDate), u32> = HashMap::new();
    for entry in entries {
        best.entry((&entry.identity, entry.date))
            .and_modify(|rank| *rank = (*rank).min(entry.rank))
            .or_insert(entry.rank);
    }
    best.into_iter()
        .map(|((identity, date), rank)| DayPoint {
            identity: identity.clone(),
            date,
            rank,
        })
        .collect()
}

struct Run {
    start: NaiveDate,
    end: NaiveDate,
    len: u32,
    best_rank: u32,
}

impl Run {
    fn begin(date: NaiveDate, rank: u32) -> Self {
        Self {
            start: date,
            end: date,
            len: 1,
            best_rank: rank,
        }
    }

    /// Longer wins; equal length goes to the later run
    fn beats(&self, other: &Run) -> bool {
        (self.len, self.end) > (other.len, other.end)
    }
}

/// Longest consecutive-day run per identity
///
/// Points must already be collapsed to one per identity per day. Each
/// identity's days are walked in date order; a gap other than exactly one
/// day closes the current run.
pub fn streaks(points: &[DayPoint], limit: usize) -> Vec<StreakRow> {
    let mut by_identity: BTreeMap<&Identity, Vec<(NaiveDate, u32)>> = BTreeMap::new();
    for point in points {
        by_identity
            .entry(&point.identity)
            .or_default()
            .push((point.date, point.rank));
    }

    let mut rows = Vec::with_capacity(by_identity.len());
    for (identity, mut days) in by_identity {
        days.sort_unstable();

        let mut longest: Option<Run> = None;
        let mut current: Option<Run> = None;
        for (date, rank) in days {
            current = Some(match current.take() {
                Some(mut run) if (date - run.end).num_days() == 1 => {
                    run.end = date;
                    run.len += 1;
                    run.best_rank = run.best_rank.min(rank);
                    run
                }
                finished => {
                    if let Some(run) = finished {
                        if longest.as_ref().map_or(true, |best| run.beats(best)) {
                            longest = Some(run);
                        }
                    }
                    Run::begin(date, rank)
                }
            });
        }
        if let Some(run) = current {
            if longest.as_ref().map_or(true, |best| run.beats(best)) {
                longest = Some(run);
            }
        }

        if let Some(run) = longest {
            rows.push(StreakRow {
                identity: identity.clone(),
                streak_start: run.start,
                streak_end: run.end,
                streak_len: run.len,
                best_rank: run.best_rank,
            });
        }
    }

    top(rows, limit, |a, b| {
        b.streak_len
            .cmp(&a.streak_len)
            .then(a.best_rank.cmp(&b.best_rank))
            .then_with(|| a.identity.name().cmp(b.identity.name()))
    })
}
