//! Dense ranking of scores within cohorts.
//!
//! Scores are compared at hundredth precision (the precision GPA/CPA values
//! are rounded and stored at), so `3.9` and `3.9000000001` share a rank.
//! Distinct values are sorted descending and numbered `1, 2, 3, ...`; ties
//! share a number and the next distinct value takes the next integer.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

/// Score expressed in integer hundredths, the unit ranks are compared in.
pub fn score_key(score: f64) -> i64 {
    (score * 100.0).round() as i64
}

/// Mapping `score -> dense rank` for one cohort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankTable {
    ranks: BTreeMap<i64, i32>,
}

impl RankTable {
    /// Build the table from every score present in the cohort.
    pub fn build<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let distinct: BTreeSet<i64> = scores.into_iter().map(score_key).collect();
        let ranks = distinct
            .into_iter()
            .rev()
            .zip(1..)
            .collect::<BTreeMap<i64, i32>>();
        Self { ranks }
    }

    /// Rank of `score`, `None` if the score was not in the cohort.
    pub fn rank_of(&self, score: f64) -> Option<i32> {
        self.ranks.get(&score_key(score)).copied()
    }

    /// Number of distinct scores.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// True when the cohort had no scores.
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// Rank every entry within its cohort.
///
/// Each entry is `(cohort, id, score)`; `id` must be unique across entries
/// (use the record's natural key). Returns `id -> rank`.
pub fn rank_cohorts<K, I, It>(entries: It) -> HashMap<I, i32>
where
    K: Ord,
    I: Eq + Hash,
    It: IntoIterator<Item = (K, I, f64)>,
{
    let mut cohorts: BTreeMap<K, Vec<(I, f64)>> = BTreeMap::new();
    for (cohort, id, score) in entries {
        cohorts.entry(cohort).or_default().push((id, score));
    }

    let mut out = HashMap::new();
    for (_cohort, members) in cohorts {
        let table = RankTable::build(members.iter().map(|(_, s)| *s));
        for (id, score) in members {
            if let Some(rank) = table.rank_of(score) {
                out.insert(id, rank);
            }
        }
    }
    out
}
