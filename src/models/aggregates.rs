//! Aggregate statistics shapes.

use super::{Resident, ResidentField};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of the counters row.
///
/// Values are signed: a drifted cache can go negative, and that is reported
/// as-is rather than clamped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalAggregates {
    /// Cached resident count.
    pub total_residents: i64,
    /// Cached registered-voter count.
    pub total_voters: i64,
    /// Cached resident count per purok.
    pub per_subdivision: BTreeMap<String, i64>,
}

impl IncrementalAggregates {
    /// Returns the cached count for a purok (0 when absent).
    #[must_use]
    pub fn subdivision(&self, purok: &str) -> i64 {
        self.per_subdivision.get(purok).copied().unwrap_or(0)
    }
}

/// Population breakdown by gender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
    /// All live residents.
    pub total: u64,
    /// Residents whose gender is male.
    pub male: u64,
    /// Residents whose gender is female.
    pub female: u64,
}

/// Voter breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterBreakdown {
    /// Registered voters.
    pub voters: u64,
    /// Everyone else.
    pub non_voters: u64,
}

/// Aggregates recomputed from every live record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputedAggregates {
    /// Population breakdown.
    pub population: Population,
    /// Voter breakdown.
    pub voters: VoterBreakdown,
    /// Number of distinct non-empty purok values.
    pub distinct_subdivision_count: u64,
}

/// Full-scan tally of live records.
///
/// Carries everything needed both for the recomputed report and for
/// rebuilding the counters row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Census {
    /// Live residents counted.
    pub total: u64,
    /// Male residents.
    pub male: u64,
    /// Female residents.
    pub female: u64,
    /// Registered voters.
    pub voters: u64,
    /// Residents per non-empty purok.
    pub per_subdivision: BTreeMap<String, u64>,
}

impl Census {
    /// Tallies a sequence of residents.
    pub fn tally<'a>(residents: impl IntoIterator<Item = &'a Resident>) -> Self {
        let mut census = Self::default();
        for resident in residents {
            census.add(resident);
        }
        census
    }

    /// Adds one resident to the tally.
    pub fn add(&mut self, resident: &Resident) {
        self.total += 1;
        let gender = resident.field(ResidentField::Gender).trim();
        if gender.eq_ignore_ascii_case("male") {
            self.male += 1;
        } else if gender.eq_ignore_ascii_case("female") {
            self.female += 1;
        }
        if resident.is_registered_voter() {
            self.voters += 1;
        }
        if let Some(purok) = resident.purok() {
            *self.per_subdivision.entry(purok.to_string()).or_insert(0) += 1;
        }
    }

    /// Converts the tally into the reporting shape.
    #[must_use]
    pub fn recomputed(&self) -> RecomputedAggregates {
        RecomputedAggregates {
            population: Population {
                total: self.total,
                male: self.male,
                female: self.female,
            },
            voters: VoterBreakdown {
                voters: self.voters,
                non_voters: self.total.saturating_sub(self.voters),
            },
            distinct_subdivision_count: self.per_subdivision.len() as u64,
        }
    }

    /// Converts the tally into the counters-row shape.
    #[must_use]
    pub fn as_counters(&self) -> IncrementalAggregates {
        IncrementalAggregates {
            total_residents: saturating_i64(self.total),
            total_voters: saturating_i64(self.voters),
            per_subdivision: self
                .per_subdivision
                .iter()
                .map(|(purok, count)| (purok.clone(), saturating_i64(*count)))
                .collect(),
        }
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
