//! Generation quota: how much content is still owed, and from which seeds.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use genpress_core::SeedId;

/// An input unit (e.g. a title) consumed by exactly one successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    pub id: SeedId,
    pub topic: String,
    pub used: bool,
}

impl Seed {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: SeedId::new(),
            topic: topic.into(),
            used: false,
        }
    }
}

/// The one active generation quota.
///
/// Invariant: `generated_count <= total_needed`. The planner deactivates the
/// quota once the two are equal. Mutation goes through the quota store's
/// atomic operations; the planner's daily cadence and the worker's
/// single-flight guard keep the two writers from interleaving in practice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationQuota {
    /// Total jobs this quota should eventually produce.
    pub total_needed: u32,
    /// Jobs completed so far.
    pub generated_count: u32,
    /// Upper bound on jobs planned per calendar day.
    pub per_day_target: u32,
    /// Preferred time-of-day for the first job of the day.
    pub preferred_start_time: NaiveTime,
    /// Ordered seed pool; each seed feeds at most one successful job.
    pub seeds: Vec<Seed>,
    pub active: bool,
}

impl GenerationQuota {
    pub fn new(
        total_needed: u32,
        per_day_target: u32,
        preferred_start_time: NaiveTime,
        topics: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            total_needed,
            generated_count: 0,
            per_day_target,
            preferred_start_time,
            seeds: topics.into_iter().map(Seed::new).collect(),
            active: true,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.total_needed.saturating_sub(self.generated_count)
    }

    pub fn is_exhausted(&self) -> bool {
        self.generated_count >= self.total_needed
    }

    /// Unused seeds in pool order.
    pub fn unused_seeds(&self) -> Vec<Seed> {
        self.seeds.iter().filter(|s| !s.used).cloned().collect()
    }
}
