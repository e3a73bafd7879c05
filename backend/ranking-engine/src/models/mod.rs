use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An item being ranked: a song or a social interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    /// Genre for songs, interaction type for social items
    pub category: String,
    #[serde(default)]
    pub counters: Vec<PopularityCounter>,
    /// BPM for songs
    #[serde(default)]
    pub numeric_feature: Option<f64>,
    /// Mood tags for songs
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner_id: Option<i64>,
}

impl Candidate {
    pub fn new(id: i64, category: impl Into<String>) -> Self {
        Self {
            id,
            category: category.into(),
            counters: Vec::new(),
            numeric_feature: None,
            tags: BTreeSet::new(),
            created_at: None,
            owner_id: None,
        }
    }

    pub fn with_counter(mut self, name: impl Into<String>, value: u64) -> Self {
        self.counters.push(PopularityCounter {
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_feature(mut self, value: f64) -> Self {
        self.numeric_feature = Some(value);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_owner(mut self, owner_id: i64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// First counter with the given name; absent counters read as zero.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularityCounter {
    pub name: String,
    pub value: u64,
}

/// Stored taste profile of the requesting user. Every field is optional;
/// an empty field never filters anything out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreference {
    #[serde(default)]
    pub preferred_tags: Vec<String>,
    #[serde(default)]
    pub preferred_moods: Vec<String>,
    #[serde(default)]
    pub preferred_scene: Option<String>,
    #[serde(default)]
    pub last_shown_tags: Vec<String>,
}

/// Per-request context. Owned by the caller and only read by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingContext {
    pub reference_time: DateTime<Utc>,
    #[serde(default)]
    pub user_preference: Option<UserPreference>,
    /// Requested scene or mood
    #[serde(default)]
    pub target_category: Option<String>,
    #[serde(default)]
    pub self_id: Option<i64>,
    /// Seed item for similarity ranking, or the requesting user for account suggestions
    #[serde(default)]
    pub target: Option<Candidate>,
    /// Ids the caller has already seen or followed
    #[serde(default)]
    pub exclude_ids: BTreeSet<i64>,
}

impl RankingContext {
    pub fn new(reference_time: DateTime<Utc>) -> Self {
        Self {
            reference_time,
            user_preference: None,
            target_category: None,
            self_id: None,
            target: None,
            exclude_ids: BTreeSet::new(),
        }
    }

    pub fn with_preference(mut self, preference: UserPreference) -> Self {
        self.user_preference = Some(preference);
        self
    }

    pub fn with_target_category(mut self, category: impl Into<String>) -> Self {
        self.target_category = Some(category.into());
        self
    }

    pub fn with_self_id(mut self, self_id: i64) -> Self {
        self.self_id = Some(self_id);
        self
    }

    pub fn with_target(mut self, target: Candidate) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_excluded_ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        self.exclude_ids.extend(ids);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a Candidate,
    pub score: f64,
    /// signal name -> weighted contribution
    pub breakdown: BTreeMap<String, f64>,
}

impl ScoredCandidate<'_> {
    pub fn id(&self) -> i64 {
        self.candidate.id
    }

    pub fn contribution(&self, signal: &str) -> f64 {
        self.breakdown.get(signal).copied().unwrap_or(0.0)
    }
}

/// Ordered, length-bounded, diversity-constrained output of one ranking call.
pub type RankingResult<'a> = Vec<ScoredCandidate<'a>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RankingStats {
    pub input_count: usize,
    /// Candidates left after profile gates
    pub gated_count: usize,
    /// Candidates left after the min-score threshold
    pub scored_count: usize,
    pub returned_count: usize,
}
