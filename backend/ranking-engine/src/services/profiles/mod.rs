/// Ranking Profiles
///
/// A profile is a named, fixed combination of weighted signals, candidate
/// gates and an optional diversity override. The pipeline never branches on
/// the profile name: adding a recommendation flavor means adding a profile.
///
/// # Built-in profiles
/// - **scene**: weighted scene tag sets, cheerful moods, BPM ranges for work/sport/relax
/// - **mood**: requested-mood tag match, like-weighted popularity
/// - **personalized**: preference match, play/like popularity, BPM, moods, recency, repetition
/// - **discovery**: low play counts and fresh releases
/// - **similarity**: filter-then-rank around a seed song
/// - **popular**: plain play-count ordering
/// - **trending_social**: interaction kind, hourly decay, self boost
/// - **social_feed**: self boost, flat affinity bonuses, hourly decay
/// - **user_similarity**: accounts to follow, ranked by shared follows, activity and sign-up date
use crate::models::{Candidate, RankingContext};
use crate::services::diversity::DiversityConfig;
use crate::services::ranking::{RankingError, Result};
use crate::services::signals::{
    CounterWeight, DecayCurve, FeatureRange, RangeScope, SceneTags, SignalSpec, TagSource,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const PLAY_COUNT: &str = "play_count";
pub const LIKE_COUNT: &str = "like_count";
pub const ACTIVITY_COUNT: &str = "activity_count";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSignal {
    pub weight: f64,
    pub signal: SignalSpec,
}

impl WeightedSignal {
    pub fn new(weight: f64, signal: SignalSpec) -> Self {
        Self { weight, signal }
    }

    /// Weight 1.0: the signal's own constants carry the magnitude.
    pub fn unit(signal: SignalSpec) -> Self {
        Self::new(1.0, signal)
    }
}

/// Hard filters applied before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateGate {
    /// Same category as the context target, numeric feature within
    /// `max_feature_delta`, at least one shared tag. The target itself is excluded.
    SimilarTo { max_feature_delta: f64 },
    /// Keeps candidates whose counter is strictly below `ceiling`.
    CounterBelow { counter: String, ceiling: u64 },
    /// Drops the context's `self_id` and every id in `exclude_ids`.
    ExcludeIds,
}

impl CandidateGate {
    pub fn admits(&self, candidate: &Candidate, context: &RankingContext) -> bool {
        match self {
            CandidateGate::SimilarTo { max_feature_delta } => match context.target.as_ref() {
                Some(target) => is_similar(candidate, target, *max_feature_delta),
                None => false,
            },
            CandidateGate::CounterBelow { counter, ceiling } => {
                candidate.counter(counter) < *ceiling
            }
            CandidateGate::ExcludeIds => {
                context.self_id != Some(candidate.id)
                    && !context.exclude_ids.contains(&candidate.id)
            }
        }
    }

    pub fn needs_target(&self) -> bool {
        matches!(self, CandidateGate::SimilarTo { .. })
    }
}

fn is_similar(candidate: &Candidate, target: &Candidate, max_feature_delta: f64) -> bool {
    if candidate.id == target.id || candidate.category != target.category {
        return false;
    }

    let close_feature = match (candidate.numeric_feature, target.numeric_feature) {
        (Some(a), Some(b)) => (a - b).abs() <= max_feature_delta,
        _ => false,
    };

    close_feature && !candidate.tags.is_disjoint(&target.tags)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingProfile {
    pub name: String,
    pub signals: Vec<WeightedSignal>,
    #[serde(default)]
    pub gates: Vec<CandidateGate>,
    /// Candidates scoring below this are dropped after scoring
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Overrides the pipeline's diversity settings
    #[serde(default)]
    pub diversity: Option<DiversityConfig>,
}

impl RankingProfile {
    pub fn new(name: impl Into<String>, signals: Vec<WeightedSignal>) -> Self {
        Self {
            name: name.into(),
            signals,
            gates: Vec::new(),
            min_score: None,
            diversity: None,
        }
    }

    pub fn with_gate(mut self, gate: CandidateGate) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn with_min_score(mut self, threshold: f64) -> Self {
        self.min_score = Some(threshold);
        self
    }

    pub fn with_diversity(mut self, diversity: DiversityConfig) -> Self {
        self.diversity = Some(diversity);
        self
    }

    /// signal name -> coefficient
    pub fn weights(&self) -> BTreeMap<String, f64> {
        let mut weights = BTreeMap::new();
        for ws in &self.signals {
            *weights.entry(ws.signal.name().to_string()).or_insert(0.0) += ws.weight;
        }
        weights
    }

    /// Rejects profiles that would silently produce a meaningless ranking.
    pub fn validate(&self) -> Result<()> {
        if self.signals.is_empty() {
            return Err(RankingError::InvalidArgument(format!(
                "profile '{}' has no signals",
                self.name
            )));
        }

        for ws in &self.signals {
            if !ws.weight.is_finite() || ws.signal.constants().iter().any(|c| !c.is_finite()) {
                return Err(RankingError::InvalidArgument(format!(
                    "profile '{}' has a non-finite value in signal '{}'",
                    self.name,
                    ws.signal.name()
                )));
            }
        }

        if let Some(threshold) = self.min_score {
            if !threshold.is_finite() {
                return Err(RankingError::InvalidArgument(format!(
                    "profile '{}' has a non-finite min_score",
                    self.name
                )));
            }
        }

        Ok(())
    }

    pub fn scene() -> Self {
        let scenes = BTreeMap::from([
            (
                "work".to_string(),
                SceneTags::new(["focus", "calm", "relaxed"], 1.0),
            ),
            (
                "sport".to_string(),
                SceneTags::new(["energetic", "passionate", "upbeat"], 1.5),
            ),
            (
                "relax".to_string(),
                SceneTags::new(["relaxed", "calm", "soothing"], 1.0),
            ),
        ]);

        Self::new(
            "scene",
            vec![
                WeightedSignal::unit(SignalSpec::CategoricalMatch { bonus: 3.0 }),
                WeightedSignal::unit(SignalSpec::TagOverlap {
                    per_tag: 1.0,
                    source: TagSource::Scene { scenes },
                }),
                // Cheerful moods suit any scene
                WeightedSignal::unit(SignalSpec::TagOverlap {
                    per_tag: 0.8,
                    source: TagSource::Listed {
                        tags: tag_set(&["happy", "joyful"]),
                    },
                }),
                WeightedSignal::unit(SignalSpec::FeatureRange {
                    scope: RangeScope::TargetCategory,
                    ranges: vec![
                        FeatureRange::for_scene("work", 60.0, 100.0, 2.0),
                        FeatureRange::for_scene("sport", 120.0, 160.0, 2.5),
                        FeatureRange::for_scene("relax", 60.0, 90.0, 2.2),
                    ],
                }),
                WeightedSignal::unit(SignalSpec::FeatureRange {
                    scope: RangeScope::PreferredScene,
                    ranges: vec![
                        FeatureRange::for_scene("work", 0.0, 100.0, 1.0),
                        FeatureRange::for_scene("sport", 120.0, f64::MAX, 1.0),
                        FeatureRange::for_scene("relax", 0.0, 90.0, 1.0),
                    ],
                }),
                WeightedSignal::new(
                    0.2,
                    SignalSpec::PopularityLog {
                        counters: vec![CounterWeight::new(PLAY_COUNT, 1.0)],
                    },
                ),
            ],
        )
    }

    pub fn mood() -> Self {
        Self::new(
            "mood",
            vec![
                WeightedSignal::unit(SignalSpec::TagOverlap {
                    per_tag: 5.0,
                    source: TagSource::TargetCategory,
                }),
                WeightedSignal::unit(SignalSpec::CategoricalMatch { bonus: 3.0 }),
                WeightedSignal::unit(SignalSpec::PopularityLog {
                    counters: vec![CounterWeight::new(LIKE_COUNT, 0.3)],
                }),
            ],
        )
    }

    pub fn personalized() -> Self {
        Self::new(
            "personalized",
            vec![
                WeightedSignal::unit(SignalSpec::CategoricalMatch { bonus: 4.0 }),
                WeightedSignal::unit(SignalSpec::PopularityLog {
                    counters: vec![
                        CounterWeight::new(PLAY_COUNT, 0.2),
                        CounterWeight::new(LIKE_COUNT, 0.3),
                    ],
                }),
                WeightedSignal::unit(SignalSpec::FeatureRange {
                    scope: RangeScope::Any,
                    ranges: vec![FeatureRange::new(60.0, 120.0, 2.0)],
                }),
                WeightedSignal::unit(SignalSpec::TagOverlap {
                    per_tag: 1.5,
                    source: TagSource::PreferredMoods,
                }),
                WeightedSignal::unit(SignalSpec::Recency {
                    curve: DecayCurve::release_steps(),
                }),
                WeightedSignal::unit(SignalSpec::RepetitionPenalty { penalty: 0.5 }),
            ],
        )
    }

    pub fn discovery() -> Self {
        Self::new(
            "discovery",
            vec![
                WeightedSignal::unit(SignalSpec::InversePopularityLog {
                    counters: vec![CounterWeight::new(PLAY_COUNT, 0.5)],
                }),
                WeightedSignal::unit(SignalSpec::Recency {
                    curve: DecayCurve::release_steps(),
                }),
                WeightedSignal::unit(SignalSpec::CategoricalMatch { bonus: 3.0 }),
            ],
        )
        .with_gate(CandidateGate::CounterBelow {
            counter: PLAY_COUNT.to_string(),
            ceiling: 100,
        })
    }

    pub fn similarity() -> Self {
        Self::new(
            "similarity",
            vec![WeightedSignal::unit(SignalSpec::PopularityLog {
                counters: vec![CounterWeight::new(PLAY_COUNT, 1.0)],
            })],
        )
        .with_gate(CandidateGate::SimilarTo {
            max_feature_delta: 20.0,
        })
    }

    pub fn popular() -> Self {
        Self::new(
            "popular",
            vec![WeightedSignal::unit(SignalSpec::PopularityLog {
                counters: vec![CounterWeight::new(PLAY_COUNT, 1.0)],
            })],
        )
    }

    pub fn trending_social() -> Self {
        let weights = BTreeMap::from([
            ("follow".to_string(), 25.0),
            ("share".to_string(), 20.0),
            ("comment".to_string(), 15.0),
            ("like".to_string(), 10.0),
        ]);

        Self::new(
            "trending_social",
            vec![
                WeightedSignal::unit(SignalSpec::InteractionType { weights }),
                WeightedSignal::unit(SignalSpec::Recency {
                    curve: DecayCurve::HourlyLinear {
                        base: 100.0,
                        rate_per_hour: 2.0,
                    },
                }),
                WeightedSignal::unit(SignalSpec::SelfBoost { bonus: 50.0 }),
                WeightedSignal::unit(SignalSpec::FlatBonus {
                    label: "author_influence".to_string(),
                    bonus: 5.0,
                }),
            ],
        )
    }

    pub fn social_feed() -> Self {
        Self::new(
            "social_feed",
            vec![
                WeightedSignal::unit(SignalSpec::SelfBoost { bonus: 50.0 }),
                WeightedSignal::unit(SignalSpec::FlatBonus {
                    label: "interaction_affinity".to_string(),
                    bonus: 20.0,
                }),
                WeightedSignal::unit(SignalSpec::FlatBonus {
                    label: "content_affinity".to_string(),
                    bonus: 15.0,
                }),
                WeightedSignal::unit(SignalSpec::Recency {
                    curve: DecayCurve::HourlyLinear {
                        base: 30.0,
                        rate_per_hour: 1.0,
                    },
                }),
            ],
        )
    }

    /// Accounts worth following. The requesting user is the context target,
    /// with the ids they follow as tags; `self_id` and `exclude_ids` keep the
    /// user and accounts they already follow out of the result.
    pub fn user_similarity() -> Self {
        Self::new(
            "user_similarity",
            vec![
                WeightedSignal::unit(SignalSpec::TagOverlap {
                    per_tag: 10.0,
                    source: TagSource::TargetTags,
                }),
                WeightedSignal::unit(SignalSpec::CounterProximity {
                    counter: ACTIVITY_COUNT.to_string(),
                    max_delta: 10,
                    bonus: 5.0,
                }),
                WeightedSignal::unit(SignalSpec::DateProximity {
                    max_days: 30,
                    bonus: 3.0,
                }),
            ],
        )
        .with_gate(CandidateGate::ExcludeIds)
    }
}

fn tag_set(tags: &[&str]) -> BTreeSet<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

/// Profiles addressable by name.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: HashMap<String, RankingProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for profile in [
            RankingProfile::scene(),
            RankingProfile::mood(),
            RankingProfile::personalized(),
            RankingProfile::discovery(),
            RankingProfile::similarity(),
            RankingProfile::popular(),
            RankingProfile::trending_social(),
            RankingProfile::social_feed(),
            RankingProfile::user_similarity(),
        ] {
            registry.register(profile);
        }
        registry
    }

    /// Adds or replaces a profile under its own name.
    pub fn register(&mut self, profile: RankingProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    /// Decodes a JSON array of profiles and registers each one after validation.
    pub fn extend_from_json(&mut self, json: &str) -> Result<()> {
        let profiles: Vec<RankingProfile> = serde_json::from_str(json)?;
        for profile in profiles {
            profile.validate()?;
            self.register(profile);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&RankingProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| RankingError::UnknownProfile(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
