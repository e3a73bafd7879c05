// ============================================
// Signal Extractors
// ============================================
//
// Pure functions mapping (candidate, context) to one scalar feature.
// Every extractor is total: missing optional fields and an absent user
// preference produce a neutral contribution, never an error.

use crate::models::{Candidate, RankingContext, UserPreference};
use crate::utils::{age_in_days, age_in_hours, eq_ignore_case, log_count};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A signal together with the constants it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalSpec {
    CategoricalMatch {
        bonus: f64,
    },
    PopularityLog {
        counters: Vec<CounterWeight>,
    },
    InversePopularityLog {
        counters: Vec<CounterWeight>,
    },
    FeatureRange {
        #[serde(default)]
        scope: RangeScope,
        ranges: Vec<FeatureRange>,
    },
    TagOverlap {
        per_tag: f64,
        source: TagSource,
    },
    /// Bonus when a counter is within `max_delta` (exclusive) of the target's
    CounterProximity {
        counter: String,
        max_delta: u64,
        bonus: f64,
    },
    /// Bonus when creation dates are less than `max_days` apart from the target's
    DateProximity {
        max_days: i64,
        bonus: f64,
    },
    Recency {
        curve: DecayCurve,
    },
    RepetitionPenalty {
        penalty: f64,
    },
    SelfBoost {
        bonus: f64,
    },
    InteractionType {
        weights: BTreeMap<String, f64>,
    },
    FlatBonus {
        label: String,
        bonus: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterWeight {
    pub name: String,
    pub weight: f64,
}

impl CounterWeight {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// Inclusive numeric range labelled with the scene it suits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRange {
    #[serde(default)]
    pub scene: Option<String>,
    pub min: f64,
    pub max: f64,
    pub bonus: f64,
}

impl FeatureRange {
    pub fn new(min: f64, max: f64, bonus: f64) -> Self {
        Self {
            scene: None,
            min,
            max,
            bonus,
        }
    }

    pub fn for_scene(scene: impl Into<String>, min: f64, max: f64, bonus: f64) -> Self {
        Self {
            scene: Some(scene.into()),
            min,
            max,
            bonus,
        }
    }

    fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Which ranges of a `FeatureRange` signal are considered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeScope {
    /// Every declared range
    #[default]
    Any,
    /// Ranges labelled with the requested scene; all of them when no scene is requested
    TargetCategory,
    /// Ranges labelled with the user's preferred scene; none when it is unknown
    PreferredScene,
}

/// The tag set a candidate's tags are compared against.
///
/// Mood and scene words compare case-insensitively; `TargetTags` holds opaque
/// identifiers and compares exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum TagSource {
    PreferredMoods,
    /// The requested mood
    TargetCategory,
    /// Tags declared for the requested scene, scaled by that scene's weight
    Scene {
        scenes: BTreeMap<String, SceneTags>,
    },
    /// A fixed tag list that applies whatever the request
    Listed { tags: BTreeSet<String> },
    /// Tags of the context target, e.g. the accounts a requesting user follows
    TargetTags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneTags {
    pub tags: BTreeSet<String>,
    #[serde(default = "default_scene_weight")]
    pub weight: f64,
}

impl SceneTags {
    pub fn new<I, S>(tags: I, weight: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            weight,
        }
    }
}

fn default_scene_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum DecayCurve {
    /// First step with `age_days < below_days` wins; older items get 0
    DailySteps { steps: Vec<DecayStep> },
    /// `max(0, base - age_hours * rate_per_hour)`
    HourlyLinear { base: f64, rate_per_hour: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayStep {
    pub below_days: i64,
    pub bonus: f64,
}

impl DecayCurve {
    /// 3.0 inside a week, 1.5 inside a month, 0.5 inside a quarter.
    pub fn release_steps() -> Self {
        DecayCurve::DailySteps {
            steps: vec![
                DecayStep {
                    below_days: 7,
                    bonus: 3.0,
                },
                DecayStep {
                    below_days: 30,
                    bonus: 1.5,
                },
                DecayStep {
                    below_days: 90,
                    bonus: 0.5,
                },
            ],
        }
    }
}

impl SignalSpec {
    /// Key used in score breakdowns.
    pub fn name(&self) -> &str {
        match self {
            SignalSpec::CategoricalMatch { .. } => "categorical_match",
            SignalSpec::PopularityLog { .. } => "popularity_log",
            SignalSpec::InversePopularityLog { .. } => "inverse_popularity_log",
            SignalSpec::FeatureRange { scope, .. } => match scope {
                RangeScope::Any => "feature_range",
                RangeScope::TargetCategory => "scene_feature_range",
                RangeScope::PreferredScene => "preferred_scene_range",
            },
            SignalSpec::TagOverlap { source, .. } => match source {
                TagSource::PreferredMoods => "tag_overlap",
                TagSource::TargetCategory => "target_tag_overlap",
                TagSource::Scene { .. } => "scene_tag_overlap",
                TagSource::Listed { .. } => "listed_tag_overlap",
                TagSource::TargetTags => "shared_tag_overlap",
            },
            SignalSpec::CounterProximity { .. } => "counter_proximity",
            SignalSpec::DateProximity { .. } => "date_proximity",
            SignalSpec::Recency { .. } => "recency",
            SignalSpec::RepetitionPenalty { .. } => "repetition_penalty",
            SignalSpec::SelfBoost { .. } => "self_boost",
            SignalSpec::InteractionType { .. } => "interaction_type",
            SignalSpec::FlatBonus { label, .. } => label.as_str(),
        }
    }

    /// Raw (unweighted) value of this signal for one candidate.
    pub fn extract(&self, candidate: &Candidate, context: &RankingContext) -> f64 {
        let preference = context.user_preference.as_ref();
        match self {
            SignalSpec::CategoricalMatch { bonus } => {
                categorical_match(candidate, preference, *bonus)
            }
            SignalSpec::PopularityLog { counters } => popularity_log(candidate, counters),
            SignalSpec::InversePopularityLog { counters } => -popularity_log(candidate, counters),
            SignalSpec::FeatureRange { scope, ranges } => {
                let scene = match scope {
                    RangeScope::Any => SceneFilter::All,
                    RangeScope::TargetCategory => context
                        .target_category
                        .as_deref()
                        .map_or(SceneFilter::All, SceneFilter::Only),
                    RangeScope::PreferredScene => {
                        match preference.and_then(|p| p.preferred_scene.as_deref()) {
                            Some(scene) => SceneFilter::Only(scene),
                            None => return 0.0,
                        }
                    }
                };
                feature_range_bonus(candidate, ranges, scene)
            }
            SignalSpec::TagOverlap { per_tag, source } => {
                tag_overlap(candidate, context, source) * per_tag
            }
            SignalSpec::CounterProximity {
                counter,
                max_delta,
                bonus,
            } => match context.target.as_ref() {
                Some(target) => counter_proximity(candidate, target, counter, *max_delta, *bonus),
                None => 0.0,
            },
            SignalSpec::DateProximity { max_days, bonus } => match context.target.as_ref() {
                Some(target) => date_proximity(candidate, target, *max_days, *bonus),
                None => 0.0,
            },
            SignalSpec::Recency { curve } => recency(candidate, context, curve),
            SignalSpec::RepetitionPenalty { penalty } => {
                repetition_penalty(candidate, preference, *penalty)
            }
            SignalSpec::SelfBoost { bonus } => self_boost(candidate, context.self_id, *bonus),
            SignalSpec::InteractionType { weights } => interaction_type_weight(candidate, weights),
            SignalSpec::FlatBonus { bonus, .. } => *bonus,
        }
    }

    /// Every constant carried by the signal, for validation.
    pub(crate) fn constants(&self) -> Vec<f64> {
        match self {
            SignalSpec::CategoricalMatch { bonus }
            | SignalSpec::SelfBoost { bonus }
            | SignalSpec::FlatBonus { bonus, .. } => vec![*bonus],
            SignalSpec::RepetitionPenalty { penalty } => vec![*penalty],
            SignalSpec::PopularityLog { counters }
            | SignalSpec::InversePopularityLog { counters } => {
                counters.iter().map(|c| c.weight).collect()
            }
            SignalSpec::FeatureRange { ranges, .. } => ranges
                .iter()
                .flat_map(|r| [r.min, r.max, r.bonus])
                .collect(),
            SignalSpec::TagOverlap { per_tag, source } => match source {
                TagSource::Scene { scenes } => std::iter::once(*per_tag)
                    .chain(scenes.values().map(|s| s.weight))
                    .collect(),
                _ => vec![*per_tag],
            },
            SignalSpec::CounterProximity { bonus, .. } => vec![*bonus],
            SignalSpec::DateProximity { bonus, .. } => vec![*bonus],
            SignalSpec::Recency { curve } => match curve {
                DecayCurve::DailySteps { steps } => steps.iter().map(|s| s.bonus).collect(),
                DecayCurve::HourlyLinear {
                    base,
                    rate_per_hour,
                } => vec![*base, *rate_per_hour],
            },
            SignalSpec::InteractionType { weights } => weights.values().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SceneFilter<'a> {
    All,
    Only(&'a str),
}

/// Bonus when the candidate's category is preferred. No preference, or an
/// empty preferred list, means nothing is filtered and the bonus applies.
pub fn categorical_match(
    candidate: &Candidate,
    preference: Option<&UserPreference>,
    bonus: f64,
) -> f64 {
    match preference {
        Some(p) if !p.preferred_tags.is_empty() => {
            if p.preferred_tags.iter().any(|t| *t == candidate.category) {
                bonus
            } else {
                0.0
            }
        }
        _ => bonus,
    }
}

/// Σ ln(count + 1) × weight over the named counters.
pub fn popularity_log(candidate: &Candidate, counters: &[CounterWeight]) -> f64 {
    counters
        .iter()
        .map(|c| log_count(candidate.counter(&c.name)) * c.weight)
        .sum()
}

/// Bonus of the first applicable range containing the numeric feature.
pub fn feature_range_bonus(
    candidate: &Candidate,
    ranges: &[FeatureRange],
    scene: SceneFilter<'_>,
) -> f64 {
    let Some(value) = candidate.numeric_feature else {
        return 0.0;
    };

    ranges
        .iter()
        .filter(|r| match scene {
            SceneFilter::All => true,
            SceneFilter::Only(scene) => r
                .scene
                .as_deref()
                .is_some_and(|s| eq_ignore_case(s, scene)),
        })
        .find(|r| r.contains(value))
        .map(|r| r.bonus)
        .unwrap_or(0.0)
}

/// Number of candidate tags found in the source tag set. Scene matches are
/// scaled by the weight of the requested scene.
pub fn tag_overlap(candidate: &Candidate, context: &RankingContext, source: &TagSource) -> f64 {
    match source {
        TagSource::PreferredMoods => match context.user_preference.as_ref() {
            Some(preference) => count_matching(candidate, &preference.preferred_moods) as f64,
            None => 0.0,
        },
        TagSource::TargetCategory => match context.target_category.as_deref() {
            Some(mood) => count_matching(candidate, [mood]) as f64,
            None => 0.0,
        },
        TagSource::Scene { scenes } => {
            let Some(scene) = context.target_category.as_deref().and_then(|requested| {
                scenes
                    .iter()
                    .find(|(name, _)| eq_ignore_case(name, requested))
                    .map(|(_, scene)| scene)
            }) else {
                return 0.0;
            };
            count_matching(candidate, &scene.tags) as f64 * scene.weight
        }
        TagSource::Listed { tags } => count_matching(candidate, tags) as f64,
        TagSource::TargetTags => match context.target.as_ref() {
            Some(target) => candidate.tags.intersection(&target.tags).count() as f64,
            None => 0.0,
        },
    }
}

/// Candidate tags equal, ignoring case, to any of `words`.
fn count_matching<I, S>(candidate: &Candidate, words: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let words: Vec<S> = words.into_iter().collect();
    candidate
        .tags
        .iter()
        .filter(|tag| words.iter().any(|w| eq_ignore_case(w.as_ref(), tag)))
        .count()
}

/// `bonus` when the named counters differ by less than `max_delta`.
pub fn counter_proximity(
    candidate: &Candidate,
    target: &Candidate,
    counter: &str,
    max_delta: u64,
    bonus: f64,
) -> f64 {
    if candidate.counter(counter).abs_diff(target.counter(counter)) < max_delta {
        bonus
    } else {
        0.0
    }
}

/// `bonus` when both creation dates are known and fewer than `max_days`
/// whole days apart.
pub fn date_proximity(candidate: &Candidate, target: &Candidate, max_days: i64, bonus: f64) -> f64 {
    match (candidate.created_at, target.created_at) {
        (Some(a), Some(b)) if (a - b).num_days().abs() < max_days => bonus,
        _ => 0.0,
    }
}

pub fn recency(candidate: &Candidate, context: &RankingContext, curve: &DecayCurve) -> f64 {
    let Some(created_at) = candidate.created_at else {
        return 0.0;
    };

    match curve {
        DecayCurve::DailySteps { steps } => {
            let age = age_in_days(created_at, context.reference_time);
            steps
                .iter()
                .find(|s| age < s.below_days)
                .map(|s| s.bonus)
                .unwrap_or(0.0)
        }
        DecayCurve::HourlyLinear {
            base,
            rate_per_hour,
        } => {
            let age = age_in_hours(created_at, context.reference_time) as f64;
            (base - age * rate_per_hour).max(0.0)
        }
    }
}

/// Negative contribution when the category was just shown to the user.
pub fn repetition_penalty(
    candidate: &Candidate,
    preference: Option<&UserPreference>,
    penalty: f64,
) -> f64 {
    match preference {
        Some(p) if p.last_shown_tags.iter().any(|t| *t == candidate.category) => -penalty,
        _ => 0.0,
    }
}

pub fn self_boost(candidate: &Candidate, self_id: Option<i64>, bonus: f64) -> f64 {
    match (candidate.owner_id, self_id) {
        (Some(owner), Some(me)) if owner == me => bonus,
        _ => 0.0,
    }
}

/// Weight keyed by interaction kind (`like`, `comment`, ...), case-insensitive.
pub fn interaction_type_weight(candidate: &Candidate, weights: &BTreeMap<String, f64>) -> f64 {
    weights
        .iter()
        .find(|(kind, _)| eq_ignore_case(kind, &candidate.category))
        .map(|(_, weight)| *weight)
        .unwrap_or(0.0)
}
