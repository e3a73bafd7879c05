use super::{scorer::score_candidate, RankingError, Result};
use crate::config::EngineConfig;
use crate::models::{Candidate, RankingContext, RankingResult, RankingStats, ScoredCandidate};
use crate::services::diversity::{DiversityConfig, DiversityLayer};
use crate::services::profiles::{ProfileRegistry, RankingProfile};
use rayon::prelude::*;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Candidate counts at or above this are scored on the rayon pool
const DEFAULT_PARALLEL_THRESHOLD: usize = 2048;

/// Ranking Pipeline - public entry point of the engine
///
/// gates → score → sort (score desc, id asc) → min-score → diversity → truncate
///
/// Stateless between calls and safe to share across threads; every call owns
/// its candidates, context and profile.
#[derive(Debug, Clone)]
pub struct RankingPipeline {
    parallel_threshold: usize,
    diversity: DiversityConfig,
}

impl Default for RankingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RankingPipeline {
    pub fn new() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            diversity: DiversityConfig::default(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            parallel_threshold: config.parallel_threshold,
            diversity: DiversityConfig {
                min_distinct_before_cap: config.min_distinct_before_cap,
                max_consecutive_same: config.max_consecutive_same,
            },
        }
    }

    /// Set the candidate count from which scoring runs in parallel
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_diversity(mut self, diversity: DiversityConfig) -> Self {
        self.diversity = diversity;
        self
    }

    /// Rank `candidates` for one request.
    ///
    /// # Errors
    /// `InvalidArgument` for a negative `limit`, a profile without signals,
    /// or a gated profile whose context lacks the required target.
    pub fn rank<'a>(
        &self,
        candidates: &'a [Candidate],
        context: &RankingContext,
        profile: &RankingProfile,
        limit: i32,
    ) -> Result<RankingResult<'a>> {
        self.rank_with_stats(candidates, context, profile, limit)
            .map(|(ranked, _)| ranked)
    }

    /// Resolve `profile_name` in `registry`, then rank.
    pub fn rank_named<'a>(
        &self,
        registry: &ProfileRegistry,
        profile_name: &str,
        candidates: &'a [Candidate],
        context: &RankingContext,
        limit: i32,
    ) -> Result<RankingResult<'a>> {
        let profile = registry.get(profile_name)?;
        self.rank(candidates, context, profile, limit)
    }

    pub fn rank_with_stats<'a>(
        &self,
        candidates: &'a [Candidate],
        context: &RankingContext,
        profile: &RankingProfile,
        limit: i32,
    ) -> Result<(RankingResult<'a>, RankingStats)> {
        let limit = validate_limit(limit)?;
        profile.validate()?;

        if profile.gates.iter().any(|g| g.needs_target()) && context.target.is_none() {
            return Err(RankingError::InvalidArgument(format!(
                "profile '{}' requires a target candidate in the context",
                profile.name
            )));
        }

        let mut stats = RankingStats {
            input_count: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() || limit == 0 {
            return Ok((Vec::new(), stats));
        }

        let eligible: Vec<&'a Candidate> = candidates
            .iter()
            .filter(|c| profile.gates.iter().all(|g| g.admits(c, context)))
            .collect();
        stats.gated_count = eligible.len();

        debug!(
            profile = %profile.name,
            input_count = stats.input_count,
            gated_count = stats.gated_count,
            "Profile gates applied"
        );

        let mut scored = self.score_all(&eligible, context, profile);

        // Sort happens after every score is in, so parallel scoring cannot
        // affect the order.
        scored.sort_by(compare_ranked);

        if let Some(threshold) = profile.min_score {
            scored.retain(|c| c.score >= threshold);
        }
        stats.scored_count = scored.len();

        let diversity = DiversityLayer::new(profile.diversity.unwrap_or(self.diversity));
        let ranked = diversity.rerank(scored, limit);
        stats.returned_count = ranked.len();

        info!(
            profile = %profile.name,
            input_count = stats.input_count,
            returned_count = stats.returned_count,
            top_score = ranked.first().map(|c| c.score),
            "Ranking completed"
        );

        Ok((ranked, stats))
    }

    fn score_all<'a>(
        &self,
        eligible: &[&'a Candidate],
        context: &RankingContext,
        profile: &RankingProfile,
    ) -> Vec<ScoredCandidate<'a>> {
        if eligible.len() >= self.parallel_threshold {
            debug!(
                candidate_count = eligible.len(),
                "Scoring candidates in parallel"
            );
            eligible
                .par_iter()
                .map(|&c| score_candidate(c, context, profile))
                .collect()
        } else {
            eligible
                .iter()
                .map(|&c| score_candidate(c, context, profile))
                .collect()
        }
    }
}

fn validate_limit(limit: i32) -> Result<usize> {
    usize::try_from(limit).map_err(|_| {
        RankingError::InvalidArgument(format!("limit must be non-negative, got {}", limit))
    })
}

/// Score descending, then id ascending for reproducible ties.
fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.candidate.id.cmp(&b.candidate.id))
}
