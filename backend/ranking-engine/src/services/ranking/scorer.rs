/// Candidate Scoring
///
/// `score = Σ weight_i × extractor_i(candidate, context)`
///
/// Pure and deterministic: signals are summed in profile order, so identical
/// inputs produce bit-identical scores on every thread.
use crate::models::{Candidate, RankingContext, ScoredCandidate};
use crate::services::profiles::RankingProfile;
use std::collections::BTreeMap;

pub fn score_candidate<'a>(
    candidate: &'a Candidate,
    context: &RankingContext,
    profile: &RankingProfile,
) -> ScoredCandidate<'a> {
    let mut score = 0.0;
    let mut breakdown = BTreeMap::new();

    for ws in &profile.signals {
        let contribution = ws.weight * ws.signal.extract(candidate, context);
        score += contribution;
        *breakdown
            .entry(ws.signal.name().to_string())
            .or_insert(0.0) += contribution;
    }

    ScoredCandidate {
        candidate,
        score,
        breakdown,
    }
}
