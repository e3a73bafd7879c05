/// Ranking Module
///
/// Deterministic, explainable multi-signal ranking for songs and social
/// interactions.
///
/// # Architecture
/// - **Scorer**: weighted sum of signal extractors with a per-signal breakdown
/// - **Pipeline**: gates → scoring → sort (score desc, id asc) → diversity → truncation
///
/// # Workflow
/// 1. Caller fetches candidates and the user preference
/// 2. Pipeline drops candidates rejected by profile gates
/// 3. Every survivor is scored (in parallel for large sets)
/// 4. Sorted output is reordered by the diversity layer and truncated
pub mod pipeline;
pub mod scorer;

pub use pipeline::RankingPipeline;
pub use scorer::score_candidate;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown ranking profile: {0}")]
    UnknownProfile(String),

    #[error("Profile decoding failed: {0}")]
    ProfileDecode(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] envy::Error),

    #[error("Preference store error: {0}")]
    PreferenceStore(String),
}

pub type Result<T> = std::result::Result<T, RankingError>;
