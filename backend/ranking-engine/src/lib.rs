pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{Config, EngineConfig};
pub use models::{Candidate, RankingContext, RankingResult, ScoredCandidate, UserPreference};
pub use services::{
    DiversityLayer, ProfileRegistry, RankingError, RankingPipeline, RankingProfile, SignalSpec,
};
