pub mod diversity;
pub mod preferences;
pub mod profiles;
pub mod ranking;
pub mod signals;

pub use diversity::{DiversityConfig, DiversityLayer};
pub use preferences::{InMemoryPreferenceCache, PreferenceCache, PreferenceResolver, PreferenceStore};
pub use profiles::{CandidateGate, ProfileRegistry, RankingProfile, WeightedSignal};
pub use ranking::{RankingError, RankingPipeline};
pub use signals::SignalSpec;
