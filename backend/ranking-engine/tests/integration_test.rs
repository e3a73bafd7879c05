use chrono::{DateTime, Duration, TimeZone, Utc};
use ranking_engine::services::profiles::{ACTIVITY_COUNT, LIKE_COUNT, PLAY_COUNT};
use ranking_engine::services::{DiversityConfig, InMemoryPreferenceCache, PreferenceResolver, PreferenceStore};
use ranking_engine::{
    Candidate, EngineConfig, ProfileRegistry, RankingContext, RankingError, RankingPipeline,
    RankingProfile, ScoredCandidate, UserPreference,
};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn ids(ranked: &[ScoredCandidate]) -> Vec<i64> {
    ranked.iter().map(|c| c.id()).collect()
}

fn pop_fan() -> UserPreference {
    UserPreference {
        preferred_tags: vec!["pop".to_string()],
        ..Default::default()
    }
}

#[test]
fn test_end_to_end_personalized() {
    init_tracing();
    let pipeline = RankingPipeline::new();
    let pool = vec![
        Candidate::new(1, "pop")
            .with_counter(PLAY_COUNT, 1000)
            .with_created_at(now() - Duration::days(2)),
        Candidate::new(2, "jazz")
            .with_counter(PLAY_COUNT, 50)
            .with_created_at(now() - Duration::days(60)),
    ];
    let context = RankingContext::new(now()).with_preference(pop_fan());

    let ranked = pipeline
        .rank(&pool, &context, &RankingProfile::personalized(), 2)
        .unwrap();

    assert_eq!(ids(&ranked), vec![1, 2]);
    let popularity_delta = (1001f64.ln() - 51f64.ln()) * 0.2;
    assert!(ranked[0].score - ranked[1].score >= 4.0 + popularity_delta - 1e-9);
}

#[test]
fn test_empty_inputs_return_empty() {
    let pipeline = RankingPipeline::new();
    let context = RankingContext::new(now());
    let profile = RankingProfile::personalized();
    let pool = vec![Candidate::new(1, "pop")];

    assert!(pipeline.rank(&[], &context, &profile, 10).unwrap().is_empty());
    assert!(pipeline.rank(&pool, &context, &profile, 0).unwrap().is_empty());
}

#[test]
fn test_popularity_is_monotonic() {
    let pipeline = RankingPipeline::new();
    let context = RankingContext::new(now());
    let pool = vec![
        Candidate::new(1, "pop").with_counter(PLAY_COUNT, 10),
        Candidate::new(2, "pop").with_counter(PLAY_COUNT, 11),
    ];

    let ranked = pipeline
        .rank(&pool, &context, &RankingProfile::personalized(), 2)
        .unwrap();

    assert_eq!(ids(&ranked), vec![2, 1]);
    assert!(ranked[0].score >= ranked[1].score);
}

#[test]
fn test_tie_break_is_stable_across_runs() {
    let pipeline = RankingPipeline::new();
    let context = RankingContext::new(now());
    let pool = vec![Candidate::new(5, "pop"), Candidate::new(3, "pop")];

    for _ in 0..10 {
        let ranked = pipeline
            .rank(&pool, &context, &RankingProfile::personalized(), 2)
            .unwrap();
        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ids(&ranked), vec![3, 5]);
    }
}

#[test]
fn test_diversity_surfaces_minority_category() {
    let pipeline = RankingPipeline::new();
    let context = RankingContext::new(now());
    let mut pool: Vec<Candidate> = (1..=10)
        .map(|id| Candidate::new(id, "pop").with_counter(PLAY_COUNT, 1000 - id as u64))
        .collect();
    pool.push(Candidate::new(11, "jazz").with_counter(PLAY_COUNT, 5));

    let ranked = pipeline
        .rank(&pool, &context, &RankingProfile::popular(), 5)
        .unwrap();

    assert_eq!(ranked.len(), 5);
    assert!(ids(&ranked).contains(&11));
}

#[test]
fn test_full_catalog_of_one_category() {
    init_tracing();
    let pipeline = RankingPipeline::new();
    let pool: Vec<Candidate> = (1..=50_000)
        .map(|id| Candidate::new(id, "pop").with_counter(PLAY_COUNT, 100_000 - id as u64))
        .collect();

    let ranked = pipeline
        .rank(&pool, &RankingContext::new(now()), &RankingProfile::popular(), 50_000)
        .unwrap();

    assert_eq!(ranked.len(), 50_000);
    assert!(ranked.iter().zip(1..).all(|(c, id)| c.id() == id));
}

#[test]
fn test_recency_orders_newest_first() {
    let pipeline = RankingPipeline::new();
    let context = RankingContext::new(now());
    let pool = vec![
        Candidate::new(1, "pop").with_created_at(now() - Duration::days(100)),
        Candidate::new(2, "rock").with_created_at(now() - Duration::days(20)),
        Candidate::new(3, "jazz").with_created_at(now() - Duration::days(1)),
    ];

    let ranked = pipeline
        .rank(&pool, &context, &RankingProfile::discovery(), 3)
        .unwrap();

    assert_eq!(ids(&ranked), vec![3, 2, 1]);
    assert_eq!(ranked[0].contribution("recency"), 3.0);
    assert_eq!(ranked[1].contribution("recency"), 1.5);
    assert_eq!(ranked[2].contribution("recency"), 0.0);
}

#[test]
fn test_scene_profile_prefers_matching_tempo_and_moods() {
    let pipeline = RankingPipeline::new();
    let context = RankingContext::new(now()).with_target_category("sport");
    let pool = vec![
        Candidate::new(1, "electronic")
            .with_feature(140.0)
            .with_tags(["energetic", "upbeat"]),
        Candidate::new(2, "ambient")
            .with_feature(70.0)
            .with_tags(["calm", "focus"])
            .with_counter(PLAY_COUNT, 5000),
        Candidate::new(3, "rock").with_feature(128.0).with_tags(["calm"]),
    ];

    let ranked = pipeline
        .rank(&pool, &context, &RankingProfile::scene(), 3)
        .unwrap();

    assert_eq!(ids(&ranked), vec![1, 3, 2]);
    // Sport moods carry a 1.5 weight per tag
    assert_eq!(ranked[0].contribution("scene_tag_overlap"), 3.0);
    assert_eq!(ranked[0].contribution("scene_feature_range"), 2.5);
}

#[test]
fn test_mood_profile_uses_requested_mood() {
    let pipeline = RankingPipeline::new();
    let context = RankingContext::new(now()).with_target_category("Happy");
    let pool = vec![
        Candidate::new(1, "pop").with_tags(["sad"]).with_counter(LIKE_COUNT, 10_000),
        Candidate::new(2, "pop").with_tags(["happy"]).with_counter(LIKE_COUNT, 3),
    ];

    let ranked = pipeline
        .rank(&pool, &context, &RankingProfile::mood(), 2)
        .unwrap();

    assert_eq!(ids(&ranked), vec![2, 1]);
}

#[test]
fn test_discovery_excludes_popular_songs() {
    let pipeline = RankingPipeline::new();
    let context = RankingContext::new(now());
    let pool = vec![
        Candidate::new(1, "pop").with_counter(PLAY_COUNT, 5000),
        Candidate::new(2, "pop").with_counter(PLAY_COUNT, 80),
        Candidate::new(3, "pop").with_counter(PLAY_COUNT, 2),
    ];

    let (ranked, stats) = pipeline
        .rank_with_stats(&pool, &context, &RankingProfile::discovery(), 10)
        .unwrap();

    assert_eq!(ids(&ranked), vec![3, 2]);
    assert_eq!(stats.gated_count, 2);
}

#[test]
fn test_similarity_filters_then_ranks() {
    let pipeline = RankingPipeline::new();
    let seed = Candidate::new(10, "rock")
        .with_feature(120.0)
        .with_tags(["energetic", "passionate"]);
    let pool = vec![
        seed.clone(),
        Candidate::new(11, "rock")
            .with_feature(110.0)
            .with_tags(["energetic"])
            .with_counter(PLAY_COUNT, 10),
        Candidate::new(12, "rock")
            .with_feature(135.0)
            .with_tags(["passionate"])
            .with_counter(PLAY_COUNT, 900),
        Candidate::new(13, "rock")
            .with_feature(160.0)
            .with_tags(["energetic"])
            .with_counter(PLAY_COUNT, 99_999),
        Candidate::new(14, "pop")
            .with_feature(120.0)
            .with_tags(["energetic"])
            .with_counter(PLAY_COUNT, 99_999),
    ];
    let context = RankingContext::new(now()).with_target(seed);

    let ranked = pipeline
        .rank(&pool, &context, &RankingProfile::similarity(), 10)
        .unwrap();

    assert_eq!(ids(&ranked), vec![12, 11]);
}

#[test]
fn test_trending_social_ranks_own_content_first() {
    let pipeline = RankingPipeline::new();
    let context = RankingContext::new(now()).with_self_id(1);
    let pool = vec![
        Candidate::new(100, "FOLLOW")
            .with_owner(2)
            .with_created_at(now() - Duration::hours(1)),
        Candidate::new(101, "LIKE")
            .with_owner(1)
            .with_created_at(now() - Duration::hours(1)),
        Candidate::new(102, "SHARE")
            .with_owner(3)
            .with_created_at(now() - Duration::hours(1)),
        Candidate::new(103, "COMMENT")
            .with_owner(4)
            .with_created_at(now() - Duration::hours(1)),
    ];

    let ranked = pipeline
        .rank(&pool, &context, &RankingProfile::trending_social(), 4)
        .unwrap();

    assert_eq!(ids(&ranked), vec![101, 100, 102, 103]);
}

#[test]
fn test_social_feed_decays_hourly() {
    let pipeline = RankingPipeline::new();
    let context = RankingContext::new(now()).with_self_id(1);
    let pool = vec![
        Candidate::new(1, "LIKE")
            .with_owner(5)
            .with_created_at(now() - Duration::hours(40)),
        Candidate::new(2, "LIKE")
            .with_owner(6)
            .with_created_at(now() - Duration::hours(2)),
        Candidate::new(3, "COMMENT")
            .with_owner(7)
            .with_created_at(now() - Duration::hours(10)),
    ];

    let ranked = pipeline
        .rank(&pool, &context, &RankingProfile::social_feed(), 3)
        .unwrap();

    assert_eq!(ids(&ranked), vec![2, 3, 1]);
    assert_eq!(ranked[0].score, 20.0 + 15.0 + 28.0);
    assert_eq!(ranked[2].score, 35.0);
}

#[test]
fn test_user_similarity_suggests_accounts_to_follow() {
    let pipeline = RankingPipeline::new();
    let joined = now() - Duration::days(100);
    let me = Candidate::new(1, "user")
        .with_tags(["20", "21", "22"])
        .with_counter(ACTIVITY_COUNT, 40)
        .with_created_at(joined);
    let pool = vec![
        me.clone(),
        // already followed
        Candidate::new(20, "user").with_tags(["21", "22"]),
        Candidate::new(30, "user")
            .with_tags(["21"])
            .with_counter(ACTIVITY_COUNT, 45)
            .with_created_at(joined + Duration::days(10)),
        Candidate::new(31, "user")
            .with_tags(["20", "21", "22"])
            .with_counter(ACTIVITY_COUNT, 500),
        Candidate::new(32, "user")
            .with_counter(ACTIVITY_COUNT, 38)
            .with_created_at(joined - Duration::days(400)),
        Candidate::new(33, "user"),
    ];
    let context = RankingContext::new(now())
        .with_self_id(1)
        .with_target(me)
        .with_excluded_ids([20, 21, 22]);

    let (ranked, stats) = pipeline
        .rank_with_stats(&pool, &context, &RankingProfile::user_similarity(), 10)
        .unwrap();

    assert_eq!(stats.gated_count, 4);
    assert_eq!(ids(&ranked), vec![31, 30, 32, 33]);
    assert_eq!(ranked[0].score, 30.0);
    assert_eq!(ranked[1].score, 10.0 + 5.0 + 3.0);
    assert_eq!(ranked[2].score, 5.0);
    assert_eq!(ranked[3].score, 0.0);
}

#[test]
fn test_named_profile_and_config() {
    let config = EngineConfig::default();
    let pipeline = RankingPipeline::from_config(&config);
    let registry = ProfileRegistry::builtin();
    let pool = vec![
        Candidate::new(1, "pop").with_counter(PLAY_COUNT, 10),
        Candidate::new(2, "pop").with_counter(PLAY_COUNT, 20),
    ];

    let ranked = pipeline
        .rank_named(
            &registry,
            "popular",
            &pool,
            &RankingContext::new(now()),
            config.default_limit,
        )
        .unwrap();

    assert_eq!(ids(&ranked), vec![2, 1]);
    assert!(matches!(
        pipeline.rank_named(&registry, "missing", &pool, &RankingContext::new(now()), 5),
        Err(RankingError::UnknownProfile(_))
    ));
}

#[test]
fn test_inputs_are_left_untouched() {
    let pipeline = RankingPipeline::new().with_diversity(DiversityConfig::default());
    let pool: Vec<Candidate> = (1..=20)
        .map(|id| Candidate::new(id, "pop").with_counter(PLAY_COUNT, id as u64))
        .collect();
    let before = pool.clone();
    let context = RankingContext::new(now()).with_preference(pop_fan());

    let _ = pipeline
        .rank(&pool, &context, &RankingProfile::personalized(), 5)
        .unwrap();

    assert_eq!(pool, before);
}

#[test]
fn test_concurrent_calls_share_nothing() {
    let pipeline = Arc::new(RankingPipeline::new().with_parallel_threshold(8));
    let pool: Arc<Vec<Candidate>> = Arc::new(
        (1..=64)
            .map(|id| {
                Candidate::new(id, ["pop", "rock", "jazz"][(id % 3) as usize])
                    .with_counter(PLAY_COUNT, (id as u64 * 7919) % 500)
            })
            .collect(),
    );
    let expected = ids(
        &pipeline
            .rank(&pool, &RankingContext::new(now()), &RankingProfile::popular(), 10)
            .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                ids(&pipeline
                    .rank(&pool, &RankingContext::new(now()), &RankingProfile::popular(), 10)
                    .unwrap())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

struct FixedStore;

#[async_trait::async_trait]
impl PreferenceStore for FixedStore {
    async fn find_by_user_id(&self, user_id: i64) -> anyhow::Result<Option<UserPreference>> {
        Ok((user_id == 1).then(pop_fan))
    }
}

#[tokio::test]
async fn test_resolved_preference_drives_ranking() {
    let resolver = PreferenceResolver::new(
        FixedStore,
        InMemoryPreferenceCache::from_config(&EngineConfig::default()),
    );
    let pipeline = RankingPipeline::new();
    let pool = vec![Candidate::new(1, "jazz"), Candidate::new(2, "pop")];

    let fan = RankingContext {
        user_preference: resolver.resolve(1).await.unwrap(),
        ..RankingContext::new(now())
    };
    let stranger = RankingContext {
        user_preference: resolver.resolve(2).await.unwrap(),
        ..RankingContext::new(now())
    };

    let profile = RankingProfile::personalized();
    assert_eq!(ids(&pipeline.rank(&pool, &fan, &profile, 2).unwrap()), vec![2, 1]);
    // Unknown users get the neutral default: both match, id breaks the tie
    assert_eq!(ids(&pipeline.rank(&pool, &stranger, &profile, 2).unwrap()), vec![1, 2]);
}
