//! End-to-end matching pipeline scenarios against a seeded database and a
//! stub provider: fuzzy matching, UFC word-boundary matching, segment
//! expansion, keyword consolidation, and cache origin preservation.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use matcharr::config::DatabaseConfig;
use matcharr::database::{self, Database};
use matcharr::dispatcharr::DispatcharrClient;
use matcharr::matching::classifier::{CardSegment, Classifier};
use matcharr::matching::event_card::EventCardMatcher;
use matcharr::matching::normalizer::normalize;
use matcharr::matching::outcome::{FailedReason, MatchMethod, MatchOutcome};
use matcharr::matching::patterns::{DetectionKeywordService, PatternSet};
use matcharr::matching::team_matcher::{MatchContext, TeamMatcher};
use matcharr::matching::ufc_segments::{expand_ufc_segments, MatchedStream};
use matcharr::models::settings::{CreateTiming, DeleteTiming, DurationSettings, TemplateSettings};
use matcharr::models::{
    DuplicateMode, Event, EventStatus, GroupCreateRequest, KeywordCreateRequest, SourceStream,
    Team,
};
use matcharr::providers::{ProviderRegistry, SportsProvider};
use matcharr::services::channel_manager::{ChannelManager, ChannelRunContext};
use matcharr::services::league_mappings::LeagueMappingService;
use matcharr::services::lifecycle::LifecycleManager;
use std::sync::Arc;
use uuid::Uuid;

struct StubProvider {
    events: Vec<Event>,
}

#[async_trait]
impl SportsProvider for StubProvider {
    fn name(&self) -> &'static str {
        "espn"
    }

    fn supports_league(&self, league: &str) -> bool {
        self.events.iter().any(|e| e.league == league)
    }

    fn get_supported_leagues(&self) -> Vec<String> {
        let mut leagues: Vec<String> = self.events.iter().map(|e| e.league.clone()).collect();
        leagues.dedup();
        leagues
    }

    async fn get_events(&self, league: &str, date: NaiveDate) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.league == league && e.start_time.date_naive() == date)
            .cloned()
            .collect()
    }

    async fn get_event(&self, id: &str, league: &str) -> Option<Event> {
        self.events
            .iter()
            .find(|e| e.id == id && e.league == league)
            .cloned()
    }

    async fn get_team(&self, _id: &str, _league: &str) -> Option<Team> {
        None
    }

    async fn get_league_teams(&self, _league: &str) -> Vec<Team> {
        Vec::new()
    }
}

fn team(id: &str, name: &str, abbrev: &str) -> Team {
    Team {
        id: id.to_string(),
        name: name.to_string(),
        short_name: None,
        abbreviation: Some(abbrev.to_string()),
        logo_url: None,
        sport: None,
    }
}

fn nfl_event(
    id: &str,
    home: Team,
    away: Team,
    start: chrono::DateTime<Utc>,
) -> Event {
    Event {
        id: id.to_string(),
        provider: "espn".to_string(),
        name: format!("{} at {}", away.name, home.name),
        start_time: start,
        home_team: Some(home),
        away_team: Some(away),
        status: EventStatus {
            state: "scheduled".to_string(),
            detail: String::new(),
        },
        sport: "football".to_string(),
        league: "nfl".to_string(),
        home_score: None,
        away_score: None,
        venue: Some("Lambeau Field".to_string()),
        broadcasts: vec!["FOX".to_string()],
        season: Some(2024),
        segment_times: Default::default(),
        main_card_start: None,
    }
}

async fn test_database() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}/test.db", dir.path().display());
    let database = Database::new(&DatabaseConfig {
        url,
        max_connections: Some(2),
    })
    .await
    .expect("database");
    database.migrate().await.expect("migrations");
    (database, dir)
}

async fn seed_nfl_teams(database: &Database) {
    let teams = [
        ("8", "Detroit Lions", "DET", "Lions"),
        ("9", "Green Bay Packers", "GB", "Packers"),
        ("6", "Dallas Cowboys", "DAL", "Cowboys"),
        ("19", "New York Giants", "NYG", "Giants"),
    ];
    for (id, name, abbrev, short) in teams {
        sqlx::query(
            "INSERT INTO team_cache
                (provider, provider_team_id, league, team_name, team_abbrev,
                 team_short_name, sport, logo_url)
             VALUES ('espn', ?, 'nfl', ?, ?, ?, 'football', NULL)",
        )
        .bind(id)
        .bind(name)
        .bind(abbrev)
        .bind(short)
        .execute(database.pool())
        .await
        .expect("seed team");
    }
}

async fn seed_league(database: &Database, code: &str, sport: &str) {
    sqlx::query(
        "INSERT INTO leagues (league_code, provider, provider_league_id, sport, display_name)
         VALUES (?, 'espn', ?, ?, ?)",
    )
    .bind(code)
    .bind(code)
    .bind(sport)
    .bind(code.to_uppercase())
    .execute(database.pool())
    .await
    .expect("seed league");
}

async fn registry_with(database: &Database, events: Vec<Event>) -> ProviderRegistry {
    let mappings = LeagueMappingService::load(database.pool())
        .await
        .expect("mappings");
    ProviderRegistry::from_providers(vec![Arc::new(StubProvider { events })], mappings)
}

fn match_ctx(group_id: Uuid, target: NaiveDate) -> MatchContext {
    MatchContext {
        group_id,
        group_leagues: vec!["nfl".to_string()],
        target_date: target,
        generation: 1,
        user_tz: chrono_tz::America::New_York,
    }
}

/// S1 — basic fuzzy match against two events on the target date.
#[tokio::test]
async fn s1_basic_fuzzy_match() {
    let (database, _dir) = test_database().await;
    seed_nfl_teams(&database).await;
    seed_league(&database, "nfl", "football").await;

    let start = Utc.with_ymd_and_hms(2024, 11, 28, 18, 0, 0).unwrap();
    let registry = registry_with(
        &database,
        vec![
            nfl_event(
                "401",
                team("8", "Detroit Lions", "DET"),
                team("9", "Green Bay Packers", "GB"),
                start,
            ),
            nfl_event(
                "402",
                team("6", "Dallas Cowboys", "DAL"),
                team("19", "New York Giants", "NYG"),
                start,
            ),
        ],
    )
    .await;

    let classifier = Classifier::new(DetectionKeywordService::default());
    let classified = classifier.classify(normalize("DETROIT LIONS VS GREEN BAY PACKERS 11/28/2024"));
    let matcher = TeamMatcher::new(database.pool().clone(), registry);

    let target = NaiveDate::from_ymd_opt(2024, 11, 28).unwrap();
    let outcome = matcher
        .match_stream(&classified, &match_ctx(Uuid::new_v4(), target))
        .await;

    match outcome {
        MatchOutcome::Matched {
            event,
            method,
            confidence,
            ..
        } => {
            assert_eq!(event.id, "401");
            assert_eq!(method, MatchMethod::Fuzzy);
            assert!(confidence >= 0.85, "confidence was {confidence}");
        }
        other => panic!("expected match, got {other:?}"),
    }
}

/// S2 — "UFC 32" must not match "UFC 325" (word-boundary rule).
#[tokio::test]
async fn s2_ufc_word_boundary() {
    let (database, _dir) = test_database().await;
    seed_league(&database, "ufc", "mma").await;

    let start = Utc.with_ymd_and_hms(2025, 5, 10, 22, 0, 0).unwrap();
    let mut ufc_event = nfl_event(
        "600",
        team("f1", "John Smith", "SMI"),
        team("f2", "Bob Jones", "JON"),
        start,
    );
    ufc_event.name = "UFC 325: Smith vs Jones".to_string();
    ufc_event.sport = "mma".to_string();
    ufc_event.league = "ufc".to_string();

    let registry = registry_with(&database, vec![ufc_event]).await;
    let classifier = Classifier::new(DetectionKeywordService::default());
    let classified = classifier.classify(normalize("UFC 32 Early Prelims"));
    let matcher = EventCardMatcher::new(database.pool().clone(), registry);

    // Stub events are UTC-dated; pick the matching target day in UTC
    let target = NaiveDate::from_ymd_opt(2025, 5, 10).unwrap();
    let mut ctx = match_ctx(Uuid::new_v4(), target);
    ctx.user_tz = chrono_tz::UTC;

    let outcome = matcher.match_stream(&classified, "ufc", &ctx).await;
    match outcome {
        MatchOutcome::Failed { reason, .. } => {
            assert_eq!(reason, FailedReason::NoEventCardMatch);
        }
        other => panic!("expected NO_EVENT_CARD_MATCH, got {other:?}"),
    }
}

/// S3 — UFC segment expansion with ESPN segment times.
#[tokio::test]
async fn s3_ufc_segment_expansion() {
    let early = Utc.with_ymd_and_hms(2025, 5, 10, 22, 0, 0).unwrap();
    let prelims = Utc.with_ymd_and_hms(2025, 5, 10, 23, 30, 0).unwrap();
    let main_card = Utc.with_ymd_and_hms(2025, 5, 11, 2, 0, 0).unwrap();

    let mut event = nfl_event(
        "600051598",
        team("f1", "Belal Muhammad", "MUH"),
        team("f2", "Jack Della Maddalena", "DEL"),
        early,
    );
    event.name = "UFC 315: Muhammad vs Della Maddalena".to_string();
    event.sport = "mma".to_string();
    event.league = "ufc".to_string();
    event.segment_times = [
        ("early_prelims".to_string(), early),
        ("prelims".to_string(), prelims),
        ("main_card".to_string(), main_card),
    ]
    .into_iter()
    .collect();

    let make = |id: i64, name: &str, segment: CardSegment| MatchedStream {
        stream: SourceStream {
            id,
            name: name.to_string(),
            url: None,
            m3u_account_id: None,
            m3u_account_name: None,
            group_title: None,
        },
        event: event.clone(),
        method: MatchMethod::Keyword,
        origin_method: None,
        league: "ufc".to_string(),
        confidence: 1.0,
        card_segment: Some(segment),
        extracted_time: None,
        segment: None,
    };

    let patterns = PatternSet::build(&[]);
    let expanded = expand_ufc_segments(
        vec![
            make(1, "UFC 315 Early Prelims", CardSegment::EarlyPrelims),
            make(2, "UFC 315 Prelims", CardSegment::Prelims),
            make(3, "UFC 315 Main Card", CardSegment::MainCard),
        ],
        &patterns,
        5.0,
        chrono_tz::America::New_York,
    );

    assert_eq!(expanded.len(), 3);
    let by_code = |code: &str| {
        expanded
            .iter()
            .find(|m| m.segment.as_ref().unwrap().code == code)
            .unwrap()
            .segment
            .clone()
            .unwrap()
    };

    let early_info = by_code("early_prelims");
    assert_eq!(early_info.start, early);
    assert_eq!(early_info.end, prelims);

    let prelims_info = by_code("prelims");
    assert_eq!(prelims_info.start, prelims);
    assert_eq!(prelims_info.end, main_card);

    let main_info = by_code("main_card");
    assert_eq!(main_info.start, main_card);
    // Last segment: estimated as start + mma_duration / 2
    assert_eq!(main_info.end, main_card + chrono::Duration::minutes(150));
}

/// S4 — keyword consolidation: Spanish feeds land on a second channel.
#[tokio::test]
async fn s4_keyword_consolidation() {
    let (database, _dir) = test_database().await;
    seed_league(&database, "nfl", "football").await;

    let group = database::groups::create_group(
        database.pool(),
        &GroupCreateRequest {
            name: "NFL Games".to_string(),
            m3u_account_id: None,
            m3u_group_id: None,
            leagues: vec!["nfl".to_string()],
            parent_group_id: None,
            channel_assignment_mode: None,
            channel_start_number: Some(101),
            sort_order: Some(0),
            duplicate_mode: Some(DuplicateMode::Consolidate),
        },
    )
    .await
    .expect("group");

    database::keywords::create_exception_keyword(
        database.pool(),
        &KeywordCreateRequest {
            label: "Spanish".to_string(),
            match_terms: "Spanish, En Español".to_string(),
            behavior: matcharr::models::ExceptionBehavior::Consolidate,
            enabled: true,
        },
    )
    .await
    .expect("keyword");
    let keywords = database::keywords::list_exception_keywords(database.pool(), true)
        .await
        .expect("keywords");

    // Event starting now so same_day create timing is already reached
    let event = nfl_event(
        "401",
        team("8", "Detroit Lions", "DET"),
        team("9", "Green Bay Packers", "GB"),
        Utc::now(),
    );

    let make = |id: i64, name: &str| MatchedStream {
        stream: SourceStream {
            id,
            name: name.to_string(),
            url: None,
            m3u_account_id: Some(1),
            m3u_account_name: Some("main".to_string()),
            group_title: None,
        },
        event: event.clone(),
        method: MatchMethod::Fuzzy,
        origin_method: None,
        league: "nfl".to_string(),
        confidence: 0.95,
        card_segment: None,
        extracted_time: None,
        segment: None,
    };

    let lifecycle = LifecycleManager::new(
        CreateTiming::SameDay,
        DeleteTiming::DayAfter,
        DurationSettings::default(),
        false,
        chrono_tz::America::New_York,
    );
    let templates = TemplateSettings::default();
    let ctx = ChannelRunContext {
        lifecycle: &lifecycle,
        keywords: &keywords,
        templates: &templates,
        profile_ids: vec![],
        user_tz: chrono_tz::America::New_York,
    };

    let manager = ChannelManager::new(
        database.clone(),
        DispatcharrClient::from_settings(&Default::default(), 30).unwrap(),
    );
    let result = manager
        .process_group_matches(
            &group,
            &[
                make(11, "Lions @ Packers"),
                make(12, "Lions @ Packers Spanish"),
                make(13, "Lions @ Packers En Español"),
            ],
            &ctx,
        )
        .await;

    assert_eq!(result.channels_created, 2);

    let channels = database::channels::get_channels_for_group(database.pool(), group.id, false)
        .await
        .expect("channels");
    assert_eq!(channels.len(), 2);

    let main = channels
        .iter()
        .find(|c| c.exception_keyword.is_none())
        .expect("main channel");
    let spanish = channels
        .iter()
        .find(|c| c.exception_keyword.as_deref() == Some("Spanish"))
        .expect("spanish channel");

    let main_streams = database::streams::get_channel_streams(database.pool(), main.id)
        .await
        .expect("main streams");
    let spanish_streams = database::streams::get_channel_streams(database.pool(), spanish.id)
        .await
        .expect("spanish streams");

    assert_eq!(main_streams.len(), 1);
    assert_eq!(main_streams[0].dispatcharr_stream_id, 11);
    assert_eq!(spanish_streams.len(), 2);

    // Live tvg_ids are unique and channel numbers don't collide
    assert_ne!(main.tvg_id, spanish.tvg_id);
    assert_ne!(main.channel_number, spanish.channel_number);
}

/// S6 — cache hits preserve the original match method across runs.
#[tokio::test]
async fn s6_cache_origin_preservation() {
    let (database, _dir) = test_database().await;
    seed_nfl_teams(&database).await;
    seed_league(&database, "nfl", "football").await;

    let start = Utc.with_ymd_and_hms(2024, 11, 28, 18, 0, 0).unwrap();
    let original = nfl_event(
        "401",
        team("8", "Detroit Lions", "DET"),
        team("9", "Green Bay Packers", "GB"),
        start,
    );
    let registry = registry_with(&database, vec![original.clone()]).await;

    let classifier = Classifier::new(DetectionKeywordService::default());
    let matcher = TeamMatcher::new(database.pool().clone(), registry);
    let target = NaiveDate::from_ymd_opt(2024, 11, 28).unwrap();
    let group_id = Uuid::new_v4();

    // Run N: fresh fuzzy match, written to the cache
    let classified = classifier.classify(normalize("Detroit Lions vs Green Bay Packers"));
    let first = matcher
        .match_stream(&classified, &match_ctx(group_id, target))
        .await;
    assert_eq!(first.effective_method(), Some(MatchMethod::Fuzzy));

    // Runs N+1..N+5: all cache hits, all still reporting fuzzy origin
    for generation in 2..=6 {
        let mut ctx = match_ctx(group_id, target);
        ctx.generation = generation;
        let outcome = matcher.match_stream(&classified, &ctx).await;

        match outcome {
            MatchOutcome::Matched {
                event,
                method,
                origin_method,
                ..
            } => {
                assert_eq!(method, MatchMethod::Cache);
                assert_eq!(origin_method, Some(MatchMethod::Fuzzy));
                // Reconstructed event equals the original
                assert_eq!(event.id, original.id);
                assert_eq!(event.provider, original.provider);
                assert_eq!(event.start_time, original.start_time);
                assert_eq!(event.league, original.league);
                assert_eq!(
                    event.home_team.as_ref().map(|t| t.id.as_str()),
                    Some("8")
                );
                assert_eq!(
                    event.away_team.as_ref().map(|t| t.id.as_str()),
                    Some("9")
                );
            }
            other => panic!("expected cache hit, got {other:?}"),
        }
    }
}

/// A cached match for an old date falls through to fresh matching when the
/// same matchup recurs on a new date.
#[tokio::test]
async fn cache_invalidated_by_date_mismatch() {
    let (database, _dir) = test_database().await;
    seed_nfl_teams(&database).await;
    seed_league(&database, "nfl", "football").await;

    let first_start = Utc.with_ymd_and_hms(2024, 11, 28, 18, 0, 0).unwrap();
    let second_start = Utc.with_ymd_and_hms(2024, 12, 5, 18, 0, 0).unwrap();
    let registry = registry_with(
        &database,
        vec![
            nfl_event(
                "401",
                team("8", "Detroit Lions", "DET"),
                team("9", "Green Bay Packers", "GB"),
                first_start,
            ),
            nfl_event(
                "500",
                team("8", "Detroit Lions", "DET"),
                team("9", "Green Bay Packers", "GB"),
                second_start,
            ),
        ],
    )
    .await;

    let classifier = Classifier::new(DetectionKeywordService::default());
    let matcher = TeamMatcher::new(database.pool().clone(), registry);
    let group_id = Uuid::new_v4();
    let classified = classifier.classify(normalize("Detroit Lions vs Green Bay Packers"));

    let first = matcher
        .match_stream(
            &classified,
            &match_ctx(group_id, NaiveDate::from_ymd_opt(2024, 11, 28).unwrap()),
        )
        .await;
    assert_eq!(first.event().map(|e| e.id.as_str()), Some("401"));

    // New occurrence of the matchup: the stale entry is skipped and the
    // December event matches fresh
    let second = matcher
        .match_stream(
            &classified,
            &match_ctx(group_id, NaiveDate::from_ymd_opt(2024, 12, 5).unwrap()),
        )
        .await;
    assert_eq!(second.event().map(|e| e.id.as_str()), Some("500"));
    match second {
        MatchOutcome::Matched { method, .. } => assert_eq!(method, MatchMethod::Fuzzy),
        other => panic!("expected fresh match, got {other:?}"),
    }
}
