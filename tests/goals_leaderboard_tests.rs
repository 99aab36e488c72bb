mod common;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use studyhub::{
    access::Role,
    auth::AuthUser,
    documents::{
        DocResult, DocumentStore, MemoryDocumentStore, Query, Snapshot, WriteBatch,
    },
    error::ApiError,
    goals::{self, CHEERS, GOALS, POINTS_PER_GOAL},
    leaderboard::{self, LEADERBOARD, LeaderboardFilter},
    models::{LeaderboardEntry, User},
};
use uuid::Uuid;

// --- Test Utilities ---

fn auth_of(user: &User) -> AuthUser {
    AuthUser {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.parsed_role().unwrap(),
    }
}

fn entry(id: u128, points: i64, school: &str, class_name: &str) -> LeaderboardEntry {
    LeaderboardEntry {
        user_id: Uuid::from_u128(id),
        name: format!("user {id}"),
        school: Some(school.to_string()),
        class_name: Some(class_name.to_string()),
        points,
        updated_at: Utc::now(),
        ..LeaderboardEntry::default()
    }
}

async fn seed_board(store: &MemoryDocumentStore, entries: &[LeaderboardEntry]) {
    let mut batch = WriteBatch::new();
    for e in entries {
        batch.set(LEADERBOARD, &e.user_id.to_string(), e).unwrap();
    }
    store.commit(batch).await.unwrap();
}

/// Yields after every read, so two joined calls both finish reading before either commits.
#[derive(Default)]
struct YieldingStore(MemoryDocumentStore);

#[async_trait]
impl DocumentStore for YieldingStore {
    async fn get(&self, collection: &str, id: &str) -> DocResult<Option<Snapshot>> {
        let snapshot = self.0.get(collection, id).await;
        tokio::task::yield_now().await;
        snapshot
    }

    async fn query(&self, query: &Query) -> DocResult<Vec<Snapshot>> {
        let hits = self.0.query(query).await;
        tokio::task::yield_now().await;
        hits
    }

    async fn commit(&self, batch: WriteBatch) -> DocResult<()> {
        self.0.commit(batch).await
    }
}

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

// --- Leaderboard ---

#[tokio::test]
async fn test_leaderboard_orders_by_points_then_id() {
    let store = MemoryDocumentStore::new();
    seed_board(
        &store,
        &[
            entry(3, 20, "A", "1"),
            entry(1, 50, "A", "1"),
            entry(2, 20, "A", "2"),
        ],
    )
    .await;

    let page = leaderboard::page(&store, &LeaderboardFilter::default())
        .await
        .unwrap();
    let order: Vec<(u64, Uuid)> = page
        .entries
        .iter()
        .map(|r| (r.rank, r.entry.user_id))
        .collect();
    assert_eq!(
        order,
        vec![
            (1, Uuid::from_u128(1)),
            (2, Uuid::from_u128(2)),
            (3, Uuid::from_u128(3)),
        ]
    );
    assert_eq!(page.limit, 20);
    assert_eq!(page.next_offset, None);
}

#[tokio::test]
async fn test_leaderboard_paginates_with_continuous_ranks() {
    let store = MemoryDocumentStore::new();
    let entries: Vec<LeaderboardEntry> = (1..=5).map(|i| entry(i, 100 - i as i64, "A", "1")).collect();
    seed_board(&store, &entries).await;

    let filter = LeaderboardFilter {
        limit: Some(2),
        offset: Some(2),
        ..LeaderboardFilter::default()
    };
    let page = leaderboard::page(&store, &filter).await.unwrap();

    let ranks: Vec<u64> = page.entries.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![3, 4]);
    assert_eq!(page.next_offset, Some(4));

    let last = leaderboard::page(
        &store,
        &LeaderboardFilter {
            limit: Some(2),
            offset: Some(4),
            ..LeaderboardFilter::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(last.entries.len(), 1);
    assert_eq!(last.next_offset, None);
}

#[tokio::test]
async fn test_leaderboard_filters_by_school_and_class() {
    let store = MemoryDocumentStore::new();
    seed_board(
        &store,
        &[
            entry(1, 10, "A", "1"),
            entry(2, 20, "A", "2"),
            entry(3, 30, "B", "1"),
        ],
    )
    .await;

    let filter = LeaderboardFilter {
        school: Some("A".to_string()),
        class_name: Some("1".to_string()),
        ..LeaderboardFilter::default()
    };
    let page = leaderboard::page(&store, &filter).await.unwrap();
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].entry.user_id, Uuid::from_u128(1));
}

#[test]
fn test_leaderboard_limit_bounds() {
    assert_eq!(leaderboard::effective_limit(None), Ok(20));
    assert_eq!(leaderboard::effective_limit(Some(500)), Ok(100));
    assert!(leaderboard::effective_limit(Some(0)).is_err());
}

#[tokio::test]
async fn test_rank_of_in_scope() {
    let store = MemoryDocumentStore::new();
    seed_board(
        &store,
        &[
            entry(1, 90, "A", "1"),
            entry(2, 50, "A", "2"),
            entry(3, 40, "A", "2"),
        ],
    )
    .await;

    let overall = leaderboard::rank_of(&store, Uuid::from_u128(3), None, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(overall.rank, 3);

    let in_class = leaderboard::rank_of(&store, Uuid::from_u128(3), Some("A"), Some("2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(in_class.rank, 2);

    assert!(
        leaderboard::rank_of(&store, Uuid::from_u128(99), None, None)
            .await
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_award_streaks() {
    let profile = common::user("student");

    let first = leaderboard::award(None, &profile, 10, day("2025-03-01"));
    assert_eq!((first.points, first.streak, first.completed_goals), (10, 1, 1));

    let same_day = leaderboard::award(Some(first), &profile, 10, day("2025-03-01"));
    assert_eq!((same_day.points, same_day.streak), (20, 1));

    let next_day = leaderboard::award(Some(same_day), &profile, 10, day("2025-03-02"));
    assert_eq!(next_day.streak, 2);

    let after_gap = leaderboard::award(Some(next_day), &profile, 10, day("2025-03-05"));
    assert_eq!((after_gap.points, after_gap.streak, after_gap.completed_goals), (40, 1, 4));
    assert_eq!(after_gap.last_completed.as_deref(), Some("2025-03-05"));
    assert_eq!(after_gap.school, profile.school);
}

#[tokio::test]
async fn test_staged_awards_accumulate() {
    let store = MemoryDocumentStore::new();
    let profile = common::user("student");

    // Both awards are computed from the same (empty) read.
    for _ in 0..2 {
        let entry = leaderboard::award(None, &profile, 10, day("2025-03-01"));
        let mut batch = WriteBatch::new();
        leaderboard::stage_award(&mut batch, &entry, 10).unwrap();
        store.commit(batch).await.unwrap();
    }

    let stored: LeaderboardEntry =
        studyhub::documents::get_typed(&store, LEADERBOARD, &profile.id.to_string())
            .await
            .unwrap()
            .unwrap();
    assert_eq!((stored.points, stored.completed_goals), (20, 2));
    assert_eq!(stored.streak, 1);
    assert_eq!(stored.name, profile.name);
}

// --- Daily Goals ---

#[tokio::test]
async fn test_create_goal_for_today() {
    let store = MemoryDocumentStore::new();
    let student = common::user("student");

    let goal = goals::create(&store, &student, "  Read chapter 4  ").await.unwrap();
    assert_eq!(goal.title, "Read chapter 4");
    assert_eq!(goal.date, goals::today().to_string());
    assert_eq!(goal.class_name, student.class_name);
    assert!(!goal.completed);

    let mine = goals::list_for_user(&store, student.id, None).await.unwrap();
    assert_eq!(mine, vec![goal]);
}

#[tokio::test]
async fn test_create_goal_rejects_blank_title() {
    let store = MemoryDocumentStore::new();
    let err = goals::create(&store, &common::user("student"), "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn test_daily_goal_limit() {
    let store = MemoryDocumentStore::new();
    let student = common::user("student");
    for i in 0..goals::MAX_GOALS_PER_DAY {
        goals::create(&store, &student, &format!("goal {i}")).await.unwrap();
    }
    let err = goals::create(&store, &student, "one too many").await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn test_complete_awards_points_once() {
    let store = MemoryDocumentStore::new();
    let student = common::user("student");
    let goal = goals::create(&store, &student, "Flashcards").await.unwrap();

    let done = goals::complete(&store, goal.id, &student).await.unwrap();
    assert!(done.completed);
    assert!(done.completed_at.is_some());

    let entry: LeaderboardEntry =
        studyhub::documents::get_typed(&store, LEADERBOARD, &student.id.to_string())
            .await
            .unwrap()
            .unwrap();
    assert_eq!(entry.points, POINTS_PER_GOAL);
    assert_eq!(entry.completed_goals, 1);

    let again = goals::complete(&store, goal.id, &student).await.unwrap_err();
    assert!(matches!(again, ApiError::Validation(_)));

    let entry: LeaderboardEntry =
        studyhub::documents::get_typed(&store, LEADERBOARD, &student.id.to_string())
            .await
            .unwrap()
            .unwrap();
    assert_eq!(entry.points, POINTS_PER_GOAL);
}

#[tokio::test]
async fn test_only_owner_completes() {
    let store = MemoryDocumentStore::new();
    let owner = common::user("student");
    let other = common::user("student");
    let goal = goals::create(&store, &owner, "Essay outline").await.unwrap();

    let err = goals::complete(&store, goal.id, &other).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let missing = goals::complete(&store, Uuid::new_v4(), &owner).await.unwrap_err();
    assert!(matches!(missing, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_cheer_rules() {
    let store = MemoryDocumentStore::new();
    let owner = common::user("student");
    let friend = common::user("student");
    let goal = goals::create(&store, &owner, "Practice test").await.unwrap();

    let own = goals::cheer(&store, goal.id, &auth_of(&owner)).await.unwrap_err();
    assert_eq!(own, ApiError::validation("You cannot cheer your own goal"));

    let cheered = goals::cheer(&store, goal.id, &auth_of(&friend)).await.unwrap();
    assert_eq!(cheered.cheer_count, 1);

    let twice = goals::cheer(&store, goal.id, &auth_of(&friend)).await.unwrap_err();
    assert_eq!(twice, ApiError::validation("You already cheered this goal"));

    let stored = store
        .get(GOALS, &goal.id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.data["cheerCount"], 1);
    assert!(
        store
            .get(CHEERS, &goals::cheer_id(goal.id, friend.id))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_simultaneous_cheers_are_all_counted() {
    let store = YieldingStore::default();
    let owner = common::user("student");
    let first = auth_of(&common::user("student"));
    let second = auth_of(&common::user("student"));
    let goal = goals::create(&store, &owner, "Past paper").await.unwrap();

    let (a, b) = tokio::join!(
        goals::cheer(&store, goal.id, &first),
        goals::cheer(&store, goal.id, &second)
    );
    a.unwrap();
    b.unwrap();

    let stored = store
        .get(GOALS, &goal.id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.data["cheerCount"], 2);
    assert_eq!(store.0.count(CHEERS).await, 2);
}

#[tokio::test]
async fn test_simultaneous_duplicate_cheer_is_rejected() {
    let store = YieldingStore::default();
    let owner = common::user("student");
    let friend = auth_of(&common::user("student"));
    let goal = goals::create(&store, &owner, "Mind map").await.unwrap();

    let (a, b) = tokio::join!(
        goals::cheer(&store, goal.id, &friend),
        goals::cheer(&store, goal.id, &friend)
    );
    let failures: Vec<ApiError> = [a, b].into_iter().filter_map(Result::err).collect();
    assert_eq!(
        failures,
        vec![ApiError::validation("You already cheered this goal")]
    );

    let stored = store
        .get(GOALS, &goal.id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.data["cheerCount"], 1);
}

#[tokio::test]
async fn test_simultaneous_completions_award_once() {
    let store = YieldingStore::default();
    let student = common::user("student");
    let goal = goals::create(&store, &student, "Timed essay").await.unwrap();

    let (a, b) = tokio::join!(
        goals::complete(&store, goal.id, &student),
        goals::complete(&store, goal.id, &student)
    );
    assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
    let err = a.err().or(b.err()).unwrap();
    assert_eq!(err, ApiError::validation("Goal is already completed"));

    let entry: LeaderboardEntry =
        studyhub::documents::get_typed(&store, LEADERBOARD, &student.id.to_string())
            .await
            .unwrap()
            .unwrap();
    assert_eq!(entry.points, POINTS_PER_GOAL);
    assert_eq!(entry.completed_goals, 1);
}

#[tokio::test]
async fn test_cheer_on_deleted_goal_leaves_no_trace() {
    let store = MemoryDocumentStore::new();
    let owner = common::user("student");
    let friend = common::user("student");
    let goal = goals::create(&store, &owner, "Gone soon").await.unwrap();
    goals::delete(&store, goal.id, &auth_of(&owner)).await.unwrap();

    let err = goals::cheer(&store, goal.id, &auth_of(&friend)).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(store.count(GOALS).await, 0);
    assert_eq!(store.count(CHEERS).await, 0);
}

#[tokio::test]
async fn test_delete_goal_removes_its_cheers() {
    let store = MemoryDocumentStore::new();
    let owner = common::user("student");
    let goal = goals::create(&store, &owner, "Lab report").await.unwrap();
    let keep = goals::create(&store, &owner, "Other goal").await.unwrap();
    for _ in 0..3 {
        let friend = common::user("student");
        goals::cheer(&store, goal.id, &auth_of(&friend)).await.unwrap();
    }
    goals::cheer(&store, keep.id, &auth_of(&common::user("teacher")))
        .await
        .unwrap();
    assert_eq!(store.count(CHEERS).await, 4);

    let stranger = common::user("student");
    let err = goals::delete(&store, goal.id, &auth_of(&stranger)).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    goals::delete(&store, goal.id, &auth_of(&owner)).await.unwrap();
    assert!(store.get(GOALS, &goal.id.to_string()).await.unwrap().is_none());
    assert_eq!(store.count(CHEERS).await, 1);
    assert_eq!(store.count(GOALS).await, 1);
}

#[tokio::test]
async fn test_admin_can_delete_any_goal() {
    let store = MemoryDocumentStore::new();
    let owner = common::user("student");
    let goal = goals::create(&store, &owner, "Spam").await.unwrap();

    let admin = AuthUser {
        role: Role::Admin,
        ..auth_of(&common::user("admin"))
    };
    goals::delete(&store, goal.id, &admin).await.unwrap();
    assert_eq!(store.count(GOALS).await, 0);
}

#[tokio::test]
async fn test_class_feed_is_scoped_to_class() {
    let store = MemoryDocumentStore::new();
    let me = common::user("student");
    let classmate = common::user("student");
    let mut elsewhere = common::user("student");
    elsewhere.class_name = Some("11B".to_string());

    goals::create(&store, &classmate, "Mine to share").await.unwrap();
    goals::create(&store, &elsewhere, "Other class").await.unwrap();
    goals::create(&store, &me, "My own").await.unwrap();

    let feed = goals::class_feed(&store, &me).await.unwrap();
    assert_eq!(feed.len(), 2);
    assert!(feed.iter().all(|g| g.class_name.as_deref() == Some(common::CLASS)));

    let mut classless = common::user("student");
    classless.class_name = None;
    assert!(goals::class_feed(&store, &classless).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_purge_user_removes_all_documents() {
    let store = MemoryDocumentStore::new();
    let leaving = common::user("student");
    let staying = common::user("student");

    let theirs = goals::create(&store, &leaving, "Leaving goal").await.unwrap();
    let mine = goals::create(&store, &staying, "Staying goal").await.unwrap();
    goals::complete(&store, theirs.id, &leaving).await.unwrap();
    goals::complete(&store, mine.id, &staying).await.unwrap();
    goals::cheer(&store, theirs.id, &auth_of(&staying)).await.unwrap();
    goals::cheer(&store, mine.id, &auth_of(&leaving)).await.unwrap();

    goals::purge_user(&store, leaving.id).await.unwrap();

    assert_eq!(store.count(GOALS).await, 1);
    assert_eq!(store.count(CHEERS).await, 0);
    assert_eq!(store.count(LEADERBOARD).await, 1);
    assert!(
        store
            .get(LEADERBOARD, &staying.id.to_string())
            .await
            .unwrap()
            .is_some()
    );
}
