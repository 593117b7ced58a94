//! End-to-end repository tests over an in-memory store.

use datakit_criteria::page::PageRequest;
use datakit_db::{AccessConfig, AccessError, ConnectOpts, DbHandle, FetchPolicy, Session};
use membership::{MemberRepository, NewMember};
use sea_orm::{ConnectionTrait, DatabaseConnection};

/// Single-connection pool so the in-memory database is shared by every
/// statement, including those issued inside transactions.
async fn connect_handle() -> anyhow::Result<DbHandle> {
    let db = DbHandle::connect(
        "sqlite::memory:",
        ConnectOpts {
            max_conns: Some(1),
            ..ConnectOpts::default()
        },
    )
    .await?;
    db.sea()
        .execute_unprepared(
            "CREATE TABLE team (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )",
        )
        .await?;
    db.sea()
        .execute_unprepared(
            "CREATE TABLE member (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                age INTEGER NOT NULL,
                team_id INTEGER REFERENCES team (id)
            )",
        )
        .await?;
    Ok(db)
}

async fn connect() -> anyhow::Result<DatabaseConnection> {
    Ok(connect_handle().await?.sea().clone())
}

/// Five members in one team, ages 10/19/20/21/41.
async fn seed(
    repo: &MemberRepository,
    conn: &DatabaseConnection,
) -> anyhow::Result<i64> {
    let team = repo.create_team(conn, "teamA").await?;
    for (name, age) in [
        ("member1", 10),
        ("member2", 19),
        ("member3", 20),
        ("member4", 21),
        ("member5", 41),
    ] {
        repo.save(conn, NewMember::new(name, age).in_team(team.id))
            .await?;
    }
    Ok(team.id)
}

#[tokio::test]
async fn save_assigns_an_id_and_find_by_id_reads_it_back() -> anyhow::Result<()> {
    let db = connect_handle().await?;
    let repo = MemberRepository::default();

    let saved = repo.save(db.sea(), NewMember::new("memberA", 10)).await?;
    assert!(saved.id > 0);

    let session = db.session();
    let found = repo.find_by_id(&session, saved.id).await?.unwrap();
    assert_eq!(found, saved);
    Ok(())
}

#[tokio::test]
async fn rolled_back_unit_of_work_leaves_no_trace() -> anyhow::Result<()> {
    let db = connect_handle().await?;
    let repo = MemberRepository::default();

    let session = Session::new(db.begin().await?);
    repo.save(session.conn(), NewMember::new("ghost", 30)).await?;
    assert!(repo
        .find_optional_by_username(session.conn(), "ghost")
        .await?
        .is_some());
    session.into_inner().rollback().await?;

    assert!(repo
        .find_optional_by_username(db.sea(), "ghost")
        .await?
        .is_none());

    // The same work, committed, is visible outside.
    let session = Session::new(db.begin().await?);
    repo.save(session.conn(), NewMember::new("memberA", 30)).await?;
    session.into_inner().commit().await?;

    assert!(repo
        .find_optional_by_username(db.sea(), "memberA")
        .await?
        .is_some());
    Ok(())
}

#[tokio::test]
async fn duplicate_team_name_is_a_constraint_violation() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();

    repo.create_team(&db, "teamA").await?;
    let err = repo.create_team(&db, "teamA").await.unwrap_err();

    assert!(matches!(
        err,
        AccessError::ConstraintViolation { operation: "team.save", .. }
    ));
    Ok(())
}

#[tokio::test]
async fn derived_finder_combines_equality_and_comparison() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();

    repo.save(&db, NewMember::new("AAA", 10)).await?;
    repo.save(&db, NewMember::new("AAA", 20)).await?;
    repo.save(&db, NewMember::new("BBB", 30)).await?;

    let found = repo
        .find_by_username_and_age_greater_than(&db, "AAA", 15)
        .await?;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, "AAA");
    assert_eq!(found[0].age, 20);
    Ok(())
}

#[tokio::test]
async fn find_by_names_matches_the_given_set() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;

    let found = repo.find_by_names(&db, &["member1", "member5"]).await?;
    assert_eq!(found.len(), 2);

    // An empty list is legal and deterministically matches nothing.
    let found = repo.find_by_names(&db, &[]).await?;
    assert!(found.is_empty());
    Ok(())
}

#[tokio::test]
async fn single_result_finders_distinguish_missing_from_error() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;

    let one = repo.find_one_by_username(&db, "member3").await?;
    assert_eq!(one.age, 20);

    assert!(repo.find_optional_by_username(&db, "nobody").await?.is_none());

    let err = repo.find_one_by_username(&db, "nobody").await.unwrap_err();
    assert!(matches!(err, AccessError::NotFound { entity: "member", .. }));

    let list = repo.find_list_by_username(&db, "nobody").await?;
    assert!(list.is_empty());
    Ok(())
}

#[tokio::test]
async fn paging_reports_totals_independent_of_the_slice() -> anyhow::Result<()> {
    // 5 members aged >= 10, window size 3, username descending
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;

    let request = PageRequest::of(0, 3)?
        .sorted_by(membership::storage::fields::USERNAME.desc());
    let page = repo.page_by_age(&db, 10, request).await?;

    assert_eq!(page.items().len(), 3);
    assert_eq!(page.total_elements(), 5);
    assert_eq!(page.total_pages(), 2);
    assert!(page.is_first());
    assert!(page.has_next());
    assert_eq!(page.items()[0].username, "member5");

    let request = PageRequest::of(1, 3)?
        .sorted_by(membership::storage::fields::USERNAME.desc());
    let page = repo.page_by_age(&db, 10, request).await?;

    assert_eq!(page.items().len(), 2);
    assert!(page.is_last());
    assert!(page.has_previous());
    Ok(())
}

#[tokio::test]
async fn prefetch_join_does_not_multiply_the_total() -> anyhow::Result<()> {
    // All five members share one team; the data query left-joins team.
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;

    let page = repo.page_by_age(&db, 0, PageRequest::of(0, 10)?).await?;
    assert_eq!(page.total_elements(), 5);
    Ok(())
}

#[tokio::test]
async fn page_size_is_clamped_to_the_configured_maximum() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::new(AccessConfig {
        max_page_size: 2,
        ..AccessConfig::default()
    });
    seed(&repo, &db).await?;

    let page = repo.page_by_age(&db, 0, PageRequest::of(0, 100)?).await?;
    assert_eq!(page.items().len(), 2);
    assert_eq!(page.size(), 2);
    assert_eq!(page.total_pages(), 3);
    Ok(())
}

#[tokio::test]
async fn bulk_age_plus_counts_only_matching_rows() -> anyhow::Result<()> {
    // ages 10, 19, 20, 21, 41; predicate age >= 20
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;

    let session = Session::new(db);
    let affected = repo.bulk_age_plus(&session, 20).await?;
    assert_eq!(affected, 3);

    let after = repo.find_one_by_username(session.conn(), "member5").await?;
    assert_eq!(after.age, 42);
    Ok(())
}

#[tokio::test]
async fn bulk_age_plus_invalidates_cached_reads() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;
    let session = Session::new(db);

    let member5 = repo.find_one_by_username(session.conn(), "member5").await?;
    let before = repo.find_by_id(&session, member5.id).await?.unwrap();
    assert_eq!(before.age, 41);

    repo.bulk_age_plus(&session, 20).await?;

    // The same session must observe the post-update state.
    let after = repo.find_by_id(&session, member5.id).await?.unwrap();
    assert_eq!(after.age, 42);
    Ok(())
}

#[tokio::test]
async fn flat_projection_exposes_only_the_username() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;

    let views = repo.username_views(&db).await?;
    assert_eq!(views.len(), 5);
    assert_eq!(views[0].str_field("username")?, "member1");

    let err = views[0].value("age").unwrap_err();
    assert!(matches!(
        err,
        AccessError::ProjectionFieldNotRequested { shape: "UsernameOnly", .. }
    ));

    let names = repo.usernames(&db).await?;
    assert_eq!(names.len(), 5);
    assert!(names.contains(&"member3".to_owned()));
    Ok(())
}

#[tokio::test]
async fn dto_projections_materialize_eagerly() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;

    let dtos = repo.username_dtos(&db).await?;
    assert_eq!(dtos.len(), 5);
    assert_eq!(dtos[0].username, "member1");

    let rows = repo.member_dtos(&db).await?;
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].username, "member1");
    assert_eq!(rows[0].team_name.as_deref(), Some("teamA"));
    Ok(())
}

#[tokio::test]
async fn member_dto_keeps_a_null_team_name_for_unassigned_members() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();

    repo.save(&db, NewMember::new("loner", 30)).await?;

    let rows = repo.member_dtos(&db).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].team_name, None);
    Ok(())
}

#[tokio::test]
async fn nested_projection_defers_the_team_by_default() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;

    let views = repo.find_with_team(&db, "member1").await?;
    assert_eq!(views.len(), 1);
    assert!(!views[0].team.is_loaded());

    // First access pays the follow-up query; later accesses are cached.
    let team = repo.team_of(&db, &views[0]).await?;
    assert_eq!(team.as_ref().unwrap().name, "teamA");
    assert!(views[0].team.is_loaded());
    Ok(())
}

#[tokio::test]
async fn eager_fetch_policy_joins_the_team_up_front() -> anyhow::Result<()> {
    let db = connect().await?;
    let mut config = AccessConfig::default();
    config.fetch.insert("team".to_owned(), FetchPolicy::Eager);
    let repo = MemberRepository::new(config);
    seed(&repo, &db).await?;

    let views = repo.find_with_team(&db, "member1").await?;
    assert!(views[0].team.is_loaded());
    assert_eq!(
        views[0].team.get().unwrap().as_ref().unwrap().name,
        "teamA"
    );
    Ok(())
}

#[tokio::test]
async fn strict_projections_fail_fast_on_a_missing_join() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::new(AccessConfig {
        strict_projections: true,
        ..AccessConfig::default()
    });
    seed(&repo, &db).await?;

    let err = repo.find_with_team(&db, "member1").await.unwrap_err();
    assert!(matches!(
        err,
        AccessError::MissingJoin { relation: "team", .. }
    ));
    Ok(())
}

#[tokio::test]
async fn strict_missing_join_is_raised_before_any_query() -> anyhow::Result<()> {
    // No schema at all: reaching the store would fail with a Db error, so a
    // MissingJoin proves the check ran before any round-trip.
    let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default()).await?;
    let repo = MemberRepository::new(AccessConfig {
        strict_projections: true,
        ..AccessConfig::default()
    });

    let err = repo.find_with_team(db.sea(), "member1").await.unwrap_err();
    assert!(matches!(
        err,
        AccessError::MissingJoin { relation: "team", .. }
    ));
    Ok(())
}

#[tokio::test]
async fn native_page_binds_by_alias_and_counts_separately() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;

    let page = repo.native_member_page(&db, PageRequest::of(0, 2)?).await?;

    assert_eq!(page.items().len(), 2);
    assert_eq!(page.total_elements(), 5);
    assert_eq!(page.total_pages(), 3);

    // Columns are selected team-name-first; binding stays alias-driven.
    assert_eq!(page.items()[0].str_field("username")?, "member1");
    assert_eq!(page.items()[0].str_field("team_name")?, "teamA");
    assert!(page.items()[0].i64_field("id")? > 0);
    Ok(())
}

#[tokio::test]
async fn find_all_with_team_pairs_members_with_their_team() -> anyhow::Result<()> {
    let db = connect().await?;
    let repo = MemberRepository::default();
    seed(&repo, &db).await?;
    repo.save(&db, NewMember::new("loner", 33)).await?;

    let rows = repo.find_all_with_team(&db).await?;
    assert_eq!(rows.len(), 6);

    let loner = rows.iter().find(|(m, _)| m.username == "loner").unwrap();
    assert!(loner.1.is_none());

    let member1 = rows.iter().find(|(m, _)| m.username == "member1").unwrap();
    assert_eq!(member1.1.as_ref().unwrap().name, "teamA");
    Ok(())
}
