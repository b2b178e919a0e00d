//! Integration tests for goal CRUD and graph queries.

use sqlx::PgPool;
use uuid::Uuid;

use switchyard_db::models::{GoalStatus, WorkPackageStatus};
use switchyard_db::queries::{decisions, goals, graph, work_packages};
use switchyard_test_utils::{create_test_db, drop_test_db};

// ---------------------------------------------------------------------------
// Fixture: a tiny persisted graph under one goal
// ---------------------------------------------------------------------------

struct GraphFixture {
    goal_id: Uuid,
    route_a: Uuid,
    route_b: Uuid,
    decision_id: Uuid,
    option_a: Uuid,
    option_b: Uuid,
    package_id: Uuid,
}

/// Insert a goal with two routes, one edge, one decision with two options,
/// one task, and one work package. Rows are inserted directly; production
/// code only ever writes the graph through the plan applier.
async fn insert_fixture(pool: &PgPool) -> GraphFixture {
    let goal = goals::insert_goal(pool, "Fixture goal", "for graph queries")
        .await
        .expect("insert_goal should succeed");

    let route_a = Uuid::new_v4();
    let route_b = Uuid::new_v4();
    for (i, (id, title, kind, phase)) in [
        (route_a, "Start", "trunk", 0),
        (route_b, "Alternative", "branch", 1),
    ]
    .iter()
    .enumerate()
    {
        sqlx::query(
            "INSERT INTO routes (id, goal_id, title, kind, phase, position) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(goal.id)
        .bind(title)
        .bind(kind)
        .bind(phase)
        .bind(i as i32)
        .execute(pool)
        .await
        .expect("route insert should succeed");
    }

    sqlx::query(
        "INSERT INTO route_edges (id, goal_id, from_route_id, to_route_id, position) \
         VALUES ($1, $2, $3, $4, 0)",
    )
    .bind(Uuid::new_v4())
    .bind(goal.id)
    .bind(route_a)
    .bind(route_b)
    .execute(pool)
    .await
    .expect("edge insert should succeed");

    let decision_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO decisions (id, goal_id, title, prompt, origin_route_id, phase, position) \
         VALUES ($1, $2, 'Which way?', 'Pick one', $3, 0, 0)",
    )
    .bind(decision_id)
    .bind(goal.id)
    .bind(route_a)
    .execute(pool)
    .await
    .expect("decision insert should succeed");

    let option_a = Uuid::new_v4();
    let option_b = Uuid::new_v4();
    for (i, (id, label)) in [(option_a, "Stay"), (option_b, "Divert")].iter().enumerate() {
        sqlx::query(
            "INSERT INTO decision_options (id, decision_id, label, to_route_id, position) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(decision_id)
        .bind(label)
        .bind(route_b)
        .bind(i as i32)
        .execute(pool)
        .await
        .expect("option insert should succeed");
    }

    let task_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO tasks (id, goal_id, route_id, title, notes, position) \
         VALUES ($1, $2, $3, 'First task', '', 0)",
    )
    .bind(task_id)
    .bind(goal.id)
    .bind(route_a)
    .execute(pool)
    .await
    .expect("task insert should succeed");

    let package_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO work_packages (id, task_id, title, notes, length, grade, position) \
         VALUES ($1, $2, 'First package', '', 2, 3, 0)",
    )
    .bind(package_id)
    .bind(task_id)
    .execute(pool)
    .await
    .expect("work package insert should succeed");

    GraphFixture {
        goal_id: goal.id,
        route_a,
        route_b,
        decision_id,
        option_a,
        option_b,
        package_id,
    }
}

// ---------------------------------------------------------------------------
// Goal CRUD
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_and_get_goal() {
    let (pool, db_name) = create_test_db().await;

    let goal = goals::insert_goal(&pool, "Learn Python", "step by step")
        .await
        .expect("insert should succeed");
    assert_eq!(goal.title, "Learn Python");
    assert_eq!(goal.status, GoalStatus::Unplanned);
    assert_eq!(goal.plan_source, "");

    let fetched = goals::get_goal(&pool, goal.id)
        .await
        .expect("get should succeed")
        .expect("goal should exist");
    assert_eq!(fetched.id, goal.id);
    assert_eq!(fetched.description, "step by step");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_goals_newest_first() {
    let (pool, db_name) = create_test_db().await;

    goals::insert_goal(&pool, "First", "").await.unwrap();
    goals::insert_goal(&pool, "Second", "").await.unwrap();

    let listed = goals::list_goals(&pool).await.expect("list should succeed");
    assert_eq!(listed.len(), 2);
    assert!(
        listed[0].created_at >= listed[1].created_at,
        "expected newest first"
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_goal_status_rows() {
    let (pool, db_name) = create_test_db().await;

    let goal = goals::insert_goal(&pool, "Status test", "").await.unwrap();

    let rows = goals::update_goal_status(&pool, goal.id, GoalStatus::Error)
        .await
        .expect("update should succeed");
    assert_eq!(rows, 1);

    let fetched = goals::get_goal(&pool, goal.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, GoalStatus::Error);

    // Unknown goal updates zero rows.
    let rows = goals::update_goal_status(&pool, Uuid::new_v4(), GoalStatus::Planned)
        .await
        .expect("update should succeed");
    assert_eq!(rows, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn delete_goal_cascades_graph() {
    let (pool, db_name) = create_test_db().await;

    let fixture = insert_fixture(&pool).await;

    let deleted = goals::delete_goal(&pool, fixture.goal_id)
        .await
        .expect("delete should succeed");
    assert!(deleted);

    let loaded = graph::load_graph(&pool, fixture.goal_id)
        .await
        .expect("load should succeed");
    assert!(loaded.is_empty(), "graph rows should cascade away");

    let orphan_packages: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM work_packages")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orphan_packages.0, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Graph queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_graph_returns_all_row_families() {
    let (pool, db_name) = create_test_db().await;

    let fixture = insert_fixture(&pool).await;

    let loaded = graph::load_graph(&pool, fixture.goal_id)
        .await
        .expect("load should succeed");

    assert_eq!(loaded.routes.len(), 2);
    assert_eq!(loaded.edges.len(), 1);
    assert_eq!(loaded.decisions.len(), 1);
    assert_eq!(loaded.options.len(), 2);
    assert_eq!(loaded.tasks.len(), 1);
    assert_eq!(loaded.work_packages.len(), 1);

    assert_eq!(loaded.routes[0].id, fixture.route_a);
    assert_eq!(loaded.edges[0].from_route_id, fixture.route_a);
    assert_eq!(loaded.edges[0].to_route_id, fixture.route_b);
    assert_eq!(loaded.decisions[0].chosen_option_id, None);

    let count = graph::count_routes(&pool, fixture.goal_id).await.unwrap();
    assert_eq!(count, 2);

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Work package toggle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn toggle_work_package_flips_status() {
    let (pool, db_name) = create_test_db().await;

    let fixture = insert_fixture(&pool).await;

    let status = work_packages::toggle_work_package(&pool, fixture.goal_id, fixture.package_id)
        .await
        .expect("toggle should succeed")
        .expect("package should exist");
    assert_eq!(status, WorkPackageStatus::Done);

    let status = work_packages::toggle_work_package(&pool, fixture.goal_id, fixture.package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, WorkPackageStatus::Open);

    let wp = work_packages::get_work_package(&pool, fixture.goal_id, fixture.package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wp.status, WorkPackageStatus::Open);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn toggle_is_scoped_to_goal() {
    let (pool, db_name) = create_test_db().await;

    let fixture = insert_fixture(&pool).await;
    let other_goal = goals::insert_goal(&pool, "Other", "").await.unwrap();

    // Toggling through the wrong goal must not touch the package.
    let result = work_packages::toggle_work_package(&pool, other_goal.id, fixture.package_id)
        .await
        .expect("toggle should succeed");
    assert!(result.is_none());

    let wp = work_packages::get_work_package(&pool, fixture.goal_id, fixture.package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wp.status, WorkPackageStatus::Open);

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Decision switch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn choose_option_sets_active_choice() {
    let (pool, db_name) = create_test_db().await;

    let fixture = insert_fixture(&pool).await;

    let switched = decisions::choose_option(
        &pool,
        fixture.goal_id,
        fixture.decision_id,
        fixture.option_b,
    )
    .await
    .expect("choose should succeed");
    assert!(switched);

    let loaded = graph::load_graph(&pool, fixture.goal_id).await.unwrap();
    assert_eq!(loaded.decisions[0].chosen_option_id, Some(fixture.option_b));

    // Switching is repeatable.
    let switched = decisions::choose_option(
        &pool,
        fixture.goal_id,
        fixture.decision_id,
        fixture.option_a,
    )
    .await
    .unwrap();
    assert!(switched);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn choose_option_rejects_foreign_option() {
    let (pool, db_name) = create_test_db().await;

    let fixture = insert_fixture(&pool).await;

    // An option id that does not belong to the decision updates nothing.
    let switched =
        decisions::choose_option(&pool, fixture.goal_id, fixture.decision_id, Uuid::new_v4())
            .await
            .expect("choose should succeed");
    assert!(!switched);

    let loaded = graph::load_graph(&pool, fixture.goal_id).await.unwrap();
    assert_eq!(loaded.decisions[0].chosen_option_id, None);

    pool.close().await;
    drop_test_db(&db_name).await;
}
