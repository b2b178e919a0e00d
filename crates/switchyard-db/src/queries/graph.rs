//! Read queries over a goal's persisted route graph.
//!
//! The graph is written only by the plan applier (whole-subtree replace in
//! one transaction); everything here is read-only and feeds the rendering
//! layer, the CLI `goal show` command, and tests.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Decision, DecisionOption, Route, RouteEdge, Task, WorkPackage};

/// The complete persisted graph under one goal, as flat row lists ordered
/// by position.
#[derive(Debug, Clone, Default)]
pub struct GoalGraph {
    pub routes: Vec<Route>,
    pub edges: Vec<RouteEdge>,
    pub decisions: Vec<Decision>,
    pub options: Vec<DecisionOption>,
    pub tasks: Vec<Task>,
    pub work_packages: Vec<WorkPackage>,
}

impl GoalGraph {
    /// True when the goal has no persisted graph at all.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Load the full route graph for a goal.
pub async fn load_graph(pool: &PgPool, goal_id: Uuid) -> Result<GoalGraph> {
    let routes = sqlx::query_as::<_, Route>(
        "SELECT * FROM routes WHERE goal_id = $1 ORDER BY position ASC",
    )
    .bind(goal_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load routes for goal {goal_id}"))?;

    let edges = sqlx::query_as::<_, RouteEdge>(
        "SELECT * FROM route_edges WHERE goal_id = $1 ORDER BY position ASC",
    )
    .bind(goal_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load edges for goal {goal_id}"))?;

    let decisions = sqlx::query_as::<_, Decision>(
        "SELECT * FROM decisions WHERE goal_id = $1 ORDER BY position ASC",
    )
    .bind(goal_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load decisions for goal {goal_id}"))?;

    let options = sqlx::query_as::<_, DecisionOption>(
        "SELECT o.* FROM decision_options o \
         JOIN decisions d ON d.id = o.decision_id \
         WHERE d.goal_id = $1 \
         ORDER BY d.position ASC, o.position ASC",
    )
    .bind(goal_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load decision options for goal {goal_id}"))?;

    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE goal_id = $1 ORDER BY position ASC",
    )
    .bind(goal_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load tasks for goal {goal_id}"))?;

    let work_packages = sqlx::query_as::<_, WorkPackage>(
        "SELECT wp.* FROM work_packages wp \
         JOIN tasks t ON t.id = wp.task_id \
         WHERE t.goal_id = $1 \
         ORDER BY t.position ASC, wp.position ASC",
    )
    .bind(goal_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load work packages for goal {goal_id}"))?;

    Ok(GoalGraph {
        routes,
        edges,
        decisions,
        options,
        tasks,
        work_packages,
    })
}

/// Count the routes persisted for a goal.
pub async fn count_routes(pool: &PgPool, goal_id: Uuid) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM routes WHERE goal_id = $1")
        .bind(goal_id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to count routes for goal {goal_id}"))?;

    Ok(row.0)
}
