//! Transactional plan application.
//!
//! Replaces a goal's entire route/task/work-package/edge/decision subtree
//! with the contents of a validated plan inside one database transaction.
//! Any failure rolls back (the transaction is dropped uncommitted) so the
//! goal's prior graph stays untouched -- partial graphs never persist.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use switchyard_db::models::GoalStatus;

use crate::graph::Plan;

/// Errors from applying a plan. Always terminal; the pipeline never
/// retries persistence failures.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("goal {0} not found")]
    GoalNotFound(Uuid),

    /// A plan edge or decision references a route key that is not part of
    /// the plan. A validated plan cannot trigger this; it guards direct
    /// trait misuse.
    #[error("plan references unknown route key {0:?}")]
    UnknownRouteKey(String),

    #[error("database error while applying plan: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence target for accepted plans.
///
/// The orchestrator only sees this trait; tests substitute an in-memory
/// store so pipeline behavior is checkable without a database.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn apply(&self, goal_id: Uuid, plan: &Plan) -> Result<(), ApplyError>;
}

/// The transactional PostgreSQL implementation.
pub struct PgPlanStore {
    pool: PgPool,
}

impl PgPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanStore for PgPlanStore {
    async fn apply(&self, goal_id: Uuid, plan: &Plan) -> Result<(), ApplyError> {
        let mut tx = self.pool.begin().await?;
        let graph = &plan.graph;

        // The goal must exist; applying to a deleted goal is an error, not
        // an upsert.
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM goals WHERE id = $1")
            .bind(goal_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(ApplyError::GoalNotFound(goal_id));
        }

        // Drop the old subtree, leaves first.
        sqlx::query(
            "DELETE FROM work_packages \
             WHERE task_id IN (SELECT id FROM tasks WHERE goal_id = $1)",
        )
        .bind(goal_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM tasks WHERE goal_id = $1")
            .bind(goal_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM decision_options \
             WHERE decision_id IN (SELECT id FROM decisions WHERE goal_id = $1)",
        )
        .bind(goal_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM decisions WHERE goal_id = $1")
            .bind(goal_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM route_edges WHERE goal_id = $1")
            .bind(goal_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM routes WHERE goal_id = $1")
            .bind(goal_id)
            .execute(&mut *tx)
            .await?;

        // Insert routes (with tasks and work packages), building the
        // provider-key -> UUID map for edges and decisions.
        let mut key_to_id: HashMap<&str, Uuid> = HashMap::new();

        for (ri, route) in graph.routes.iter().enumerate() {
            let route_id = Uuid::new_v4();
            key_to_id.insert(route.key.as_str(), route_id);

            sqlx::query(
                "INSERT INTO routes (id, goal_id, title, description, kind, phase, position) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(route_id)
            .bind(goal_id)
            .bind(&route.title)
            .bind(&route.description)
            .bind(route.kind)
            .bind(route.phase)
            .bind(ri as i32)
            .execute(&mut *tx)
            .await?;

            for (ti, task) in route.tasks.iter().enumerate() {
                let task_id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO tasks (id, goal_id, route_id, title, notes, position) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(task_id)
                .bind(goal_id)
                .bind(route_id)
                .bind(&task.title)
                .bind(&task.notes)
                .bind(ti as i32)
                .execute(&mut *tx)
                .await?;

                for (wi, wp) in task.work_packages.iter().enumerate() {
                    sqlx::query(
                        "INSERT INTO work_packages \
                         (id, task_id, title, notes, length, grade, status, position) \
                         VALUES ($1, $2, $3, $4, $5, $6, 'open', $7)",
                    )
                    .bind(Uuid::new_v4())
                    .bind(task_id)
                    .bind(&wp.title)
                    .bind(&wp.notes)
                    .bind(wp.length.max(1))
                    .bind(wp.grade.clamp(0, 10))
                    .bind(wi as i32)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        let resolve = |key: &str| -> Result<Uuid, ApplyError> {
            key_to_id
                .get(key)
                .copied()
                .ok_or_else(|| ApplyError::UnknownRouteKey(key.to_string()))
        };

        // Insert edges.
        for (ei, edge) in graph.edges.iter().enumerate() {
            sqlx::query(
                "INSERT INTO route_edges (id, goal_id, from_route_id, to_route_id, position) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(goal_id)
            .bind(resolve(&edge.from)?)
            .bind(resolve(&edge.to)?)
            .bind(ei as i32)
            .execute(&mut *tx)
            .await?;
        }

        // Insert decisions and options. The active choice starts unset;
        // switching is a user action after the plan lands.
        for (di, decision) in graph.decisions.iter().enumerate() {
            let decision_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO decisions \
                 (id, goal_id, title, prompt, origin_route_id, phase, position) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(decision_id)
            .bind(goal_id)
            .bind(&decision.title)
            .bind(&decision.prompt)
            .bind(resolve(&decision.origin)?)
            .bind(decision.phase)
            .bind(di as i32)
            .execute(&mut *tx)
            .await?;

            for (oi, option) in decision.options.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO decision_options (id, decision_id, label, to_route_id, position) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(decision_id)
                .bind(&option.label)
                .bind(resolve(&option.to)?)
                .bind(oi as i32)
                .execute(&mut *tx)
                .await?;
            }
        }

        // Finally the goal row itself: description (when the plan carries
        // one), status, and the plan source.
        sqlx::query(
            "UPDATE goals \
             SET description = COALESCE(NULLIF($2, ''), description), \
                 status = $3, \
                 plan_source = $4 \
             WHERE id = $1",
        )
        .bind(goal_id)
        .bind(&graph.description)
        .bind(GoalStatus::Planned)
        .bind(&plan.source)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            goal_id = %goal_id,
            routes = graph.routes.len(),
            edges = graph.edges.len(),
            decisions = graph.decisions.len(),
            work_packages = graph.work_package_count(),
            "plan applied"
        );

        Ok(())
    }
}
