//! Database query functions for the `goals` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Goal, GoalStatus};

/// Insert a new goal. Returns the inserted row with server-generated
/// defaults (id, status, created_at).
pub async fn insert_goal(pool: &PgPool, title: &str, description: &str) -> Result<Goal> {
    let goal = sqlx::query_as::<_, Goal>(
        "INSERT INTO goals (title, description) \
         VALUES ($1, $2) \
         RETURNING *",
    )
    .bind(title)
    .bind(description)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert goal {title:?}"))?;

    Ok(goal)
}

/// Fetch a goal by id.
pub async fn get_goal(pool: &PgPool, goal_id: Uuid) -> Result<Option<Goal>> {
    let goal = sqlx::query_as::<_, Goal>("SELECT * FROM goals WHERE id = $1")
        .bind(goal_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch goal {goal_id}"))?;

    Ok(goal)
}

/// List all goals, newest first.
pub async fn list_goals(pool: &PgPool) -> Result<Vec<Goal>> {
    let goals = sqlx::query_as::<_, Goal>("SELECT * FROM goals ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
        .context("failed to list goals")?;

    Ok(goals)
}

/// Set a goal's status. Returns the number of rows updated (0 when the
/// goal does not exist).
pub async fn update_goal_status(pool: &PgPool, goal_id: Uuid, status: GoalStatus) -> Result<u64> {
    let result = sqlx::query("UPDATE goals SET status = $2 WHERE id = $1")
        .bind(goal_id)
        .bind(status)
        .execute(pool)
        .await
        .with_context(|| format!("failed to update status of goal {goal_id}"))?;

    Ok(result.rows_affected())
}

/// Delete a goal and (via FK cascades) its entire route graph.
///
/// Returns `true` if a row was deleted.
pub async fn delete_goal(pool: &PgPool, goal_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM goals WHERE id = $1")
        .bind(goal_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete goal {goal_id}"))?;

    Ok(result.rows_affected() > 0)
}
