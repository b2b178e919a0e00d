//! Database query functions for the `work_packages` table.
//!
//! Status is the only work-package field mutated outside plan application.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{WorkPackage, WorkPackageStatus};

/// Fetch a work package by id, scoped to a goal.
///
/// Returns `None` when the package does not exist or belongs to a
/// different goal.
pub async fn get_work_package(
    pool: &PgPool,
    goal_id: Uuid,
    package_id: Uuid,
) -> Result<Option<WorkPackage>> {
    let wp = sqlx::query_as::<_, WorkPackage>(
        "SELECT wp.* FROM work_packages wp \
         JOIN tasks t ON t.id = wp.task_id \
         WHERE t.goal_id = $1 AND wp.id = $2",
    )
    .bind(goal_id)
    .bind(package_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch work package {package_id}"))?;

    Ok(wp)
}

/// Flip a work package between `open` and `done`, scoped to a goal.
///
/// Returns the new status, or `None` when the package does not exist or
/// belongs to a different goal.
pub async fn toggle_work_package(
    pool: &PgPool,
    goal_id: Uuid,
    package_id: Uuid,
) -> Result<Option<WorkPackageStatus>> {
    let status: Option<(WorkPackageStatus,)> = sqlx::query_as(
        "UPDATE work_packages wp \
         SET status = CASE WHEN wp.status = 'done' THEN 'open' ELSE 'done' END \
         FROM tasks t \
         WHERE wp.task_id = t.id AND t.goal_id = $1 AND wp.id = $2 \
         RETURNING wp.status",
    )
    .bind(goal_id)
    .bind(package_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to toggle work package {package_id}"))?;

    Ok(status.map(|(s,)| s))
}
