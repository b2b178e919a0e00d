//! Database query functions for the `decisions` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

/// Set the active choice of a decision ("switch").
///
/// The option must belong to the decision, and the decision to the goal;
/// non-chosen branches are untouched. Returns `true` if a row was updated.
pub async fn choose_option(
    pool: &PgPool,
    goal_id: Uuid,
    decision_id: Uuid,
    option_id: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE decisions d \
         SET chosen_option_id = o.id \
         FROM decision_options o \
         WHERE d.id = $2 AND d.goal_id = $1 \
           AND o.id = $3 AND o.decision_id = d.id",
    )
    .bind(goal_id)
    .bind(decision_id)
    .bind(option_id)
    .execute(pool)
    .await
    .with_context(|| format!("failed to choose option {option_id} on decision {decision_id}"))?;

    Ok(result.rows_affected() > 0)
}
