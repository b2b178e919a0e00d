//! The `switchyard plan` command: run one generation from the terminal,
//! printing broker events as they happen.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use uuid::Uuid;

use switchyard_core::apply::PgPlanStore;
use switchyard_core::events::{EventBroker, EventLevel};
use switchyard_core::generation::{
    ExponentialBackoff, GenerationRequest, GoalLeases, run_generation,
};
use switchyard_core::provider::OpenAiProvider;
use switchyard_db::models::GoalStatus;
use switchyard_db::queries::goals;

use crate::config::SwitchyardConfig;

pub async fn cmd_plan(
    pool: &PgPool,
    config: &SwitchyardConfig,
    goal_id: Uuid,
    context: String,
) -> Result<()> {
    let goal = goals::get_goal(pool, goal_id)
        .await?
        .with_context(|| format!("goal {goal_id} not found"))?;

    let Some(provider_config) = config.provider.clone() else {
        bail!(
            "no plan provider configured; set SWITCHYARD_API_KEY or add \
             api_key to the [provider] section of the config file"
        );
    };
    let provider = OpenAiProvider::new(provider_config);

    let leases = GoalLeases::new();
    let _lease = leases
        .acquire(goal_id)
        .context("a generation for this goal is already running")?;

    let broker = Arc::new(EventBroker::with_buffer_size(config.events_buffer_size));

    // Print events while the run progresses, like a stream subscriber
    // would see them.
    let mut subscription = broker.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = subscription.next().await {
            let level = match event.level {
                EventLevel::Info => "info ",
                EventLevel::Warn => "warn ",
                EventLevel::Error => "error",
            };
            match &event.data {
                Some(data) => println!("[{level}] {} {data}", event.message),
                None => println!("[{level}] {}", event.message),
            }
        }
    });

    let store = PgPlanStore::new(pool.clone());
    let backoff = ExponentialBackoff::default();
    let request = GenerationRequest {
        goal_id,
        goal: goal.title.clone(),
        context,
        redirect: None,
    };

    let result = run_generation(
        &request,
        &provider,
        &store,
        broker.as_ref(),
        &backoff,
        &config.generation,
    )
    .await;

    // Dropping the broker closes every subscriber queue, ending the
    // printer once it has drained.
    drop(broker);
    let _ = printer.await;

    match result {
        Ok(plan) => {
            println!();
            println!(
                "Plan applied: {} routes, {} work packages (source: {}).",
                plan.graph.routes.len(),
                plan.graph.work_package_count(),
                plan.source
            );
            for warning in &plan.warnings {
                println!("  warning: {}: {}", warning.location, warning.message);
            }
            if plan.quality_issues.is_empty() {
                println!("All work packages pass the documentation checks.");
            } else {
                println!("{} documentation issue(s):", plan.quality_issues.len());
                for issue in &plan.quality_issues {
                    println!("  {}: {}", issue.location, issue.message);
                }
            }
            Ok(())
        }
        Err(err) => {
            goals::update_goal_status(pool, goal_id, GoalStatus::Error)
                .await
                .context("failed to mark goal as errored")?;
            Err(anyhow::Error::new(err).context("plan generation failed"))
        }
    }
}
