//! Goal management commands: create, list, show, delete.

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use uuid::Uuid;

use switchyard_db::queries::{goals, graph};

pub async fn cmd_goal_create(pool: &PgPool, title: &str, description: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        bail!("goal title must not be empty");
    }

    let goal = goals::insert_goal(pool, title, description.trim()).await?;
    println!("Created goal {} ({})", goal.id, goal.title);
    println!("Next: `switchyard plan {}` to generate its route graph.", goal.id);
    Ok(())
}

pub async fn cmd_goal_list(pool: &PgPool) -> Result<()> {
    let listed = goals::list_goals(pool).await?;
    if listed.is_empty() {
        println!("No goals yet. Create one with `switchyard goal create <title>`.");
        return Ok(());
    }

    println!("{:<38} {:<10} {:<10} TITLE", "ID", "STATUS", "SOURCE");
    for goal in listed {
        println!(
            "{:<38} {:<10} {:<10} {}",
            goal.id,
            goal.status.to_string(),
            if goal.plan_source.is_empty() {
                "-"
            } else {
                goal.plan_source.as_str()
            },
            goal.title
        );
    }
    Ok(())
}

pub async fn cmd_goal_show(pool: &PgPool, goal_id: Uuid) -> Result<()> {
    let goal = goals::get_goal(pool, goal_id)
        .await?
        .with_context(|| format!("goal {goal_id} not found"))?;

    println!("{} ({})", goal.title, goal.status);
    if !goal.description.is_empty() {
        println!("  {}", goal.description);
    }

    let loaded = graph::load_graph(pool, goal_id).await?;
    if loaded.is_empty() {
        println!("  no plan yet");
        return Ok(());
    }

    println!(
        "  graph: {} routes, {} edges, {} decisions, {} tasks, {} work packages",
        loaded.routes.len(),
        loaded.edges.len(),
        loaded.decisions.len(),
        loaded.tasks.len(),
        loaded.work_packages.len()
    );

    for route in &loaded.routes {
        println!(
            "  [phase {}] {} ({}) {}",
            route.phase, route.title, route.kind, route.id
        );
        for task in loaded.tasks.iter().filter(|t| t.route_id == route.id) {
            println!("    - {}", task.title);
            for wp in loaded.work_packages.iter().filter(|w| w.task_id == task.id) {
                let mark = match wp.status {
                    switchyard_db::models::WorkPackageStatus::Done => "x",
                    switchyard_db::models::WorkPackageStatus::Open => " ",
                };
                println!("      [{mark}] {} (length {}, grade {})", wp.title, wp.length, wp.grade);
            }
        }
    }

    for decision in &loaded.decisions {
        println!("  decision: {} (phase {})", decision.title, decision.phase);
        for option in loaded.options.iter().filter(|o| o.decision_id == decision.id) {
            let active = decision.chosen_option_id == Some(option.id);
            println!(
                "    {} {} -> route {}",
                if active { "*" } else { "-" },
                option.label,
                option.to_route_id
            );
        }
    }

    Ok(())
}

pub async fn cmd_goal_delete(pool: &PgPool, goal_id: Uuid) -> Result<()> {
    if goals::delete_goal(pool, goal_id).await? {
        println!("Deleted goal {goal_id} and its graph.");
        Ok(())
    } else {
        bail!("goal {goal_id} not found");
    }
}
