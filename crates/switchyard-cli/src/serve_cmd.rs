//! The HTTP/SSE surface: goal CRUD, plan kickoff, work-package toggles,
//! decision switches, and the event snapshot/stream endpoints.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use switchyard_core::apply::PgPlanStore;
use switchyard_core::events::EventBroker;
use switchyard_core::generation::{
    ExponentialBackoff, GenerationConfig, GenerationRequest, GoalLeases, run_generation,
};
use switchyard_core::provider::PlanProvider;
use switchyard_db::models::{
    Decision, DecisionOption, Goal, GoalStatus, Route, RouteEdge, Task, WorkPackage,
    WorkPackageStatus,
};
use switchyard_db::queries::{decisions, goals, graph, work_packages};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared state for the server: the pool, the process-wide event broker,
/// the per-goal generation leases, and the (optional) plan provider.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub broker: Arc<EventBroker>,
    pub leases: GoalLeases,
    pub provider: Option<Arc<dyn PlanProvider>>,
    pub generation: GenerationConfig,
    pub events_enabled: bool,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateGoalRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanGoalRequest {
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Deserialize)]
pub struct SwitchDecisionRequest {
    pub option_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub work_packages: Vec<WorkPackage>,
}

#[derive(Debug, Serialize)]
pub struct RouteDetail {
    #[serde(flatten)]
    pub route: Route,
    pub tasks: Vec<TaskDetail>,
}

#[derive(Debug, Serialize)]
pub struct DecisionDetail {
    #[serde(flatten)]
    pub decision: Decision,
    pub options: Vec<DecisionOption>,
}

/// A goal with its full persisted graph, read-only for rendering.
#[derive(Debug, Serialize)]
pub struct GoalDetailResponse {
    #[serde(flatten)]
    pub goal: Goal,
    pub routes: Vec<RouteDetail>,
    pub edges: Vec<RouteEdge>,
    pub decisions: Vec<DecisionDetail>,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub status: WorkPackageStatus,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/goals", get(list_goals).post(create_goal))
        .route(
            "/api/goals/{id}",
            get(get_goal_detail).delete(delete_goal),
        )
        .route("/api/goals/{id}/plan", post(plan_goal))
        .route(
            "/api/goals/{id}/packages/{package_id}/toggle",
            post(toggle_package),
        )
        .route(
            "/api/goals/{id}/decisions/{decision_id}/switch",
            post(switch_decision),
        )
        .route("/api/events/snapshot", get(events_snapshot))
        .route("/api/events/stream", get(events_stream))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("switchyard serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("switchyard serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Goal handlers
// ---------------------------------------------------------------------------

async fn create_goal(
    State(state): State<AppState>,
    Json(req): Json<CreateGoalRequest>,
) -> Result<axum::response::Response, AppError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("goal title must not be empty"));
    }

    let goal = goals::insert_goal(&state.pool, title, req.description.trim())
        .await
        .map_err(AppError::internal)?;

    Ok((StatusCode::CREATED, Json(goal)).into_response())
}

async fn list_goals(
    State(state): State<AppState>,
) -> Result<axum::response::Response, AppError> {
    let listed = goals::list_goals(&state.pool)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(listed).into_response())
}

async fn get_goal_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let goal = goals::get_goal(&state.pool, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("goal {id} not found")))?;

    let loaded = graph::load_graph(&state.pool, id)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(assemble_detail(goal, loaded)).into_response())
}

async fn delete_goal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let deleted = goals::delete_goal(&state.pool, id)
        .await
        .map_err(AppError::internal)?;
    if !deleted {
        return Err(AppError::not_found(format!("goal {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Group the flat graph rows into the nested response shape.
fn assemble_detail(goal: Goal, loaded: graph::GoalGraph) -> GoalDetailResponse {
    let graph::GoalGraph {
        routes,
        edges,
        decisions,
        options,
        tasks,
        work_packages,
    } = loaded;

    let route_details = routes
        .into_iter()
        .map(|route| {
            let tasks = tasks
                .iter()
                .filter(|t| t.route_id == route.id)
                .cloned()
                .map(|task| {
                    let work_packages = work_packages
                        .iter()
                        .filter(|wp| wp.task_id == task.id)
                        .cloned()
                        .collect();
                    TaskDetail {
                        task,
                        work_packages,
                    }
                })
                .collect();
            RouteDetail { route, tasks }
        })
        .collect();

    let decision_details = decisions
        .into_iter()
        .map(|decision| {
            let options = options
                .iter()
                .filter(|o| o.decision_id == decision.id)
                .cloned()
                .collect();
            DecisionDetail { decision, options }
        })
        .collect();

    GoalDetailResponse {
        goal,
        routes: route_details,
        edges,
        decisions: decision_details,
    }
}

// ---------------------------------------------------------------------------
// Plan kickoff
// ---------------------------------------------------------------------------

async fn plan_goal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PlanGoalRequest>,
) -> Result<axum::response::Response, AppError> {
    let goal = goals::get_goal(&state.pool, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("goal {id} not found")))?;

    let Some(provider) = state.provider.clone() else {
        return Err(AppError::unavailable("no plan provider configured"));
    };

    // At most one generation per goal. The lease is released when the
    // spawned run drops it.
    let Some(lease) = state.leases.acquire(id) else {
        return Err(AppError::conflict(format!(
            "a generation for goal {id} is already running"
        )));
    };

    let request = GenerationRequest {
        goal_id: id,
        goal: goal.title.clone(),
        context: req.context,
        redirect: Some(format!("/api/goals/{id}")),
    };
    let pool = state.pool.clone();
    let broker = Arc::clone(&state.broker);
    let config = state.generation.clone();

    // Fire and forget: the run continues to completion even if every
    // stream subscriber disconnects.
    tokio::spawn(async move {
        let _lease = lease;
        let store = PgPlanStore::new(pool.clone());
        let backoff = ExponentialBackoff::default();

        match run_generation(
            &request,
            provider.as_ref(),
            &store,
            broker.as_ref(),
            &backoff,
            &config,
        )
        .await
        {
            Ok(_plan) => {}
            Err(err) => {
                tracing::warn!(goal_id = %id, error = %err, "generation run failed");
                if let Err(db_err) =
                    goals::update_goal_status(&pool, id, GoalStatus::Error).await
                {
                    tracing::warn!(goal_id = %id, error = %db_err, "failed to mark goal errored");
                }
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"started": true, "goal_id": id})),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Work-package toggle and decision switch
// ---------------------------------------------------------------------------

async fn toggle_package(
    State(state): State<AppState>,
    Path((id, package_id)): Path<(Uuid, Uuid)>,
) -> Result<axum::response::Response, AppError> {
    let status = work_packages::toggle_work_package(&state.pool, id, package_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| {
            AppError::not_found(format!("work package {package_id} not found on goal {id}"))
        })?;

    Ok(Json(ToggleResponse { status }).into_response())
}

async fn switch_decision(
    State(state): State<AppState>,
    Path((id, decision_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SwitchDecisionRequest>,
) -> Result<axum::response::Response, AppError> {
    let switched = decisions::choose_option(&state.pool, id, decision_id, req.option_id)
        .await
        .map_err(AppError::internal)?;
    if !switched {
        return Err(AppError::not_found(format!(
            "decision {decision_id} with option {} not found on goal {id}",
            req.option_id
        )));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// Event endpoints
// ---------------------------------------------------------------------------

async fn events_snapshot(State(state): State<AppState>) -> axum::response::Response {
    let events = if state.events_enabled {
        state.broker.snapshot()
    } else {
        Vec::new()
    };
    Json(serde_json::json!({
        "enabled": state.events_enabled,
        "events": events,
    }))
    .into_response()
}

/// Live event stream: one `data: <json>` frame per event, buffer snapshot
/// first. Dropping the connection detaches only this subscriber.
async fn events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.events_enabled.then(|| state.broker.subscribe());

    let stream = async_stream::stream! {
        let Some(mut subscription) = subscription else { return };
        while let Some(event) = subscription.next().await {
            match serde_json::to_string(&event) {
                Ok(payload) => yield Ok(Event::default().data(payload)),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to serialize progress event");
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
