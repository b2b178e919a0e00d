//! Strict decoding of raw provider output into a [`CandidateGraph`].
//!
//! Decode is all-or-nothing: either the full candidate is constructed, or a
//! [`DecodeError`] identifies the first structural mismatch. Providers wrap
//! their JSON in prose or code fences often enough that extraction tolerates
//! raw JSON, fenced ```json blocks, and surrounding text.

use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;

use switchyard_db::models::RouteKind;

use super::{
    CandidateDecision, CandidateEdge, CandidateGraph, CandidateOption, CandidateRoute,
    CandidateTask, CandidateWorkPackage,
};

/// Errors from decoding provider output into a candidate graph.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no JSON object found in provider output")]
    NoJsonObject,

    #[error("provider output is not valid JSON: {0}")]
    Json(String),

    #[error("plan schema mismatch: {0}")]
    Schema(String),

    #[error("plan contains no routes")]
    NoRoutes,

    #[error("duplicate route key {0:?}")]
    DuplicateRouteKey(String),

    #[error("invalid route kind {value:?} on route {route} (expected trunk or branch)")]
    InvalidRouteKind { route: String, value: String },

    #[error("plan has {count} routes, above the configured maximum of {max}")]
    TooManyRoutes { count: usize, max: usize },

    #[error("route {route} has {count} tasks, above the configured maximum of {max}")]
    TooManyTasks {
        route: String,
        count: usize,
        max: usize,
    },

    #[error(
        "task {task:?} on route {route} has {count} work packages, above the configured maximum of {max}"
    )]
    TooManyWorkPackages {
        route: String,
        task: String,
        count: usize,
        max: usize,
    },
}

/// Structural bounds the decoder enforces, derived from the generation
/// configuration.
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    pub max_routes: usize,
    pub max_tasks_per_route: usize,
    pub max_work_packages_per_task: usize,
}

// ---------------------------------------------------------------------------
// Raw serde shapes (provider JSON)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawGraph {
    title: String,
    #[serde(default)]
    description: String,
    routes: Vec<RawRoute>,
    #[serde(default)]
    edges: Vec<RawEdge>,
    #[serde(default)]
    decisions: Vec<RawDecision>,
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_kind")]
    kind: String,
    phase: i32,
    #[serde(default)]
    tasks: Vec<RawTask>,
}

fn default_kind() -> String {
    "trunk".to_string()
}

#[derive(Debug, Deserialize)]
struct RawTask {
    title: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    work_packages: Vec<RawWorkPackage>,
}

#[derive(Debug, Deserialize)]
struct RawWorkPackage {
    title: String,
    #[serde(default)]
    notes: String,
    #[serde(default = "default_length")]
    length: i32,
    #[serde(default)]
    grade: i32,
}

fn default_length() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
struct RawEdge {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    title: String,
    #[serde(default)]
    prompt: String,
    origin: String,
    phase: i32,
    options: Vec<RawOption>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    label: String,
    to: String,
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Extract the first JSON object from a model response.
///
/// Accepts raw JSON, fenced ```json blocks, or extra surrounding text.
fn extract_json_object(text: &str) -> Result<serde_json::Value, DecodeError> {
    let mut candidate = text.trim();

    // Strip code fences if present.
    let stripped;
    if candidate.starts_with("```") {
        stripped = candidate
            .trim_matches('`')
            .trim_start_matches("json")
            .trim()
            .to_string();
        candidate = &stripped;
    }

    // Try a direct parse first.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
        if value.is_object() {
            return Ok(value);
        }
    }

    // Fallback: find the outermost braces.
    let start = candidate.find('{');
    let end = candidate.rfind('}');
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) if e > s => (s, e),
        _ => return Err(DecodeError::NoJsonObject),
    };

    let snippet = &candidate[start..=end];
    let value: serde_json::Value =
        serde_json::from_str(snippet).map_err(|e| DecodeError::Json(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::NoJsonObject);
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode raw provider output into a typed candidate graph.
///
/// All-or-nothing: any structural mismatch, unknown route kind, duplicate
/// route key, or count outside `limits` fails the whole decode.
pub fn decode_candidate(text: &str, limits: &DecodeLimits) -> Result<CandidateGraph, DecodeError> {
    let value = extract_json_object(text)?;

    let raw: RawGraph =
        serde_json::from_value(value).map_err(|e| DecodeError::Schema(e.to_string()))?;

    if raw.routes.is_empty() {
        return Err(DecodeError::NoRoutes);
    }
    if raw.routes.len() > limits.max_routes {
        return Err(DecodeError::TooManyRoutes {
            count: raw.routes.len(),
            max: limits.max_routes,
        });
    }

    let mut seen_keys: HashSet<&str> = HashSet::new();
    let mut routes = Vec::with_capacity(raw.routes.len());

    for raw_route in &raw.routes {
        if !seen_keys.insert(raw_route.id.as_str()) {
            return Err(DecodeError::DuplicateRouteKey(raw_route.id.clone()));
        }

        let kind: RouteKind =
            raw_route
                .kind
                .parse()
                .map_err(|_| DecodeError::InvalidRouteKind {
                    route: raw_route.id.clone(),
                    value: raw_route.kind.clone(),
                })?;

        if raw_route.tasks.len() > limits.max_tasks_per_route {
            return Err(DecodeError::TooManyTasks {
                route: raw_route.id.clone(),
                count: raw_route.tasks.len(),
                max: limits.max_tasks_per_route,
            });
        }

        let mut tasks = Vec::with_capacity(raw_route.tasks.len());
        for raw_task in &raw_route.tasks {
            if raw_task.work_packages.len() > limits.max_work_packages_per_task {
                return Err(DecodeError::TooManyWorkPackages {
                    route: raw_route.id.clone(),
                    task: raw_task.title.clone(),
                    count: raw_task.work_packages.len(),
                    max: limits.max_work_packages_per_task,
                });
            }
            tasks.push(CandidateTask {
                title: raw_task.title.clone(),
                notes: raw_task.notes.clone(),
                work_packages: raw_task
                    .work_packages
                    .iter()
                    .map(|wp| CandidateWorkPackage {
                        title: wp.title.clone(),
                        notes: wp.notes.clone(),
                        length: wp.length,
                        grade: wp.grade,
                    })
                    .collect(),
            });
        }

        routes.push(CandidateRoute {
            key: raw_route.id.clone(),
            title: raw_route.title.clone(),
            description: raw_route.description.clone(),
            kind,
            phase: raw_route.phase,
            tasks,
        });
    }

    let edges = raw
        .edges
        .iter()
        .map(|e| CandidateEdge {
            from: e.from.clone(),
            to: e.to.clone(),
        })
        .collect();

    let decisions = raw
        .decisions
        .iter()
        .map(|d| CandidateDecision {
            title: d.title.clone(),
            prompt: d.prompt.clone(),
            origin: d.origin.clone(),
            phase: d.phase,
            options: d
                .options
                .iter()
                .map(|o| CandidateOption {
                    label: o.label.clone(),
                    to: o.to.clone(),
                })
                .collect(),
        })
        .collect();

    Ok(CandidateGraph {
        title: raw.title,
        description: raw.description,
        routes,
        edges,
        decisions,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DecodeLimits {
        DecodeLimits {
            max_routes: 8,
            max_tasks_per_route: 6,
            max_work_packages_per_task: 6,
        }
    }

    fn minimal_json() -> String {
        r#"{
            "title": "Learn something",
            "description": "A plan",
            "routes": [
                {"id": "r0", "title": "Start", "kind": "trunk", "phase": 0,
                 "tasks": [{"title": "T1", "work_packages": [
                     {"title": "W1", "notes": "n", "length": 2, "grade": 3}
                 ]}]},
                {"id": "r1", "title": "Next", "kind": "branch", "phase": 1, "tasks": []}
            ],
            "edges": [{"from": "r0", "to": "r1"}],
            "decisions": []
        }"#
        .to_string()
    }

    #[test]
    fn decodes_plain_json() {
        let graph = decode_candidate(&minimal_json(), &limits()).expect("should decode");
        assert_eq!(graph.title, "Learn something");
        assert_eq!(graph.routes.len(), 2);
        assert_eq!(graph.routes[0].key, "r0");
        assert_eq!(graph.routes[0].kind, RouteKind::Trunk);
        assert_eq!(graph.routes[0].tasks[0].work_packages[0].length, 2);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.work_package_count(), 1);
    }

    #[test]
    fn decodes_fenced_json() {
        let fenced = format!("```json\n{}\n```", minimal_json());
        let graph = decode_candidate(&fenced, &limits()).expect("should decode fenced block");
        assert_eq!(graph.routes.len(), 2);
    }

    #[test]
    fn decodes_json_with_surrounding_prose() {
        let chatty = format!("Here is your plan:\n\n{}\n\nGood luck!", minimal_json());
        let graph = decode_candidate(&chatty, &limits()).expect("should decode embedded object");
        assert_eq!(graph.title, "Learn something");
    }

    #[test]
    fn rejects_text_without_json() {
        let err = decode_candidate("no json here at all", &limits()).unwrap_err();
        assert!(
            matches!(err, DecodeError::NoJsonObject),
            "expected NoJsonObject, got: {err}"
        );
    }

    #[test]
    fn rejects_broken_json() {
        let err = decode_candidate("{\"title\": \"x\", routes: [}", &limits()).unwrap_err();
        assert!(
            matches!(err, DecodeError::Json(_)),
            "expected Json, got: {err}"
        );
    }

    #[test]
    fn rejects_missing_required_field() {
        // routes missing entirely.
        let err = decode_candidate(r#"{"title": "x"}"#, &limits()).unwrap_err();
        assert!(
            matches!(err, DecodeError::Schema(_)),
            "expected Schema, got: {err}"
        );
    }

    #[test]
    fn rejects_wrong_field_type() {
        let err = decode_candidate(
            r#"{"title": "x", "routes": [{"id": "r0", "title": "t", "phase": "zero"}]}"#,
            &limits(),
        )
        .unwrap_err();
        assert!(
            matches!(err, DecodeError::Schema(_)),
            "expected Schema, got: {err}"
        );
    }

    #[test]
    fn rejects_empty_routes() {
        let err = decode_candidate(r#"{"title": "x", "routes": []}"#, &limits()).unwrap_err();
        assert!(
            matches!(err, DecodeError::NoRoutes),
            "expected NoRoutes, got: {err}"
        );
    }

    #[test]
    fn rejects_duplicate_route_keys() {
        let json = r#"{
            "title": "x",
            "routes": [
                {"id": "r0", "title": "a", "phase": 0},
                {"id": "r0", "title": "b", "phase": 1}
            ]
        }"#;
        let err = decode_candidate(json, &limits()).unwrap_err();
        assert!(
            matches!(err, DecodeError::DuplicateRouteKey(ref k) if k == "r0"),
            "expected DuplicateRouteKey, got: {err}"
        );
    }

    #[test]
    fn rejects_invalid_route_kind() {
        let json = r#"{
            "title": "x",
            "routes": [{"id": "r0", "title": "a", "kind": "siding", "phase": 0}]
        }"#;
        let err = decode_candidate(json, &limits()).unwrap_err();
        assert!(
            matches!(err, DecodeError::InvalidRouteKind { ref value, .. } if value == "siding"),
            "expected InvalidRouteKind, got: {err}"
        );
    }

    #[test]
    fn rejects_too_many_routes() {
        let routes: Vec<String> = (0..9)
            .map(|i| format!(r#"{{"id": "r{i}", "title": "t", "phase": 0}}"#))
            .collect();
        let json = format!(r#"{{"title": "x", "routes": [{}]}}"#, routes.join(","));
        let err = decode_candidate(&json, &limits()).unwrap_err();
        assert!(
            matches!(err, DecodeError::TooManyRoutes { count: 9, max: 8 }),
            "expected TooManyRoutes, got: {err}"
        );
    }

    #[test]
    fn rejects_too_many_tasks() {
        let tasks: Vec<String> = (0..7).map(|i| format!(r#"{{"title": "t{i}"}}"#)).collect();
        let json = format!(
            r#"{{"title": "x", "routes": [{{"id": "r0", "title": "a", "phase": 0, "tasks": [{}]}}]}}"#,
            tasks.join(",")
        );
        let err = decode_candidate(&json, &limits()).unwrap_err();
        assert!(
            matches!(err, DecodeError::TooManyTasks { count: 7, max: 6, .. }),
            "expected TooManyTasks, got: {err}"
        );
    }

    #[test]
    fn rejects_too_many_work_packages() {
        let wps: Vec<String> = (0..7).map(|i| format!(r#"{{"title": "w{i}"}}"#)).collect();
        let json = format!(
            r#"{{"title": "x", "routes": [{{"id": "r0", "title": "a", "phase": 0,
                "tasks": [{{"title": "t", "work_packages": [{}]}}]}}]}}"#,
            wps.join(",")
        );
        let err = decode_candidate(&json, &limits()).unwrap_err();
        assert!(
            matches!(err, DecodeError::TooManyWorkPackages { count: 7, max: 6, .. }),
            "expected TooManyWorkPackages, got: {err}"
        );
    }

    #[test]
    fn defaults_for_optional_fields() {
        let json = r#"{
            "title": "x",
            "routes": [{"id": "r0", "title": "a", "phase": 0,
                        "tasks": [{"title": "t", "work_packages": [{"title": "w"}]}]}]
        }"#;
        let graph = decode_candidate(json, &limits()).expect("should decode with defaults");
        let wp = &graph.routes[0].tasks[0].work_packages[0];
        assert_eq!(wp.length, 1);
        assert_eq!(wp.grade, 0);
        assert_eq!(graph.routes[0].kind, RouteKind::Trunk);
        assert!(graph.edges.is_empty());
        assert!(graph.decisions.is_empty());
    }
}
