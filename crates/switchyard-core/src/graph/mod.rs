//! Candidate graph model: plan structures as decoded from provider output.
//!
//! A candidate keeps the provider-assigned string keys (`"r0"`, `"r1"`) so
//! validation issues can cite locations the way the provider named them.
//! Database UUIDs are assigned only when an accepted plan is applied.

pub mod decode;
pub mod validate;

pub use decode::{DecodeError, DecodeLimits, decode_candidate};
pub use validate::{Severity, ValidationIssue, ValidationReport, validate_candidate};

use serde::{Deserialize, Serialize};

use switchyard_db::models::RouteKind;

use crate::quality::QualityIssue;

/// A decoded plan graph, not yet validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateGraph {
    pub title: String,
    pub description: String,
    pub routes: Vec<CandidateRoute>,
    pub edges: Vec<CandidateEdge>,
    pub decisions: Vec<CandidateDecision>,
}

impl CandidateGraph {
    /// Total number of work packages across all routes and tasks.
    pub fn work_package_count(&self) -> usize {
        self.routes
            .iter()
            .flat_map(|r| &r.tasks)
            .map(|t| t.work_packages.len())
            .sum()
    }
}

/// A route of the candidate, identified by its provider key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRoute {
    /// Provider-assigned key, e.g. `"r0"`. Unique within the candidate.
    pub key: String,
    pub title: String,
    pub description: String,
    pub kind: RouteKind,
    /// Branching depth, expected in 0-10 (checked by the validator).
    pub phase: i32,
    pub tasks: Vec<CandidateTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTask {
    pub title: String,
    pub notes: String,
    pub work_packages: Vec<CandidateWorkPackage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateWorkPackage {
    pub title: String,
    /// Markdown notes; completeness is checked by the quality checker.
    pub notes: String,
    pub length: i32,
    pub grade: i32,
}

/// A directed edge between two routes, by provider key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEdge {
    pub from: String,
    pub to: String,
}

/// A decision point branching off a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDecision {
    pub title: String,
    pub prompt: String,
    /// Key of the route the branches originate from.
    pub origin: String,
    pub phase: i32,
    pub options: Vec<CandidateOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateOption {
    pub label: String,
    /// Key of the route this option leads to.
    pub to: String,
}

/// A validated plan, ready to persist.
///
/// Carries the structural warnings the validator recorded and the
/// (non-blocking) quality issues found in the work-package notes.
#[derive(Debug, Clone)]
pub struct Plan {
    pub graph: CandidateGraph,
    /// Name of the provider that produced the plan.
    pub source: String,
    /// Warning-level validation issues; error-level issues reject a
    /// candidate before a `Plan` exists.
    pub warnings: Vec<ValidationIssue>,
    /// Work-package documentation defects. Recorded, never blocking.
    pub quality_issues: Vec<QualityIssue>,
}
