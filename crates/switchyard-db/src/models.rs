use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Planning status of a goal.
///
/// Goals start `unplanned`; a successful plan application sets `planned`;
/// a terminal generation failure sets `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Planned,
    Unplanned,
    Error,
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planned => "planned",
            Self::Unplanned => "unplanned",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for GoalStatus {
    type Err = GoalStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "unplanned" => Ok(Self::Unplanned),
            "error" => Ok(Self::Error),
            other => Err(GoalStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`GoalStatus`] string.
#[derive(Debug, Clone)]
pub struct GoalStatusParseError(pub String);

impl fmt::Display for GoalStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid goal status: {:?}", self.0)
    }
}

impl std::error::Error for GoalStatusParseError {}

// ---------------------------------------------------------------------------

/// Kind of a route within a plan graph.
///
/// A `trunk` route sits on the main line of the plan; a `branch` route is
/// one of the mutually exclusive alternatives behind a decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Trunk,
    Branch,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trunk => "trunk",
            Self::Branch => "branch",
        };
        f.write_str(s)
    }
}

impl FromStr for RouteKind {
    type Err = RouteKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trunk" => Ok(Self::Trunk),
            "branch" => Ok(Self::Branch),
            other => Err(RouteKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`RouteKind`] string.
#[derive(Debug, Clone)]
pub struct RouteKindParseError(pub String);

impl fmt::Display for RouteKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid route kind: {:?}", self.0)
    }
}

impl std::error::Error for RouteKindParseError {}

// ---------------------------------------------------------------------------

/// Completion status of a work package.
///
/// The only field a user mutates directly after a plan has been applied;
/// everything else is regenerated wholesale by the next plan application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkPackageStatus {
    Open,
    Done,
}

impl fmt::Display for WorkPackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkPackageStatus {
    type Err = WorkPackageStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "done" => Ok(Self::Done),
            other => Err(WorkPackageStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`WorkPackageStatus`] string.
#[derive(Debug, Clone)]
pub struct WorkPackageStatusParseError(pub String);

impl fmt::Display for WorkPackageStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid work package status: {:?}", self.0)
    }
}

impl std::error::Error for WorkPackageStatusParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A goal -- the top-level unit. Owns a route graph once planned.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Goal {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: GoalStatus,
    /// Name of the provider that produced the last applied plan, if any.
    pub plan_source: String,
    pub created_at: DateTime<Utc>,
}

/// A route -- a macro-stage of a plan, positioned at a branching depth
/// (`phase`, 0-10).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Route {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub title: String,
    pub description: String,
    pub kind: RouteKind,
    pub phase: i32,
    pub position: i32,
}

/// A directed edge between two routes of the same goal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RouteEdge {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub from_route_id: Uuid,
    pub to_route_id: Uuid,
    pub position: i32,
}

/// A decision point: a branch offering two or more mutually exclusive
/// outgoing routes. `chosen_option_id` is the user's active choice, used
/// only for rendering emphasis -- the non-chosen branches are kept.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Decision {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub title: String,
    pub prompt: String,
    pub origin_route_id: Uuid,
    pub phase: i32,
    pub chosen_option_id: Option<Uuid>,
    pub position: i32,
}

/// One selectable branch of a decision, pointing at the route it leads to.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DecisionOption {
    pub id: Uuid,
    pub decision_id: Uuid,
    pub label: String,
    pub to_route_id: Uuid,
    pub position: i32,
}

/// A task within a route.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub route_id: Uuid,
    pub title: String,
    pub notes: String,
    pub position: i32,
}

/// The smallest actionable unit, carrying markdown documentation and a
/// completion status.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkPackage {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    /// Markdown notes with the required documentation sections.
    pub notes: String,
    /// Rough effort estimate, >= 1.
    pub length: i32,
    /// Rough difficulty, 0-10.
    pub grade: i32,
    pub status: WorkPackageStatus,
    pub position: i32,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_status_display_roundtrip() {
        let variants = [GoalStatus::Planned, GoalStatus::Unplanned, GoalStatus::Error];
        for v in &variants {
            let s = v.to_string();
            let parsed: GoalStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn goal_status_invalid() {
        let result = "bogus".parse::<GoalStatus>();
        assert!(result.is_err());
    }

    #[test]
    fn route_kind_display_roundtrip() {
        let variants = [RouteKind::Trunk, RouteKind::Branch];
        for v in &variants {
            let s = v.to_string();
            let parsed: RouteKind = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn route_kind_invalid() {
        let result = "siding".parse::<RouteKind>();
        assert!(result.is_err());
    }

    #[test]
    fn work_package_status_display_roundtrip() {
        let variants = [WorkPackageStatus::Open, WorkPackageStatus::Done];
        for v in &variants {
            let s = v.to_string();
            let parsed: WorkPackageStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn work_package_status_invalid() {
        let result = "todo".parse::<WorkPackageStatus>();
        assert!(result.is_err());
    }
}
