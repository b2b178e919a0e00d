//! Structural validation of a decoded candidate graph.
//!
//! Checks run in a fixed order: acyclicity, single-root reachability,
//! phase monotonicity, decision consistency, merge validity. Every issue
//! carries a severity and a human-readable location; any error-level issue
//! rejects the whole candidate, warnings ride along with the accepted plan.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use switchyard_db::models::RouteKind;

use super::CandidateGraph;

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation finding with a human-readable location
/// (e.g. `"route r3"` or `"edge r1 -> r0"`).
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub location: String,
    pub message: String,
}

/// The full verdict for one candidate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// True when no error-level issue was recorded.
    pub fn passed(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| i.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Warning-level issues, cloned for attachment to an accepted plan.
    pub fn warnings(&self) -> Vec<ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .cloned()
            .collect()
    }

    /// One line describing the first error, for events and terminal
    /// failures. Empty when the report passed.
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .find(|i| i.severity == Severity::Error)
            .map(|i| format!("{}: {}", i.location, i.message))
            .unwrap_or_default()
    }

    fn error(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Error,
            location: location.into(),
            message: message.into(),
        });
    }

    fn warning(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Warning,
            location: location.into(),
            message: message.into(),
        });
    }
}

/// Validate a decoded candidate graph.
pub fn validate_candidate(graph: &CandidateGraph) -> ValidationReport {
    let mut report = ValidationReport::default();

    let key_to_idx: HashMap<&str, usize> = graph
        .routes
        .iter()
        .enumerate()
        .map(|(i, r)| (r.key.as_str(), i))
        .collect();
    let n = graph.routes.len();

    // Resolve edges; dangling references are errors and the edge is
    // excluded from traversal.
    let mut adj: Vec<Vec<usize>> = vec![vec![]; n];
    let mut in_degree = vec![0usize; n];
    let mut edge_set: HashSet<(usize, usize)> = HashSet::new();

    for edge in &graph.edges {
        let location = format!("edge {} -> {}", edge.from, edge.to);
        let from = key_to_idx.get(edge.from.as_str());
        let to = key_to_idx.get(edge.to.as_str());
        match (from, to) {
            (Some(&f), Some(&t)) => {
                adj[f].push(t);
                in_degree[t] += 1;
                edge_set.insert((f, t));
            }
            (None, _) => {
                report.error(location.as_str(), format!("references unknown route {}", edge.from));
            }
            (_, None) => {
                report.error(location.as_str(), format!("references unknown route {}", edge.to));
            }
        }
    }

    // 1. Acyclicity: DFS with back-edge detection so the closing edge of
    //    every cycle is named.
    check_cycles(graph, &adj, &mut report);

    // 2. Single-root reachability.
    check_root_and_reachability(graph, &adj, &in_degree, &mut report);

    // 3. Phase monotonicity and range.
    check_phases(graph, &key_to_idx, &mut report);

    // 4. Decision consistency.
    check_decisions(graph, &key_to_idx, &edge_set, &mut report);

    // 5. Merge validity: multiple incoming edges are legal; nothing to
    //    check beyond acyclicity. Warn on unusually high branching instead.
    for (i, route) in graph.routes.iter().enumerate() {
        if route.kind == RouteKind::Trunk && adj[i].len() >= 4 {
            report.warning(
                format!("route {}", route.key),
                format!("trunk route has {} outgoing edges, unusually high branching", adj[i].len()),
            );
        }
    }

    report
}

/// DFS with colors; every back edge closes a cycle and is reported.
fn check_cycles(graph: &CandidateGraph, adj: &[Vec<usize>], report: &mut ValidationReport) {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    let n = graph.routes.len();
    let mut color = vec![WHITE; n];

    for start in 0..n {
        if color[start] != WHITE {
            continue;
        }
        // Iterative DFS: (node, next child index to visit).
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        color[start] = GRAY;

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            if frame.1 < adj[node].len() {
                let child = adj[node][frame.1];
                frame.1 += 1;
                match color[child] {
                    GRAY => {
                        report.error(
                            format!(
                                "edge {} -> {}",
                                graph.routes[node].key, graph.routes[child].key
                            ),
                            "closes a cycle".to_string(),
                        );
                    }
                    WHITE => {
                        color[child] = GRAY;
                        stack.push((child, 0));
                    }
                    _ => {}
                }
            } else {
                color[node] = BLACK;
                stack.pop();
            }
        }
    }
}

/// Exactly one route without incoming edges, at phase 0, from which every
/// other route is reachable.
fn check_root_and_reachability(
    graph: &CandidateGraph,
    adj: &[Vec<usize>],
    in_degree: &[usize],
    report: &mut ValidationReport,
) {
    let roots: Vec<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| i)
        .collect();

    match roots.as_slice() {
        [] => {
            report.error(
                "graph".to_string(),
                "no root route: every route has an incoming edge",
            );
        }
        [root] => {
            let root = *root;
            if graph.routes[root].phase != 0 {
                report.error(
                    format!("route {}", graph.routes[root].key),
                    format!("root route must have phase 0, found {}", graph.routes[root].phase),
                );
            }

            // BFS from the root.
            let mut reachable = vec![false; graph.routes.len()];
            let mut queue = VecDeque::from([root]);
            reachable[root] = true;
            while let Some(node) = queue.pop_front() {
                for &next in &adj[node] {
                    if !reachable[next] {
                        reachable[next] = true;
                        queue.push_back(next);
                    }
                }
            }

            for (i, route) in graph.routes.iter().enumerate() {
                if !reachable[i] {
                    report.error(
                        format!("route {}", route.key),
                        format!("not reachable from root route {}", graph.routes[root].key),
                    );
                }
            }
        }
        many => {
            let keys: Vec<&str> = many
                .iter()
                .map(|&i| graph.routes[i].key.as_str())
                .collect();
            report.error(
                "graph".to_string(),
                format!("multiple root routes without incoming edges: {}", keys.join(", ")),
            );
        }
    }
}

/// Phases stay within [0, 10] and never decrease along an edge.
fn check_phases(
    graph: &CandidateGraph,
    key_to_idx: &HashMap<&str, usize>,
    report: &mut ValidationReport,
) {
    for route in &graph.routes {
        if !(0..=10).contains(&route.phase) {
            report.error(
                format!("route {}", route.key),
                format!("phase {} outside the allowed range 0-10", route.phase),
            );
        }
    }

    for edge in &graph.edges {
        let (Some(&f), Some(&t)) = (
            key_to_idx.get(edge.from.as_str()),
            key_to_idx.get(edge.to.as_str()),
        ) else {
            // Dangling edges were already reported.
            continue;
        };
        let from_phase = graph.routes[f].phase;
        let to_phase = graph.routes[t].phase;
        if to_phase < from_phase {
            report.error(
                format!("edge {} -> {}", edge.from, edge.to),
                format!("phase decreases from {from_phase} to {to_phase}"),
            );
        }
    }
}

/// Every decision needs >= 2 options; each option's branch must exist as an
/// edge out of the decision's origin route.
fn check_decisions(
    graph: &CandidateGraph,
    key_to_idx: &HashMap<&str, usize>,
    edge_set: &HashSet<(usize, usize)>,
    report: &mut ValidationReport,
) {
    for (di, decision) in graph.decisions.iter().enumerate() {
        let location = format!("decision {} {:?}", di, decision.title);

        let Some(&origin) = key_to_idx.get(decision.origin.as_str()) else {
            report.error(location.as_str(), format!("origin references unknown route {}", decision.origin));
            continue;
        };

        if decision.options.len() < 2 {
            report.error(
                location.as_str(),
                format!("has {} option(s), a decision needs at least 2", decision.options.len()),
            );
        }

        for option in &decision.options {
            let Some(&target) = key_to_idx.get(option.to.as_str()) else {
                report.error(
                    location.as_str(),
                    format!("option {:?} references unknown route {}", option.label, option.to),
                );
                continue;
            };
            if !edge_set.contains(&(origin, target)) {
                report.error(
                    location.as_str(),
                    format!(
                        "option {:?} has no matching edge {} -> {}",
                        option.label, decision.origin, option.to
                    ),
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
