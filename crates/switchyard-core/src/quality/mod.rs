//! Work-package documentation quality checks.
//!
//! Every work package's notes must carry six markdown sections with
//! minimum item counts: `Kurzfassung`, `Schritte` (>= 6 numbered steps),
//! `Definition of Done` (>= 7 checkboxes), `Risiken` (>= 3 bullets),
//! `Quellen` (3-8 URLs), `Bilder` (1-3 URLs). Findings are collected per
//! work-package location and never block plan acceptance.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::graph::CandidateGraph;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s)\]>"']+"#).expect("URL regex is valid")
});

static ORDERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s+").expect("ordered-item regex is valid"));

/// A single documentation defect, keyed by work-package location.
#[derive(Debug, Clone, Serialize)]
pub struct QualityIssue {
    /// Where the defect sits, e.g. `route r1 / task "Setup" / work package "Install"`.
    pub location: String,
    /// Name of the offending section.
    pub section: String,
    pub message: String,
}

/// Section requirements, in reporting order.
const SECTIONS: &[&str] = &[
    "Kurzfassung",
    "Schritte",
    "Definition of Done",
    "Risiken",
    "Quellen",
    "Bilder",
];

/// Check every work package in the candidate graph.
pub fn check_plan_quality(graph: &CandidateGraph) -> Vec<QualityIssue> {
    let mut issues = Vec::new();

    for route in &graph.routes {
        for task in &route.tasks {
            for wp in &task.work_packages {
                let location = format!(
                    "route {} / task {:?} / work package {:?}",
                    route.key, task.title, wp.title
                );
                for (section, message) in check_notes(&wp.notes) {
                    issues.push(QualityIssue {
                        location: location.clone(),
                        section,
                        message,
                    });
                }
            }
        }
    }

    issues
}

/// Check one notes blob. Returns `(section, message)` pairs for every
/// missing or short section.
pub fn check_notes(notes: &str) -> Vec<(String, String)> {
    let sections = split_sections(notes);
    let mut findings = Vec::new();

    for &name in SECTIONS {
        let Some(body) = sections.get(&normalize_heading(name)) else {
            findings.push((name.to_string(), format!("missing section {name:?}")));
            continue;
        };

        match name {
            "Kurzfassung" => {
                if body.iter().all(|l| l.trim().is_empty()) {
                    findings.push((name.to_string(), "section \"Kurzfassung\" is empty".into()));
                }
            }
            "Schritte" => {
                let count = body.iter().filter(|l| is_ordered_item(l)).count();
                if count < 6 {
                    findings.push((
                        name.to_string(),
                        format!("section \"Schritte\" has {count} numbered steps, expected at least 6"),
                    ));
                }
            }
            "Definition of Done" => {
                let count = body.iter().filter(|l| is_checkbox(l)).count();
                if count < 7 {
                    findings.push((
                        name.to_string(),
                        format!(
                            "section \"Definition of Done\" has {count} checkboxes, expected at least 7"
                        ),
                    ));
                }
            }
            "Risiken" => {
                let count = body.iter().filter(|l| is_bullet(l)).count();
                if count < 3 {
                    findings.push((
                        name.to_string(),
                        format!("section \"Risiken\" has {count} bullet items, expected at least 3"),
                    ));
                }
            }
            "Quellen" => {
                let count = extract_urls(body).len();
                if !(3..=8).contains(&count) {
                    findings.push((
                        name.to_string(),
                        format!("section \"Quellen\" has {count} source links, expected 3 to 8"),
                    ));
                }
            }
            "Bilder" => {
                let count = extract_urls(body).len();
                if !(1..=3).contains(&count) {
                    findings.push((
                        name.to_string(),
                        format!("section \"Bilder\" has {count} image links, expected 1 to 3"),
                    ));
                }
            }
            _ => {}
        }
    }

    findings
}

// ---------------------------------------------------------------------------
// Markdown helpers
// ---------------------------------------------------------------------------

/// Split notes into sections keyed by normalized heading. Lines before the
/// first heading are ignored here (the checker only cares about the named
/// sections).
fn split_sections(notes: &str) -> HashMap<String, Vec<String>> {
    let mut sections: HashMap<String, Vec<String>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in notes.lines() {
        if let Some(heading) = heading_from_line(line) {
            current = Some(normalize_heading(&heading));
            sections.entry(normalize_heading(&heading)).or_default();
            continue;
        }
        if let Some(ref key) = current {
            sections
                .entry(key.clone())
                .or_default()
                .push(line.to_string());
        }
    }

    sections
}

/// Recognize `#`/`##`/`###` markdown headings and the tolerated
/// `Heading:` style.
fn heading_from_line(line: &str) -> Option<String> {
    let s = line.trim();
    for prefix in ["### ", "## ", "# "] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return Some(rest.trim().to_string());
        }
    }
    // Tolerate "Titel:" style headings.
    if let Some(stripped) = s.strip_suffix(':') {
        if (2..=40).contains(&s.len()) {
            return Some(stripped.trim().to_string());
        }
    }
    None
}

fn normalize_heading(heading: &str) -> String {
    heading.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn is_ordered_item(line: &str) -> bool {
    ORDERED_RE.is_match(line)
}

fn is_checkbox(line: &str) -> bool {
    let s = line.trim();
    s.starts_with("- [ ") || s.starts_with("- [x") || s.starts_with("- [X")
}

fn is_bullet(line: &str) -> bool {
    let s = line.trim();
    s.starts_with("- ") || s.starts_with("* ")
}

/// Extract URL-shaped tokens, stripping trailing punctuation and
/// de-duplicating while preserving order.
fn extract_urls(lines: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for line in lines {
        for m in URL_RE.find_iter(line) {
            let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', '"', ')', '\'', ']', '>']);
            if !url.is_empty() && !seen.iter().any(|u| u == url) {
                seen.push(url.to_string());
            }
        }
    }
    seen
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CandidateGraph, CandidateRoute, CandidateTask, CandidateWorkPackage};
    use switchyard_db::models::RouteKind;

    /// Notes that satisfy every requirement.
    fn complete_notes() -> String {
        let steps: String = (1..=6).map(|i| format!("{i}. Schritt {i}\n")).collect();
        let checks: String = (1..=7).map(|i| format!("- [ ] Kriterium {i}\n")).collect();
        let risks: String = (1..=3).map(|i| format!("- Risiko {i}\n")).collect();
        let sources: String = (1..=3)
            .map(|i| format!("- https://example.org/quelle-{i}\n"))
            .collect();
        format!(
            "## Kurzfassung\nEin kurzer Abriss.\n\n\
             ## Schritte\n{steps}\n\
             ## Definition of Done\n{checks}\n\
             ## Risiken\n{risks}\n\
             ## Quellen\n{sources}\n\
             ## Bilder\n- https://example.org/bild-1.png\n"
        )
    }

    fn graph_with_notes(notes: &str) -> CandidateGraph {
        CandidateGraph {
            title: "G".to_string(),
            description: String::new(),
            routes: vec![CandidateRoute {
                key: "r0".to_string(),
                title: "Start".to_string(),
                description: String::new(),
                kind: RouteKind::Trunk,
                phase: 0,
                tasks: vec![CandidateTask {
                    title: "Setup".to_string(),
                    notes: String::new(),
                    work_packages: vec![CandidateWorkPackage {
                        title: "Install".to_string(),
                        notes: notes.to_string(),
                        length: 1,
                        grade: 0,
                    }],
                }],
            }],
            edges: vec![],
            decisions: vec![],
        }
    }

    #[test]
    fn complete_notes_pass() {
        let findings = check_notes(&complete_notes());
        assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    }

    #[test]
    fn empty_notes_flag_every_section() {
        let findings = check_notes("");
        assert_eq!(findings.len(), SECTIONS.len());
        for (section, message) in &findings {
            assert!(message.contains("missing section"), "{section}: {message}");
        }
    }

    #[test]
    fn missing_section_is_named() {
        let notes = complete_notes().replace("## Risiken", "## Nebenwirkungen");
        let findings = check_notes(&notes);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].0, "Risiken");
        assert!(findings[0].1.contains("missing section \"Risiken\""));
    }

    #[test]
    fn short_steps_flagged_with_count() {
        let notes = complete_notes().replace("6. Schritt 6\n", "");
        let findings = check_notes(&notes);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].0, "Schritte");
        assert!(findings[0].1.contains("has 5 numbered steps"));
    }

    #[test]
    fn short_checklist_flagged() {
        let notes = complete_notes().replace("- [ ] Kriterium 7\n", "");
        let findings = check_notes(&notes);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].0, "Definition of Done");
    }

    #[test]
    fn checked_boxes_count_too() {
        let notes = complete_notes().replace("- [ ] Kriterium 1", "- [x] Kriterium 1");
        let findings = check_notes(&notes);
        assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    }

    #[test]
    fn too_few_sources_flagged() {
        let notes = complete_notes().replace("- https://example.org/quelle-3\n", "");
        let findings = check_notes(&notes);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].0, "Quellen");
        assert!(findings[0].1.contains("has 2 source links"));
    }

    #[test]
    fn too_many_images_flagged() {
        let extra: String = (2..=4)
            .map(|i| format!("- https://example.org/bild-{i}.png\n"))
            .collect();
        let notes = format!("{}{extra}", complete_notes());
        let findings = check_notes(&notes);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].0, "Bilder");
        assert!(findings[0].1.contains("has 4 image links"));
    }

    #[test]
    fn duplicate_urls_count_once() {
        let notes = complete_notes().replace(
            "- https://example.org/quelle-3\n",
            "- https://example.org/quelle-2\n",
        );
        let findings = check_notes(&notes);
        assert_eq!(findings.len(), 1, "duplicate should not satisfy the minimum");
        assert_eq!(findings[0].0, "Quellen");
    }

    #[test]
    fn trailing_punctuation_stripped_from_urls() {
        let notes = complete_notes().replace(
            "- https://example.org/quelle-3\n",
            "Siehe (https://example.org/quelle-3).\n",
        );
        let findings = check_notes(&notes);
        assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    }

    #[test]
    fn colon_style_headings_tolerated() {
        let notes = complete_notes().replace("## Kurzfassung", "Kurzfassung:");
        let findings = check_notes(&notes);
        assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    }

    #[test]
    fn plan_issues_carry_location() {
        let graph = graph_with_notes("nur Text, keine Struktur");
        let issues = check_plan_quality(&graph);
        assert_eq!(issues.len(), SECTIONS.len());
        assert!(issues[0].location.contains("route r0"));
        assert!(issues[0].location.contains("task \"Setup\""));
        assert!(issues[0].location.contains("work package \"Install\""));
    }

    #[test]
    fn complete_plan_has_no_issues() {
        let graph = graph_with_notes(&complete_notes());
        assert!(check_plan_quality(&graph).is_empty());
    }
}
