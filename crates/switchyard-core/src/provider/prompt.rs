//! Prompt construction for plan generation.
//!
//! Assembles the instruction block sent to the provider: the JSON schema
//! the response must match, the structural constraints, and the required
//! work-package documentation sections.

use super::PlanPrompt;

/// JSON schema reference included in every request.
const SCHEMA_REFERENCE: &str = r#"## Plan JSON Schema

```json
{
  "title": "string",
  "description": "string",
  "routes": [
    {
      "id": "r0",
      "title": "string",
      "description": "string",
      "kind": "trunk",
      "phase": 0,
      "tasks": [
        {
          "title": "string",
          "notes": "string",
          "work_packages": [
            {"title": "string", "notes": "markdown", "length": 1, "grade": 0}
          ]
        }
      ]
    }
  ],
  "edges": [{"from": "r0", "to": "r1"}],
  "decisions": [
    {
      "title": "string",
      "prompt": "string",
      "origin": "r0",
      "phase": 1,
      "options": [{"label": "string", "to": "r1"}]
    }
  ]
}
```

### Field rules
- `routes[].id`: unique keys like "r0", "r1", referenced by edges and decisions.
- `routes[].kind`: "trunk" for the main line, "branch" for decision alternatives.
- `routes[].phase`: branching depth, an integer from 0 to 10. Exactly one
  route has phase 0 and no incoming edge; phases never decrease along an edge.
- `edges`: the whole graph must be acyclic and every route reachable from the
  phase-0 root. Merges (several edges into one route) are allowed.
- `decisions`: each needs at least 2 options, all branching off the `origin`
  route; every option must have a matching edge from `origin` to its target.
- `work_packages[].length`: effort from 1 to 8. `grade`: difficulty from 0 to 10.
"#;

/// Documentation requirements for work-package notes.
const NOTES_GUIDELINES: &str = r#"## Work package notes

Every work package's `notes` field is markdown with exactly these sections,
using these German headers verbatim:

- `## Kurzfassung` -- a short summary paragraph.
- `## Schritte` -- at least 6 numbered steps ("1. ...").
- `## Definition of Done` -- at least 7 checkboxes ("- [ ] ...").
- `## Risiken` -- at least 3 bullet items.
- `## Quellen` -- 3 to 8 source URLs (https://...).
- `## Bilder` -- 1 to 3 image URLs.
"#;

/// Build the full instruction text for one plan request.
pub fn build_plan_prompt(prompt: &PlanPrompt) -> String {
    let mut out = String::with_capacity(4096);

    out.push_str("# Plan Architect\n\n");
    out.push_str(
        "You are a planning assistant. Decompose the given goal into a \
         directed acyclic graph of routes (macro-stages), each carrying \
         tasks and work packages, with decision points offering mutually \
         exclusive alternatives that may merge back later.\n\n",
    );
    out.push_str(
        "Respond with exactly one JSON object matching the schema below. \
         No prose before or after the object.\n\n",
    );

    out.push_str(SCHEMA_REFERENCE);
    out.push('\n');
    out.push_str(NOTES_GUIDELINES);
    out.push('\n');

    let c = &prompt.constraints;
    out.push_str("## Constraints\n\n");
    out.push_str(&format!("- At most {} routes.\n", c.max_routes));
    out.push_str(&format!("- At most {} tasks per route.\n", c.max_tasks_per_route));
    out.push_str(&format!(
        "- At most {} work packages per task.\n",
        c.max_work_packages_per_task
    ));
    out.push_str("- At least one decision with 2 or more options.\n\n");

    out.push_str("## Goal\n\n");
    out.push_str(prompt.goal.trim());
    out.push('\n');

    if !prompt.context.trim().is_empty() {
        out.push_str("\n## Context\n\n");
        out.push_str(prompt.context.trim());
        out.push('\n');
    }

    out
}
