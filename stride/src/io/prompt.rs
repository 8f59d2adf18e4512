//! Prompt rendering for the planner, coder and reviewer agents.
//!
//! Templates are split into sections with `<!-- section:KEY required|droppable -->`
//! markers. When a rendered prompt exceeds the byte budget, droppable sections
//! are removed in a fixed order and the last remaining section is truncated.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use crate::core::types::TaskDescriptor;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const CODER_TEMPLATE: &str = include_str!("prompts/coder.md");
const REVIEWER_TEMPLATE: &str = include_str!("prompts/reviewer.md");

const SECTION_MARKER: &str = r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->";

/// Droppable sections, least important first.
const DROP_ORDER: [&str; 2] = ["hints", "workspace"];

const TRUNCATION_NOTICE: &str = "\n[truncated]";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Inputs for the coder prompt.
#[derive(Debug, Clone, Copy)]
pub struct CoderInputs<'a> {
    pub task: &'a TaskDescriptor,
    /// Previous review comment when this is a revision attempt.
    pub revision: Option<&'a str>,
    pub revision_count: u32,
    pub workspace: &'a str,
}

/// Inputs for the reviewer prompt.
#[derive(Debug, Clone, Copy)]
pub struct ReviewerInputs<'a> {
    pub task: &'a TaskDescriptor,
    pub changed_files: &'a [String],
    pub workspace: &'a str,
}

/// Renders agent prompts within a byte budget.
pub struct PromptBuilder {
    env: Environment<'static>,
    section_re: Regex,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .context("load planner template")?;
        env.add_template("coder", CODER_TEMPLATE)
            .context("load coder template")?;
        env.add_template("reviewer", REVIEWER_TEMPLATE)
            .context("load reviewer template")?;
        let section_re = Regex::new(SECTION_MARKER).context("compile section marker")?;
        Ok(Self {
            env,
            section_re,
            budget_bytes,
        })
    }

    pub fn planner(&self, plan: &str, workspace: &str) -> Result<String> {
        let rendered = self.env.get_template("planner")?.render(context! {
            plan => plan.trim(),
            workspace => non_empty(workspace),
        })?;
        Ok(self.fit(&rendered))
    }

    pub fn coder(&self, input: &CoderInputs<'_>) -> Result<String> {
        let rendered = self.env.get_template("coder")?.render(context! {
            task => input.task.description.trim(),
            read_files => &input.task.read_paths,
            write_files => &input.task.write_paths,
            revision => input.revision.and_then(non_empty),
            revision_count => input.revision_count,
            workspace => non_empty(input.workspace),
        })?;
        Ok(self.fit(&rendered))
    }

    pub fn reviewer(&self, input: &ReviewerInputs<'_>) -> Result<String> {
        let rendered = self.env.get_template("reviewer")?.render(context! {
            task => input.task.description.trim(),
            write_files => &input.task.write_paths,
            changed_files => input.changed_files,
            workspace => non_empty(input.workspace),
        })?;
        Ok(self.fit(&rendered))
    }

    fn fit(&self, rendered: &str) -> String {
        let mut sections = self.parse_sections(rendered);
        apply_budget(&mut sections, self.budget_bytes);
        render_sections(&sections)
    }

    /// Split on section markers, discarding empty sections.
    fn parse_sections(&self, rendered: &str) -> Vec<ParsedSection> {
        let markers: Vec<_> = self.section_re.captures_iter(rendered).collect();
        let mut sections = Vec::new();
        for (i, caps) in markers.iter().enumerate() {
            let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let end = markers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(rendered.len(), |m| m.start());
            let content = rendered[whole.end()..end].trim();
            if content.is_empty() {
                continue;
            }
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required: kind.as_str() == "required",
                content: content.to_string(),
            });
        }
        sections
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let allowed = budget.saturating_sub(total_len(rest));
    let before_len = last.content.len();
    if allowed > TRUNCATION_NOTICE.len() {
        truncate_at_char(&mut last.content, allowed - TRUNCATION_NOTICE.len());
        last.content.push_str(TRUNCATION_NOTICE);
    } else {
        truncate_at_char(&mut last.content, allowed);
    }
    debug!(
        section = last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn truncate_at_char(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> TaskDescriptor {
        TaskDescriptor::new(
            "Add a CSV exporter",
            vec!["src/model.rs".into()],
            vec!["src/export.rs".into()],
        )
    }

    #[test]
    fn planner_prompt_carries_plan_and_workspace() {
        let builder = PromptBuilder::new(10_000).expect("builder");
        let prompt = builder.planner("Build an exporter.", "demo").expect("render");

        let contract = prompt.find("### Planner Contract").expect("contract");
        let plan = prompt.find("Build an exporter.").expect("plan");
        let workspace = prompt.find("### Workspace").expect("workspace");
        assert!(contract < plan && plan < workspace);
        assert!(!prompt.contains("section:"));
    }

    #[test]
    fn coder_prompt_includes_revision_only_when_revising() {
        let builder = PromptBuilder::new(10_000).expect("builder");
        let task = task();

        let first = builder
            .coder(&CoderInputs {
                task: &task,
                revision: None,
                revision_count: 0,
                workspace: "demo",
            })
            .expect("render");
        assert!(!first.contains("### Revision Request"));
        assert!(first.contains("- src/export.rs"));

        let second = builder
            .coder(&CoderInputs {
                task: &task,
                revision: Some("handle empty rows"),
                revision_count: 1,
                workspace: "demo",
            })
            .expect("render");
        assert!(second.contains("### Revision Request"));
        assert!(second.contains("handle empty rows"));
        assert!(second.contains("attempt=\"1\""));
    }

    #[test]
    fn bare_task_has_no_files_section() {
        let builder = PromptBuilder::new(10_000).expect("builder");
        let task = TaskDescriptor::bare("Tidy up");
        let prompt = builder
            .reviewer(&ReviewerInputs {
                task: &task,
                changed_files: &[],
                workspace: "",
            })
            .expect("render");
        assert!(!prompt.contains("### Files"));
        assert!(!prompt.contains("### Workspace"));
        assert!(prompt.contains("Tidy up"));
    }

    #[test]
    fn budget_drops_hints_before_workspace() {
        let builder = PromptBuilder::new(10_000).expect("builder");
        let task = TaskDescriptor::new("t", vec!["r".repeat(400)], vec![]);
        let full = builder
            .coder(&CoderInputs {
                task: &task,
                revision: None,
                revision_count: 0,
                workspace: "demo",
            })
            .expect("render");

        let tight = PromptBuilder::new(full.len() - 100).expect("builder");
        let prompt = tight
            .coder(&CoderInputs {
                task: &task,
                revision: None,
                revision_count: 0,
                workspace: "demo",
            })
            .expect("render");
        assert!(!prompt.contains("### Files"));
        assert!(prompt.contains("### Workspace"));
        assert!(prompt.contains("### Coder Contract"));
    }

    #[test]
    fn oversized_required_section_is_truncated() {
        let builder = PromptBuilder::new(1_200).expect("builder");
        let plan = "é".repeat(2_000);
        let prompt = builder.planner(&plan, "demo").expect("render");
        assert!(!prompt.contains("### Workspace"));
        assert!(prompt.ends_with("[truncated]"));
        assert!(prompt.len() <= 1_200 + "\n\n".len());
    }
}
