//! Decoding of planner output into task descriptors.

use serde::Deserialize;
use tracing::warn;

use crate::core::extract::{ParsedOutput, parse_json_block};
use crate::core::types::TaskDescriptor;

/// One planner list entry: either a legacy bare string or a structured record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlannedTask {
    Bare(String),
    Structured {
        #[serde(default)]
        task: String,
        #[serde(default)]
        read_files: Option<Vec<String>>,
        #[serde(default)]
        write_files: Option<Vec<String>>,
    },
}

impl From<PlannedTask> for TaskDescriptor {
    fn from(entry: PlannedTask) -> Self {
        match entry {
            PlannedTask::Bare(task) => TaskDescriptor::bare(task),
            PlannedTask::Structured {
                task,
                read_files,
                write_files,
            } => TaskDescriptor::new(
                task,
                read_files.unwrap_or_default(),
                write_files.unwrap_or_default(),
            ),
        }
    }
}

/// Parse the JSON task array embedded in a planner response.
pub fn parse_task_list(response: &str) -> ParsedOutput<Vec<TaskDescriptor>> {
    match parse_json_block::<Vec<PlannedTask>>(response, '[', ']') {
        ParsedOutput::Parsed(entries) => {
            ParsedOutput::Parsed(entries.into_iter().map(TaskDescriptor::from).collect())
        }
        ParsedOutput::Malformed(raw) => ParsedOutput::Malformed(raw),
    }
}

/// Resolve planner output to the task queue.
///
/// A malformed response degrades to a single task whose description is the
/// trimmed raw response.
pub fn tasks_or_fallback(parsed: ParsedOutput<Vec<TaskDescriptor>>) -> Vec<TaskDescriptor> {
    match parsed {
        ParsedOutput::Parsed(tasks) => tasks,
        ParsedOutput::Malformed(raw) => {
            warn!(
                preview = %preview(&raw),
                "planner output had no task list, using raw response as a single task"
            );
            vec![TaskDescriptor::bare(raw.trim())]
        }
    }
}

fn preview(raw: &str) -> String {
    raw.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_tasks_inside_prose() {
        let response = r#"Here is the plan:
[{"task": "add parser", "read_files": ["src/lib.rs"], "write_files": ["src/parser.rs"]},
 {"task": "wire cli", "write_files": ["src/main.rs"]}]
Done."#;

        let tasks = tasks_or_fallback(parse_task_list(response));
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].description, "add parser");
        assert_eq!(tasks[0].read_paths, vec!["src/lib.rs"]);
        assert_eq!(tasks[1].read_paths, Vec::<String>::new());
        assert_eq!(tasks[1].write_paths, vec!["src/main.rs"]);
    }

    #[test]
    fn bare_strings_become_tasks_with_empty_hints() {
        let tasks = tasks_or_fallback(parse_task_list(r#"["first", "second"]"#));
        assert_eq!(tasks, vec![TaskDescriptor::bare("first"), TaskDescriptor::bare("second")]);
    }

    #[test]
    fn null_path_lists_normalize_to_empty() {
        let tasks = tasks_or_fallback(parse_task_list(
            r#"[{"task": "t", "read_files": null, "write_files": null}]"#,
        ));
        assert!(tasks[0].read_paths.is_empty());
        assert!(tasks[0].write_paths.is_empty());
    }

    #[test]
    fn empty_array_is_a_parsed_empty_plan() {
        assert_eq!(parse_task_list("[]"), ParsedOutput::Parsed(Vec::new()));
    }

    #[test]
    fn malformed_response_falls_back_to_single_raw_task() {
        let tasks = tasks_or_fallback(parse_task_list("  just implement the thing  "));
        assert_eq!(tasks, vec![TaskDescriptor::bare("just implement the thing")]);
    }
}
