//! Prerequisite graph validation.

use std::collections::{BTreeMap, HashSet};

use super::TaskDefinition;
use crate::error::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Reject empty or duplicate ids, unknown or self prerequisites, and cycles.
pub fn validate_graph(tasks: &[TaskDefinition]) -> Result<()> {
    let mut by_id: BTreeMap<&str, &TaskDefinition> = BTreeMap::new();
    for task in tasks {
        if task.id.trim().is_empty() {
            return Err(Error::invalid_graph("task id must not be empty"));
        }
        if by_id.insert(task.id.as_str(), task).is_some() {
            return Err(Error::invalid_graph(format!("duplicate task id '{}'", task.id)));
        }
    }

    for task in tasks {
        let mut seen = HashSet::new();
        for prereq in &task.prerequisites {
            if prereq == &task.id {
                return Err(Error::invalid_graph(format!(
                    "task '{}' lists itself as a prerequisite",
                    task.id
                )));
            }
            if !by_id.contains_key(prereq.as_str()) {
                return Err(Error::invalid_graph(format!(
                    "task '{}' requires unknown task '{}'",
                    task.id, prereq
                )));
            }
            if !seen.insert(prereq) {
                return Err(Error::invalid_graph(format!(
                    "task '{}' lists prerequisite '{}' twice",
                    task.id, prereq
                )));
            }
        }
    }

    let mut marks: BTreeMap<&str, Mark> = by_id.keys().map(|id| (*id, Mark::Unvisited)).collect();
    for id in by_id.keys().copied() {
        let mut stack = Vec::new();
        visit(id, &by_id, &mut marks, &mut stack)?;
    }

    Ok(())
}

fn visit<'a>(
    id: &'a str,
    by_id: &BTreeMap<&'a str, &'a TaskDefinition>,
    marks: &mut BTreeMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Result<()> {
    match marks.get(id).copied().unwrap_or(Mark::Done) {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            let start = stack.iter().position(|s| *s == id).unwrap_or(0);
            let mut path: Vec<&str> = stack[start..].to_vec();
            path.push(id);
            return Err(Error::invalid_graph(format!(
                "prerequisite cycle: {}",
                path.join(" -> ")
            )));
        }
        Mark::Unvisited => {}
    }

    marks.insert(id, Mark::InProgress);
    stack.push(id);
    if let Some(task) = by_id.get(id).copied() {
        for prereq in &task.prerequisites {
            visit(prereq.as_str(), by_id, marks, stack)?;
        }
    }
    stack.pop();
    marks.insert(id, Mark::Done);
    Ok(())
}
