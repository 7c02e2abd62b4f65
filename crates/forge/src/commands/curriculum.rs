//! Curriculum commands.
//!
//! - `forge curriculum validate` - Check the task graph
//! - `forge curriculum list` - Tasks with progress and lock state
//! - `forge curriculum plan` - Recommended tasks within a time budget

use anyhow::{Context, Result, bail};
use colored::Colorize;
use forge_core::CurriculumTracker;
use forge_core::curriculum::CurriculumTask;
use forge_sdk::ForgeConfig;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

use super::{open_read_only, pct};
use crate::cli::{CurriculumAction, CurriculumCommand};
use crate::config::LoadedConfig;

pub async fn execute(cmd: CurriculumCommand, loaded: &LoadedConfig) -> Result<()> {
    match cmd.action {
        CurriculumAction::Validate { file } => validate(file.as_deref(), loaded),
        CurriculumAction::List { json } => list(json, loaded),
        CurriculumAction::Plan { minutes } => plan(minutes, loaded),
    }
}

fn validate(file: Option<&Path>, loaded: &LoadedConfig) -> Result<()> {
    let config = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml_tasks(&content)?
        }
        None => loaded.config.clone(),
    };

    let curriculum = &config.curriculum;
    let definitions = curriculum.task_definitions();
    match CurriculumTracker::new(definitions.clone(), curriculum.mastery.clone(), curriculum.tier_advance_ratio) {
        Ok(tracker) => {
            let tiers: BTreeSet<String> = definitions.iter().map(|d| d.difficulty.to_string()).collect();
            println!(
                "{} {} tasks across {} tiers; first up: {}",
                "✓".green(),
                tracker.len(),
                tiers.len(),
                tracker.recommend_next(3)?.join(", ")
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            bail!("curriculum is invalid")
        }
    }
}

fn toml_tasks(content: &str) -> Result<ForgeConfig> {
    ForgeConfig::from_toml_str(content).context("Failed to parse curriculum file")
}

#[derive(Debug, Serialize)]
struct TaskRow {
    #[serde(flatten)]
    task: CurriculumTask,
    unlocked: bool,
}

fn rows(tasks: Vec<CurriculumTask>) -> Vec<TaskRow> {
    let mastered: BTreeSet<String> = tasks.iter().filter(|t| t.mastered()).map(|t| t.id().to_string()).collect();
    tasks
        .into_iter()
        .map(|task| {
            let unlocked = task.definition.prerequisites.iter().all(|p| mastered.contains(p));
            TaskRow { task, unlocked }
        })
        .collect()
}

fn list(json: bool, loaded: &LoadedConfig) -> Result<()> {
    let forge = open_read_only(&loaded.config)?;
    let mut rows = rows(forge.curriculum().tasks()?);
    rows.sort_by(|a, b| {
        a.task
            .difficulty()
            .cmp(&b.task.difficulty())
            .then_with(|| a.task.id().cmp(b.task.id()))
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!();
    println!("  {} ({})", "Curriculum:".cyan().bold(), rows.len());
    for row in &rows {
        let t = &row.task;
        let status = if t.mastered() {
            "mastered".green()
        } else if row.unlocked {
            "open".yellow()
        } else {
            "locked".red()
        };
        println!(
            "    {:<28} {:<13} {:<9} attempts {:>3}  success {:>4}  quality {:>5.1}",
            t.id(),
            t.difficulty().to_string(),
            status,
            t.attempts(),
            pct(t.success_rate()),
            t.avg_quality()
        );
        if !row.unlocked {
            println!("      needs: {}", t.definition.prerequisites.join(", ").dimmed());
        }
    }
    println!();
    Ok(())
}

fn plan(minutes: u32, loaded: &LoadedConfig) -> Result<()> {
    let forge = open_read_only(&loaded.config)?;
    let curriculum = forge.curriculum();
    let planned = curriculum.personalized_plan(minutes)?;

    println!();
    println!("  {} {} minutes", "Plan for".cyan().bold(), minutes);
    if planned.is_empty() {
        println!("    Nothing fits; every open task needs more time or all are mastered");
    }
    let mut total = 0;
    for task in &planned {
        total += task.definition.estimated_minutes;
        println!(
            "    {} {:<28} {:>3} min  [{}]",
            "•".green(),
            task.id(),
            task.definition.estimated_minutes,
            task.definition.domain
        );
    }
    if !planned.is_empty() {
        println!("    Total: {total} min");
    }

    let focus = curriculum.focus_areas()?;
    if !focus.is_empty() {
        println!("    Focus areas: {}", focus.join(", ").yellow());
    }
    println!();
    Ok(())
}
