//! Simulated session command.
//!
//! Drives the orchestrator with the seeded generator and reviewer, walking
//! the curriculum the way a learner would: each request is the next
//! recommended task. Once everything is mastered, free-form requests fill
//! the rest of the session.

use anyhow::{Context, Result};
use colored::Colorize;
use forge_sdk::orchestrator::fixtures::{SimulatedGenerator, SimulatedReviewer};
use forge_sdk::types::Difficulty;
use forge_sdk::{Forge, GenerationRequest};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use super::report::print_report;
use crate::cli::SimulateArgs;
use crate::config::LoadedConfig;

/// Requests used after the curriculum is exhausted
const FREEFORM: &[(&str, &str)] = &[
    ("weather dashboard with hourly chart", "data_visualization"),
    ("markdown note editor with local storage", "interactive_apps"),
    ("accessible modal dialog", "ui_components"),
    ("pomodoro timer with sound", "interactive_apps"),
];

pub async fn execute(args: SimulateArgs, loaded: LoadedConfig) -> Result<()> {
    let mut config = loaded.config;
    if let Some(db) = args.db {
        config.database_path = Some(db);
    }

    let mut builder = Forge::builder(config).generator(Arc::new(SimulatedGenerator::new(args.seed)));
    if !args.no_review {
        builder = builder.reviewer(Arc::new(SimulatedReviewer::new(args.seed.wrapping_add(1))));
    }
    let forge = builder.build().context("Failed to start forge")?;
    forge.initialize();

    let pb = ProgressBar::new(args.requests as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut failed = 0;
    for i in 0..args.requests {
        let request = next_request(&forge, i, args.time_budget)?;
        pb.set_message(request.description.clone());
        let response = forge.handle(request).await;
        if !response.success {
            failed += 1;
        }
        // One request's learning lands before the next is planned
        forge.wait_idle().await;
        pb.inc(1);
    }
    pb.finish_with_message(format!("{} requests, {} failed", args.requests, failed));

    let consolidation = forge.consolidate().await?;
    let report = forge.report()?;
    tracing::info!(
        requests = args.requests,
        failed,
        mastered = report.curriculum.mastered_tasks,
        "Simulation finished"
    );
    forge.shutdown().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} consolidated: {} new, {} updated patterns",
            "✓".green(),
            consolidation.created_patterns.len(),
            consolidation.updated_patterns.len()
        );
        print_report(&report);
    }
    Ok(())
}

/// The next recommended task, or a free-form request
fn next_request(forge: &Forge, index: usize, time_budget: f64) -> Result<GenerationRequest> {
    if let Some(task_id) = forge.recommend_next(1)?.into_iter().next() {
        let task = forge.curriculum().task(&task_id)?;
        let def = &task.definition;
        let description = if def.description.is_empty() {
            def.id.replace('_', " ")
        } else {
            def.description.clone()
        };
        return Ok(GenerationRequest::new(description, def.domain.clone())
            .with_difficulty(def.difficulty)
            .with_task(task_id)
            .with_time_budget(time_budget));
    }

    let (description, domain) = FREEFORM[index % FREEFORM.len()];
    Ok(GenerationRequest::new(description, domain)
        .with_difficulty(Difficulty::Intermediate)
        .with_time_budget(time_budget))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_sdk::ForgeConfig;

    #[tokio::test]
    async fn test_first_request_follows_the_curriculum() {
        let forge = Forge::builder(ForgeConfig::default())
            .generator(Arc::new(SimulatedGenerator::new(1)))
            .build()
            .unwrap();
        let request = next_request(&forge, 0, 120.0).unwrap();
        let expected = forge.recommend_next(1).unwrap();
        assert_eq!(request.task_id.as_ref(), expected.first());
        assert_eq!(request.time_budget_secs, 120.0);
    }
}
