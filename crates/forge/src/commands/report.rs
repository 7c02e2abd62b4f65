//! Learning report command.
//!
//! Shows, for the persisted state named by `database_path`:
//! - Recent performance and quality progression
//! - Memory tier sizes
//! - Curriculum progress and focus areas
//! - Strategy statistics and efficiency
//! - Recent insights

use anyhow::Result;
use colored::Colorize;
use forge_sdk::ForgeReport;
use forge_sdk::utils::format_datetime;

use super::{open_read_only, pct};
use crate::config::LoadedConfig;

pub async fn execute(json: bool, loaded: &LoadedConfig) -> Result<()> {
    if loaded.config.database_path.is_none() {
        eprintln!(
            "{} no database_path configured; nothing has been persisted to report on",
            "!".yellow()
        );
    }
    let forge = open_read_only(&loaded.config)?;
    let report = forge.report()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

pub(crate) fn print_report(report: &ForgeReport) {
    println!();
    println!("{}", "Forge Report".cyan().bold());
    println!("  generated {}", format_datetime(&report.generated_at).dimmed());

    // Performance
    let p = &report.performance;
    println!();
    println!("  {}", "Performance:".cyan().bold());
    println!("    Attempts:        {} ({} successful)", p.total_attempts, p.successes);
    println!("    Success rate:    {}", pct(p.success_rate));
    println!("    Recent (last 5): {}", rate_colored(p.recent_success_rate));
    println!("    Avg quality:     {:.1}", p.avg_quality);
    println!("    Time efficiency: {}", pct(p.time_efficiency));
    if !p.quality_progression.is_empty() {
        let progression: Vec<String> = p.quality_progression.iter().map(|q| format!("{q:.0}")).collect();
        println!("    Progression:     {}", progression.join(" → "));
    }

    // Memory
    let m = &report.memory;
    println!();
    println!("  {}", "Memory:".cyan().bold());
    println!(
        "    short {}  mid {}  long {}  reflective {}",
        m.short_term, m.mid_term, m.long_term, m.reflective
    );
    println!("    Consolidation passes: {}", m.consolidation_passes);
    if let Some(at) = &m.last_consolidation_at {
        println!("    Last consolidation:   {}", format_datetime(at));
    }

    // Curriculum
    let c = &report.curriculum;
    println!();
    println!("  {}", "Curriculum:".cyan().bold());
    println!(
        "    Mastered {}/{} ({})  attempted {}",
        c.mastered_tasks,
        c.total_tasks,
        pct(c.mastery_rate),
        c.tasks_attempted
    );
    println!("    Current difficulty: {}", c.current_difficulty);
    if let Some(tier) = c.active_tier {
        println!("    Active tier:        {tier}");
    }
    println!("    Velocity:           {:.1} tasks/week", c.learning_velocity_per_week);
    if !c.focus_areas.is_empty() {
        println!("    Focus areas:        {}", c.focus_areas.join(", ").yellow());
    }
    if !c.next_recommended.is_empty() {
        println!("    Next:               {}", c.next_recommended.join(", ").green());
    }

    // Strategies
    println!();
    println!("  {} ({})", "Strategies:".cyan().bold(), report.strategies.len());
    if report.strategies.is_empty() {
        println!("    No outcomes recorded");
    }
    for s in &report.strategies {
        println!(
            "    {:<12} {:<20} used {:>3}  success {:>4}  quality {:>5.1}",
            s.strategy.as_str(),
            s.domain,
            s.usage_count,
            pct(s.success_rate),
            s.avg_quality
        );
    }
    for (strategy, efficiency) in &report.strategy_efficiency {
        println!("    {} {strategy}: {efficiency:.2} quality/s", "•".green());
    }

    // Patterns
    if !report.top_patterns.is_empty() {
        println!();
        println!("  {}", "Top Patterns:".cyan().bold());
        for pattern in &report.top_patterns {
            println!(
                "    {} {} [{}] success {} over {} attempts",
                "•".green(),
                pattern.id,
                pattern.domain,
                pct(pattern.success_rate),
                pattern.evidence_count
            );
        }
    }

    // Reflection
    let r = &report.reflection;
    println!();
    println!(
        "  {} ({} insights, threshold {:.2})",
        "Reflection:".cyan().bold(),
        r.total_insights,
        r.threshold
    );
    for digest in &r.recent {
        println!(
            "    [{}] {} {}",
            digest.level,
            digest.statement,
            format!("(conf {:.2})", digest.confidence).dimmed()
        );
    }

    // Jobs
    let j = &report.jobs;
    if j.failed > 0 {
        println!();
        println!(
            "  {} {} of {} background jobs failed ({} retries)",
            "⚠".red(),
            j.failed.to_string().red().bold(),
            j.dispatched,
            j.retries
        );
    }
    println!();
}

fn rate_colored(rate: f64) -> colored::ColoredString {
    let text = pct(rate);
    if rate >= 0.8 {
        text.green()
    } else if rate >= 0.5 {
        text.yellow()
    } else {
        text.red()
    }
}
