//! Plain-text rendering of the workspace for the terminal.

use procsim_core::compare::{MetricComparison, Trend};
use procsim_core::format::{
    format_delta, format_metric_value, format_metric_value_opt, format_relative_time,
};
use procsim_core::{ChatMessage, ChatRole, LogStatus, ProcessStep, SimulationResult, Snapshot};

pub fn print_status(snapshot: &Snapshot, has_credential: bool) {
    println!("Process: {}", snapshot.process_name);
    println!();

    if snapshot.steps.is_empty() {
        println!("No steps defined. Add one with 'procsim step add' or use 'procsim import'.");
    } else {
        print_steps(&snapshot.steps);
    }
    println!();

    for (label, result) in [
        ("Baseline run", &snapshot.baseline_result),
        ("Optimized run", &snapshot.optimized_result),
    ] {
        match result {
            Some(r) => println!(
                "{label:<15} {} ({} metrics)",
                format_relative_time(r.timestamp),
                r.metrics.len()
            ),
            None => println!("{label:<15} -"),
        }
    }
    println!("{:<15} {}", "Chat messages", snapshot.chat_history.len());
    println!(
        "{:<15} {}",
        "API key",
        if has_credential { "available" } else { "not set" }
    );
}

pub fn print_steps(steps: &[ProcessStep]) {
    for (i, step) in steps.iter().enumerate() {
        let short_id: String = step.id.chars().take(8).collect();
        println!("{:>3}. {} [{}]", i + 1, step.name, short_id);
        println!("     {}", step.description);
        println!("     Inputs: {}", step.inputs);
        if let Some(conditions) = &step.conditions {
            println!("     Conditions: {}", conditions);
        }
    }
}

pub fn print_result(result: &SimulationResult) {
    println!(
        "{} run ({})",
        result.run_type,
        format_relative_time(result.timestamp)
    );
    println!();

    println!("Metrics:");
    let width = result
        .metrics
        .iter()
        .map(|m| m.name.len())
        .max()
        .unwrap_or(0);
    for metric in &result.metrics {
        println!(
            "  {:<width$}  {:>12}  {}",
            metric.name,
            format_metric_value(metric.value, &metric.unit),
            metric.category.as_str(),
        );
    }

    if !result.logs.is_empty() {
        println!();
        println!("Execution log:");
        for log in &result.logs {
            let marker = match log.status {
                LogStatus::Success => "ok  ",
                LogStatus::Warning => "warn",
                LogStatus::Failure => "FAIL",
            };
            println!("  [{marker}] {}: {}", log.step_name, log.outcome);
            if !log.details.is_empty() {
                println!("         {}", log.details);
            }
        }
    }

    if !result.summary.is_empty() {
        println!();
        println!("Summary:");
        println!("  {}", result.summary);
    }

    if !result.assumptions.is_empty() {
        println!();
        println!("Assumptions:");
        for assumption in &result.assumptions {
            println!("  - {}", assumption);
        }
    }
}

pub fn print_comparison(rows: &[MetricComparison]) {
    let width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0).max(6);
    println!(
        "{:<width$}  {:>12}  {:>12}  {:>8}",
        "Metric", "Baseline", "Optimized", "Change"
    );
    for row in rows {
        let trend = match row.trend {
            Some(Trend::Improved) => " better",
            Some(Trend::Regressed) => " worse",
            Some(Trend::Unchanged) | None => "",
        };
        println!(
            "{:<width$}  {:>12}  {:>12}  {:>8}{}",
            row.name,
            format_metric_value_opt(row.baseline, &row.unit),
            format_metric_value_opt(row.optimized, &row.unit),
            format_delta(row.delta_percent),
            trend,
        );
    }
}

pub fn print_message(message: &ChatMessage) {
    let speaker = match message.role {
        ChatRole::User => "You",
        ChatRole::Model => "Assistant",
    };
    println!("{speaker}: {}", message.text);

    if let Some(steps) = message
        .proposed_process
        .as_deref()
        .filter(|_| message.is_optimization_proposal)
    {
        println!();
        println!("Proposed steps:");
        print_steps(steps);
    }
}
