//! Terminal rendering of plans, graphs and statement reports

use colored::Colorize;

use blueprint::{ApplyReport, FieldDiff, Plan, PlanSummary, ResourceChange, ResourceGraph};

use crate::ui;

/// One-line plan summary
pub fn summary_line(s: &PlanSummary) -> String {
    format!(
        "Plan: {} to add, {} to change, {} to replace, {} to transfer, {} to remove.",
        s.add.to_string().green(),
        s.change.to_string().yellow(),
        s.replace.to_string().magenta(),
        s.transfer.to_string().yellow(),
        s.remove.to_string().red(),
    )
}

/// Field lines of one change, already indented
pub fn change_lines(change: &ResourceChange) -> Vec<String> {
    let diffs = change.field_diffs();
    let width = diffs.iter().map(|d| d.key().len()).max().unwrap_or(0);
    diffs
        .iter()
        .map(|diff| match diff {
            FieldDiff::Added { key, value } => {
                format!("    {} {key:<width$} = {value}", "+".green())
            }
            FieldDiff::Removed { key, value } => {
                format!("    {} {key:<width$} = {}", "-".red(), value.to_string().dimmed())
            }
            FieldDiff::Changed { key, from, to } => format!(
                "    {} {key:<width$} = {} -> {to}",
                "~".yellow(),
                from.to_string().dimmed()
            ),
        })
        .collect()
}

/// Print a plan, NOOPs omitted
pub fn print_plan(plan: &Plan) {
    if plan.is_noop() {
        ui::success("No changes. Remote state matches the manifest.");
        return;
    }

    for (level, changes) in plan.levels() {
        let actionable: Vec<&ResourceChange> = changes
            .into_iter()
            .filter(|c| c.action.is_mutation())
            .collect();
        if actionable.is_empty() {
            continue;
        }
        ui::section(&format!("Level {level}"));
        for change in actionable {
            println!(
                "  {} {} {}",
                ui::action_symbol(change.action),
                change.urn,
                format!("({})", change.action).dimmed()
            );
            if let Some(reason) = &change.rejection {
                println!("    {} {}", "✗".red(), reason.red());
            }
            for line in change_lines(change) {
                println!("{line}");
            }
        }
    }

    let summary = plan.summary();
    println!();
    println!("{}", summary_line(&summary));
    if summary.rejected > 0 {
        ui::warn(&format!(
            "{} change(s) cannot be applied and will fail with their dependents",
            summary.rejected
        ));
    }
}

/// Print the statements a run recorded, with the role for each
pub fn print_statements(report: &ApplyReport) {
    if report.statements.is_empty() {
        ui::info("Nothing to execute");
        return;
    }
    for statement in &report.statements {
        let role = statement.role.as_deref().unwrap_or("-");
        println!("{} {}", format!("[{role}]").cyan(), statement.sql);
    }
}

/// Print the graph level by level
pub fn print_graph(graph: &ResourceGraph) {
    if graph.is_empty() {
        ui::info("Manifest declares no resources");
        return;
    }
    for (level, nodes) in graph.levels().iter().enumerate() {
        ui::section(&format!("Level {level}"));
        for node in nodes {
            println!("  {}", node.urn);
            for dep in &node.dependencies {
                ui::dim(&format!("  needs {dep}"));
            }
            for dep in &node.external {
                ui::dim(&format!("  expects {dep}"));
            }
        }
    }
    println!();
    ui::kv("resources", &graph.len().to_string());
    ui::kv("levels", &graph.levels().len().to_string());
}
