//! `snowplan sql`: dry-run a plan and print every statement with its role

use anyhow::Result;

use blueprint::{AutoConfirm, ExecuteOptions, NoTransport};

use crate::Context;
use crate::cli::InputArgs;
use crate::commands::Loaded;
use crate::display;
use crate::progress::LevelProgress;
use crate::ui;

pub fn run(ctx: &Context, args: &InputArgs) -> Result<()> {
    let loaded = Loaded::from_args(args)?;
    let plan = loaded.plan()?;
    plan.validate_removals(&loaded.blueprint.config().sync_allowlist())?;

    let opts = ExecuteOptions {
        dry_run: true,
        ..loaded.blueprint.execute_options()
    };
    let mut progress = LevelProgress::new(plan.len(), ctx.quiet);
    let report = blueprint::execute(&plan, &NoTransport, &opts, &mut progress, &mut AutoConfirm)?;
    progress.finish();

    display::print_statements(&report);

    let summary = report.summary();
    if !report.is_success() {
        ui::error(&format!(
            "{} failed, {} skipped",
            summary.failed, summary.skipped
        ));
        for outcome in report.failures() {
            ui::dim(&format!("{} {}", outcome.urn, ui::status_label(&outcome.status)));
        }
        anyhow::bail!("plan cannot be applied cleanly");
    }
    if ctx.verbose > 0 {
        ui::success(&format!(
            "{} statements for {} changes",
            report.statements.len(),
            summary.total_changes()
        ));
    }
    Ok(())
}
