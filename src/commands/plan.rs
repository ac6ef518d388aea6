//! `snowplan plan`: diff a manifest against exported remote state

use anyhow::Result;

use crate::Context;
use crate::cli::{PlanArgs, PlanFormat};
use crate::commands::Loaded;
use crate::display;
use crate::ui;

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let loaded = Loaded::from_args(&args.input)?;
    let plan = loaded.plan()?;

    match args.format {
        PlanFormat::Json => println!("{}", plan.to_json()?),
        PlanFormat::Text => {
            if !ctx.quiet {
                ui::header(&format!("Plan for {}", loaded.blueprint.config().account));
            }
            display::print_plan(&plan);
        }
    }
    Ok(())
}
