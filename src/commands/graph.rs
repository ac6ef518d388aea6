//! `snowplan graph`: show the dependency levels of a manifest

use anyhow::Result;

use crate::Context;
use crate::cli::InputArgs;
use crate::commands::Loaded;
use crate::display;
use crate::ui;

pub fn run(ctx: &Context, args: &InputArgs) -> Result<()> {
    let loaded = Loaded::from_args(args)?;
    let graph = loaded.blueprint.build_graph(&loaded.declarations)?;
    if !ctx.quiet {
        ui::header("Dependency graph");
    }
    display::print_graph(&graph);
    Ok(())
}
