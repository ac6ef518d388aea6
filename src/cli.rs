use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

use blueprint::ResourceType;

#[derive(Parser)]
#[command(name = "snowplan")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Plan warehouse resource changes against an exported account state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what would change to make the account match the manifest
    Plan(PlanArgs),

    /// Print the statements an apply would run, with the role for each
    Sql(InputArgs),

    /// Show the dependency graph of a manifest, level by level
    Graph(InputArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared inputs
// ============================================================================

#[derive(Args, Clone)]
pub struct InputArgs {
    /// Manifest of resource declarations (JSON)
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Exported remote state (JSON); an empty account when omitted
    #[arg(short, long)]
    pub state: Option<PathBuf>,

    /// Blueprint config (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Account locator; overrides the config file
    #[arg(long, env = "SNOWPLAN_ACCOUNT")]
    pub account: Option<String>,

    /// Worker threads; overrides the config file
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Resource types whose undeclared remote resources are removed
    #[arg(long, value_delimiter = ',', value_parser = parse_resource_type)]
    pub sync: Vec<ResourceType>,
}

fn parse_resource_type(s: &str) -> Result<ResourceType, String> {
    s.parse().map_err(|e: blueprint::Error| e.to_string())
}

// ============================================================================
// Plan
// ============================================================================

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = PlanFormat::Text)]
    pub format: PlanFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlanFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_list_parses() {
        let cli = Cli::parse_from([
            "snowplan",
            "plan",
            "--manifest",
            "m.json",
            "--sync",
            "role,grant",
            "--format",
            "json",
        ]);
        let Command::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.input.sync, vec![ResourceType::Role, ResourceType::Grant]);
        assert_eq!(args.format, PlanFormat::Json);
    }

    #[test]
    fn test_unknown_sync_type_is_rejected() {
        let result = Cli::try_parse_from(["snowplan", "sql", "-m", "m.json", "--sync", "dashboards"]);
        assert!(result.is_err());
    }
}
