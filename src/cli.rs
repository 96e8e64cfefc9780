use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fleetbook")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Install software on tracked servers with Ansible", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Inventory database file (overrides [store] path)
    #[arg(long, global = true, env = "FLEETBOOK_STORE", value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Roles directory the software catalog is read from
    #[arg(long, global = true, value_name = "DIR")]
    pub roles_dir: Option<PathBuf>,

    /// Directory descriptors are written to and Ansible runs in
    #[arg(long, global = true, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Select servers and software, run the playbook, record outcomes
    Run(RunArgs),

    /// List servers stored in the inventory
    Servers,

    /// Show recorded install outcomes
    Status(StatusArgs),

    /// List installable software and the OS variants each role ships
    Catalog,

    /// Create the inventory store and a default config file
    Init,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Run
// ============================================================================

#[derive(Parser)]
pub struct RunArgs {
    /// Read server and software selections from a TOML file instead of prompting
    #[arg(long, value_name = "FILE")]
    pub from: Option<PathBuf>,

    /// Skip the confirmation before Ansible is invoked
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Parser)]
pub struct StatusArgs {
    /// Only show outcomes for this server
    #[arg(short, long)]
    pub server: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
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
    fn test_parse_run_from_file() {
        let cli = Cli::parse_from(["fleetbook", "-vv", "run", "--from", "plan.toml", "--yes"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.from, Some(PathBuf::from("plan.toml")));
                assert!(args.yes);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_overrides_after_subcommand() {
        let cli = Cli::parse_from(["fleetbook", "status", "--json", "--roles-dir", "/srv/roles"]);
        assert_eq!(cli.roles_dir, Some(PathBuf::from("/srv/roles")));
        assert!(matches!(cli.command, Command::Status(StatusArgs { json: true, .. })));
    }
}
