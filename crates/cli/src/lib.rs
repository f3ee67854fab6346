pub mod commands;

use clap::{Parser, Subcommand};
use ocbot_core::config::load_env_file;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "ocbot",
    about = "ocbot operator CLI",
    long_about = "Inspect ocbot configuration, check integration readiness, and apply installation-store migrations.",
    after_help = "Examples:\n  ocbot doctor --json\n  ocbot config\n  ocbot migrate"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending SQLite migrations for the installation store")]
    Migrate,
    #[command(about = "Print the effective configuration with source attribution and redaction")]
    Config,
    #[command(about = "Check config, Airtable connectivity, and installation-store readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    load_env_file(None);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
