pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kopi",
    about = "Kopi operator CLI",
    long_about = "Operate the kopi assistant: migrations, seed data, readiness checks, config inspection, and one-off turns.",
    after_help = "Examples:\n  kopi seed\n  kopi doctor --json\n  kopi calc \"(2 + 3) * 4\"\n  kopi ask \"Which outlets in Selangor are open?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic outlet and drinkware dataset (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database, seed data, and knowledge index readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Evaluate an arithmetic expression with the calculator tool")]
    Calc {
        #[arg(help = "Expression such as \"(2 + 3) * 4\"")]
        expression: String,
    },
    #[command(about = "Run one conversational turn against the configured reasoning engine")]
    Ask {
        #[arg(help = "The user message")]
        message: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Calc { expression } => commands::calc::run(&expression),
        Command::Ask { message } => commands::ask::run(&message),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
