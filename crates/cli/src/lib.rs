pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::Level;

#[derive(Debug, Parser)]
#[command(
    name = "telroute",
    about = "Telroute customer query CLI",
    long_about = "Ask telecom support questions, inspect configuration, and check runtime readiness.",
    after_help = "Examples:\n  telroute ask \"why was I charged twice?\"\n  telroute chat --session demo\n  telroute doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Print diagnostic logs to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer a single question and print the normalized answer")]
    Ask {
        text: String,
        #[arg(long, default_value = "cli", help = "Session the question belongs to")]
        session: String,
        #[arg(long, help = "Customer email passed to the capability providers")]
        email: Option<String>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Interactive multi-turn conversation over stdin")]
    Chat {
        #[arg(long, help = "Session id to continue (a new one is generated by default)")]
        session: Option<String>,
        #[arg(long, help = "Customer email passed to the capability providers")]
        email: Option<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, provider registry, llm and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Ask { text, session, email, json } => {
            commands::ask::run(&text, &session, email.as_deref(), json)
        }
        Command::Chat { session, email } => commands::chat::run(session, email),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Migrate => commands::migrate::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so command output on stdout stays parseable.
fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
