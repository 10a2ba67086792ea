use std::process::ExitCode;

use clap::{Parser, Subcommand};

use boss_relay::commands::doctor::DoctorArgs;
use boss_relay::commands::init_config::InitConfigArgs;
use boss_relay::commands::run::RunArgs;
use boss_relay::{commands, error, telemetry};

#[derive(Debug, Parser)]
#[command(
    name = "boss-relay",
    version,
    about = "Poll Slack channels and start an agent for every boss instruction"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll the configured channels and dispatch agents until interrupted
    Run(RunArgs),
    /// Validate config, Slack access, and the agent executable
    Doctor(DoctorArgs),
    /// Write a starter boss-relay.toml
    InitConfig(InitConfigArgs),
    /// Print the JSON Schema for boss-relay.toml
    Schema,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Run(_) => "run",
            Self::Doctor(_) => "doctor",
            Self::InitConfig(_) => "init-config",
            Self::Schema => "schema",
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Run(args) => args.execute(),
        Commands::Doctor(args) => args.execute(),
        Commands::InitConfig(args) => args.execute(),
        Commands::Schema => commands::schema::run_schema(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<error::ExitError>() {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
