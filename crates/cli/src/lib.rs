pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::Level;

use pricelab_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};

use crate::commands::report::Dimension;

#[derive(Debug, Parser)]
#[command(
    name = "pricelab",
    about = "Pricelab operator CLI",
    long_about = "Manage pricing experiments: migrations, demo data, lifecycle decisions, simulations, and result exports.",
    after_help = "Examples:\n  pricelab seed\n  pricelab experiment submit --id exp-demo-cola\n  pricelab simulate --id exp-demo-cola\n  pricelab report --run <run-id> --by store"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset and draft experiment")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Drive an experiment through its lifecycle")]
    Experiment {
        #[command(subcommand)]
        action: ExperimentAction,
    },
    #[command(about = "Project CONTROL and TEST outcomes for an approved experiment")]
    Simulate {
        #[arg(long, help = "Experiment identifier")]
        id: String,
    },
    #[command(about = "Summarize a simulation run, optionally broken down by a dimension")]
    Report {
        #[arg(long, help = "Simulation run identifier")]
        run: String,
        #[arg(long, value_enum, help = "Breakdown dimension")]
        by: Option<Dimension>,
    },
    #[command(about = "Export a run's daily results as CSV")]
    Export {
        #[arg(long, help = "Simulation run identifier")]
        run: String,
        #[arg(long, help = "Write CSV to this path instead of stdout")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
enum ExperimentAction {
    #[command(about = "Validate the lever against guardrails and submit a draft for approval")]
    Submit {
        #[arg(long, help = "Experiment identifier")]
        id: String,
        #[arg(long, help = "Validation date (YYYY-MM-DD), defaults to today")]
        as_of: Option<NaiveDate>,
    },
    #[command(about = "Approve a pending experiment")]
    Approve {
        #[arg(long, help = "Experiment identifier")]
        id: String,
    },
    #[command(about = "Reject a pending experiment")]
    Reject {
        #[arg(long, help = "Experiment identifier")]
        id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config.logging);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Experiment { action } => match action {
            ExperimentAction::Submit { id, as_of } => {
                let validated_on = as_of.unwrap_or_else(|| Utc::now().date_naive());
                commands::experiment::submit(&id, validated_on)
            }
            ExperimentAction::Approve { id } => commands::experiment::approve(&id),
            ExperimentAction::Reject { id } => commands::experiment::reject(&id),
        },
        Command::Simulate { id } => commands::simulate::run(&id),
        Command::Report { run, by } => commands::report::run(&run, by),
        Command::Export { run, output } => commands::export::run(&run, output.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn init_logging(logging: &LoggingConfig) {
    let level = logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt().with_target(false).with_max_level(level);
    // A second init in the same process keeps the first subscriber.
    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
