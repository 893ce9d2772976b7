mod batch;
mod cache;
mod cascade;
mod cli;
mod db;
mod error;
mod external;
mod fmt;
mod hints;
mod importer;
mod income;
mod metrics;
mod models;
mod normalizer;
mod rules;
mod session;
mod settings;
mod taxonomy;
mod transfer;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, PatternsCommands, RulesCommands};

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TALLYMAN_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Run {
            files,
            out,
            offline,
            accounts,
            as_of,
            window_days,
            workers,
        } => cli::run::run(cli::run::RunArgs {
            files,
            out,
            offline,
            accounts,
            as_of,
            window_days,
            workers,
        })
        .map(|code| {
            if code != 0 {
                std::process::exit(code);
            }
        }),
        Commands::Categorize { file, offline } => cli::categorize::run(&file, offline),
        Commands::Metrics {
            file,
            offline,
            accounts,
            as_of,
            json,
        } => cli::metrics::run(&file, offline, accounts, as_of, json),
        Commands::Patterns { command } => match command {
            PatternsCommands::List { limit } => cli::patterns::list(limit),
            PatternsCommands::Stats => cli::patterns::stats(),
            PatternsCommands::Retrain {
                key,
                code,
                confidence,
            } => cli::patterns::retrain(&key, &code, confidence),
        },
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                pattern,
                code,
                match_type,
                priority,
                confidence,
                direction,
            } => cli::rules::add(
                &pattern,
                &code,
                &match_type,
                priority,
                confidence,
                direction.as_deref(),
            ),
            RulesCommands::List => cli::rules::list(),
            RulesCommands::Delete { id } => cli::rules::delete(id),
        },
        Commands::Schema => cli::schema::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
