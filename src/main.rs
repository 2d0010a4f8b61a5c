mod assigner;
mod camt;
mod classifier;
mod cleanup;
mod cli;
mod error;
mod extract;
mod fmt;
mod importer;
mod models;
mod normalizer;
mod posting;
mod reviewer;
mod settings;
mod sniff;
mod values;

use clap::Parser;

use cli::normalize::NormalizeArgs;
use cli::{Cli, Commands, ConfigCommands, RulesCommands};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Candidates { file, json } => cli::candidates::run(&file, json),
        Commands::Mapping {
            file,
            candidate,
            template,
        } => cli::mapping::run(&file, candidate.as_deref(), template),
        Commands::Normalize {
            file,
            candidate,
            mapping,
            bank_account,
            vat,
            currency,
            no_cleanup,
            overrides,
            edits,
            json,
            export,
        } => cli::normalize::run(NormalizeArgs {
            file,
            candidate,
            mapping,
            bank_account,
            vat,
            currency,
            no_cleanup,
            overrides,
            edits,
            json,
            export,
        }),
        Commands::Clean {
            text,
            disable,
            remove,
        } => cli::clean::run(&text, &disable, &remove),
        Commands::Config { command } => match command {
            ConfigCommands::Show => cli::config::show(),
            ConfigCommands::Set {
                bank_account,
                vat,
                currency,
                add_removal,
            } => cli::config::set(bank_account, vat, currency, add_removal),
        },
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                keyword,
                account,
                side,
                match_type,
                priority,
            } => cli::rules::add(&keyword, &account, side, match_type, priority),
            RulesCommands::List => cli::rules::list(),
            RulesCommands::Remove { index } => cli::rules::remove(index),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
