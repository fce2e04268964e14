use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod interactive;
mod output;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match cli.command {
        cli::Command::Run(args) => commands::run::execute(args, &cli.toolchain).await,
        cli::Command::Setup(args) => commands::setup::execute(args, &cli.toolchain).await,
        cli::Command::Status(args) => commands::status::execute(args, &cli.toolchain).await,
        cli::Command::Parse(args) => commands::parse::execute(args),
        cli::Command::Batch(args) => commands::batch::execute(args),
    };

    std::process::exit(exit_code);
}
