mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use console::style;
use warden::WardenError;
use warden_shared::constants::exit_codes;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log = warden::util::init_logging(cli.global.debug);

    let result = match cli.command {
        Commands::Install(args) => commands::install::execute(args, &cli.global, &log).await,
        Commands::Check(args) => commands::check::execute(args),
        Commands::Status(args) => commands::status::execute(args, &cli.global),
        Commands::Reset(args) => commands::reset::execute(args, &cli.global),
        Commands::Secret(args) => commands::secret::execute(args),
    };

    if let Err(err) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), err);
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<WardenError>())
        .map(WardenError::exit_code)
        .unwrap_or(exit_codes::INTERNAL)
}
