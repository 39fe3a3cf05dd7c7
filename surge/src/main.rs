mod cli;
mod exit_codes;
mod init;
mod logging;
mod output;
mod request;
mod run;
mod run_error;
mod run_support;
mod scenario_yaml;

use clap::Parser;
use clap::error::ErrorKind;
use mimalloc::MiMalloc;

use crate::cli::{Cli, Command};
use crate::exit_codes::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
                _ => ExitCode::InvalidInput,
            }
            .into();
        }
    };

    logging::init();
    dispatch(cli.command).await.into()
}

async fn dispatch(command: Command) -> ExitCode {
    match command {
        Command::Run(args) => run::run(args).await.unwrap_or_else(|err| {
            eprintln!("error: {err}");
            err.exit_code()
        }),
        Command::Init(args) => match init::init(args).await {
            Ok(()) => ExitCode::Success,
            Err(err) => {
                eprintln!("error: {err:#}");
                ExitCode::RuntimeError
            }
        },
    }
}
