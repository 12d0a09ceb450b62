mod args;
mod cli;
mod commands;
mod exit;
mod logging;

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    match cli::run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("tsls: {err:#}");
            ExitCode::FAILURE
        }
    }
}
