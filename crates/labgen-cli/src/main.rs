//! labgen CLI - batch generation of validated query labs
//!
//! Thin entry point; everything lives in the library so it can be tested.

use std::process::ExitCode;

use colored::Colorize;
use labgen_cli::error::exit_code_from_error;

#[tokio::main]
async fn main() -> ExitCode {
    match labgen_cli::run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(exit_code_from_error(&err))
        },
    }
}
