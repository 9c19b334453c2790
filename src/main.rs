//! The `pyrite` binary: parses CLI flags, runs one analysis pass (or, with
//! `--mcp`, serves the editor-facing surface over stdio), and exits with the
//! code spec §6 assigns the result.

use clap::Parser;
use pyrite::cli::{self, Cli};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    #[cfg(feature = "mcp")]
    if cli.mcp {
        return match pyrite::mcp::run_mcp_server().await {
            Ok(()) => std::process::ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("pyrite: {err}");
                std::process::ExitCode::from(err.exit_code().code())
            }
        };
    }

    match cli::run(&cli) {
        Ok((rendered, code)) => {
            print!("{rendered}");
            std::process::ExitCode::from(code.code())
        }
        Err(err) => {
            eprintln!("pyrite: {err}");
            std::process::ExitCode::from(err.exit_code().code())
        }
    }
}
