//! `rallyd-client` - command line control utility for a rallyd server.
//!
//! Each subcommand maps onto one rallyd endpoint. Results print as tables by
//! default or as the server's raw JSON with `--json`.

mod commands;
mod output;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use rallyd_client::RallydClient;
use rallyd_config::{ENV_ENDPOINT, RallydConfig};

use commands::Command;

#[derive(Debug, Parser)]
#[command(name = "rallyd-client", version, about = "Rallyd control utility")]
struct Cli {
    /// rallyd endpoint (default from config, then http://127.0.0.1:8001).
    #[arg(long, env = ENV_ENDPOINT, global = true)]
    endpoint: Option<String>,
    /// Print the server's JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,
    /// Request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::try_new("error").expect("error filter is valid"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = RallydConfig::load().context("Failed to load rallyd config")?;
    let endpoint = cli.endpoint.unwrap_or_else(|| config.endpoint());
    let timeout = cli
        .timeout
        .filter(|secs| *secs > 0)
        .map_or_else(|| config.client_timeout(), Duration::from_secs);
    let client = RallydClient::new(&endpoint, timeout)?;
    tracing::debug!(endpoint = %client.endpoint(), ?timeout, "Using rallyd");

    let output = cli.command.execute(&client).await?;
    println!("{}", output.render(cli.json));
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "5f1c2d3e-0000-4000-8000-000000000001";

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("rallyd-client").chain(args.iter().copied()))
    }

    #[test]
    fn resource_ids_are_positional() {
        for sub in [
            "deployment-get",
            "deployment-recreate",
            "deployment-delete",
            "task-get",
            "task-log",
            "task-result",
            "task-report",
            "task-delete",
            "run-get",
            "run-result",
            "tempest-install",
            "tempest-check",
            "tempest-reinstall",
            "tempest-uninstall",
            "verification-start",
            "verification-get",
            "verification-result",
            "verification-report",
        ] {
            assert!(parse(&[sub, UUID]).is_ok(), "{sub} <uuid> should parse");
            assert!(parse(&[sub]).is_err(), "{sub} without an id should fail");
        }
    }

    #[test]
    fn task_create_takes_deployment_then_file() {
        let cli = parse(&["task-create", UUID, "task.json", "--task-params", "times=3"]).unwrap();
        match cli.command {
            Command::TaskCreate {
                deployment_uuid,
                task_filename,
                task_params,
                ..
            } => {
                assert_eq!(deployment_uuid, UUID);
                assert_eq!(task_filename, std::path::PathBuf::from("task.json"));
                assert_eq!(task_params.len(), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(parse(&["task-create", UUID]).is_err());
    }

    #[test]
    fn run_start_takes_many_files() {
        let cli = parse(&["run-start", UUID, "a.json", "b.json", "--tag", "batch"]).unwrap();
        match cli.command {
            Command::RunStart { task_filenames, .. } => assert_eq!(task_filenames.len(), 2),
            other => panic!("unexpected command {other:?}"),
        }
        assert!(parse(&["run-start", UUID]).is_err());
    }

    #[test]
    fn task_log_keeps_negative_line_flags() {
        let cli = parse(&["task-log", UUID, "--start-line", "-3", "--end-line", "-1"]).unwrap();
        match cli.command {
            Command::TaskLog {
                start_line,
                end_line,
                ..
            } => {
                assert_eq!(start_line, Some(-3));
                assert_eq!(end_line, Some(-1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
