use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{io::BufRead, time::Duration};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use drive_advisor::{
    config::AdvisorConfig,
    model,
    poll::{Control, PollLoop},
    render::TerminalDisplay,
    simulator,
    telemetry::HttpTelemetrySource,
    AdvisoryEngine,
};

/// Driver assistant: polls vehicle telemetry and shows driving advice.
///
/// Configuration comes from `ADVISOR_CONFIG` (JSON file) and the
/// TELEMETRY_URL, SIGNALS_PATH, POLL_INTERVAL_MS, MODEL_PATH, MODEL_KIND and
/// BIND_ADDR environment variables.
#[derive(Parser, Debug)]
#[command(name = "drive_advisor", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Poll telemetry and display advice (default)
    Run,
    /// Serve a simulated vehicle on GET /signals
    Simulate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // frames go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = AdvisorConfig::from_env().context("loading configuration")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_advisor(cfg).await,
        Command::Simulate => run_simulator(cfg).await,
    }
}

async fn run_advisor(cfg: AdvisorConfig) -> anyhow::Result<()> {
    let mdl = model::load_classifier(&cfg).context("loading classifier")?;
    let engine = AdvisoryEngine::new(mdl);

    let source = HttpTelemetrySource::new(&cfg.telemetry);
    tracing::info!(url = source.url(), interval_ms = cfg.poll_interval_ms, "polling telemetry");

    let (tx, rx) = mpsc::channel(8);
    spawn_stdin_controls(tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Control::Quit).await;
        }
    });

    let display = TerminalDisplay::new(std::io::stdout());
    let interval = Duration::from_millis(cfg.poll_interval_ms);
    let last = PollLoop::new(engine, source, display, interval)
        .run(rx)
        .await
        .context("advisory loop failed")?;

    tracing::info!(mode = %last.mode, "shutting down");
    Ok(())
}

async fn run_simulator(cfg: AdvisorConfig) -> anyhow::Result<()> {
    let bind_addr = &cfg.simulator.bind_addr;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind simulator at {}", bind_addr))?;
    simulator::run(listener, Duration::from_millis(cfg.simulator.step_ms)).await?;
    Ok(())
}

// A plain thread so a pending stdin read never holds up runtime shutdown.
fn spawn_stdin_controls(tx: mpsc::Sender<Control>) {
    std::thread::spawn(move || {
        eprintln!("controls: `s` + Enter to start/stop, `q` + Enter to quit");
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let cmd = match line.trim() {
                "s" => Control::Toggle,
                "q" => Control::Quit,
                "" => continue,
                other => {
                    tracing::warn!("unknown control {:?}", other);
                    continue;
                }
            };
            if tx.blocking_send(cmd).is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::try_parse_from(["drive_advisor"]).unwrap();
        assert_eq!(cli.command.unwrap_or(Command::Run), Command::Run);

        let cli = Cli::try_parse_from(["drive_advisor", "simulate"]).unwrap();
        assert_eq!(cli.command, Some(Command::Simulate));
    }

    #[test]
    fn help_and_unknown_commands() {
        let err = Cli::try_parse_from(["drive_advisor", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);

        assert!(Cli::try_parse_from(["drive_advisor", "replay"]).is_err());
    }
}
