// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use smppsim_catcher::init::agent::Agent;
use smppsim_catcher::init::args::CatcherArgs;
use smppsim_catcher::init::wait;
use smppsim_catcher::listener::Listener;
use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;
use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Tail a capture file and serve the captured messages
    Start(Box<CatcherArgs>),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "smppsim-catcher")]
#[command(bin_name = "smppsim-catcher")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "SMPPSIM_CATCHER_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version())
        }
        Some(Commands::Start(args)) => {
            // Bind before starting anything so a busy port fails fast.
            let listener = match Listener::listen_std(args.query_endpoint) {
                Ok(l) => l,
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    return ExitCode::from(1);
                }
            };

            let _guard = match setup_logging(&opt.log_format) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("ERROR: failed to setup logging: {}", e);
                    return ExitCode::from(1);
                }
            };

            if let Err(e) = run_agent(args, listener) {
                error!(error = e, "Failed to run agent.");
                return ExitCode::from(1);
            }
        }
        None => {
            // subcommand_required prevents this
            error!("Must specify a command");
            return ExitCode::from(2);
        }
    }

    ExitCode::SUCCESS
}

#[tokio::main]
async fn run_agent(
    args: Box<CatcherArgs>,
    listener: Listener,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut agent_join_set = JoinSet::new();

    let cancel_token = CancellationToken::new();
    {
        let token = cancel_token.clone();
        let agent = Agent::new(*args, listener);
        agent_join_set.spawn(async move { agent.run(token).await });
    }

    select! {
        _ = signal_wait() => {
            info!("Shutdown signal received.");
            cancel_token.cancel();
        },
        e = wait::wait_for_any_task(&mut agent_join_set) => {
            match e {
                Ok(()) => warn!("Unexpected early exit of agent."),
                Err(e) => return Err(e),
            }
        },
    }

    // The agent applies its own shorter timeouts per component.
    wait::wait_for_tasks_with_timeout(&mut agent_join_set, Duration::from_secs(10)).await?;

    Ok(())
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("hyper=warn".parse()?)
        .add_directive("h2=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");
    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}

#[cfg(unix)]
async fn signal_wait() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sig_term, mut sig_int) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = ?e, "Unable to install signal handlers, falling back to ctrl-c.");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
}

#[cfg(not(unix))]
async fn signal_wait() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = ?e, "Unable to listen for ctrl-c.");
        std::future::pending::<()>().await;
    }
}
