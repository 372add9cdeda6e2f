//! Bartender bot entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build provider client; validate the assistant when one is configured
//!   6. Build conversation dispatcher
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Run console channel until shutdown or EOF

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bartender::comms::pty::PtyChannel;
use bartender::config;
use bartender::conversation::Dispatcher;
use bartender::error::AppError;
use bartender::llm::client::ProviderClient;
use bartender::logger;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let cli_level = logger::verbosity_level(args.verbosity);
    let (config_level, recognised) = logger::resolve_level(&config.log_level);
    let effective_log_level = cli_level.unwrap_or(config_level);
    logger::init(effective_log_level, cli_level.is_some())?;

    if !recognised {
        warn!(configured = %config.log_level, "unrecognised log level, using info");
    }
    info!(
        bot_name = %config.bot_name,
        configured_log_level = %config.log_level,
        %effective_log_level,
        model = %config.llm.model,
        api_base_url = %config.llm.api_base_url,
        "config loaded"
    );
    if config.llm_api_key.is_none() {
        warn!("LLM_API_KEY not set, requests go out without authorization");
    }

    let client = ProviderClient::new(config.client_settings())?;

    if let Some(assistant_id) = &config.llm.assistant_id {
        let assistant = client.fetch_assistant(assistant_id).await?;
        info!(
            assistant_id = %assistant.id,
            name = assistant.name.as_deref().unwrap_or("-"),
            model = %assistant.model,
            "assistant validated"
        );
    }

    // Shared shutdown token. Ctrl-C cancels it; run waits and the console
    // loop watch it.
    let shutdown = CancellationToken::new();

    let dispatcher = Arc::new(Dispatcher::new(
        client,
        config.dispatcher_settings(),
        shutdown.clone(),
    ));

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    if config.pty_enabled {
        PtyChannel::new(config.bot_name.clone(), dispatcher).run(shutdown.clone()).await?;
    } else {
        warn!("no chat channel enabled, idling until ctrl-c");
        shutdown.cancelled().await;
    }

    shutdown.cancel();

    {
        use std::io::Write as _;
        println!("\nBye :) ...");
        let _ = std::io::stdout().flush();
    }

    Ok(())
}

struct CliArgs {
    /// Number of `-v` flags given.
    verbosity: u8,
    config_path: Option<String>,
}

const USAGE: &str = "\
Usage: bartender [OPTIONS]

Options:
  -h, --help             Print help
  -f, --config <PATH>    Configuration file (default: config/default.toml)
  -v, -vv, -vvv, -vvvv   Log at warn, info, debug or trace";

fn parse_cli_args() -> CliArgs {
    let mut args = CliArgs { verbosity: 0, config_path: None };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--" => break,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            "-f" | "--config" => match iter.next() {
                Some(path) => args.config_path = Some(path),
                None => {
                    eprintln!("error: {arg} requires a path argument");
                    std::process::exit(1);
                }
            },
            "--verbose" => args.verbosity = args.verbosity.saturating_add(1),
            flag if flag.len() > 1 && flag.strip_prefix('-').is_some_and(|v| v.bytes().all(|b| b == b'v')) => {
                args.verbosity = args.verbosity.saturating_add((flag.len() - 1) as u8);
            }
            other => eprintln!("warning: ignoring unknown argument '{other}'"),
        }
    }

    args
}
