//! DateCity terminal game.
//!
//! A line-mode front end for the DateCity dating game. Completions come from
//! a local OpenAI-compatible server when one is running (LM Studio on port
//! 1234 by default) and from OpenRouter otherwise.
//!
//! ```bash
//! cargo run -p datecity
//! OPENROUTER_API_KEY=sk-or-... cargo run -p datecity -- --no-local
//! ```

mod notify;
mod repl;

use datecity_core::{GameSession, LogTarget, SessionConfig};
use notify::TerminalNotifier;
use std::io;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "datecity=info,datecity_core=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with game text on stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let options = parse_args(&args, SessionConfig::from_env());
    tracing::debug!(
        data_dir = %options.config.resolved_data_dir().display(),
        local_url = ?options.config.local_url,
        remote_model = %options.config.remote_model,
        "Starting session"
    );

    let notifier = Arc::new(TerminalNotifier::new(options.bell));
    let session = GameSession::start(options.config, notifier).await;

    repl::run(session, io::stdin().lock(), io::stdout()).await?;
    Ok(())
}

/// Command line settings layered over the environment.
#[derive(Debug)]
struct Options {
    config: SessionConfig,
    bell: bool,
}

/// Apply command line flags to `config`. Flags missing their value are ignored.
fn parse_args(args: &[String], mut config: SessionConfig) -> Options {
    let mut bell = true;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" => {
                if let Some(dir) = args.get(i + 1) {
                    config = config.with_data_dir(dir);
                    i += 1;
                }
            }
            "--model" => {
                if let Some(model) = args.get(i + 1) {
                    config = config.with_remote_model(model);
                    i += 1;
                }
            }
            "--local-url" => {
                if let Some(url) = args.get(i + 1) {
                    config = config.with_local_url(url);
                    i += 1;
                }
            }
            "--local-model" => {
                if let Some(model) = args.get(i + 1) {
                    config = config.with_local_model(model);
                    i += 1;
                }
            }
            "--temperature" => {
                if let Some(t) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                    config = config.with_temperature(t);
                    i += 1;
                }
            }
            "--no-local" => config = config.without_local(),
            "--no-log" => config = config.with_log(LogTarget::Disabled),
            "--quiet" => bell = false,
            _ => {}
        }
        i += 1;
    }

    Options { config, bell }
}

fn print_help() {
    println!("DateCity - a dating game played by a language model");
    println!();
    println!("USAGE:");
    println!("  datecity [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help             Show this help message");
    println!("  --data-dir <DIR>       Where the game is saved");
    println!("  --model <MODEL>        Remote model (default: openai/gpt-4)");
    println!("  --local-url <URL>      Local server (default: http://localhost:1234/v1)");
    println!("  --local-model <MODEL>  Model name sent to the local server");
    println!("  --temperature <T>      Sampling temperature (default: 1.0)");
    println!("  --no-local             Do not look for a local server");
    println!("  --no-log               Do not write the conversation log");
    println!("  --quiet                No terminal bell on cues");
    println!();
    println!("ENVIRONMENT:");
    println!("  OPENROUTER_API_KEY     Enables the remote backend");
    println!("  DATECITY_DATA_DIR, DATECITY_LOCAL_URL, DATECITY_LOCAL_MODEL,");
    println!("  DATECITY_REMOTE_URL, DATECITY_MODEL, DATECITY_REFERER,");
    println!("  DATECITY_TEMPERATURE, DATECITY_MAX_TOKENS, DATECITY_LOG");
    println!("  RUST_LOG               Log filter (default: {DEFAULT_LOG_FILTER})");
    println!();
    println!("COMMANDS (in game):");
    println!("  #new, #status, #history, #help, #quit");
}
