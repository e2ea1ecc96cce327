//! DU chapters ETL - one Extract -> Transform -> Load run per invocation.

use du_chapters_etl::cli::Cli;
use du_chapters_etl::logging;
use du_chapters_etl::pipeline;
use du_chapters_etl::telemetry::TracingObserver;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Load .env before anything reads the environment (RUST_LOG included).
    let dotenv = dotenvy::dotenv();

    logging::init_stderr_logging();

    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!("Ignoring unreadable .env file: {e}");
        }
    }

    let cli = match Cli::parse_args() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        // --help / --version
        Err(e) => e.exit(),
    };

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    };

    info!(
        "Loading state={} into {}",
        config.api.state_filter,
        config.database.display_string()
    );

    let result = pipeline::run(&config, &TracingObserver).await;
    std::process::exit(pipeline::exit_code(&result));
}
