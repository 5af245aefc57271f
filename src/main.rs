use clap::Parser;
use tracing::{debug, error, info, warn};

use dvrman::config::Config;

#[derive(Parser)]
#[command(version)]
struct Args {
    /// Set config file path
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let cfg = match Config::parse(args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    utils::set_log(
        utils::default_directives(&["dvrman", "api"], &cfg.log.level),
        utils::LogFormat::parse(&cfg.log.format),
    );

    warn!("set log level : {}", cfg.log.level);
    debug!("config : {:?}", cfg);

    let listener = match tokio::net::TcpListener::bind(cfg.http.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("bind {}: {}", cfg.http.listen, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = dvrman::serve(cfg, listener, shutdown_signal()).await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
    info!("Server shutdown");
}

async fn shutdown_signal() {
    let signal = signal::wait_for_stop_signal().await;
    debug!("Received signal: {}", signal);
}
