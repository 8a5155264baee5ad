use clap::Parser;
use std::env;
use tracing::error;
use tracing_subscriber::EnvFilter;

use destock::api::{Cli, run_cli, run_http_server};

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        init_tracing("info");
        let port = raw_args
            .get(2)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        if let Err(e) = run_http_server(port).await {
            error!("Server error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    match run_cli(cli) {
        Ok(json) => println!("{json}"),
        Err(msg) => {
            error!("{msg}");
            std::process::exit(1);
        }
    }
}
