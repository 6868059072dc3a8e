use std::env;
use std::process;
use tinyrp::{config::ProxyConfig, init_tracing, run_proxy};

#[tokio::main]
async fn main() {
    init_tracing();

    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    let config = match ProxyConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            eprintln!("Usage: tinyrp [config_file]");
            process::exit(1);
        }
    };

    if let Err(e) = run_proxy(config).await {
        eprintln!("tinyrp error: {}", e);
        process::exit(1);
    }
}
