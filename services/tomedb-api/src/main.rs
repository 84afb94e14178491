use tomedb_api::{init_tracing, run_server, Config};

#[tokio::main]
async fn main() {
    // Configuration problems surface before tracing is installed
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = config.validate() {
        eprintln!("configuration error: {err}");
        std::process::exit(1);
    }

    init_tracing(&config.logging);

    if let Err(err) = run_server(config).await {
        tracing::error!(error = %err, "Server terminated with error");
        std::process::exit(1);
    }
}
