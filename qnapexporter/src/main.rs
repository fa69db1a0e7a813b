use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use clap::{Arg, Command};
use qnapexporter_core::{config::CliConfig, Config, Exporter};
use std::{net::SocketAddr, path::PathBuf, process, sync::Arc};
use tracing::{error, info};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const LANDING_PAGE: &str = r#"<html>
<head><title>QNAP Exporter</title></head>
<body>
<h1>QNAP Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>
"#;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("qnapexporter=info")),
        )
        .init();

    if let Err(e) = run() {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let matches = Command::new("qnapexporter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Prometheus exporter for QNAP NAS host telemetry")
        .arg(
            Arg::new("listen")
                .long("listen")
                .value_name("ADDR")
                .help("Address to serve /metrics on")
        )
        .arg(
            Arg::new("ping-target")
                .long("ping-target")
                .value_name("HOST")
                .help("Host to measure round-trip time against")
        )
        .arg(
            Arg::new("ups-address")
                .long("ups-address")
                .value_name("HOST:PORT")
                .help("Address of the UPS daemon")
        )
        .arg(
            Arg::new("source-timeout-ms")
                .long("source-timeout-ms")
                .value_name("MS")
                .help("Per-scrape deadline for all sources; 0 disables it")
                .value_parser(clap::value_parser!(u64))
        )
        .arg(
            Arg::new("json-config")
                .long("json-config")
                .value_name("PATH")
                .help("Path to JSON configuration file")
                .value_parser(clap::value_parser!(PathBuf))
        )
        .get_matches();

    let cli_config = CliConfig {
        listen_address: matches.get_one::<String>("listen").cloned(),
        ping_target: matches.get_one::<String>("ping-target").cloned(),
        ups_address: matches.get_one::<String>("ups-address").cloned(),
        source_timeout_ms: matches.get_one::<u64>("source-timeout-ms").copied(),
    };

    let json_config_path = matches.get_one::<PathBuf>("json-config");
    let config = Config::load(Some(&cli_config), json_config_path.map(PathBuf::as_path))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address {:?}", config.listen_address))?;

    let exporter = Arc::new(Exporter::new(&config));

    let app = Router::new()
        .route("/", get(landing))
        .route("/metrics", get(metrics))
        .with_state(Arc::clone(&exporter));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutting down");
    tokio::task::spawn_blocking(move || exporter.close())
        .await
        .context("failed to close exporter")?;
    Ok(())
}

async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn metrics(State(exporter): State<Arc<Exporter>>) -> Response {
    // Sources block on commands and sleeps
    let scraped = tokio::task::spawn_blocking(move || {
        let mut body = Vec::new();
        exporter.write_metrics(&mut body);
        body
    })
    .await;

    match scraped {
        Ok(body) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Scrape task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
