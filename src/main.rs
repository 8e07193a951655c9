use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use gosei::{http, logging, wait_for_shutdown_signal, Config, Dashboard};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load().context("loading configuration")?;
    logging::init(&cfg);

    let addr = cfg.bind_addr()?;
    let groups_root = std::env::current_dir().context("resolving working directory")?;

    // Simulated runtime with the demo groups. `executor = compose` is refused
    // here: it needs a real runtime client injected through the library.
    let dashboard = Dashboard::builder(cfg)
        .with_groups_root(groups_root)
        .build()
        .context("wiring dashboard")?;
    dashboard.start();

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    let app = http::router(dashboard.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match wait_for_shutdown_signal().await {
                Ok(signal) => info!(signal, "termination signal received"),
                Err(e) => error!(error = %e, "signal handler unavailable"),
            }
            if let Err(e) = dashboard.shutdown().await {
                error!(label = e.as_label(), "{}", e.as_message());
            }
        })
        .await
        .context("serving http")?;

    info!("bye");
    Ok(())
}
