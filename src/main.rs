use std::sync::Arc;

use anyhow::Result;

use supplier_services::{app, config, logging, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let config = config::Config::from_env()?;
    let addr = config.bind_addr;

    let state = Arc::new(AppState::new(config));
    let app = app(state);

    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
