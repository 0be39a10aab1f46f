use std::sync::Arc;
use studyvault::{api, config, identity, logging, orchestrator};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();

    let orchestrator = orchestrator::OrchestratorService::new()
        .expect("Failed to initialize store clients");
    let identity = identity::IdentityService::new(orchestrator.metadata_store());
    let metrics = orchestrator.metrics();

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    let app = api::create_router(api::AppState {
        orchestrator: Arc::new(orchestrator),
        identity: Arc::new(identity),
        metrics,
        webhook_secret: config::get_config().webhook_secret.clone(),
        port,
    });

    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.expect("Server error");
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4000..=4099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4000-4099",
    ))
}
