use nfcemu_core::Emulator;
use nfcemu_net::{ConnectionState, LocalCommandServer, RemoteSyncClient};
use tracing::{info, warn};

/// Resolved settings for a serve session
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServeOptions {
    /// Local server port, `None` keeps the server off
    pub(crate) port: Option<u16>,
    /// Remote controller host and port
    pub(crate) remote: Option<(String, u16)>,
    pub(crate) interval_ms: u64,
}

/// Run the network services until Ctrl-C
pub(crate) async fn run(emulator: Emulator, options: ServeOptions) -> eyre::Result<()> {
    let server = LocalCommandServer::new(emulator.clone());
    if let Some(port) = options.port {
        let port = server.start(port).await?;
        info!(port, "Accepting commands");
    }

    let client = RemoteSyncClient::new(emulator)?;
    let forwarder = client.forward_status();
    if let Some((address, port)) = &options.remote {
        match client.connect(address, *port, options.interval_ms).await {
            ConnectionState::Connected => info!(%address, port, "Polling remote controller"),
            state => warn!(%address, port, ?state, "Remote controller unavailable"),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    client.disconnect().await;
    forwarder.abort();
    server.stop().await;
    Ok(())
}
