//! Standalone ETL Trace Monitor
//!
//! Runs as a standalone service that receives OTLP traces via gRPC, rebuilds
//! them into execution records, writes those to Arrow IPC files and alerts on
//! failed executions.

use etl_trace_monitor::{ConfigLoader, EtlMonitor, EtlTraceServer};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    // ETLMON_CONFIG names a YAML file; otherwise defaults plus ETLMON_* overrides
    let config = match std::env::var("ETLMON_CONFIG") {
        Ok(path) => ConfigLoader::from_yaml(path)?,
        Err(_) => ConfigLoader::from_env()?,
    };

    let monitor = EtlMonitor::new(config.clone()).await?;

    // Start gRPC trace receiver if enabled
    let receiver_handle = if config.receiver.enabled {
        let receiver_addr: SocketAddr =
            format!("{}:{}", config.receiver.bind_address, config.receiver.port)
                .parse()
                .map_err(|e| {
                    format!(
                        "Invalid receiver address {}:{}: {}",
                        config.receiver.bind_address, config.receiver.port, e
                    )
                })?;

        let server = EtlTraceServer::new(monitor.pipeline().clone());

        Some(tokio::spawn(async move {
            if let Err(e) = server.start(receiver_addr).await {
                error!("gRPC trace receiver error: {}", e);
            }
        }))
    } else {
        info!("gRPC trace receiver disabled");
        None
    };

    // Start health check endpoint (simple HTTP responder)
    let health_addr: SocketAddr = format!("0.0.0.0:{}", config.health_port)
        .parse()
        .map_err(|e| format!("Invalid health check port {}: {}", config.health_port, e))?;
    let health_listener = tokio::net::TcpListener::bind(&health_addr).await?;
    info!("Health check endpoint listening on {}", health_addr);

    let health_handle = tokio::spawn(async move {
        loop {
            match health_listener.accept().await {
                Ok((mut stream, _)) => {
                    let response = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK";
                    let _ = stream.write_all(response).await;
                    let _ = stream.shutdown().await;
                }
                Err(e) => {
                    error!("Health check endpoint error: {}", e);
                }
            }
        }
    });

    info!(
        receiver_port = config.receiver.port,
        output_dir = %config.storage.output_dir.display(),
        "ETL trace monitor started"
    );

    // Keep the service running
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");

    if let Some(handle) = receiver_handle {
        handle.abort();
    }
    health_handle.abort();

    monitor.shutdown().await?;

    Ok(())
}
