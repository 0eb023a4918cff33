//! gRPC server for receiving OTLP traces
//!
//! Implements the OTLP TraceService using tonic and feeds every accepted
//! request through the execution pipeline.

use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
    trace_service_server::{TraceService, TraceServiceServer},
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info};

use crate::api::pipeline::ExecutionPipeline;
use crate::error::{MonitorError, ServerError};

/// gRPC server for ETL traces
#[derive(Debug, Clone)]
pub struct EtlTraceServer {
    pipeline: ExecutionPipeline,
}

impl EtlTraceServer {
    pub fn new(pipeline: ExecutionPipeline) -> Self {
        Self { pipeline }
    }

    /// The tonic service, for hosts that compose their own `Server`
    pub fn service(&self) -> TraceServiceServer<TraceServiceImpl> {
        TraceServiceServer::new(TraceServiceImpl {
            pipeline: self.pipeline.clone(),
        })
    }

    /// Start the gRPC server on the specified address
    pub async fn start(&self, addr: SocketAddr) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("{}: {}", addr, e)))?;
        self.serve_with_listener(listener).await
    }

    /// Serve on an already-bound listener (port 0 works for tests)
    pub async fn serve_with_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(e.to_string()))?;
        info!("Starting OTLP gRPC trace receiver on {}", local_addr);

        Server::builder()
            .add_service(self.service())
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .map_err(|e| ServerError::StartupError(e.to_string()))
    }
}

/// Trace service implementation
#[derive(Debug, Clone)]
pub struct TraceServiceImpl {
    pub(crate) pipeline: ExecutionPipeline,
}

#[tonic::async_trait]
impl TraceService for TraceServiceImpl {
    async fn export(
        &self,
        request: Request<ExportTraceServiceRequest>,
    ) -> Result<Response<ExportTraceServiceResponse>, Status> {
        let req = request.into_inner();

        match self.pipeline.process_request(&req).await {
            Ok(_) => Ok(Response::new(ExportTraceServiceResponse {
                partial_success: None,
            })),
            Err(MonitorError::Extraction(e)) => Err(Status::invalid_argument(e.to_string())),
            Err(e) => {
                error!("Failed to process trace export: {}", e);
                Err(Status::internal(format!("Failed to process traces: {}", e)))
            }
        }
    }
}
