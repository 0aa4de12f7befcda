//! gRPC endpoint wiring.
//!
//! `StreamAudio` reads exactly one inbound message, hands it to the
//! orchestrator, and bridges the orchestrator's sink onto the outbound
//! stream. The remainder of the inbound stream is watched for the client
//! half-closing early or sending anything at all, both of which mark the
//! hardware id in the interrupt registry.

use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use loqui_proto::v1::assistant_server::{Assistant, AssistantServer};
use loqui_proto::v1::{StreamRequest, StreamResponse};

use crate::orchestrator::RequestOrchestrator;

/// Outbound channel depth; small, so backpressure reaches the workflow.
const OUTBOUND_BUFFER: usize = 16;

/// The `loqui.v1.Assistant` service.
pub struct AssistantService {
    orchestrator: Arc<RequestOrchestrator>,
}

impl AssistantService {
    /// Create the service.
    #[must_use]
    pub fn new(orchestrator: Arc<RequestOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Wrap into the tonic server type.
    #[must_use]
    pub fn into_server(self) -> AssistantServer<Self> {
        AssistantServer::new(self)
    }
}

#[tonic::async_trait]
impl Assistant for AssistantService {
    type StreamAudioStream =
        Pin<Box<dyn Stream<Item = Result<StreamResponse, Status>> + Send + 'static>>;

    async fn stream_audio(
        &self,
        request: Request<Streaming<StreamRequest>>,
    ) -> Result<Response<Self::StreamAudioStream>, Status> {
        let mut inbound = request.into_inner();

        let first = inbound
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("stream closed before a request arrived"))?;
        let hardware_id = first.hardware_id.clone();

        tracing::debug!(hardware_id, "stream opened");

        // Watch the rest of the inbound stream: an early error (client
        // cancel) or any extra message is an interrupt.
        let interrupts = self.orchestrator.interrupts();
        let watcher_id = hardware_id.clone();
        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(_)) => {
                        tracing::info!(hardware_id = %watcher_id, "explicit interrupt message");
                        interrupts.mark(&watcher_id);
                    }
                    Ok(None) => break, // clean half-close
                    Err(status) => {
                        tracing::info!(
                            hardware_id = %watcher_id,
                            code = ?status.code(),
                            "inbound stream broke, marking interrupt"
                        );
                        interrupts.mark(&watcher_id);
                        break;
                    }
                }
            }
        });

        let (tx, rx) = tokio::sync::mpsc::channel::<StreamResponse>(OUTBOUND_BUFFER);
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            let mut sink = tx;
            orchestrator.handle(first, &mut sink).await;
        });

        let outbound = ReceiverStream::new(rx).map(Ok);
        Ok(Response::new(Box::pin(outbound)))
    }
}
