//! gRPC service implementation

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status};
use tracing::info;

use crate::engine::GenerationRequest;
use crate::gateway::GenerationSession;
use crate::proto::llm_server::Llm;
use crate::proto::{GenerateReply, GenerateRequest as PbGenerateRequest, Token};
use crate::ServiceContext;

/// The `llm.Llm` service: unary and streaming generation over one
/// shared service context.
pub struct LlmService {
    ctx: Arc<ServiceContext>,
}

impl LlmService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    fn to_request(&self, pb: PbGenerateRequest) -> GenerationRequest {
        GenerationRequest::new(pb.prompt, pb.max_new_tokens, pb.temperature)
    }
}

#[tonic::async_trait]
impl Llm for LlmService {
    async fn generate(
        &self,
        request: Request<PbGenerateRequest>,
    ) -> Result<Response<GenerateReply>, Status> {
        self.ctx.metrics.requests_total.inc();

        let req = self.to_request(request.into_inner());
        info!(
            request_id = %req.request_id,
            prompt_len = req.prompt.len(),
            "Received generate request"
        );

        let mut session = GenerationSession::new(req.request_id.clone(), self.ctx.metrics.clone());
        let text = session
            .run_unary(self.ctx.engine.as_ref(), &self.ctx.admission, req)
            .await?;

        Ok(Response::new(GenerateReply { text }))
    }

    type StreamGenerateStream = Pin<Box<dyn Stream<Item = Result<Token, Status>> + Send>>;

    async fn stream_generate(
        &self,
        request: Request<PbGenerateRequest>,
    ) -> Result<Response<Self::StreamGenerateStream>, Status> {
        self.ctx.metrics.requests_total.inc();

        let req = self.to_request(request.into_inner());
        info!(
            request_id = %req.request_id,
            prompt_len = req.prompt.len(),
            "Received stream generate request"
        );

        let (tx, rx) = mpsc::channel(32);
        let ctx = self.ctx.clone();
        let request_id = req.request_id.clone();
        tokio::spawn(async move {
            let mut session = GenerationSession::new(request_id, ctx.metrics.clone());
            if let Err(e) = session
                .run_streaming(ctx.engine.as_ref(), &ctx.admission, req, &tx)
                .await
            {
                let _ = tx.send(Err(e)).await;
            }
        });

        let tokens = ReceiverStream::new(rx).map(|item| match item {
            Ok(chunk) => Ok(Token {
                text: chunk.text,
                is_last: chunk.is_last,
            }),
            Err(e) => Err(Status::from(e)),
        });

        Ok(Response::new(Box::pin(tokens)))
    }
}
