//! Embedding request loop
//!
//! Reads one request line, encodes its chunks, writes one response line,
//! flushes, and only then reads the next line. Per-line failures become
//! error responses; only stream I/O failures end the loop early.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, instrument};

use crate::models::{error_chain, DeviceResolver, EmbeddingModel, ModelFactory, ModelLoader};
use crate::protocol::status::{StatusChannel, StatusEvent};
use crate::protocol::{parse_request, Chunks, EmbedResponse, EmbedSuccess, Encoded, ErrorResponse};
use crate::server::{ServiceConfig, ServiceError};

/// Counters for one serving session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub lines: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Owns the loaded model for the lifetime of the process
pub struct EmbeddingService {
    model: Box<dyn EmbeddingModel>,
    include_traceback: bool,
    stats: ServeStats,
}

impl EmbeddingService {
    pub fn new(model: Box<dyn EmbeddingModel>, include_traceback: bool) -> Self {
        Self {
            model,
            include_traceback,
            stats: ServeStats::default(),
        }
    }

    pub fn model(&self) -> &dyn EmbeddingModel {
        self.model.as_ref()
    }

    /// Serve request lines from `input` until end of stream
    pub async fn serve<R, W>(&mut self, mut input: R, output: &mut W) -> Result<ServeStats, ServiceError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf).await? == 0 {
                debug!("input closed");
                break;
            }

            let response = self.handle_line(&buf).await;
            output.write_all(response.to_line()?.as_bytes()).await?;
            // The caller blocks on each response line
            output.flush().await?;
        }
        Ok(self.stats)
    }

    /// Produce the response for one raw input line
    #[instrument(skip_all)]
    pub async fn handle_line(&mut self, raw: &[u8]) -> EmbedResponse {
        self.stats.lines += 1;
        let response = EmbedResponse::from(self.process(raw).await);
        match &response {
            EmbedResponse::Success(success) => {
                self.stats.succeeded += 1;
                debug!(count = success.count, dim = success.embedding_dim, "encoded");
            }
            EmbedResponse::Error(err) => {
                self.stats.failed += 1;
                debug!(error = %err.error, "request failed");
            }
        }
        response
    }

    async fn process(&mut self, raw: &[u8]) -> Result<EmbedSuccess, ErrorResponse> {
        let line = std::str::from_utf8(raw).map_err(|e| ErrorResponse::new(format!("JSON decode error: {}", e)))?;
        let chunks = parse_request(line)?;
        let count = chunks.len();

        let encoded = match chunks {
            Chunks::One(text) => self.model.embed_text(&text).await.map(Encoded::Single),
            Chunks::Many(texts) => self.model.embed_batch(&texts).await.map(Encoded::Batch),
        };

        let include_traceback = self.include_traceback;
        let encoded = encoded.map_err(|e| {
            let response = ErrorResponse::encoding(&e);
            if include_traceback {
                response.with_traceback(error_chain(&e))
            } else {
                response
            }
        })?;

        EmbedSuccess::from_encoded(count, encoded).map_err(ErrorResponse::encoding)
    }
}

/// Resolve the device, load the model, then serve until `input` ends.
///
/// Status events go to `status`. Any error returned here has already been
/// reported there.
pub async fn run<R, O, E>(
    config: &ServiceConfig,
    resolver: &DeviceResolver,
    factory: &dyn ModelFactory,
    input: R,
    mut output: O,
    status: E,
) -> Result<ServeStats, ServiceError>
where
    R: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut status = StatusChannel::new(status);

    let device = resolver.resolve(&config.model.device);
    let model = ModelLoader::new(factory)
        .load(&config.model.name, device, &config.model.device, &mut status)
        .await?;

    let mut service = EmbeddingService::new(model, config.protocol.include_traceback);
    debug!(model = %service.model().info().name, dimension = ?service.model().dimension(), "serving requests");
    match service.serve(input, &mut output).await {
        Ok(stats) => {
            info!(
                lines = stats.lines,
                succeeded = stats.succeeded,
                failed = stats.failed,
                "input exhausted, shutting down"
            );
            Ok(stats)
        }
        Err(e) => {
            error!(error = %e, "fatal error in request loop");
            // The status stream may be the one that failed.
            if let Err(report) = status
                .emit(&StatusEvent::error(format!("Fatal error: {}", e), Some(error_chain(&e))))
                .await
            {
                error!(error = %report, "could not report fatal error");
            }
            Err(e)
        }
    }
}
