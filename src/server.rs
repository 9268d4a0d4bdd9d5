use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::{ErrorKind, FrameError};
use crate::mediator::Mediator;
use crate::native::codec;
use crate::protocol::{self, Inbound, Outbound};
use crate::request::OriginContext;
use crate::response::CompletionResult;

/// Serve framed extension messages from `reader`, answering on `writer`.
///
/// Prompts run concurrently; replies go out in completion order, each tagged
/// with its request id and origin. Returns once `reader` closes and every
/// already-queued reply has been written. Results still in flight at that
/// point are dropped, since their contexts are gone.
pub async fn serve<R, W>(
    mediator: Arc<Mediator>,
    origins: &[String],
    reader: R,
    writer: W,
) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_frames(writer, out_rx));

    for origin in origins {
        open_context(&mediator, OriginContext::new(origin.as_str()), &out_tx);
    }

    let read_result = read_frames(&mediator, reader, &out_tx).await;
    tracing::info!("extension input closed");

    for origin in mediator.contexts().origins() {
        mediator.contexts().detach(&origin);
    }
    drop(out_tx);

    let write_result = writer_task
        .await
        .map_err(|e| FrameError::Io(std::io::Error::other(e)))?;
    read_result.and(write_result)
}

async fn read_frames<R>(
    mediator: &Arc<Mediator>,
    reader: R,
    out_tx: &mpsc::UnboundedSender<Outbound>,
) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, codec::codec());
    while let Some(frame) = frames.next().await {
        // A framing error means the stream is out of sync; nothing after it can be trusted.
        let frame = frame?;

        let value: Value = match codec::decode(&frame) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("undecodable frame: {e}");
                let _ = out_tx.send(Outbound::ProtocolError {
                    error: ErrorKind::InvalidRequest,
                    detail: e.to_string(),
                });
                continue;
            }
        };

        match protocol::parse(value) {
            Err(reply) => {
                tracing::warn!("rejected malformed message");
                let _ = out_tx.send(reply);
            }
            Ok(Inbound::ContextOpen { origin }) => {
                open_context(mediator, OriginContext::new(origin), out_tx);
            }
            Ok(Inbound::ContextClose { origin }) => {
                mediator.contexts().detach(&OriginContext::new(origin));
            }
            Ok(Inbound::SetApiKey {
                request_id,
                origin,
                api_key,
            }) => {
                let mediator = Arc::clone(mediator);
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    let attached = mediator
                        .contexts()
                        .is_attached(&OriginContext::new(origin.as_str()));
                    let error = if !attached {
                        tracing::warn!(%origin, "key write from unknown origin rejected");
                        Some(ErrorKind::InvalidRequest)
                    } else {
                        match mediator.store_credential(&api_key).await {
                            Ok(()) => None,
                            Err(e) => {
                                tracing::warn!("key write failed: {e}");
                                Some(e.kind())
                            }
                        }
                    };
                    let _ = out_tx.send(Outbound::KeyStored {
                        request_id,
                        origin,
                        success: error.is_none(),
                        error,
                    });
                });
            }
            Ok(prompt @ Inbound::Prompt { .. }) => {
                let Some(request) = prompt.into_prompt_request() else {
                    continue;
                };
                if mediator.contexts().is_attached(request.origin()) {
                    mediator.dispatch(request);
                } else {
                    // No outbox to deliver through; answer on the wire directly.
                    tracing::warn!(
                        origin = %request.origin(),
                        "prompt from unknown origin rejected"
                    );
                    let result = CompletionResult::error(
                        request.request_id().clone(),
                        ErrorKind::InvalidRequest,
                    );
                    let reply = Outbound::response(request.origin().clone(), result);
                    let _ = out_tx.send(reply);
                }
            }
        }
    }
    Ok(())
}

/// Attach `origin` and forward everything delivered to it onto the shared writer.
fn open_context(
    mediator: &Mediator,
    origin: OriginContext,
    out_tx: &mpsc::UnboundedSender<Outbound>,
) {
    let mut outbox = mediator.contexts().attach(origin.clone());
    let out_tx = out_tx.clone();
    tokio::spawn(async move {
        while let Some(result) = outbox.recv().await {
            if out_tx.send(Outbound::response(origin.clone(), result)).is_err() {
                break;
            }
        }
    });
}

async fn write_frames<W>(
    writer: W,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, codec::codec());
    while let Some(message) = out_rx.recv().await {
        sink.send(codec::encode(&message)?).await?;
    }
    SinkExt::<Bytes>::close(&mut sink).await?;
    Ok(())
}
