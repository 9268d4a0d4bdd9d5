//! Host side of the native handshake, used by the `promptbridge-keyhost` binary.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::FrameError;
use crate::native::{GET_API_KEY, NativeHandshakeMessage, codec};

/// Build the reply for one request. An unset key answers with an empty
/// string, which the extension reads as "not configured".
pub fn answer(message: &NativeHandshakeMessage, api_key: Option<&str>) -> Value {
    match message.action.as_str() {
        GET_API_KEY => json!({ "apiKey": api_key.unwrap_or_default() }),
        other => json!({ "error": format!("unknown action: {other}") }),
    }
}

/// Read one framed request, write one framed reply. Returns `Ok(false)` if
/// the stream closed before any request arrived.
pub async fn serve_once<R, W>(
    reader: R,
    writer: W,
    api_key: Option<&str>,
) -> Result<bool, FrameError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut requests = FramedRead::new(reader, codec::codec());
    let Some(frame) = requests.next().await else {
        return Ok(false);
    };
    let frame = frame?;

    let reply = match codec::decode::<NativeHandshakeMessage>(&frame) {
        Ok(message) => {
            tracing::debug!(action = %message.action, "native request");
            answer(&message, api_key)
        }
        Err(e) => json!({ "error": format!("invalid request: {e}") }),
    };

    let mut sink = FramedWrite::new(writer, codec::codec());
    sink.send(codec::encode(&reply)?).await?;
    SinkExt::<Bytes>::flush(&mut sink).await?;
    Ok(true)
}
