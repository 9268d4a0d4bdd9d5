use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::process::Command;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::BridgeError;
use crate::native::{NativeHandshakeMessage, NativeTransport, codec};

/// Launches the native host executable for each exchange and speaks
/// native-messaging frames over its stdin/stdout.
///
/// - No shell: `Command::new` + explicit args
/// - `kill_on_drop(true)` so a timed-out exchange doesn't leave the host running
/// - Replies larger than [`codec::MAX_MESSAGE_BYTES`] are rejected by the codec
pub struct ProcessTransport {
    executable: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl ProcessTransport {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Extra environment for the host process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl NativeTransport for ProcessTransport {
    async fn send(&self, message: &NativeHandshakeMessage) -> Result<Option<Value>, BridgeError> {
        let frame = codec::encode(message)
            .map_err(|e| BridgeError::Unavailable(format!("failed to encode request: {e}")))?;

        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::Unavailable(format!(
                "failed to spawn {}: {e}",
                self.executable.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Unavailable("host stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Unavailable("host stdout not captured".to_string()))?;

        // Write from a separate task so a host that replies before draining
        // stdin can't deadlock us on a full pipe.
        let writer = tokio::spawn(async move {
            let mut sink = FramedWrite::new(stdin, codec::codec());
            sink.send(frame).await?;
            // Closing stdin tells the host no more requests are coming.
            SinkExt::<Bytes>::close(&mut sink).await
        });

        let mut replies = FramedRead::new(stdout, codec::codec());
        let reply = match replies.next().await {
            None => Ok(None),
            Some(Ok(bytes)) => codec::decode::<Value>(&bytes)
                .map(Some)
                .map_err(|e| BridgeError::Malformed(format!("reply is not JSON: {e}"))),
            Some(Err(e)) => Err(BridgeError::Malformed(format!("bad reply frame: {e}"))),
        };

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("native host stdin write failed: {e}"),
            Err(e) => tracing::debug!("native host writer task failed: {e}"),
        }

        // One exchange per process. Reap it so it doesn't linger as a zombie.
        if let Ok(None) = child.try_wait() {
            let _ = child.start_kill();
        }
        if let Err(e) = child.wait().await {
            tracing::debug!("failed to reap native host: {e}");
        }

        reply
    }
}
