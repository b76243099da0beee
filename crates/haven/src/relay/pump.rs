//! Moves decoded deltas from the upstream body to the caller.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::frame::{Frame, FrameDecoder};
use crate::completion::CompletionResult;

/// How an upstream stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The provider sent `[DONE]`. Carries the full reply.
    Completed { content: String },
    /// The body ended, failed or stalled before `[DONE]`.
    Truncated { delivered: String },
    /// The caller went away.
    Cancelled,
}

impl StreamEnd {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Relay upstream bytes to `tx` as text deltas, in arrival order.
///
/// Returns as soon as the stream is finished in any way; dropping `tx` on
/// return closes the caller's body and dropping `upstream` releases the
/// provider connection.
pub async fn pump<S>(mut upstream: S, tx: mpsc::Sender<Bytes>, idle_timeout: Duration) -> StreamEnd
where
    S: Stream<Item = CompletionResult<Bytes>> + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut content = String::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => {
                debug!(delivered = content.len(), "Caller disconnected mid-stream");
                return StreamEnd::Cancelled;
            }
            next = tokio::time::timeout(idle_timeout, upstream.next()) => next,
        };

        let frames = match next {
            Ok(Some(Ok(chunk))) => decoder.push(&chunk),
            Ok(Some(Err(err))) => {
                warn!(error = %err, "Completion stream failed");
                return StreamEnd::Truncated { delivered: content };
            }
            Ok(None) => {
                let frames = decoder.finish();
                if let Some(end) = forward(frames, &tx, &mut content).await {
                    return end;
                }
                warn!(
                    delivered = content.len(),
                    "Completion stream ended without a completion marker"
                );
                return StreamEnd::Truncated { delivered: content };
            }
            Err(_) => {
                warn!(timeout = ?idle_timeout, "Completion stream stalled");
                return StreamEnd::Truncated { delivered: content };
            }
        };

        if let Some(end) = forward(frames, &tx, &mut content).await {
            return end;
        }
    }
}

/// Send each delta on and accumulate it. `Some` when the stream is over.
async fn forward(
    frames: Vec<Frame>,
    tx: &mpsc::Sender<Bytes>,
    content: &mut String,
) -> Option<StreamEnd> {
    for frame in frames {
        match frame {
            Frame::Delta(text) => {
                content.push_str(&text);
                if tx.send(Bytes::from(text)).await.is_err() {
                    debug!("Caller disconnected mid-stream");
                    return Some(StreamEnd::Cancelled);
                }
            }
            Frame::Done => {
                return Some(StreamEnd::Completed {
                    content: std::mem::take(content),
                });
            }
        }
    }
    None
}
