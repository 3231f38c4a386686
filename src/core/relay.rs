//! Streaming multimodal relay
//!
//! Forwards a provider's incremental audio/text stream to the caller as
//! line-delimited tagged records while folding the same chunks into an
//! assistant turn for the session's dialog history.
//!
//! The relay is an explicit two-task pipeline: a provider-read task parses
//! upstream chunks and sends encoded lines into a bounded channel; the HTTP
//! response drains the channel. The bounded channel is the only buffering
//! between provider and caller, so caller-side backpressure propagates to
//! the upstream read. If the caller disconnects, the channel send fails and
//! the read task returns, dropping the upstream connection.
//!
//! A terminal `done:` line marks clean stream exhaustion; its absence tells
//! the caller the stream ended abnormally (in which case the partial
//! assistant turn is discarded and only the user's turn stays in history).

use crate::core::providers::ProviderError;
use crate::core::session::SessionStore;
use crate::core::types::{ConversationTurn, StreamChunk};
use crate::utils::error::GatewayError;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Terminal record emitted after a successfully exhausted stream
pub const DONE_LINE: &str = "done:\n";

/// Capacity of the relay channel: one chunk in flight plus a small margin
const RELAY_BUFFER: usize = 16;

/// Relays provider streams into caller responses and session history
#[derive(Clone)]
pub struct OmniRelay {
    sessions: Arc<SessionStore>,
}

impl OmniRelay {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }

    /// Append the caller's turn to the session history and relay `upstream`
    ///
    /// The user turn is persisted before the stream starts; the accumulated
    /// assistant turn is appended only when the provider closes the stream
    /// cleanly. Chunks are forwarded strictly in emission order.
    pub fn relay<S>(
        &self,
        session_id: &str,
        user_turn: ConversationTurn,
        upstream: S,
    ) -> impl Stream<Item = Result<Bytes, GatewayError>>
    where
        S: Stream<Item = Result<StreamChunk, ProviderError>> + Send + 'static,
    {
        self.sessions.append_history(session_id, user_turn);

        let (tx, rx) = mpsc::channel::<Result<Bytes, GatewayError>>(RELAY_BUFFER);
        let sessions = Arc::clone(&self.sessions);
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let mut upstream = Box::pin(upstream);
            let mut parts = Vec::new();

            while let Some(item) = upstream.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        // Mid-flight provider failure: stop forwarding and
                        // discard the partially built assistant turn. The
                        // caller sees the stream end without a done: line.
                        warn!(session_id = %session_id, error = %e, "provider stream failed mid-flight");
                        return;
                    }
                };

                let line = Bytes::from(chunk.encode_line());
                if tx.send(Ok(line)).await.is_err() {
                    // Caller disconnected; dropping `upstream` releases the
                    // provider connection.
                    debug!(session_id = %session_id, "caller disconnected, aborting relay");
                    return;
                }
                parts.push(chunk.into_part());
            }

            sessions.append_history(&session_id, ConversationTurn::assistant_parts(parts));
            let _ = tx.send(Ok(Bytes::from_static(DONE_LINE.as_bytes()))).await;
        });

        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContentPart, TurnContent};
    use futures_util::stream;

    fn collect_body(
        stream: impl Stream<Item = Result<Bytes, GatewayError>>,
    ) -> impl std::future::Future<Output = String> {
        async move {
            let chunks: Vec<_> = stream.collect().await;
            chunks
                .into_iter()
                .map(|c| String::from_utf8(c.unwrap().to_vec()).unwrap())
                .collect()
        }
    }

    #[tokio::test]
    async fn accumulated_turn_equals_forwarded_chunks_in_order() {
        let sessions = Arc::new(SessionStore::new());
        let relay = OmniRelay::new(sessions.clone());

        let upstream = stream::iter(vec![
            Ok(StreamChunk::Text("Hello".to_string())),
            Ok(StreamChunk::Audio("Zm9v".to_string())),
            Ok(StreamChunk::Text("!".to_string())),
        ]);

        let body = collect_body(relay.relay(
            "s1",
            ConversationTurn::user_text("hi"),
            upstream,
        ))
        .await;

        assert_eq!(body, "text:Hello\naudio:Zm9v\ntext:!\ndone:\n");

        let history = sessions.history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(
            history[1].content,
            TurnContent::Parts(vec![
                ContentPart::text("Hello"),
                ContentPart::input_audio("Zm9v", "wav"),
                ContentPart::text("!"),
            ])
        );
    }

    #[tokio::test]
    async fn abnormal_termination_discards_partial_assistant_turn() {
        let sessions = Arc::new(SessionStore::new());
        let relay = OmniRelay::new(sessions.clone());

        let upstream = stream::iter(vec![
            Ok(StreamChunk::Text("partial".to_string())),
            Err(ProviderError::transport("qwen", "connection reset")),
            // Never reached: the relay stops at the first error
            Ok(StreamChunk::Text("never".to_string())),
        ]);

        let body = collect_body(relay.relay(
            "s1",
            ConversationTurn::user_text("hi"),
            upstream,
        ))
        .await;

        // Forwarded chunks end without the done: sentinel
        assert_eq!(body, "text:partial\n");

        // Only the user's turn was persisted
        let history = sessions.history("s1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], ConversationTurn::user_text("hi"));
    }

    #[tokio::test]
    async fn empty_stream_persists_empty_assistant_turn_and_done_marker() {
        let sessions = Arc::new(SessionStore::new());
        let relay = OmniRelay::new(sessions.clone());

        let upstream = stream::iter(Vec::<Result<StreamChunk, ProviderError>>::new());
        let body = collect_body(relay.relay(
            "s1",
            ConversationTurn::user_text("hi"),
            upstream,
        ))
        .await;

        assert_eq!(body, "done:\n");
        assert_eq!(sessions.history_len("s1"), 2);
    }

    #[tokio::test]
    async fn dropped_caller_stops_the_relay() {
        let sessions = Arc::new(SessionStore::new());
        let relay = OmniRelay::new(sessions.clone());

        // Unbounded chunk source; the relay must stop on its own once the
        // caller side is gone rather than drain it forever.
        let upstream = stream::iter((0..).map(|i| Ok(StreamChunk::Text(format!("c{}", i)))));

        let body_stream = relay.relay("s1", ConversationTurn::user_text("hi"), upstream);
        drop(body_stream);

        // Give the spawned task a chance to observe the closed channel
        tokio::task::yield_now().await;

        // No assistant turn was persisted
        assert_eq!(sessions.history_len("s1"), 1);
    }
}
