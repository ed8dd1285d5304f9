//! Stream fan-in.
//!
//! Bridges an executor [`EventSource`] into the ordered, bounded sequence of
//! content increments handed to a caller. Whole messages and token fragments
//! both arrive as [`Message`] chunks.
//!
//! The adapter task:
//! - is confirmed running before [`fan_in`] returns
//! - blocks when the output queue is full (no drops while the consumer reads)
//! - keeps draining the source after the consumer goes away, discarding what
//!   it can no longer deliver
//! - closes the output exactly once, when the source ends

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::executor::{EventSource, StreamEvent};
use crate::session::{Message, Role};

use super::tool_result::format_tool_message;

/// Default output queue capacity.
pub const DEFAULT_STREAM_CAPACITY: usize = 100;

/// Consumer side of a fanned-in executor stream.
///
/// Yields chunks in production order and ends when the producer finishes.
/// Also usable as a [`futures::Stream`].
#[derive(Debug)]
pub struct ResponseStream {
    session_id: String,
    rx: mpsc::Receiver<Message>,
}

impl ResponseStream {
    /// Session this stream belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Receive the next chunk, or `None` once the stream is finished.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Stop accepting chunks. The producer keeps draining its source.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Drain the stream into one assistant message, suitable for
    /// `append_assistant_message`.
    ///
    /// Assistant chunks contribute their content and tool calls; chunks with
    /// any other role are skipped.
    pub async fn collect_reply(mut self) -> Message {
        let mut content = String::new();
        let mut calls = Vec::new();
        while let Some(chunk) = self.rx.recv().await {
            if chunk.role != Role::Assistant {
                continue;
            }
            content.push_str(&chunk.content);
            calls.extend(chunk.tool_calls.into_iter().flatten());
        }
        if calls.is_empty() {
            Message::assistant(&content)
        } else {
            Message::assistant_with_tools(&content, calls)
        }
    }
}

impl futures::Stream for ResponseStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.rx.poll_recv(cx)
    }
}

/// Adapt `source` into a [`ResponseStream`] with an output queue of
/// `capacity` chunks.
///
/// Per-event errors from the source are logged and skipped. Empty fragments
/// are dropped. Tool messages are normalized with
/// [`format_tool_message`](super::tool_result::format_tool_message).
pub async fn fan_in(session_id: &str, mut source: EventSource, capacity: usize) -> ResponseStream {
    let (tx, rx) = mpsc::channel::<Message>(capacity.max(1));
    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    let task_session = session_id.to_string();

    tokio::spawn(async move {
        let _ = ready_tx.send(());

        let mut delivered = 0usize;
        let mut discarded = 0usize;
        let mut consumer_open = true;

        while let Some(event) = source.recv().await {
            let chunk = match event {
                StreamEvent::Message(message) => format_tool_message(message),
                StreamEvent::Delta(text) if text.is_empty() => continue,
                StreamEvent::Delta(text) => Message::assistant(&text),
                StreamEvent::Error(e) => {
                    warn!(session_id = %task_session, error = %e, "Executor stream event failed");
                    continue;
                }
            };

            if !consumer_open {
                discarded += 1;
                continue;
            }
            if tx.send(chunk).await.is_err() {
                debug!(session_id = %task_session, "Stream consumer closed, draining source");
                consumer_open = false;
                discarded += 1;
            } else {
                delivered += 1;
            }
        }

        debug!(
            session_id = %task_session,
            delivered,
            discarded,
            "Executor stream finished"
        );
    });

    // The sender is consumed on the task's first statement; an error here
    // would mean the runtime dropped the task, and the stream then just ends.
    let _ = ready_rx.await;

    ResponseStream {
        session_id: session_id.to_string(),
        rx,
    }
}
