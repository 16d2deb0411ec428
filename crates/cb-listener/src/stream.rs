//! Subscriber side of a listener stream

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::events::{StreamEvent, StreamKind};

/// Producer half owned by a listener session
pub(crate) type EventSink = mpsc::UnboundedSender<StreamEvent>;

/// Create the sink a session emits into and the stream the caller reads
pub(crate) fn event_channel(kind: StreamKind) -> (EventSink, ContactEventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ContactEventStream { kind, rx })
}

/// Stream of change payloads for one subscription.
///
/// Ends (`None`) once the subscription is torn down: unsubscribe, replacement
/// by a newer subscription of the same kind, permission revocation, or a
/// failed start after its single error payload.
#[derive(Debug)]
pub struct ContactEventStream {
    kind: StreamKind,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl ContactEventStream {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Next payload, or `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Next payload if one is already queued
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ContactEventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
