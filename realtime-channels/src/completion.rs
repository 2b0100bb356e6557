//! Operation results handed back to application code.
//!
//! Every channel operation enqueues its command immediately and returns a
//! [`Completion`]. Awaiting it is optional: the operation runs regardless.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use realtime_protocol::{codes, ErrorInfo};
use tokio::sync::oneshot;

/// Sending half of a [`Completion`], held by the dispatcher.
pub(crate) type Responder<T> = oneshot::Sender<Result<T, ErrorInfo>>;

/// Future resolving with the outcome of a channel operation.
#[must_use = "the operation runs anyway; await the completion to observe its outcome"]
pub struct Completion<T> {
    inner: Inner<T>,
}

enum Inner<T> {
    Ready(Option<Result<T, ErrorInfo>>),
    Pending(oneshot::Receiver<Result<T, ErrorInfo>>),
}

// Never pin-projects into `T`.
impl<T> Unpin for Completion<T> {}

impl<T> Completion<T> {
    /// A completion resolved before it is returned.
    pub(crate) fn ready(result: Result<T, ErrorInfo>) -> Self {
        Self {
            inner: Inner::Ready(Some(result)),
        }
    }

    /// Create a responder and the completion it resolves.
    pub(crate) fn channel() -> (Responder<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                inner: Inner::Pending(rx),
            },
        )
    }

    /// Take the outcome if it is already available, without waiting.
    pub fn try_take(&mut self) -> Option<Result<T, ErrorInfo>> {
        match &mut self.inner {
            Inner::Ready(slot) => slot.take(),
            Inner::Pending(rx) => match rx.try_recv() {
                Ok(result) => Some(result),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => Some(Err(client_closed())),
            },
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, ErrorInfo>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            Inner::Ready(slot) => Poll::Ready(slot.take().unwrap_or_else(|| Err(client_closed()))),
            Inner::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or_else(|_| Err(client_closed()))),
        }
    }
}

/// Resolve a responder, ignoring callers that stopped listening.
pub(crate) fn resolve<T>(responder: Responder<T>, result: Result<T, ErrorInfo>) {
    let _ = responder.send(result);
}

/// Error seen by completions whose dispatcher went away before answering.
pub(crate) fn client_closed() -> ErrorInfo {
    ErrorInfo::new(codes::CONNECTION_CLOSED, 400, "Realtime client closed")
}
