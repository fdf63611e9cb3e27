//! Single-resolution completion handles and the caller-side future.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// What a successful request resolves with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    /// Fire-and-forget request whose bytes were written.
    Sent,
    /// The correlated response frame.
    Frame(T),
}

/// Producer half of a pending request.
///
/// `resolve` and `reject` consume the handle, so a request completes at
/// most once. A caller that dropped its [`ResponseFuture`] is ignored.
#[derive(Debug)]
pub struct Completion<T> {
    tx: oneshot::Sender<Result<Reply<T>>>,
}

impl<T> Completion<T> {
    /// Create a linked completion/future pair.
    pub fn pair() -> (Completion<T>, ResponseFuture<T>) {
        let (tx, rx) = oneshot::channel();
        (Completion { tx }, ResponseFuture { rx })
    }

    /// Complete the request successfully.
    pub fn resolve(self, reply: Reply<T>) {
        let _ = self.tx.send(Ok(reply));
    }

    /// Complete the request with an error.
    pub fn reject(self, error: Error) {
        let _ = self.tx.send(Err(error));
    }

    /// Whether the caller has dropped the matching future.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Caller half of a pending request.
///
/// Resolves with the request's outcome. If the completion is dropped
/// without being actioned (the IO task went away), it resolves with
/// [`Error::Closed`].
#[derive(Debug)]
pub struct ResponseFuture<T> {
    rx: oneshot::Receiver<Result<Reply<T>>>,
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<Reply<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::Closed)))
    }
}
