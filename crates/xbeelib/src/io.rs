//! IO task types and implementation.
//!
//! This module defines the request protocol between the [`XBee`](crate::XBee)
//! handle and the single IO task that owns the transport, plus the IO task
//! loop itself.
//!
//! The IO task owns the [`Correlator`] as well, so frame ID allocation,
//! pending-request bookkeeping and timeouts all run on one task without
//! locks. It handles: encoding and writing requests, decoding inbound
//! bytes, resolving pending requests from responses, expiring requests
//! whose deadline passed, and forwarding unsolicited frames to
//! subscribers.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use xbeelib_api::{ApiFrame, ApiMode, FrameDecoder, encode_frame};
use xbeelib_core::correlator::{Correlator, Dispatch};
use xbeelib_core::error::{Error, Result};
use xbeelib_core::transport::Transport;
use xbeelib_core::{Reply, ResponseFuture};

use crate::commands::classify_response;
use crate::events::XBeeEvent;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the IO task.
pub(crate) struct IoConfig {
    /// Framing used on the wire.
    pub api_mode: ApiMode,
}

/// A request sent from the handle to the IO task.
pub(crate) enum Request {
    /// Write a frame. For correlated requests the IO task allocates the
    /// frame ID and registers the request before writing.
    Submit {
        frame: ApiFrame,
        expects_response: bool,
        timeout: Duration,
        reply: oneshot::Sender<Result<ResponseFuture<ApiFrame>>>,
    },
    /// Reject everything outstanding, close the transport, and exit.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Handle to the IO task. Stored inside `XBee`.
pub(crate) struct XBeeIo {
    pub cmd_tx: mpsc::Sender<Request>,
    pub cancel: CancellationToken,
}

impl XBeeIo {
    /// Submit a frame and await its correlated response.
    pub async fn request(&self, frame: ApiFrame, timeout: Duration) -> Result<ApiFrame> {
        let response = self.submit(frame, true, timeout).await?;
        match response.await? {
            Reply::Frame(frame) => Ok(frame),
            Reply::Sent => Err(Error::Protocol("request completed without a response".into())),
        }
    }

    /// Submit a frame with frame ID 0 and await the write.
    pub async fn send(&self, frame: ApiFrame) -> Result<()> {
        let response = self.submit(frame, false, Duration::ZERO).await?;
        response.await.map(|_| ())
    }

    /// Hand a frame to the IO task. Returns once the request is
    /// registered, so capacity errors surface here and not from the
    /// returned future.
    async fn submit(
        &self,
        frame: ApiFrame,
        expects_response: bool,
        timeout: Duration,
    ) -> Result<ResponseFuture<ApiFrame>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::Submit {
                frame,
                expects_response,
                timeout,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Closed)?;

        reply_rx.await.map_err(|_| Error::Closed)?
    }

    /// Shut down the IO task. Outstanding requests are rejected with
    /// [`Error::Closed`] before the transport is closed.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Request::Shutdown { reply: reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task. Returns the handle for sending requests.
pub(crate) fn spawn_io_task(
    transport: Box<dyn Transport>,
    config: IoConfig,
    event_tx: broadcast::Sender<XBeeEvent>,
) -> XBeeIo {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(32);
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(io_loop(transport, config, event_tx, cmd_rx, cancel_clone));

    XBeeIo { cmd_tx, cancel }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// How long a single receive call may wait before the loop re-polls.
const RECEIVE_POLL: Duration = Duration::from_millis(100);

/// Why the main loop stopped.
enum Exit {
    /// Cancelled, or every handle dropped.
    Cancelled,
    /// Explicit shutdown; reply once the transport is closed.
    Shutdown(oneshot::Sender<()>),
    /// The transport failed.
    Disconnected(Error),
}

/// Sleep until `deadline`, or forever if there is none.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Request submission
/// 3. Inbound bytes
/// 4. The earliest pending deadline
///
/// A response that arrives in the same poll as its deadline therefore
/// resolves the request instead of timing it out.
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    event_tx: broadcast::Sender<XBeeEvent>,
    mut cmd_rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    let mut correlator: Correlator<ApiFrame> = Correlator::new(classify_response);
    let mut decoder = FrameDecoder::new(config.api_mode);
    let mut buf = [0u8; 256];

    let exit = loop {
        let deadline = correlator.next_deadline();

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("IO task cancelled");
                break Exit::Cancelled;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Request::Submit { frame, expects_response, timeout, reply }) => {
                        if let Err(e) = submit_frame(
                            &mut *transport,
                            &mut correlator,
                            &config,
                            frame,
                            expects_response,
                            timeout,
                            reply,
                        ).await {
                            break Exit::Disconnected(e);
                        }
                    }
                    Some(Request::Shutdown { reply }) => {
                        debug!("IO task shutdown requested");
                        break Exit::Shutdown(reply);
                    }
                    None => {
                        debug!("all request senders dropped, exiting IO task");
                        break Exit::Cancelled;
                    }
                }
            }

            result = transport.receive(&mut buf, RECEIVE_POLL) => {
                match result {
                    Ok(n) => {
                        decoder.push(&buf[..n]);
                        while let Some(frame) = decoder.next_frame() {
                            dispatch_frame(&mut correlator, &event_tx, frame);
                        }
                    }
                    Err(Error::ReadTimeout) => {}
                    Err(e) => break Exit::Disconnected(e),
                }
            }

            _ = sleep_until_deadline(deadline) => {
                correlator.expire(Instant::now());
            }
        }
    };

    match exit {
        Exit::Cancelled => close_session(&mut *transport, &mut correlator).await,
        Exit::Shutdown(reply) => {
            close_session(&mut *transport, &mut correlator).await;
            let _ = reply.send(());
        }
        Exit::Disconnected(error) => {
            tracing::warn!(error = %error, "transport failed, rejecting outstanding requests");
            correlator.fail_all(&error);
            let _ = event_tx.send(XBeeEvent::Disconnected);
            if let Err(e) = transport.close().await {
                debug!(error = %e, "error closing failed transport");
            }
            drain_disconnected(&mut cmd_rx, &cancel).await;
        }
    }
}

/// Register (if correlated), encode and write one request.
///
/// Per-request failures are reported through `reply` or the request's
/// future. Returns `Err` only when the link itself is gone.
async fn submit_frame(
    transport: &mut dyn Transport,
    correlator: &mut Correlator<ApiFrame>,
    config: &IoConfig,
    frame: ApiFrame,
    expects_response: bool,
    timeout: Duration,
    reply: oneshot::Sender<Result<ResponseFuture<ApiFrame>>>,
) -> Result<()> {
    let begun = match correlator.begin(expects_response, timeout, Instant::now()) {
        Ok(begun) => begun,
        Err(e) => {
            debug!(error = %e, "request refused");
            let _ = reply.send(Err(e));
            return Ok(());
        }
    };

    let frame_id = begun.frame_id;
    let frame = frame.with_frame_id(frame_id);
    let bytes = encode_frame(&frame, config.api_mode);

    if reply.send(Ok(begun.response)).is_err() {
        debug!(frame_id = %frame_id, "caller went away before the request was written");
    }

    tracing::trace!(
        frame_id = %frame_id,
        frame_type = frame.frame_type(),
        bytes = bytes.len(),
        "writing frame"
    );

    match transport.send(&bytes).await {
        Ok(()) => {
            if let Some(ack) = begun.ack {
                ack.resolve(Reply::Sent);
            }
            Ok(())
        }
        Err(e) => {
            match begun.ack {
                Some(ack) => ack.reject(Error::Transport(e.to_string())),
                None => {
                    correlator.on_write_failed(frame_id, &e);
                }
            }
            if is_fatal(&e) { Err(e) } else { Ok(()) }
        }
    }
}

/// Errors after which the transport cannot be used again.
fn is_fatal(error: &Error) -> bool {
    matches!(error, Error::ConnectionLost | Error::NotConnected)
}

/// Hand a decoded frame to the correlator; forward it if nobody was
/// waiting for it.
fn dispatch_frame(
    correlator: &mut Correlator<ApiFrame>,
    event_tx: &broadcast::Sender<XBeeEvent>,
    frame: ApiFrame,
) {
    tracing::trace!(frame_type = frame.frame_type(), "received frame");
    if let Dispatch::Unsolicited(frame) = correlator.on_frame(frame) {
        // No subscribers is not an error.
        let _ = event_tx.send(XBeeEvent::Frame(frame));
    }
}

/// Reject outstanding requests, then release the transport.
async fn close_session(transport: &mut dyn Transport, correlator: &mut Correlator<ApiFrame>) {
    let rejected = correlator.close();
    if rejected > 0 {
        debug!(rejected, "closed session with requests outstanding");
    }
    if let Err(e) = transport.close().await {
        debug!(error = %e, "error closing transport");
    }
}

/// After a transport failure, refuse new requests until shutdown.
async fn drain_disconnected(cmd_rx: &mut mpsc::Receiver<Request>, cancel: &CancellationToken) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return,

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Request::Submit { reply, .. }) => {
                        let _ = reply.send(Err(Error::NotConnected));
                    }
                    Some(Request::Shutdown { reply }) => {
                        let _ = reply.send(());
                        return;
                    }
                    None => return,
                }
            }
        }
    }
}
