//! LLRP session client.
//!
//! A [`Client`] owns one reader connection. Exactly one task runs
//! [`Client::connect`], which performs the connection handshake and then
//! drives the read side until the connection ends; any number of other
//! tasks may call [`Client::send`] concurrently. Responses are matched to
//! requests by message ID. Keepalives are acknowledged automatically, and
//! unsolicited reports / notifications are fanned out on a broadcast
//! channel.
//!
//! ```rust,ignore
//! let client = Arc::new(Client::dial("dock-door-3", "10.0.0.5:5084", Duration::from_secs(30)).await?);
//! let mut events = client.subscribe();
//! tokio::spawn({
//!     let client = Arc::clone(&client);
//!     async move { client.connect().await }
//! });
//! let caps = client.send(&Request::GetRoSpecs, Duration::from_secs(30)).await?;
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, oneshot, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::frame::{LlrpCodec, Message, MessageType};
use crate::messages::{ErrorMessage, ReaderEventNotification, Request, Response};
use crate::param::ConnectionAttemptStatus;

/// Broadcast channel capacity for unsolicited messages.
const UNSOLICITED_CHANNEL_CAPACITY: usize = 256;

type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

// ── State ───────────────────────────────────────────────────────────

/// Lifecycle of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Transport open, handshake not yet seen.
    Pending,
    /// Handshake accepted; requests may flow.
    Connected,
    /// `CLOSE_CONNECTION` sent, waiting for the reader to hang up.
    Closing,
    /// Terminal.
    Closed,
}

// ── Client ──────────────────────────────────────────────────────────

pub struct Client {
    name: String,
    writer: Mutex<FramedWrite<BoxedWriter, LlrpCodec>>,
    reader: Mutex<Option<FramedRead<BoxedReader, LlrpCodec>>>,
    pending: DashMap<u32, oneshot::Sender<Message>>,
    next_id: AtomicU32,
    state: watch::Sender<ClientState>,
    events: broadcast::Sender<Message>,
    cancel: CancellationToken,
}

impl Client {
    /// Wrap an already-open transport.
    pub fn new<T>(name: impl Into<String>, io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let reader: BoxedReader = Box::pin(read_half);
        let writer: BoxedWriter = Box::pin(write_half);
        let (events, _) = broadcast::channel(UNSOLICITED_CHANNEL_CAPACITY);

        Self {
            name: name.into(),
            writer: Mutex::new(FramedWrite::new(writer, LlrpCodec::new())),
            reader: Mutex::new(Some(FramedRead::new(reader, LlrpCodec::new()))),
            pending: DashMap::new(),
            next_id: AtomicU32::new(1),
            state: watch::Sender::new(ClientState::Pending),
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Open a TCP connection to a reader.
    pub async fn dial(
        name: impl Into<String>,
        address: &str,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| Error::DialTimeout {
                address: address.to_owned(),
                timeout_secs: timeout.as_secs(),
            })??;
        stream.set_nodelay(true)?;
        Ok(Self::new(name, stream))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Receive unsolicited `READER_EVENT_NOTIFICATION` and
    /// `RO_ACCESS_REPORT` messages, starting with the connection greeting.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }

    /// Run the connection until it ends.
    ///
    /// Returns `Ok(())` when the reader hangs up after a graceful
    /// [`shutdown`](Self::shutdown), `Err(ClientClosed)` after
    /// [`close`](Self::close), and any other error when the connection is
    /// lost or the reader misbehaves.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or(Error::AlreadyConnected)?;

        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::ClientClosed),
            result = self.run(&mut reader) => result,
        };

        self.finish();
        match &result {
            Ok(()) => tracing::debug!(client = %self.name, "connection closed by reader after shutdown"),
            Err(e) if e.is_closed() => tracing::debug!(client = %self.name, "connection closed"),
            Err(e) => tracing::warn!(client = %self.name, error = %e, "connection ended"),
        }
        result
    }

    /// Send a request and wait for its paired response.
    ///
    /// Waits for the handshake if the client is still pending. The whole
    /// exchange is bounded by `timeout`. Non-success `LLRPStatus` and
    /// `ERROR_MESSAGE` replies become errors.
    pub async fn send(&self, request: &Request, timeout: Duration) -> Result<Response, Error> {
        tokio::time::timeout(timeout, self.round_trip(request))
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: timeout.as_secs(),
            })?
    }

    /// Ask the reader to close the connection, then close locally.
    ///
    /// Returns `Err(ClientClosed)` if the client is already closing or
    /// closed.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), Error> {
        let mut previous = ClientState::Closed;
        self.state.send_if_modified(|state| {
            previous = *state;
            if *state == ClientState::Connected {
                *state = ClientState::Closing;
                true
            } else {
                false
            }
        });

        match previous {
            ClientState::Connected => {}
            ClientState::Pending => return self.close().await,
            ClientState::Closing | ClientState::Closed => return Err(Error::ClientClosed),
        }

        let reply = tokio::time::timeout(
            timeout,
            self.transact(MessageType::CLOSE_CONNECTION, Bytes::new()),
        )
        .await
        .map_err(|_| Error::Timeout {
            timeout_secs: timeout.as_secs(),
        })??;
        check_reply(&Request::CloseConnection, reply)?;

        match self.close().await {
            Err(e) if e.is_closed() => Ok(()),
            other => other,
        }
    }

    /// Close immediately without notifying the reader.
    ///
    /// Returns `Err(ClientClosed)` if the client was already closed.
    pub async fn close(&self) -> Result<(), Error> {
        let mut already_closed = false;
        self.state.send_if_modified(|state| {
            if *state == ClientState::Closed {
                already_closed = true;
                false
            } else {
                *state = ClientState::Closed;
                true
            }
        });
        if already_closed {
            return Err(Error::ClientClosed);
        }

        self.cancel.cancel();
        self.pending.clear();
        // A writer stuck on a full socket must not block a forced close.
        if let Ok(mut writer) = self.writer.try_lock() {
            if let Err(e) = writer.get_mut().shutdown().await {
                tracing::debug!(client = %self.name, error = %e, "socket shutdown failed");
            }
        }
        tracing::debug!(client = %self.name, "client closed");
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn run(&self, reader: &mut FramedRead<BoxedReader, LlrpCodec>) -> Result<(), Error> {
        let greeting = reader.next().await.ok_or(Error::ConnectionLost)??;
        check_greeting(&greeting)?;

        self.state.send_if_modified(|state| {
            if *state == ClientState::Pending {
                *state = ClientState::Connected;
                true
            } else {
                false
            }
        });
        tracing::debug!(client = %self.name, "reader accepted connection");
        let _ = self.events.send(greeting);

        while let Some(frame) = reader.next().await {
            self.dispatch(frame?).await?;
        }

        if self.state() == ClientState::Closing {
            Ok(())
        } else {
            Err(Error::ConnectionLost)
        }
    }

    async fn dispatch(&self, msg: Message) -> Result<(), Error> {
        match msg.kind {
            MessageType::KEEPALIVE => {
                tracing::trace!(client = %self.name, id = msg.id, "keepalive");
                self.write(Message::new(msg.id, MessageType::KEEPALIVE_ACK, Bytes::new()))
                    .await?;
            }
            kind if kind.is_unsolicited() => {
                // No subscribers is fine.
                let _ = self.events.send(msg);
            }
            kind => match self.pending.remove(&msg.id) {
                Some((_, tx)) => {
                    let _ = tx.send(msg);
                }
                None => tracing::warn!(
                    client = %self.name,
                    id = msg.id,
                    kind = %kind,
                    "dropping reply with no pending request"
                ),
            },
        }
        Ok(())
    }

    async fn round_trip(&self, request: &Request) -> Result<Response, Error> {
        self.wait_connected().await?;
        let reply = self
            .transact(request.kind(), request.encode_payload()?)
            .await?;
        check_reply(request, reply)
    }

    async fn wait_connected(&self) -> Result<(), Error> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|state| *state != ClientState::Pending)
            .await
            .map_err(|_| Error::ClientClosed)?;
        match state {
            ClientState::Connected => Ok(()),
            _ => Err(Error::ClientClosed),
        }
    }

    async fn transact(&self, kind: MessageType, payload: Bytes) -> Result<Message, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::ClientClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        tracing::trace!(client = %self.name, id, kind = %kind, "sending request");
        self.write(Message::new(id, kind, payload)).await?;
        rx.await.map_err(|_| {
            if self.cancel.is_cancelled() && self.state() == ClientState::Closed {
                Error::ClientClosed
            } else {
                Error::ConnectionLost
            }
        })
    }

    async fn write(&self, msg: Message) -> Result<(), Error> {
        self.writer.lock().await.send(msg).await
    }

    fn finish(&self) {
        self.state.send_replace(ClientState::Closed);
        self.cancel.cancel();
        self.pending.clear();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Drops the pending slot when a request is abandoned (timeout, error).
struct PendingGuard<'a> {
    pending: &'a DashMap<u32, oneshot::Sender<Message>>,
    id: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

fn check_greeting(msg: &Message) -> Result<(), Error> {
    if msg.kind != MessageType::READER_EVENT_NOTIFICATION {
        return Err(Error::Decode(format!(
            "expected READER_EVENT_NOTIFICATION as first message, got {}",
            msg.kind
        )));
    }
    match ReaderEventNotification::decode(msg.payload.clone())?.connection_attempt_status() {
        Some(ConnectionAttemptStatus::Success) => Ok(()),
        Some(status) => Err(Error::ConnectionAttemptFailed(status)),
        None => Err(Error::Decode(
            "first notification has no ConnectionAttemptEvent".into(),
        )),
    }
}

fn check_reply(request: &Request, reply: Message) -> Result<Response, Error> {
    if reply.kind == MessageType::ERROR_MESSAGE {
        return Err(Error::ErrorMessage(ErrorMessage::decode(reply.payload)?.status));
    }
    if reply.kind != request.response_kind() {
        return Err(Error::UnexpectedResponse {
            expected: request.response_kind(),
            got: reply.kind,
        });
    }
    let response = Response::decode(reply.kind, reply.payload)?;
    if !response.status().is_success() {
        return Err(Error::Status(response.status().clone()));
    }
    Ok(response)
}
