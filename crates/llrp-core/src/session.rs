//! The seams between the registry and the session layer.
//!
//! [`Session`] is what the registry stores and the supervisor occupies;
//! [`Dialer`] opens new ones. Production code uses [`TcpDialer`], which
//! yields `llrp_api::Client`s.

use std::future::Future;
use std::time::Duration;

use llrp_api::{Client, Message, Request, Response};
use tokio::sync::broadcast;

use crate::model::DeviceAddress;

type ApiError = llrp_api::Error;

/// A live reader connection.
pub trait Session: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Send a request and await its paired response.
    fn send(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> impl Future<Output = Result<Response, ApiError>> + Send;

    /// Block until the connection ends. Only the supervisor calls this.
    fn occupy(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Polite close: tell the reader, then hang up.
    fn shutdown(&self, timeout: Duration) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Hang up immediately.
    fn close(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Unsolicited notifications and reports.
    fn subscribe(&self) -> broadcast::Receiver<Message>;
}

/// Opens sessions to reader addresses.
pub trait Dialer: Send + Sync + 'static {
    type Session: Session;

    fn dial(
        &self,
        name: &str,
        address: &DeviceAddress,
    ) -> impl Future<Output = Result<Self::Session, ApiError>> + Send;
}

// ── llrp_api::Client ────────────────────────────────────────────────

impl Session for Client {
    fn name(&self) -> &str {
        Client::name(self)
    }

    fn send(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> impl Future<Output = Result<Response, ApiError>> + Send {
        Client::send(self, request, timeout)
    }

    fn occupy(&self) -> impl Future<Output = Result<(), ApiError>> + Send {
        Client::connect(self)
    }

    fn shutdown(&self, timeout: Duration) -> impl Future<Output = Result<(), ApiError>> + Send {
        Client::shutdown(self, timeout)
    }

    fn close(&self) -> impl Future<Output = Result<(), ApiError>> + Send {
        Client::close(self)
    }

    fn subscribe(&self) -> broadcast::Receiver<Message> {
        Client::subscribe(self)
    }
}

/// Dials readers over TCP.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    pub timeout: Duration,
}

impl Dialer for TcpDialer {
    type Session = Client;

    async fn dial(&self, name: &str, address: &DeviceAddress) -> Result<Client, ApiError> {
        tracing::debug!(device = %name, %address, "dialing reader");
        Client::dial(name, &address.to_string(), self.timeout).await
    }
}

// ── Test doubles ────────────────────────────────────────────────────
