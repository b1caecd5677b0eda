// Shared fixtures: an in-process LLRP reader listening on loopback.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;

use llrp_api::{
    ConnectionAttemptStatus, ErrorMessage, LlrpCodec, LlrpStatus, Message, MessageType,
    ReaderEventNotification, Request, Response,
};
use llrp_core::{
    AsyncValues, DeviceAddress, DiscoveredDevice, Driver, DriverConfig, ProtocolProperties,
    RetryPolicy,
};

/// Accepts any number of connections, greets each one, and answers every
/// request with a success response (or an `ERROR_MESSAGE` when told to).
pub struct FakeReader {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Request>>>,
    reject: Arc<Mutex<Option<LlrpStatus>>>,
    kick: broadcast::Sender<()>,
    reports: broadcast::Sender<Message>,
}

impl FakeReader {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (kick, _) = broadcast::channel(4);
        let (reports, _) = broadcast::channel(16);
        let reader = Self {
            addr,
            connections: Arc::default(),
            requests: Arc::default(),
            reject: Arc::default(),
            kick,
            reports,
        };

        let connections = Arc::clone(&reader.connections);
        let requests = Arc::clone(&reader.requests);
        let reject = Arc::clone(&reader.reject);
        let kick = reader.kick.clone();
        let reports = reader.reports.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn = Connection {
                    requests: Arc::clone(&requests),
                    reject: Arc::clone(&reject),
                    kick: kick.subscribe(),
                    reports: reports.subscribe(),
                };
                connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(conn.serve(stream));
            }
        });
        reader
    }

    pub fn address(&self) -> DeviceAddress {
        DeviceAddress::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub fn protocols(&self) -> ProtocolProperties {
        self.address().to_protocols()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Answer every following request with an `ERROR_MESSAGE`.
    pub fn reject_with(&self, status: LlrpStatus) {
        *self.reject.lock().unwrap() = Some(status);
    }

    /// Drop every open connection without a goodbye.
    pub fn kick_all(&self) {
        let _ = self.kick.send(());
    }

    pub fn push(&self, msg: Message) {
        let _ = self.reports.send(msg);
    }

    pub async fn wait_for_connections(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.connections() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reader never saw the expected connections");
    }
}

struct Connection {
    requests: Arc<Mutex<Vec<Request>>>,
    reject: Arc<Mutex<Option<LlrpStatus>>>,
    kick: broadcast::Receiver<()>,
    reports: broadcast::Receiver<Message>,
}

impl Connection {
    async fn serve(mut self, stream: TcpStream) {
        let mut framed = Framed::new(stream, LlrpCodec::new());
        let hello = ReaderEventNotification::connection_attempt(ConnectionAttemptStatus::Success, 0);
        let greeting = Message::new(
            0,
            MessageType::READER_EVENT_NOTIFICATION,
            hello.encode_payload().unwrap(),
        );
        if framed.send(greeting).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                frame = framed.next() => {
                    let Some(Ok(msg)) = frame else { return };
                    if msg.kind == MessageType::KEEPALIVE_ACK {
                        continue;
                    }
                    let request = Request::decode(msg.kind, msg.payload).unwrap();
                    self.requests.lock().unwrap().push(request.clone());

                    let rejection = self.reject.lock().unwrap().clone();
                    let reply = match rejection {
                        Some(status) if request != Request::CloseConnection => Message::new(
                            msg.id,
                            MessageType::ERROR_MESSAGE,
                            ErrorMessage { status }.encode_payload().unwrap(),
                        ),
                        _ => {
                            let response = Response::success_for(&request);
                            Message::new(msg.id, response.kind(), response.encode_payload().unwrap())
                        }
                    };
                    if framed.send(reply).await.is_err() || request == Request::CloseConnection {
                        return;
                    }
                }
                _ = self.kick.recv() => return,
                Ok(report) = self.reports.recv() => {
                    if framed.send(report).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

pub struct Harness {
    pub driver: Driver,
    pub events: mpsc::Receiver<AsyncValues>,
    pub batches: mpsc::Receiver<Vec<DiscoveredDevice>>,
}

pub fn driver() -> Harness {
    let (async_tx, events) = mpsc::channel(64);
    let (disc_tx, batches) = mpsc::channel(4);
    let config = DriverConfig {
        command_timeout: Duration::from_secs(3),
        shutdown_timeout: Duration::from_millis(500),
        dial_timeout: Duration::from_secs(1),
        retry: RetryPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            max_attempts: None,
        },
        ..DriverConfig::default()
    };
    Harness {
        driver: Driver::new(config, async_tx, disc_tx),
        events,
        batches,
    }
}

pub async fn next_event(events: &mut mpsc::Receiver<AsyncValues>) -> AsyncValues {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no async event arrived")
        .expect("event channel closed")
}

/// Skip ahead to the first event carrying `resource`. Readers greet every
/// connection with a `ReaderEventNotification`, so that usually comes first.
pub async fn next_event_for(events: &mut mpsc::Receiver<AsyncValues>, resource: &str) -> AsyncValues {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if event.values.iter().any(|v| v.resource == resource) {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {resource} event arrived"))
}
