//! Async event fan-out.
//!
//! Each session gets one forwarder task that drains its unsolicited-message
//! channel and republishes reader event notifications and RO access
//! reports as [`AsyncValues`] carrying a JSON string. Write
//! acknowledgements go out through the same [`EventSink`].

use futures_util::StreamExt;
use llrp_api::{Message, MessageType, ReaderEventNotification, RoAccessReport};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::error::CoreError;
use crate::model::{AsyncValues, CommandValue, Resource};

// ── EventSink ───────────────────────────────────────────────────────

/// Outbound side of the async value stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<AsyncValues>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<AsyncValues>) -> Self {
        Self { tx }
    }

    /// Serialize `payload` and publish it as a string value.
    ///
    /// Serialization failures are logged and the event dropped.
    pub async fn publish<T: Serialize>(&self, device: &str, resource: Resource, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => self.send(device, CommandValue::string(resource.to_string(), json)).await,
            Err(e) => {
                tracing::error!(device, %resource, error = %e, "failed to encode async event");
            }
        }
    }

    pub async fn send(&self, device: &str, value: CommandValue) {
        let event = AsyncValues {
            device_name: device.to_owned(),
            values: vec![value],
        };
        if self.tx.send(event).await.is_err() {
            tracing::debug!(device, "async value receiver gone, dropping event");
        }
    }
}

// ── Forwarder ───────────────────────────────────────────────────────

/// Spawn the forwarder for one session.
///
/// The task ends when the session's broadcast sender is dropped.
pub fn spawn(
    device: String,
    events: broadcast::Receiver<Message>,
    sink: EventSink,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = BroadcastStream::new(events);
        while let Some(item) = stream.next().await {
            match item {
                Ok(msg) => match to_value(&msg) {
                    Ok(Some(value)) => sink.send(&device, value).await,
                    Ok(None) => {
                        tracing::trace!(device = %device, kind = %msg.kind, "ignoring unsolicited message");
                    }
                    Err(e) => {
                        tracing::error!(device = %device, kind = %msg.kind, error = %e, "failed to decode async event");
                    }
                },
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(device = %device, skipped, "event forwarder lagged");
                }
            }
        }
        tracing::debug!(device = %device, "event forwarder stopped");
    })
}

/// Decode an unsolicited message into a JSON-carrying value.
///
/// Returns `Ok(None)` for message types that are not forwarded.
pub fn to_value(msg: &Message) -> Result<Option<CommandValue>, CoreError> {
    let (resource, json) = match msg.kind {
        MessageType::READER_EVENT_NOTIFICATION => (
            Resource::ReaderEventNotification,
            serde_json::to_string(&ReaderEventNotification::decode(msg.payload.clone())?)?,
        ),
        MessageType::RO_ACCESS_REPORT => (
            Resource::RoAccessReport,
            serde_json::to_string(&RoAccessReport::decode(msg.payload.clone())?)?,
        ),
        _ => return Ok(None),
    };
    Ok(Some(CommandValue::string(resource.to_string(), json)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use llrp_api::{ConnectionAttemptStatus, Parameter};

    use super::*;
    use crate::model::Value;

    fn report() -> Message {
        let report = RoAccessReport {
            parameters: vec![Parameter::new(240, vec![0xAB])],
        };
        Message::new(9, MessageType::RO_ACCESS_REPORT, report.encode_payload().unwrap())
    }

    #[test]
    fn reports_become_json_string_values() {
        let value = to_value(&report()).unwrap().unwrap();
        assert_eq!(value.resource, "ROAccessReport");
        let Value::String(json) = &value.value else {
            panic!("expected string value");
        };
        let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(parsed["Parameters"][0]["Type"], 240);
    }

    #[test]
    fn keepalives_are_not_forwarded() {
        let msg = Message::new(1, MessageType::KEEPALIVE, Vec::new());
        assert!(to_value(&msg).unwrap().is_none());
    }

    #[test]
    fn malformed_notification_is_an_error() {
        let msg = Message::new(1, MessageType::READER_EVENT_NOTIFICATION, vec![0, 1]);
        assert!(to_value(&msg).is_err());
    }

    #[tokio::test]
    async fn forwarder_tags_events_with_device_and_skips_bad_frames() {
        let (events_tx, events_rx) = broadcast::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let task = spawn("dock-door-3".into(), events_rx, EventSink::new(out_tx));

        let note = ReaderEventNotification::connection_attempt(ConnectionAttemptStatus::Success, 0);
        events_tx
            .send(Message::new(
                0,
                MessageType::READER_EVENT_NOTIFICATION,
                note.encode_payload().unwrap(),
            ))
            .unwrap();
        events_tx
            .send(Message::new(1, MessageType::RO_ACCESS_REPORT, vec![0xFF]))
            .unwrap();
        events_tx.send(report()).unwrap();
        drop(events_tx);

        let first = out_rx.recv().await.unwrap();
        assert_eq!(first.device_name, "dock-door-3");
        assert_eq!(first.values[0].resource, "ReaderEventNotification");

        let second = out_rx.recv().await.unwrap();
        assert_eq!(second.values[0].resource, "ROAccessReport");

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
