//! The driver facade the host framework calls into.
//!
//! Owns the connection registry and both outbound channels. Commands
//! resolve the device address, translate every resource up front, then
//! reuse (or lazily dial) the device's session for the round trips.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::DriverConfig;
use crate::discovery;
use crate::error::CoreError;
use crate::forwarder::EventSink;
use crate::model::{
    AsyncValues, CommandRequest, CommandValue, DeviceAddress, DiscoveredDevice,
    ProtocolProperties,
};
use crate::registry::Registry;
use crate::session::{Dialer, Session, TcpDialer};
use crate::translate::{translate_read, translate_write};

pub struct Driver<D: Dialer = TcpDialer> {
    registry: Arc<Registry<D>>,
    config: DriverConfig,
    sink: EventSink,
    discovered: mpsc::Sender<Vec<DiscoveredDevice>>,
}

impl Driver<TcpDialer> {
    /// Build a driver that dials readers over TCP.
    pub fn new(
        config: DriverConfig,
        async_values: mpsc::Sender<AsyncValues>,
        discovered: mpsc::Sender<Vec<DiscoveredDevice>>,
    ) -> Self {
        let dialer = TcpDialer {
            timeout: config.dial_timeout,
        };
        Self::with_dialer(dialer, config, async_values, discovered)
    }
}

impl<D: Dialer> Driver<D> {
    pub fn with_dialer(
        dialer: D,
        config: DriverConfig,
        async_values: mpsc::Sender<AsyncValues>,
        discovered: mpsc::Sender<Vec<DiscoveredDevice>>,
    ) -> Self {
        let sink = EventSink::new(async_values);
        let registry = Arc::new(Registry::new(
            dialer,
            config.retry.clone(),
            config.shutdown_timeout,
            sink.clone(),
        ));
        Self {
            registry,
            config,
            sink,
            discovered,
        }
    }

    pub fn registry(&self) -> &Arc<Registry<D>> {
        &self.registry
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Read each requested resource, in order, within one overall deadline.
    pub async fn handle_read_commands(
        &self,
        device: &str,
        protocols: &ProtocolProperties,
        requests: &[CommandRequest],
    ) -> Result<Vec<CommandValue>, CoreError> {
        tracing::debug!(device, count = requests.len(), "read command");
        if requests.is_empty() {
            return Err(CoreError::validation("missing requests"));
        }
        let translated = requests
            .iter()
            .map(|req| translate_read(&req.resource))
            .collect::<Result<Vec<_>, _>>()?;

        let (address, session) = self.session(device, protocols).await?;
        let deadline = Instant::now() + self.config.command_timeout;

        let mut values = Vec::with_capacity(translated.len());
        for (resource, request) in translated {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let response = session
                .send(&request, remaining)
                .await
                .map_err(|e| CoreError::from(e).on_device(device, &address))?;
            let json = serde_json::to_string(&response)?;
            values.push(CommandValue::string(resource.to_string(), json));
        }
        Ok(values)
    }

    /// Perform one write. The reader's response is published to the async
    /// stream, tagged with the written resource.
    pub async fn handle_write_commands(
        &self,
        device: &str,
        protocols: &ProtocolProperties,
        requests: &[CommandRequest],
        params: &[CommandValue],
    ) -> Result<(), CoreError> {
        tracing::debug!(device, count = requests.len(), params = params.len(), "write command");
        let (resource, request) = translate_write(requests, params)?;

        let (address, session) = self.session(device, protocols).await?;
        let response = session
            .send(&request, self.config.command_timeout)
            .await
            .map_err(|e| CoreError::from(e).on_device(device, &address))?;

        let sink = self.sink.clone();
        let device = device.to_owned();
        tokio::spawn(async move {
            sink.publish(&device, resource, &response).await;
        });
        Ok(())
    }

    async fn session(
        &self,
        device: &str,
        protocols: &ProtocolProperties,
    ) -> Result<(DeviceAddress, Arc<D::Session>), CoreError> {
        let address = DeviceAddress::from_protocols(protocols)?;
        let session = self.registry.get_or_create(device, &address).await?;
        Ok((address, session))
    }

    // ── Device lifecycle ─────────────────────────────────────────────

    /// Connect to a newly added device.
    pub async fn add_device(
        &self,
        device: &str,
        protocols: &ProtocolProperties,
    ) -> Result<(), CoreError> {
        tracing::info!(device, "adding device");
        self.session(device, protocols).await.map(|_| ())
    }

    /// Reconnect a registered device whose address changed.
    pub async fn update_device(
        &self,
        device: &str,
        protocols: &ProtocolProperties,
    ) -> Result<(), CoreError> {
        let address = DeviceAddress::from_protocols(protocols)?;
        // A device in its reconnect window still reports the old address.
        match self.registry.address_of(device).await {
            Some(current) if current != address => {
                tracing::info!(device, from = %current, to = %address, "device address changed");
                self.registry.remove(device).await;
                self.registry.get_or_create(device, &address).await.map(|_| ())
            }
            _ => Ok(()),
        }
    }

    pub async fn remove_device(&self, device: &str) -> Result<(), CoreError> {
        if !self.registry.remove(device).await {
            tracing::debug!(device, "remove for unknown device");
        }
        Ok(())
    }

    /// Close every session; see [`Registry::stop_all`].
    pub async fn stop(&self, force: bool) {
        self.registry.stop_all(force).await;
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Scan the configured subnets and emit one batch of discovered
    /// readers. Returns the batch size.
    pub async fn discover(&self) -> Result<usize, CoreError> {
        let known = self.registry.addresses().await;
        let found = discovery::discover(&self.config.discovery, &known).await;
        let count = found.len();
        self.discovered
            .send(found)
            .await
            .map_err(|_| CoreError::Internal("discovery receiver closed".into()))?;
        Ok(count)
    }
}

impl<D: Dialer> std::fmt::Debug for Driver<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
