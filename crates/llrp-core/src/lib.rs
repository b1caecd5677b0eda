//! Connection management and command translation for LLRP reader fleets.
//!
//! - **[`Driver`]**: facade the host framework calls. Read and write
//!   commands, device add/update/remove callbacks, shutdown and discovery.
//!
//! - **[`Registry`]**: one session per device name, created lazily with at
//!   most one dial in flight per name. Each session is watched by a
//!   supervisor that redials after unexpected drops.
//!
//! - **Translation** ([`translate`]): resource names plus positional,
//!   resource-tagged parameters become typed LLRP requests before any I/O.
//!
//! - **Forwarding** ([`forwarder`]): reader event notifications and RO
//!   access reports are republished as JSON [`AsyncValues`].

pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod forwarder;
pub mod model;
pub mod registry;
pub mod retry;
pub mod session;
pub mod supervisor;
pub mod translate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DiscoveryConfig, DriverConfig, LLRP_PORT};
pub use driver::Driver;
pub use error::CoreError;
pub use forwarder::EventSink;
pub use model::{
    Action, AsyncValues, CommandRequest, CommandValue, DeviceAddress, DiscoveredDevice,
    ProtocolProperties, Resource, Value,
};
pub use registry::Registry;
pub use retry::{RetryError, RetryPolicy};
pub use session::{Dialer, Session, TcpDialer};
pub use supervisor::SupervisorState;
