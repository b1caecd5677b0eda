// ── Runtime driver configuration ──
//
// The resolved, typed settings a `Driver` runs with. File and environment
// loading lives in llrp-config, which produces one of these.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default LLRP port.
pub const LLRP_PORT: u16 = 5084;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Deadline for one command round trip.
    pub command_timeout: Duration,
    /// Deadline for a graceful session shutdown before forcing it.
    pub shutdown_timeout: Duration,
    /// Deadline for a single TCP connect.
    pub dial_timeout: Duration,
    pub retry: RetryPolicy,
    /// Capacity of the outbound async value channel.
    pub async_buffer: usize,
    pub discovery: DiscoveryConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(1),
            dial_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            async_buffer: 256,
            discovery: DiscoveryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// IPv4 networks in CIDR form, e.g. `192.168.1.0/24`.
    pub subnets: Vec<String>,
    pub port: u16,
    /// How long a host gets to accept and greet.
    pub probe_timeout: Duration,
    /// Probes in flight at once.
    pub concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            subnets: Vec::new(),
            port: LLRP_PORT,
            probe_timeout: Duration::from_secs(1),
            concurrency: 64,
        }
    }
}
