//! Subnet discovery.
//!
//! A host counts as an LLRP reader when it accepts a TCP connection on the
//! configured port and its first frame is a `READER_EVENT_NOTIFICATION`.
//! Probes run with bounded concurrency; hosts that are already registered
//! are skipped.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use futures_util::{StreamExt, stream};
use llrp_api::{LlrpCodec, MessageType};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;

use crate::config::DiscoveryConfig;
use crate::error::CoreError;
use crate::model::{DeviceAddress, DiscoveredDevice};

/// Smallest prefix accepted, so a typo cannot schedule millions of probes.
const MIN_PREFIX: u8 = 16;

/// Hosts of an IPv4 CIDR block.
///
/// Network and broadcast addresses are left out for prefixes shorter
/// than /31.
pub fn expand_subnet(cidr: &str) -> Result<Vec<Ipv4Addr>, CoreError> {
    let (addr, prefix) = cidr
        .trim()
        .split_once('/')
        .ok_or_else(|| CoreError::config(format!("subnet {cidr:?} is not in CIDR form")))?;
    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| CoreError::config(format!("subnet {cidr:?} has an invalid address")))?;
    let prefix: u8 = prefix
        .parse()
        .ok()
        .filter(|p| *p <= 32)
        .ok_or_else(|| CoreError::config(format!("subnet {cidr:?} has an invalid prefix")))?;
    if prefix < MIN_PREFIX {
        return Err(CoreError::config(format!(
            "subnet {cidr:?} is too large (minimum prefix is /{MIN_PREFIX})"
        )));
    }

    let mask = u32::MAX.checked_shl(u32::from(32 - prefix)).unwrap_or(0);
    let network = u32::from(addr) & mask;
    let broadcast = network | !mask;

    let hosts = if prefix >= 31 {
        (network..=broadcast).map(Ipv4Addr::from).collect()
    } else {
        (network + 1..broadcast).map(Ipv4Addr::from).collect()
    };
    Ok(hosts)
}

/// Probe every configured subnet and return the readers found.
///
/// Invalid subnets are logged and skipped.
pub async fn discover(config: &DiscoveryConfig, known: &[DeviceAddress]) -> Vec<DiscoveredDevice> {
    let known: HashSet<&DeviceAddress> = known.iter().collect();
    let mut targets = Vec::new();
    for subnet in &config.subnets {
        match expand_subnet(subnet) {
            Ok(hosts) => targets.extend(
                hosts
                    .into_iter()
                    .map(|ip| DeviceAddress::new(ip.to_string(), config.port))
                    .filter(|addr| !known.contains(addr)),
            ),
            Err(e) => tracing::warn!(subnet = %subnet, error = %e, "skipping subnet"),
        }
    }

    tracing::info!(hosts = targets.len(), port = config.port, "scanning for LLRP readers");
    let found: Vec<DiscoveredDevice> = stream::iter(targets)
        .map(|addr| async move {
            if probe(&addr, config).await {
                Some(discovered(&addr))
            } else {
                None
            }
        })
        .buffer_unordered(config.concurrency.max(1))
        .filter_map(|hit| async move { hit })
        .collect()
        .await;
    tracing::info!(found = found.len(), "scan complete");
    found
}

async fn probe(addr: &DeviceAddress, config: &DiscoveryConfig) -> bool {
    let attempt = async {
        let stream = TcpStream::connect((addr.host.as_str(), addr.port)).await.ok()?;
        let mut frames = FramedRead::new(stream, LlrpCodec::new());
        frames.next().await?.ok()
    };
    match tokio::time::timeout(config.probe_timeout, attempt).await {
        Ok(Some(msg)) if msg.kind == MessageType::READER_EVENT_NOTIFICATION => {
            tracing::debug!(%addr, "found LLRP reader");
            true
        }
        Ok(Some(msg)) => {
            tracing::debug!(%addr, kind = %msg.kind, "host answered with a non-LLRP greeting");
            false
        }
        Ok(None) | Err(_) => false,
    }
}

fn discovered(addr: &DeviceAddress) -> DiscoveredDevice {
    DiscoveredDevice {
        name: format!("LLRP-{}", addr.host),
        protocols: addr.to_protocols(),
        description: "LLRP RFID Reader".to_owned(),
        labels: vec!["RFID".to_owned(), "LLRP".to_owned()],
    }
}
