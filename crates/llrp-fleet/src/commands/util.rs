//! Helpers shared by the command handlers.

use std::path::PathBuf;

use tokio::sync::mpsc;

use llrp_config::ServiceConfig;
use llrp_core::{AsyncValues, DeviceAddress, DiscoveredDevice, Driver, DriverConfig, LLRP_PORT};

use crate::cli::{GlobalOpts, TargetArgs};
use crate::error::CliError;

/// The config file in effect: `--config`, else the platform location.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(llrp_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<ServiceConfig, CliError> {
    Ok(llrp_config::load_config(Some(&config_file(global)))?)
}

/// Resolve a reader's address from `--host`/`--port`, falling back to the
/// `[devices]` table.
pub fn resolve_target(
    device: &str,
    target: &TargetArgs,
    cfg: &ServiceConfig,
) -> Result<DeviceAddress, CliError> {
    match (&target.host, cfg.devices.get(device)) {
        (Some(host), _) => Ok(DeviceAddress::new(
            host.clone(),
            target.port.unwrap_or(LLRP_PORT),
        )),
        (None, Some(entry)) => Ok(DeviceAddress::new(
            entry.host.clone(),
            target.port.unwrap_or(entry.port),
        )),
        (None, None) => Err(CliError::UnknownDevice {
            device: device.to_owned(),
        }),
    }
}

/// A driver for a single command, plus the receiving ends of its channels.
pub struct OneShot {
    pub driver: Driver,
    pub events: mpsc::Receiver<AsyncValues>,
    pub batches: mpsc::Receiver<Vec<DiscoveredDevice>>,
}

pub fn one_shot(config: DriverConfig) -> OneShot {
    let (async_tx, events) = mpsc::channel(config.async_buffer.max(1));
    let (disc_tx, batches) = mpsc::channel(1);
    OneShot {
        driver: Driver::new(config, async_tx, disc_tx),
        events,
        batches,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use llrp_config::DeviceEntry;

    use super::*;

    fn target(host: Option<&str>, port: Option<u16>) -> TargetArgs {
        TargetArgs {
            host: host.map(str::to_owned),
            port,
        }
    }

    fn with_dock_door() -> ServiceConfig {
        let mut cfg = ServiceConfig::default();
        cfg.devices.insert(
            "dock-door".into(),
            DeviceEntry {
                host: "10.0.0.5".into(),
                port: 5085,
            },
        );
        cfg
    }

    #[test]
    fn host_flag_wins_over_config() {
        let addr = resolve_target("dock-door", &target(Some("10.0.0.9"), None), &with_dock_door())
            .unwrap();
        assert_eq!(addr, DeviceAddress::new("10.0.0.9", LLRP_PORT));
    }

    #[test]
    fn configured_devices_resolve_by_name() {
        let cfg = with_dock_door();
        assert_eq!(
            resolve_target("dock-door", &target(None, None), &cfg).unwrap(),
            DeviceAddress::new("10.0.0.5", 5085)
        );
        assert_eq!(
            resolve_target("dock-door", &target(None, Some(6000)), &cfg).unwrap(),
            DeviceAddress::new("10.0.0.5", 6000)
        );
    }

    #[test]
    fn unknown_devices_need_a_host() {
        let err = resolve_target("gate", &target(None, None), &with_dock_door()).unwrap_err();
        assert!(matches!(err, CliError::UnknownDevice { device } if device == "gate"));
    }
}
