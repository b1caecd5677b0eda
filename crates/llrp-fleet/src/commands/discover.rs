//! One-shot subnet scan.

use std::time::Duration;

use tabled::Tabled;

use llrp_core::{DeviceAddress, DiscoveredDevice, discovery};

use super::util::{self, OneShot};
use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Labels")]
    labels: String,
}

fn device_row(d: &DiscoveredDevice) -> DeviceRow {
    DeviceRow {
        name: d.name.clone(),
        address: DeviceAddress::from_protocols(&d.protocols)
            .map_or_else(|_| "-".into(), |a| a.to_string()),
        description: d.description.clone(),
        labels: d.labels.join(", "),
    }
}

pub async fn handle(args: DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load(global)?;
    let mut config = cfg.to_driver_config();

    if !args.subnets.is_empty() {
        for subnet in &args.subnets {
            discovery::expand_subnet(subnet).map_err(|e| CliError::Validation {
                field: "--subnet".into(),
                reason: e.to_string(),
            })?;
        }
        config.discovery.subnets = args.subnets;
    }
    if let Some(port) = args.port {
        config.discovery.port = port;
    }
    if let Some(ms) = args.probe_timeout_ms {
        config.discovery.probe_timeout = Duration::from_millis(ms);
    }
    if config.discovery.subnets.is_empty() {
        return Err(CliError::Validation {
            field: "discovery.subnets".into(),
            reason: "no subnets to scan; pass --subnet or configure discovery.subnets".into(),
        });
    }

    output::status(
        global,
        &format!(
            "scanning {} on port {}",
            config.discovery.subnets.join(", "),
            config.discovery.port
        ),
    );
    let OneShot {
        driver,
        events: _events,
        mut batches,
    } = util::one_shot(config);
    let count = driver.discover().await?;
    let found = batches.recv().await.unwrap_or_default();
    output::status(global, &format!("found {count} reader(s)"));

    let out = output::render_list(global.output, &found, device_row, |d| d.name.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
