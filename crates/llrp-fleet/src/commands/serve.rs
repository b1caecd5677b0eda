//! Long-running service: connect the configured readers, stream their
//! events as JSON lines, and shut down gracefully on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use llrp_core::{AsyncValues, DiscoveredDevice, Driver, ProtocolProperties};

use super::util;
use crate::cli::{GlobalOpts, ServeArgs};
use crate::error::CliError;
use crate::output;

const DISCOVERY_BUFFER: usize = 4;

/// One line of service output.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
enum Line<'a> {
    Event(&'a AsyncValues),
    Discovered(&'a [DiscoveredDevice]),
}

pub async fn handle(args: ServeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load(global)?;
    let driver_config = cfg.to_driver_config();
    let (async_tx, mut events) = mpsc::channel(driver_config.async_buffer);
    let (disc_tx, mut batches) = mpsc::channel(DISCOVERY_BUFFER);
    let driver = Arc::new(Driver::new(driver_config, async_tx, disc_tx));

    output::status(
        global,
        &format!(
            "{} starting with {} configured reader(s)",
            cfg.service.name,
            cfg.devices.len()
        ),
    );
    let configured = cfg
        .devices
        .iter()
        .map(|(name, entry)| (name.clone(), entry.address().to_protocols()))
        .collect();
    tokio::spawn(add_devices(Arc::clone(&driver), configured));

    let discovery = (cfg.discovery.enabled && !args.no_discovery).then(|| {
        schedule_discovery(
            Arc::clone(&driver),
            Duration::from_secs(cfg.discovery.startup_delay_secs),
        )
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let result = loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                }
                break Ok(());
            }
            Some(event) = events.recv() => {
                if let Err(e) = emit(&Line::Event(&event), global) {
                    break Err(e);
                }
            }
            Some(batch) = batches.recv() => {
                if let Err(e) = emit(&Line::Discovered(&batch), global) {
                    break Err(e);
                }
                if args.auto_add {
                    let found = batch.into_iter().map(|d| (d.name, d.protocols)).collect();
                    tokio::spawn(add_devices(Arc::clone(&driver), found));
                }
            }
        }
    };

    if let Some(task) = discovery {
        task.abort();
    }
    output::status(global, "stopping");
    driver.stop(false).await;
    result
}

fn emit(line: &Line<'_>, global: &GlobalOpts) -> Result<(), CliError> {
    output::print_output(&output::render_json_compact(line)?, global.quiet);
    Ok(())
}

/// Connect devices concurrently. A failure is logged; the next command
/// for that device dials again.
async fn add_devices(driver: Arc<Driver>, devices: Vec<(String, ProtocolProperties)>) {
    let attempts = devices.iter().map(|(name, protocols)| {
        let driver = &driver;
        async move { (name, driver.add_device(name, protocols).await) }
    });
    for (name, result) in join_all(attempts).await {
        match result {
            Ok(()) => tracing::info!(device = %name, "reader connected"),
            Err(e) => tracing::warn!(device = %name, error = %e, "reader not connected"),
        }
    }
}

fn schedule_discovery(driver: Arc<Driver>, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match driver.discover().await {
            Ok(count) => tracing::info!(count, "startup discovery finished"),
            Err(e) => tracing::warn!(error = %e, "startup discovery failed"),
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use llrp_core::CommandValue;

    use super::*;

    #[test]
    fn event_lines_are_tagged() {
        let event = AsyncValues {
            device_name: "dock-door".into(),
            values: vec![CommandValue::string("ROAccessReport", "{}")],
        };
        let json = output::render_json_compact(&Line::Event(&event)).unwrap();
        assert!(json.starts_with(r#"{"kind":"event","data":{"device_name":"dock-door""#));
    }

    #[test]
    fn discovery_lines_carry_the_batch() {
        let json = output::render_json_compact(&Line::Discovered(&[])).unwrap();
        assert_eq!(json, r#"{"kind":"discovered","data":[]}"#);
    }
}
