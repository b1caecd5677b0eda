//! One-shot reads and writes against a single reader.

use std::time::Duration;

use tabled::Tabled;
use tokio::sync::mpsc;

use llrp_core::{AsyncValues, CommandRequest, CommandValue};

use super::util::{self, OneShot};
use crate::cli::{GlobalOpts, ParamArg, ParamValue, ReadArgs, WriteArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ValueRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn value_row(v: &CommandValue) -> ValueRow {
    ValueRow {
        resource: v.resource.clone(),
        value: output::pretty_json_text(&v.value.to_string()),
    }
}

// ── Read ─────────────────────────────────────────────────────────────

pub async fn read(args: ReadArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load(global)?;
    let address = util::resolve_target(&args.device, &args.target, &cfg)?;
    let requests: Vec<CommandRequest> = args.resources.iter().map(CommandRequest::new).collect();

    let OneShot {
        driver,
        events: _events,
        batches: _batches,
    } = util::one_shot(cfg.to_driver_config());
    let result = driver
        .handle_read_commands(&args.device, &address.to_protocols(), &requests)
        .await;
    driver.stop(false).await;
    let values = result?;

    let out = output::render_list(global.output, &values, value_row, |v| v.value.to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Write ────────────────────────────────────────────────────────────

pub async fn write(args: WriteArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let WriteArgs {
        device,
        target,
        resource,
        params,
    } = args;
    let cfg = util::load(global)?;
    let address = util::resolve_target(&device, &target, &cfg)?;
    let params = params
        .into_iter()
        .map(to_command_value)
        .collect::<Result<Vec<_>, _>>()?;

    let OneShot {
        driver,
        mut events,
        batches: _batches,
    } = util::one_shot(cfg.to_driver_config());
    let timeout = driver.config().command_timeout;
    let result = async {
        driver
            .handle_write_commands(
                &device,
                &address.to_protocols(),
                &[CommandRequest::new(resource.clone())],
                &params,
            )
            .await?;
        wait_for_ack(&mut events, &resource, timeout).await
    }
    .await;
    driver.stop(false).await;
    let ack = result?;

    let out = output::render_single(global.output, &ack, |v| {
        format!(
            "{} acknowledged by {}\n{}",
            v.resource,
            device,
            output::pretty_json_text(&v.value.to_string())
        )
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Wait for the reader's response to be published for `resource`.
async fn wait_for_ack(
    events: &mut mpsc::Receiver<AsyncValues>,
    resource: &str,
    timeout: Duration,
) -> Result<CommandValue, CliError> {
    let wait = async {
        while let Some(event) = events.recv().await {
            if let Some(ack) = event.values.into_iter().find(|v| v.resource == resource) {
                return Some(ack);
            }
        }
        None
    };
    match tokio::time::timeout(timeout, wait).await {
        Ok(Some(ack)) => Ok(ack),
        Ok(None) => Err(CliError::SessionClosed),
        Err(_) => Err(CliError::Timeout {
            seconds: timeout.as_secs(),
        }),
    }
}

fn to_command_value(param: ParamArg) -> Result<CommandValue, CliError> {
    let ParamArg { name, value } = param;
    Ok(match value {
        ParamValue::Text(text) => CommandValue::string(name, text),
        ParamValue::Uint32(n) => CommandValue::uint32(name, n),
        ParamValue::File(path) => {
            let text = std::fs::read_to_string(&path).map_err(|e| CliError::Validation {
                field: format!("--param {name}"),
                reason: format!("cannot read {}: {e}", path.display()),
            })?;
            CommandValue::string(name, text)
        }
    })
}
