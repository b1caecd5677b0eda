//! Config subcommand handlers.

use llrp_config::ServiceConfig;

use super::util;
use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = util::config_file(global);
    match args.command {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::Validation {
                    field: "config".into(),
                    reason: format!("{} already exists (use --force to overwrite)", path.display()),
                });
            }
            llrp_config::save_config(&ServiceConfig::default(), &path)?;
            output::status(global, &format!("wrote {}", path.display()));
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = util::load(global)?;
            let text = cfg.to_toml()?;
            let out = output::render_single(global.output, &cfg, |_| text.trim_end().to_owned())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }
    }
}
