//! Command dispatch: bridges CLI args -> driver calls -> output formatting.

pub mod config_cmd;
pub mod device;
pub mod discover;
pub mod serve;
pub mod util;

use clap::CommandFactory;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Serve(args) => serve::handle(args, global).await,
        Command::Read(args) => device::read(args, global).await,
        Command::Write(args) => device::write(args, global).await,
        Command::Discover(args) => discover::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "llrp-fleet", &mut std::io::stdout());
            Ok(())
        }
    }
}
