//! Clap derive structures for the `llrp-fleet` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// llrp-fleet -- run and drive a fleet of LLRP RFID readers
#[derive(Debug, Parser)]
#[command(
    name = "llrp-fleet",
    version,
    about = "Run and drive a fleet of LLRP RFID readers",
    long_about = "Keeps one supervised LLRP connection per reader, translates named\n\
        resource reads and writes into LLRP requests, and streams reader\n\
        events and tag reports as JSON.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if stderr is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to the configured readers and stream their events
    Serve(ServeArgs),

    /// Read one or more resources from a reader
    #[command(alias = "get")]
    Read(ReadArgs),

    /// Write a resource on a reader
    #[command(alias = "set")]
    Write(WriteArgs),

    /// Scan subnets for LLRP readers
    #[command(alias = "scan")]
    Discover(DiscoverArgs),

    /// Manage the service configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Serve ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Skip the startup discovery scan even when it is enabled
    #[arg(long)]
    pub no_discovery: bool,

    /// Connect to readers found by discovery
    #[arg(long)]
    pub auto_add: bool,
}

// ── Read / Write ─────────────────────────────────────────────────────

/// Where to reach a reader. Falls back to the `[devices]` table.
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Reader host name or IP address
    #[arg(long)]
    pub host: Option<String>,

    /// Reader LLRP port
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Device name
    pub device: String,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Resources to read (ReaderCapabilities, ReaderConfig, ROSpec, AccessSpec)
    #[arg(required = true)]
    pub resources: Vec<String>,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Device name
    pub device: String,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Resource to write (ReaderConfig, ROSpec, ROSpecID, AccessSpec, AccessSpecID)
    pub resource: String,

    /// Parameter as NAME=VALUE, NAME=VALUE:u32, or NAME=@file.json
    #[arg(long = "param", short = 'P', value_parser = parse_param)]
    pub params: Vec<ParamArg>,
}

/// A write parameter as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamArg {
    pub name: String,
    pub value: ParamValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Uint32(u32),
    /// Contents of a file, read when the command runs.
    File(PathBuf),
}

pub fn parse_param(s: &str) -> Result<ParamArg, String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name is empty in {s:?}"));
    }

    let value = if let Some(path) = value.strip_prefix('@') {
        ParamValue::File(PathBuf::from(path))
    } else if let Some(num) = value.strip_suffix(":u32") {
        ParamValue::Uint32(
            num.trim()
                .parse()
                .map_err(|_| format!("{num:?} is not a uint32"))?,
        )
    } else {
        ParamValue::Text(value.to_owned())
    };

    Ok(ParamArg {
        name: name.to_owned(),
        value,
    })
}

// ── Discover ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Subnet to scan in CIDR form (repeatable; replaces configured subnets)
    #[arg(long = "subnet")]
    pub subnets: Vec<String>,

    /// LLRP port to probe
    #[arg(long)]
    pub port: Option<u16>,

    /// Per-host probe timeout in milliseconds
    #[arg(long)]
    pub probe_timeout_ms: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
