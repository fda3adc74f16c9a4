//! Command-line surface (§6): `broker` runs the daemon itself; `qr`, `rpc`
//! and `gui` are operator utilities that talk to an already-running broker
//! or render a provisioning string without one.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "orc-daemon", version, about = "On-premise edge camera device orchestrator")]
pub struct Cli {
    /// Directory holding `config.toml` and `tls_client_certs/` (§6 Persisted
    /// layout). Defaults to the current directory so `cargo run` and a
    /// packaged `/etc/orc-daemon` deployment both work without extra flags.
    #[arg(long, global = true, default_value = ".")]
    pub config_dir: PathBuf,

    #[arg(short = 's', long, global = true)]
    pub silent: bool,

    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the control plane: spawn one MQTT session per configured
    /// device, serve the REST/WS API and the artifact webserver, and block
    /// until SIGINT.
    Broker(BrokerArgs),
    /// Print a provisioning QR payload string for a device.
    Qr(QrArgs),
    /// Issue a single RPC to a running device's session and print the reply.
    Rpc(RpcArgs),
    /// Placeholder for the operator GUI (§1 non-goal — not implemented; the
    /// REST/WS API is the supported integration surface).
    Gui,
}

#[derive(Debug, Args)]
pub struct BrokerArgs {
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Args)]
pub struct QrArgs {
    /// Device id, which doubles as its MQTT port.
    #[arg(long)]
    pub device: u16,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long, default_value = "localhost")]
    pub host: String,
    #[arg(long)]
    pub tls: bool,
    #[arg(long, default_value = "pool.ntp.org")]
    pub ntp_server: String,
    /// Write the QR payload string to this path instead of stdout. Actually
    /// rendering a PNG is out of scope (§1 non-goal: "no QR-code image
    /// generation") — this writes the same wire-format string a reader
    /// would feed into an external QR renderer.
    #[arg(long)]
    pub save_png: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RpcArgs {
    /// Device id the RPC targets.
    pub instance_id: u16,
    pub method: String,
    /// JSON-encoded params object.
    pub params: String,
}
