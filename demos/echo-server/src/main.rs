//! Echo Server Demo
//!
//! Runs the `tcp-echo` package under the Gantry runtime.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-server -- --config demos/echo-server/gantry.toml
//! nc 127.0.0.1 7000
//! ```
//!
//! Edit the configuration file and send `SIGHUP` to apply it without
//! dropping the listening socket:
//!
//! ```bash
//! kill -HUP $(pgrep echo-server)
//! ```
//!
//! A configuration that fails to load or start is rejected and the running
//! one is left alone.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gantry::prelude::*;

/// Hot-reloadable TCP echo server.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (defaults to `gantry.toml` in the current directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`.
    #[arg(short, long)]
    profile: Option<String>,

    /// Overrides `apps.echo.listen`.
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = GantryRuntime::builder().module_package(gantry_tcp_echo::register);
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = args.profile {
        builder = builder.profile(profile);
    }
    if let Some(listen) = args.listen {
        builder = builder.set("apps.echo.listen", listen);
    }

    let runtime = builder.build()?;
    info!(
        reload_policy = runtime.config().supervisor.reload_policy.as_str(),
        apps = runtime.config().apps.len(),
        "Starting echo server"
    );

    runtime.run().await?;
    Ok(())
}
