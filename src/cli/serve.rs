//! HTTP server command (`idcard serve`).

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::common::Session;

/// Arguments for `idcard serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (overrides `server.host`).
    #[arg(long)]
    pub host: Option<IpAddr>,
    /// Port to listen on (overrides `server.port`).
    #[arg(short, long)]
    pub port: Option<u16>,
    /// SQLite database file (overrides `server.database`).
    #[arg(long)]
    pub database: Option<PathBuf>,
    /// Directory for uploaded photos (overrides `server.uploads_dir`).
    #[arg(long)]
    pub uploads: Option<PathBuf>,
}

pub fn handle(args: ServeArgs, session: Session) -> Result<()> {
    let mut server = session.config.server;
    if let Some(host) = args.host {
        server.host = host.to_string();
    }
    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(database) = args.database {
        server.database = database;
    }
    if let Some(uploads) = args.uploads {
        server.uploads_dir = uploads;
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(idcard::server::serve(&server))
}
