//! Command-line interface wiring for the `idcard` binary.
//!
//! This module owns the clap definitions and delegates execution to
//! specialized submodules that encapsulate each command family.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod card;
pub mod common;
pub mod render;
pub mod serve;
pub mod template;
pub mod utils;

use crate::cli::common::{GlobalArgs, Session};

/// Parsed CLI entrypoint for the `idcard` binary.
#[derive(Parser, Debug)]
#[command(name = "idcard", version, about = "Student ID card generator")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Top-level command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// High-level command families made available to end users.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create, list, inspect and delete saved cards.
    #[command(subcommand)]
    Card(card::CardCommand),
    /// Export a saved card as PNG or print its embedded code.
    #[command(subcommand)]
    Render(render::RenderCommand),
    /// Inspect the card templates.
    #[command(subcommand)]
    Template(template::TemplateCommand),
    /// Run the card REST server.
    Serve(serve::ServeArgs),
}

/// Execute the requested command.
pub fn run(cli: Cli) -> Result<()> {
    let session = Session::load(&cli.global)?;
    match cli.command {
        Command::Card(cmd) => card::handle(cmd, &session),
        Command::Render(cmd) => render::handle(cmd, &session),
        Command::Template(cmd) => template::handle(cmd),
        Command::Serve(args) => serve::handle(args, session),
    }
}
