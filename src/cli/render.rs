//! Rendering commands (`idcard render ...`).

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};

use idcard::code::EmbeddedCode;

use crate::cli::common::Session;
use crate::cli::utils::{fail, print_notice, write_output};

/// Available render subcommands.
#[derive(Subcommand, Debug)]
pub enum RenderCommand {
    /// Export a saved card as PNG.
    Image(RenderImageArgs),
    /// Print the embedded code of a saved card.
    Code(RenderCodeArgs),
}

/// Args for `idcard render image`.
#[derive(Args, Debug)]
pub struct RenderImageArgs {
    /// Roll number of the saved card.
    pub roll_number: String,
    /// Template name or alias (defaults to `card.template`).
    #[arg(short = 't', long)]
    pub template: Option<String>,
    /// Output directory, or `-` to write the PNG to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

/// Args for `idcard render code`.
#[derive(Args, Debug)]
pub struct RenderCodeArgs {
    /// Roll number of the saved card.
    pub roll_number: String,
    /// Print only the JSON payload.
    #[arg(long)]
    pub payload: bool,
}

/// Execute a render command.
pub fn handle(command: RenderCommand, session: &Session) -> Result<()> {
    match command {
        RenderCommand::Image(args) => image(args, session),
        RenderCommand::Code(args) => code(args, session),
    }
}

fn image(args: RenderImageArgs, session: &Session) -> Result<()> {
    let mut form = session.form()?;
    if let Some(name) = &args.template {
        form.select_template(name).map_err(fail)?;
    }
    form.load_saved(&args.roll_number).map_err(fail)?;
    let exported = form.export().map_err(fail)?;

    let output = args
        .output
        .unwrap_or_else(|| session.config.export.output_dir.clone());
    if output.as_os_str() == "-" {
        return write_output(&output, &exported.image.bytes);
    }
    let path = exported
        .image
        .save_in(&output)
        .context("failed to save exported card")?;
    print_notice(&exported.notice);
    println!(
        "{} ({}x{}, template {})",
        path.display(),
        exported.image.width,
        exported.image.height,
        form.template().name
    );
    Ok(())
}

fn code(args: RenderCodeArgs, session: &Session) -> Result<()> {
    let Some(record) = session.store()?.get_by_key(&args.roll_number)? else {
        bail!("no saved card with roll number '{}'", args.roll_number);
    };
    let code = EmbeddedCode::for_record(&record)?;
    if args.payload {
        println!("{}", code.payload());
        return Ok(());
    }
    print!("{}", code.to_text());
    println!("{}", code.payload());
    Ok(())
}
