//! Card-level operations (`idcard card ...`).

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};

use idcard::catalog::{Allergy, BUS_ROUTES, CLASS_OPTIONS};
use idcard::form::{Field, PhotoUpload};

use crate::cli::common::Session;
use crate::cli::utils::{fail, print_json, print_notice, print_record};

/// Supported `idcard card` subcommands.
#[derive(Subcommand, Debug)]
pub enum CardCommand {
    /// Fill in the form and save a card.
    Add(CardAddArgs),
    /// List saved cards, newest first.
    List(CardListArgs),
    /// Show one saved card.
    Show(CardShowArgs),
    /// Delete a saved card.
    Delete(CardDeleteArgs),
    /// List the accepted class, bus route and allergy values.
    Options,
}

/// Arguments for `idcard card add`.
#[derive(Args, Debug)]
pub struct CardAddArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long = "roll-number")]
    pub roll_number: String,
    /// Class and division code, e.g. `8A`.
    #[arg(long = "class")]
    pub class_div: String,
    #[arg(long = "rack-number")]
    pub rack_number: String,
    /// Bus route label, or `None`.
    #[arg(long = "bus-route", default_value = "None")]
    pub bus_route: String,
    /// Allergy label or id; repeat or separate with commas.
    #[arg(long = "allergy", value_delimiter = ',')]
    pub allergies: Vec<String>,
    /// Student photo (image file, 5 MB at most).
    #[arg(long)]
    pub photo: PathBuf,
    /// Template name or alias used for `--export`.
    #[arg(long)]
    pub template: Option<String>,
    /// Also export the card as PNG.
    #[arg(long)]
    pub export: bool,
    /// Directory for the exported PNG (defaults to `export.output_dir`).
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

/// Arguments for `idcard card list`.
#[derive(Args, Debug)]
pub struct CardListArgs {
    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `idcard card show`.
#[derive(Args, Debug)]
pub struct CardShowArgs {
    pub roll_number: String,
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `idcard card delete`.
#[derive(Args, Debug)]
pub struct CardDeleteArgs {
    pub roll_number: String,
}

/// Execute a card command.
pub fn handle(command: CardCommand, session: &Session) -> Result<()> {
    match command {
        CardCommand::Add(args) => add(args, session),
        CardCommand::List(args) => list(args, session),
        CardCommand::Show(args) => show(args, session),
        CardCommand::Delete(args) => delete(args, session),
        CardCommand::Options => options(),
    }
}

fn add(args: CardAddArgs, session: &Session) -> Result<()> {
    let mut form = session.form()?;
    form.set_field(Field::Name, args.name);
    form.set_field(Field::RollNumber, args.roll_number);
    form.set_field(Field::ClassDiv, args.class_div);
    form.set_field(Field::RackNumber, args.rack_number);
    form.set_field(Field::BusRoute, args.bus_route);
    for raw in &args.allergies {
        let allergy: Allergy = raw.parse()?;
        if !form.draft().allergies.contains(&allergy) {
            form.toggle_allergy(allergy);
        }
    }
    if let Some(name) = &args.template {
        form.select_template(name).map_err(fail)?;
    }

    let photo = fs::canonicalize(&args.photo)
        .with_context(|| format!("failed to read {}", args.photo.display()))?;
    let upload = PhotoUpload::from_file(photo).map_err(fail)?;
    form.attach_photo(upload).map_err(fail)?;

    let notice = form.submit().map_err(fail)?;
    print_notice(&notice);

    if args.export {
        let exported = form.export().map_err(fail)?;
        let dir = args
            .output
            .unwrap_or_else(|| session.config.export.output_dir.clone());
        let path = exported.image.save_in(&dir)?;
        print_notice(&exported.notice);
        println!("{}", path.display());
    }
    Ok(())
}

fn list(args: CardListArgs, session: &Session) -> Result<()> {
    let records = session.store()?.list()?;
    if args.json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No saved cards.");
        return Ok(());
    }
    println!("{:<12} {:<28} {:<6} {:<8} {}", "ROLL", "NAME", "CLASS", "RACK", "BUS");
    for record in &records {
        println!(
            "{:<12} {:<28} {:<6} {:<8} {}",
            record.roll_number, record.name, record.class_div, record.rack_number, record.bus_route
        );
    }
    Ok(())
}

fn show(args: CardShowArgs, session: &Session) -> Result<()> {
    let Some(record) = session.store()?.get_by_key(&args.roll_number)? else {
        bail!("no saved card with roll number '{}'", args.roll_number);
    };
    if args.json {
        return print_json(&record);
    }
    print_record(&record);
    Ok(())
}

fn delete(args: CardDeleteArgs, session: &Session) -> Result<()> {
    let mut form = session.form()?;
    let notice = form.delete_saved(&args.roll_number).map_err(fail)?;
    print_notice(&notice);
    Ok(())
}

fn options() -> Result<()> {
    println!("Classes (--class):");
    for opt in CLASS_OPTIONS {
        println!("  {:<8} {}", opt.value, opt.label);
    }
    println!("Bus routes (--bus-route):");
    for opt in BUS_ROUTES {
        println!("  {:<8} {}", opt.value, opt.label);
    }
    println!("Allergies (--allergy):");
    for allergy in Allergy::ALL {
        println!("  {:<12} {}", allergy.id(), allergy.label());
    }
    Ok(())
}
