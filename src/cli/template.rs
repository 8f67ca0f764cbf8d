//! Template discovery commands (`idcard template ...`).

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use idcard::record::StudentRecord;
use idcard::templates::{RenderContext, TemplateRegistry};

/// Template subcommands.
#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    /// List all known templates.
    List,
    /// Show a template and the text it lays out for a sample student.
    Show(TemplateShowArgs),
}

/// Arguments for `idcard template show`.
#[derive(Args, Debug)]
pub struct TemplateShowArgs {
    /// Template name or alias to display.
    pub name: String,
}

/// Execute a template command.
pub fn handle(command: TemplateCommand) -> Result<()> {
    match command {
        TemplateCommand::List => list(),
        TemplateCommand::Show(args) => show(args),
    }
}

fn list() -> Result<()> {
    println!("Available templates:");
    for tpl in TemplateRegistry::list() {
        println!("  - {} ({}): {}", tpl.name, tpl.alias, tpl.description);
    }
    Ok(())
}

fn show(args: TemplateShowArgs) -> Result<()> {
    let tpl = TemplateRegistry::get(&args.name)
        .with_context(|| format!("template '{}' not found", args.name))?;
    let sample = StudentRecord {
        name: "Sample Student".into(),
        roll_number: "2024001".into(),
        class_div: "5B".into(),
        allergies: Vec::new(),
        rack_number: "R1".into(),
        bus_route: "Route 1".into(),
        photo: None,
        timestamp: None,
    };
    let card = idcard::render_card(tpl, &sample, &RenderContext::default())?;

    println!("Template: {} (alias {})", tpl.name, tpl.alias);
    println!("{}", tpl.description);
    println!("Size: {}x{} px", card.width, card.height);
    for text in card.texts() {
        println!("  {text}");
    }
    Ok(())
}
