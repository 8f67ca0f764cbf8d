//! Convenience helpers shared across command handlers.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use idcard::catalog::{BUS_ROUTES, CLASS_OPTIONS, OptionEntry, label_for};
use idcard::form::{FormError, Notice, Tone};
use idcard::record::StudentRecord;

/// Persist bytes either to a file or stdout when `-` is provided.
pub fn write_output(path: &Path, content: &[u8]) -> Result<()> {
    if path.as_os_str() == "-" {
        io::stdout().write_all(content)?;
        return Ok(());
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

pub fn print_notice(notice: &Notice) {
    match notice.tone {
        Tone::Success => println!("{notice}"),
        Tone::Destructive => eprintln!("{notice}"),
    }
}

/// Report a form failure the way the form would and turn it into an error.
pub fn fail(err: FormError) -> anyhow::Error {
    let notice = err.notice();
    print_notice(&notice);
    anyhow!(err).context(notice.title)
}

pub fn print_record(record: &StudentRecord) {
    let allergies = if record.allergies.is_empty() {
        "None".to_string()
    } else {
        record.allergy_labels().join(", ")
    };
    println!("Name:        {}", record.name);
    println!("Roll Number: {}", record.roll_number);
    println!("Class:       {}", labelled(CLASS_OPTIONS, &record.class_div));
    println!("Rack Number: {}", record.rack_number);
    println!("Bus Route:   {}", labelled(BUS_ROUTES, &record.bus_route));
    println!("Allergies:   {allergies}");
    if let Some(photo) = &record.photo {
        println!("Photo:       {photo}");
    }
    if let Some(ts) = record.timestamp {
        println!("Saved:       {}", ts.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

/// `value (label)` for catalog values, the bare value otherwise.
fn labelled(options: &[OptionEntry], value: &str) -> String {
    match label_for(options, value) {
        Some(label) => format!("{value} ({label})"),
        None => value.to_string(),
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}
