//! Inspect command.

use std::path::Path;

use pemap::{ImageReport, ImportSymbol};
use pemap_layout::{ExportTarget, SectionHeader};
use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal;

/// Handle the `inspect` command.
pub fn cmd_inspect(input: &Path) -> i32 {
    let file = match std::fs::read(input) {
        Ok(file) => file,
        Err(e) => {
            error!(error = %e, path = %input.display(), "failed to read image");
            return EXIT_FAILURE;
        }
    };
    match pemap::inspect(&file) {
        Ok(report) => {
            print_report(&report);
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, path = %input.display(), "failed to decode image");
            terminal::error(&format!("{} is not a usable PE image", input.display()));
            EXIT_FAILURE
        }
    }
}

fn print_report(report: &ImageReport) {
    let headers = &report.headers;
    terminal::header("Headers");
    terminal::indent(&format!("machine       {:#06x}", headers.machine));
    terminal::indent(&format!("format        {:?}", headers.width));
    terminal::indent(&format!("image base    {:#x}", headers.image_base));
    terminal::indent(&format!("entry point   {:#x}", headers.entry_point));
    terminal::indent(&format!("size of image {:#x}", headers.size_of_image));
    terminal::indent(&format!("dll           {}", headers.is_dll()));

    terminal::header("Sections");
    for section in &headers.sections {
        terminal::indent(&section_line(section));
    }

    terminal::header("Relocations");
    terminal::indent(&format!("{} blocks", report.relocations.blocks));
    for (kind, count) in &report.relocations.by_kind {
        terminal::indent(&format!("{kind:<9} {count}"));
    }

    terminal::header("Imports");
    for library in &report.imports {
        terminal::indent(&library.library);
        for symbol in &library.symbols {
            match symbol {
                ImportSymbol::Ordinal(_) => terminal::indent(&format!("  {symbol}")),
                ImportSymbol::Name { hint, .. } => {
                    terminal::indent(&format!("  {symbol} (hint {hint})"));
                }
            }
        }
    }

    terminal::header("Exports");
    for export in &report.exports {
        let target = match &export.target {
            ExportTarget::Rva(rva) => format!("{rva:#x}"),
            ExportTarget::Forwarder(name) => format!("-> {}", String::from_utf8_lossy(name)),
        };
        terminal::indent(&format!("{:>5} {} {target}", export.ordinal, export.name));
    }

    if !report.pogo.is_empty() {
        terminal::header("POGO");
        for entry in &report.pogo {
            terminal::indent(&format!(
                "{:#010x} {:#08x} {}",
                entry.start_rva,
                entry.size,
                String::from_utf8_lossy(&entry.name)
            ));
        }
    }
}

fn section_line(section: &SectionHeader) -> String {
    format!(
        "{:<8} va {:#08x} vsize {:#08x} raw {:#08x}{}",
        section.name(),
        section.virtual_address,
        section.virtual_size,
        section.size_of_raw_data,
        if section.is_executable() { " x" } else { "" }
    )
}
