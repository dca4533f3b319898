//! Load command.

use std::path::Path;

use pemap::{LoadError, Loader, LoaderConfig};
use pemap_sys::NativePlatform;
use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal;

/// Handle the `load` command.
pub fn cmd_load(input: &Path, config: LoaderConfig, silent: bool) -> i32 {
    let file = match std::fs::read(input) {
        Ok(file) => file,
        Err(e) => {
            error!(error = %e, path = %input.display(), "failed to read image");
            return EXIT_FAILURE;
        }
    };

    if !silent {
        terminal::info(&format!("mapping {}", input.display()));
    }
    let platform = NativePlatform::new();
    let loader = Loader::new(&platform, config);
    // Running the entry point is what the user asked for with --execute.
    let module = match unsafe { loader.load(&file) } {
        Ok(module) => module,
        Err(e) => {
            report_failure(input, &e);
            return EXIT_FAILURE;
        }
    };

    info!(
        base = %module.base(),
        relocations = module.relocations().applied,
        imports = module.imports().len(),
        "image mapped"
    );
    if !silent {
        terminal::success(&format!(
            "{} mapped at {} ({} relocations, {} imports)",
            input.display(),
            module.base(),
            module.relocations().applied,
            module.imports().len()
        ));
    }

    if let Err(e) = module.release() {
        error!(error = %e, "failed to release image");
        return EXIT_FAILURE;
    }
    EXIT_SUCCESS
}

fn report_failure(input: &Path, e: &LoadError) {
    error!(error = %e, path = %input.display(), "failed to load image");
    if e.is_resolution_failure() {
        terminal::warning("a dependency library or symbol is missing on this host");
    } else {
        terminal::error(&format!("{} could not be loaded", input.display()));
    }
}
