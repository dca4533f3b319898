//! Command implementations.

mod inspect;
mod load;

use crate::cli::{Cli, Commands};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Inspect { .. } => handle_inspect(cli),
        Commands::Load { .. } => handle_load(cli),
    }
}

fn handle_inspect(cli: &Cli) -> i32 {
    let Commands::Inspect { input } = &cli.command else {
        unreachable!("inspect command variant mismatch");
    };
    inspect::cmd_inspect(input)
}

fn handle_load(cli: &Cli) -> i32 {
    let Commands::Load {
        input,
        execute,
        no_flush,
        allow_relocation_skip,
    } = &cli.command
    else {
        unreachable!("load command variant mismatch");
    };

    let config = pemap::LoaderConfig::new()
        .with_execute_entry(*execute)
        .with_flush_instruction_cache(!*no_flush)
        .with_allow_relocation_skip(*allow_relocation_skip);
    load::cmd_load(input, config, cli.silent)
}
