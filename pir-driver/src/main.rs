use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use pir_driver::Opt;
use utils::DiagnosticEmitter;

fn main() -> ExitCode {
    let opts = Opt::parse();

    // Warnings from the analysis by default, --verbose enables debug;
    // RUST_LOG overrides.
    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_module("sraa", level)
        .filter_module("pir_lib", level)
        .filter_module("pir_driver", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();

    let mut diag = DiagnosticEmitter::new(Box::new(std::io::stdout()), Box::new(std::io::stderr()));
    let contents = match std::fs::read_to_string(&opts.filename) {
        Ok(contents) => contents,
        Err(err) => {
            diag.err_ln(&format!("Failed to read '{}': {err}", opts.filename));
            return ExitCode::from(1);
        }
    };

    if pir_driver::process_source(&contents, &mut diag, &opts).is_none() {
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}
