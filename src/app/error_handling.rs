//! Error handling utilities

use tracing::error;

const GENERAL_ERROR: i32 = 1;
const CONFIG_ERROR: i32 = 2;

/// Print `error` and exit. Configuration problems exit with 2, everything else with 1.
///
/// With `verbose >= 1` the full error chain is printed as well.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);
    eprintln!("Error: {error}");

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}

fn exit_code(error: &anyhow::Error) -> i32 {
    let is_config = error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<crate::error::Error>(),
            Some(crate::error::Error::Config(_))
        )
    });
    if is_config {
        CONFIG_ERROR
    } else {
        GENERAL_ERROR
    }
}
