//! CLI Exit Code Registry
//!
//! Single source of truth for `mora` exit codes. Exit codes are part of the
//! shell contract: scheduled jobs branch on them.
//!
//! # Exit Code Ranges
//!
//! | Code | Domain    | Description                                      |
//! |------|-----------|--------------------------------------------------|
//! | 0    | Universal | Success (diagnostics do not change this)         |
//! | 1    | Universal | General error (unspecified)                      |
//! | 2    | Universal | CLI usage error (bad args, bad `--as-of`)        |
//! | 60   | recon     | Invalid config (TOML syntax, validation, no file)|
//! | 61   | recon     | Declared table or column missing from input      |
//! | 62   | recon     | Runtime: unreadable input, CSV error, write error|
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `recon_exit_code` or the command's error handling

use mora_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success. A run that produced diagnostics still exits 0.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments. clap exits with this code on its own for
/// parse failures; argument combinations are checked by the command.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Recon (60-69)
// =============================================================================

/// Config could not be parsed or failed validation, or a table section
/// lacks the `file` the CLI needs to load it.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 60;

/// A table or column declared in the config is absent from the input.
pub const EXIT_RECON_MISSING_INPUT: u8 = 61;

/// Input file unreadable, malformed CSV, or output not writable.
pub const EXIT_RECON_RUNTIME: u8 = 62;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_RECON_INVALID_CONFIG,
        ReconError::MissingTable(_) | ReconError::MissingColumn { .. } => EXIT_RECON_MISSING_INPUT,
        ReconError::Csv { .. } => EXIT_RECON_RUNTIME,
    }
}
