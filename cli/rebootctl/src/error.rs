//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Cannot read the daemon's API token from {0}")]
    NotAuthorized(String),

    #[error("{message}")]
    Api { code: String, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Lock backend is not available")]
    LockBackendUnavailable,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::NotAuthorized(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: mutating commands read the token rebootd writes; run as the same user as the daemon."
                        .yellow()
                );
            }
            CliError::Network(_) => {
                eprintln!("\n{}", "Hint: is rebootd running on this machine?".yellow());
            }
            CliError::Api { code, .. } if code == "PermissionDenied" => {
                eprintln!(
                    "\n{}",
                    "Hint: the daemon rejected the API token; has rebootd been restarted with a fresh state directory?"
                        .yellow()
                );
            }
            CliError::LockBackendUnavailable => {
                eprintln!(
                    "\n{}",
                    "Hint: set REBOOTD_KV_URL to the cluster's key-value backend.".yellow()
                );
            }
            _ => {}
        }
    }
}
