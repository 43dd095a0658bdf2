//! Command-line errors

use thiserror::Error;

/// Errors raised before any request is made.
#[derive(Error, Debug)]
pub enum Error {
    #[error("SESSIONCTL_PASSWORD must be set to sign in or register")]
    MissingPassword,
}
