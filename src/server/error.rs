//! You can find the errors that can occur during server startup here

use std::fmt::{Display, Formatter};
use std::io;

/// The errors that can occur during server startup
#[derive(Debug)]
pub enum StartServerError {
    /// Binding or running the server failed
    IO(io::Error),
    /// The configured token signing secret is empty
    EmptySecretKey,
}

impl Display for StartServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StartServerError::IO(err) => write!(f, "Could not start the server: {err}"),
            StartServerError::EmptySecretKey => {
                write!(f, "SecretKey must not be empty, tokens are signed with it")
            }
        }
    }
}

impl From<io::Error> for StartServerError {
    fn from(value: io::Error) -> Self {
        Self::IO(value)
    }
}
