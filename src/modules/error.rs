//! Failure taxonomy of the mount bootstrap.
//!
//! Every variant is terminal to the current invocation; nothing in the
//! bootstrap retries. An operator interrupt is not represented here, it is a
//! normal shutdown (see [`RunExit`](super::session::RunExit)).

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Errors surfaced by the bootstrap stages.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The invocation itself is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No credential could be obtained while encryption is required.
    #[error("credential unavailable: {reason}")]
    CredentialUnavailable {
        /// Which source failed and why
        reason: String,
        /// Underlying I/O failure, when there was one
        #[source]
        source: Option<io::Error>,
    },

    /// Replacing the process image with the cipher library preloaded failed.
    #[error("failed to re-execute with {library} preloaded")]
    EncryptionBootstrapFailed {
        /// Library that was being injected
        library: String,
        /// Error returned by the exec call
        #[source]
        source: io::Error,
    },

    /// The backing store could not be opened.
    #[error("failed to open {locator}")]
    OpenFailed {
        /// Database locator as given on the command line
        locator: String,
        /// Collaborator error
        #[source]
        source: anyhow::Error,
    },

    /// The mount layer rejected the handshake.
    #[error("failed to mount on {}", mountpoint.display())]
    MountFailed {
        /// Requested mountpoint
        mountpoint: PathBuf,
        /// Collaborator error
        #[source]
        source: anyhow::Error,
    },

    /// Detaching from the terminal failed after a successful mount.
    #[error("failed to daemonize")]
    Daemonize(#[source] anyhow::Error),

    /// The session run loop ended with an error.
    #[error("session terminated abnormally")]
    Runtime(#[source] anyhow::Error),
}

impl BootstrapError {
    pub(crate) fn credential(reason: impl Into<String>) -> Self {
        Self::CredentialUnavailable {
            reason: reason.into(),
            source: None,
        }
    }

    /// Numeric exit status for this failure.
    pub fn exit_status(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

/// Result alias used throughout the bootstrap.
pub type Result<T> = std::result::Result<T, BootstrapError>;
