#![doc(html_root_url = "https://docs.rs/sqlmount/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! sqlmount: mount a SQLite-backed filesystem, encrypted on demand
//!
//! Turns a command line into a running FUSE session over a database file.
//!
//! ## Features
//!
//! - Mount-layer options and sqlmount options share one `-o` list
//! - Passphrase from an option, `SQLMOUNT_PASSWORD`, a credentials file or
//!   the terminal, wiped from memory and environment once taken
//! - The cipher library is preloaded only when encryption is asked for
//! - Detaches from the terminal only after the mount succeeded
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sqlmount::{Bootstrap, CurrentExe, Daemon, FuseBackend, MountRequest, ProcessEnv, TerminalPrompt};
//!
//! # fn main() -> anyhow::Result<()> {
//! let request = MountRequest::new("/var/lib/fs.sqlite", "/mnt/db")
//!     .options(["ro,encrypt"])
//!     .foreground(true);
//!
//! let bootstrap = Bootstrap {
//!     env: &mut ProcessEnv,
//!     replacer: &CurrentExe,
//!     prompt: &TerminalPrompt,
//!     cipher_library: "libsqlcipher.so",
//! };
//! bootstrap.run(&request, &mut FuseBackend, &mut Daemon::new(None))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Option namespaces
//!
//! - `password=<secret>`: passphrase for the store
//! - `credentials=<file>`: read the passphrase from a file
//! - `encrypt`: encrypt even without a passphrase source
//! - anything else goes to the mount layer untouched

pub mod modules;

pub use modules::bootstrap::Bootstrap;
pub use modules::credential::TerminalPrompt;
pub use modules::daemon::Daemon;
pub use modules::env::ProcessEnv;
pub use modules::error::BootstrapError;
pub use modules::mount::FuseBackend;
pub use modules::preload::CurrentExe;

// Re-export commonly used types
pub use modules::request::{DatabaseLocator, MountRequest};
pub use modules::session::RunExit;
