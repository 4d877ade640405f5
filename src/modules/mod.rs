//! Core bootstrap modules.
//!
//! - `options`: splitting `-o` arguments and assembling mount options
//! - `credential`: deciding on encryption and resolving the passphrase
//! - `preload`: loading the cipher library by re-executing
//! - `session`: session lifecycle and the backend interface
//! - `mount`: the FUSE backend
//! - `daemon`: detaching from the terminal

pub mod bootstrap;
pub mod constants;
pub mod credential;
pub mod daemon;
pub mod env;
pub mod error;
pub mod mount;
pub mod options;
pub mod preload;
pub mod request;
pub mod session;
/// Stand-in for the SQLite store.
pub mod store;
