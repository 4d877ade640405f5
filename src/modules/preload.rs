//! Injection of the cipher library.
//!
//! Encryption is provided by a library that is only loaded when it is
//! needed. [`ensure_loaded`] checks whether it is already part of the
//! process and, if not, adds it to `LD_PRELOAD` and replaces the current
//! process image with itself. The new image finds the library in place and
//! the check short-circuits, so the re-exec happens at most once.

use super::constants::PRELOAD_VAR;
use super::env::Environment;
use super::error::{BootstrapError, Result};
use log::{debug, error, info};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

/// Replaces the running process image.
pub trait ImageReplacer {
    /// Starts the same program with the same arguments and the given
    /// environment in place of this one. Only returns on failure.
    fn replace(&self, env: Vec<(OsString, OsString)>) -> io::Error;
}

/// Re-executes the current executable with its original argument vector.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentExe;

impl ImageReplacer for CurrentExe {
    fn replace(&self, env: Vec<(OsString, OsString)>) -> io::Error {
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(err) => return err,
        };

        let mut args = std::env::args_os();
        let mut command = Command::new(exe);
        if let Some(arg0) = args.next() {
            command.arg0(arg0);
        }
        command.args(args).env_clear().envs(env).exec()
    }
}

/// Whether `entry` (a path or bare soname) names `library`, allowing a
/// version suffix such as `libsqlcipher.so.0`.
fn names_library(entry: &str, library: &str) -> bool {
    if entry == library {
        return true;
    }
    let file_name = Path::new(entry)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or(entry);
    let wanted = Path::new(library)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or(library);

    file_name == wanted
        || file_name
            .strip_prefix(wanted)
            .map_or(false, |rest| rest.starts_with('.'))
}

/// Entries of a preload list. The dynamic loader accepts both colons and
/// spaces as separators.
fn preload_entries(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c| c == ':' || c == ' ')
        .filter(|entry| !entry.is_empty())
}

fn preload_references<E: Environment>(env: &E, library: &str) -> bool {
    env.var(PRELOAD_VAR).map_or(false, |value| {
        preload_entries(&value.to_string_lossy()).any(|entry| names_library(entry, library))
    })
}

/// Whether `library` is mapped into this process already, e.g. linked in
/// directly rather than preloaded.
fn is_mapped(library: &str) -> bool {
    match fs::read_to_string("/proc/self/maps") {
        Ok(maps) => maps
            .lines()
            .filter_map(|line| line.split_whitespace().nth(5))
            .any(|path| names_library(path, library)),
        Err(_) => false,
    }
}

/// The preload list with `library` appended.
pub fn append_preload(current: Option<&OsStr>, library: &str) -> OsString {
    match current {
        Some(value) if !value.to_string_lossy().trim().is_empty() => {
            let mut value = value.to_os_string();
            value.push(":");
            value.push(library);
            value
        }
        _ => OsString::from(library),
    }
}

/// Makes sure `library` is loaded, re-executing the process if it is not.
///
/// Returns `Ok(())` when the library is already present. Otherwise this only
/// returns if the image replacement failed.
pub fn ensure_loaded<E: Environment>(
    env: &mut E,
    library: &str,
    replacer: &dyn ImageReplacer,
) -> Result<()> {
    if preload_references(env, library) {
        debug!("{} already listed in {}", library, PRELOAD_VAR);
        return Ok(());
    }
    if is_mapped(library) {
        debug!("{} already mapped into the process", library);
        return Ok(());
    }

    let preload = append_preload(env.var(PRELOAD_VAR).as_deref(), library);
    env.set_var(PRELOAD_VAR, &preload);

    info!("Re-executing with {} preloaded", library);
    let source = replacer.replace(env.vars());
    error!("Re-exec with {} preloaded failed: {}", library, source);
    Err(BootstrapError::EncryptionBootstrapFailed {
        library: library.to_string(),
        source,
    })
}
