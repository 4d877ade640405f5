//! Mount bootstrap.
//!
//! Ties the stages together: split the options, decide on encryption, make
//! sure the cipher library is loaded (re-executing if it is not), resolve the
//! passphrase and hand over to the session lifecycle.
//!
//! The passphrase is resolved only after the re-exec check. The replaced
//! image inherits the environment and the argument vector, so a password
//! from either source is still there to be taken by the new image, and the
//! terminal is prompted at most once.

use super::credential::{self, PassphrasePrompt};
use super::daemon::Detach;
use super::env::Environment;
use super::error::Result;
use super::options::{partition, OptionSet};
use super::preload::{self, ImageReplacer};
use super::request::MountRequest;
use super::session::{self, Backend, RunExit};
use log::info;

/// Process-level context the bootstrap runs in.
pub struct Bootstrap<'a, E: Environment> {
    pub env: &'a mut E,
    pub replacer: &'a dyn ImageReplacer,
    pub prompt: &'a dyn PassphrasePrompt,
    /// Library providing transparent encryption
    pub cipher_library: &'a str,
}

impl<'a, E: Environment> Bootstrap<'a, E> {
    /// Runs the whole bootstrap for `request` and serves until shutdown.
    pub fn run<B: Backend>(
        self,
        request: &MountRequest,
        backend: &mut B,
        detach: &mut dyn Detach,
    ) -> Result<RunExit> {
        let OptionSet {
            mount_options,
            mut system_options,
        } = partition(&request.raw_options);

        let env = self.env;
        let credential = if credential::encryption_required(request, &system_options, &*env) {
            preload::ensure_loaded(&mut *env, self.cipher_library, self.replacer)?;
            Some(credential::resolve(
                request,
                &mut system_options,
                env,
                self.prompt,
            )?)
        } else {
            info!("No encryption requested");
            None
        };
        drop(system_options);

        session::run(backend, detach, request, &mount_options, credential)
    }
}
