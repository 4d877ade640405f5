use super::credential::Credential;
use super::options::MountOptions;
use super::request::DatabaseLocator;
use super::session::{Backend, Release, RunExit};
use super::store::{Store, StoreFs};
use anyhow::{anyhow, Context, Result};
use libc::{SIGINT, SIGTERM};
use log::{error, info};
use signal_hook::iterator::Signals;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// An open store, shared with the filesystem once mounted.
pub struct StoreSession {
    store: Arc<Store>,
}

impl StoreSession {
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl Release for StoreSession {
    fn release(&mut self) {
        self.store.close();
    }
}

/// A live FUSE mount. Dropping the inner session unmounts.
pub struct FuseMount {
    session: Option<fuser::Session<StoreFs>>,
    mountpoint: PathBuf,
}

impl Release for FuseMount {
    fn release(&mut self) {
        if let Some(session) = self.session.take() {
            drop(session);
            info!("Unmounted {}", self.mountpoint.display());
        }
    }
}

/// [`Backend`] that serves the store over FUSE via `fuser`.
#[derive(Debug, Default)]
pub struct FuseBackend;

impl Backend for FuseBackend {
    type Session = StoreSession;
    type Mount = FuseMount;

    fn open_session(
        &mut self,
        locator: &DatabaseLocator,
        credential: Option<Credential>,
    ) -> Result<StoreSession> {
        let store = Store::open(locator, credential.map(Credential::into_secret))?;
        Ok(StoreSession {
            store: Arc::new(store),
        })
    }

    fn mount(
        &mut self,
        session: &mut StoreSession,
        mountpoint: &Path,
        options: &MountOptions,
    ) -> Result<FuseMount> {
        let fs = StoreFs::new(session.store.clone());
        let fuse = fuser::Session::new(fs, mountpoint, &options.to_fuser())
            .with_context(|| format!("mount handshake on {} failed", mountpoint.display()))?;

        Ok(FuseMount {
            session: Some(fuse),
            mountpoint: mountpoint.to_path_buf(),
        })
    }

    /// Blocks in the FUSE request loop. SIGINT or SIGTERM unmounts, which
    /// ends the loop; that is reported as [`RunExit::Interrupted`].
    fn run(&mut self, mount: &mut FuseMount) -> Result<RunExit> {
        let session = mount
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("{} is no longer mounted", mount.mountpoint.display()))?;

        let interrupted = Arc::new(AtomicBool::new(false));
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let signals_handle = signals.handle();
        let mut unmounter = session.unmount_callable();

        let watcher = {
            let interrupted = interrupted.clone();
            thread::spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!("Received signal {}, unmounting...", sig);
                    interrupted.store(true, Ordering::SeqCst);
                    if let Err(e) = unmounter.unmount() {
                        error!("Failed to unmount: {}", e);
                    }
                }
            })
        };

        let result = session.run();
        signals_handle.close();
        if watcher.join().is_err() {
            error!("Signal watcher panicked");
        }
        result.context("FUSE session failed")?;

        if interrupted.load(Ordering::SeqCst) {
            Ok(RunExit::Interrupted)
        } else {
            Ok(RunExit::Completed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::credential::CredentialSource;
    use zeroize::Zeroizing;

    #[test]
    fn test_open_session_keys_store() -> Result<()> {
        let mut backend = FuseBackend;
        let credential = Credential::new(Zeroizing::new("key".into()), CredentialSource::Option);

        let mut session = backend.open_session(&DatabaseLocator::Ephemeral, Some(credential))?;
        assert!(session.store().is_encrypted());
        assert!(session.store().is_open());

        session.release();
        session.release();
        assert!(!session.store().is_open());
        Ok(())
    }

    #[test]
    fn test_mount_on_missing_directory_fails() -> Result<()> {
        let mut backend = FuseBackend;
        let mut session = backend.open_session(&DatabaseLocator::Ephemeral, None)?;
        let options = MountOptions::assemble::<&str>(&[]);

        let result = backend.mount(&mut session, Path::new("/no/such/mountpoint"), &options);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_release_without_session_is_noop() {
        let mut mount = FuseMount {
            session: None,
            mountpoint: PathBuf::from("/mnt/x"),
        };
        mount.release();
        assert!(FuseBackend.run(&mut mount).is_err());
    }
}
