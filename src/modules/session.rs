//! Session lifecycle.
//!
//! Drives a [`Backend`] through open, mount, optional detach and run. The
//! session and mount handles are held in [`Guard`]s so that both are
//! released exactly once, mount first, on every exit path.

use super::credential::Credential;
use super::daemon::Detach;
use super::error::{BootstrapError, Result};
use super::options::MountOptions;
use super::request::{DatabaseLocator, MountRequest};
use log::{debug, info};
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// How the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The filesystem was unmounted from outside
    Completed,
    /// An operator interrupt asked for shutdown
    Interrupted,
}

/// A resource that has to be given back explicitly.
pub trait Release {
    /// Releases the resource. Called at most once by [`Guard`].
    fn release(&mut self);
}

/// The filesystem session collaborator.
pub trait Backend {
    /// Open backing store
    type Session: Release;
    /// Established mount
    type Mount: Release;

    /// Opens the store at `locator`, keyed with `credential` if given.
    fn open_session(
        &mut self,
        locator: &DatabaseLocator,
        credential: Option<Credential>,
    ) -> anyhow::Result<Self::Session>;

    /// Performs the mount handshake.
    fn mount(
        &mut self,
        session: &mut Self::Session,
        mountpoint: &Path,
        options: &MountOptions,
    ) -> anyhow::Result<Self::Mount>;

    /// Serves requests until unmounted or interrupted.
    fn run(&mut self, mount: &mut Self::Mount) -> anyhow::Result<RunExit>;
}

/// Releases the wrapped resource when dropped, unless already released.
pub struct Guard<T: Release> {
    resource: T,
    name: &'static str,
    released: bool,
}

impl<T: Release> Guard<T> {
    pub fn new(resource: T, name: &'static str) -> Self {
        Self {
            resource,
            name,
            released: false,
        }
    }

    /// Releases now. Further calls, including the one from `Drop`, do nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.resource.release();
            debug!("Released {}", self.name);
        }
    }
}

impl<T: Release> Deref for Guard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.resource
    }
}

impl<T: Release> DerefMut for Guard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.resource
    }
}

impl<T: Release> Drop for Guard<T> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Mounts and serves the store described by `request`.
///
/// `credential` is moved into the backend when the session is opened and is
/// not reachable from here afterwards. Detaching happens only when the mount
/// handshake has succeeded, so mount failures still reach the terminal.
pub fn run<B: Backend>(
    backend: &mut B,
    detach: &mut dyn Detach,
    request: &MountRequest,
    mount_options: &[String],
    credential: Option<Credential>,
) -> Result<RunExit> {
    let options = MountOptions::assemble(mount_options);
    debug!("Mount options: {}", options.iter().collect::<Vec<_>>().join(","));

    let session = backend
        .open_session(&request.database, credential)
        .map_err(|source| BootstrapError::OpenFailed {
            locator: request.database.to_string(),
            source,
        })?;
    let mut session = Guard::new(session, "session");

    let mount = backend
        .mount(&mut session, &request.mountpoint, &options)
        .map_err(|source| BootstrapError::MountFailed {
            mountpoint: request.mountpoint.clone(),
            source,
        })?;
    let mut mount = Guard::new(mount, "mount");
    info!(
        "Mounted {} on {}",
        request.database,
        request.mountpoint.display()
    );

    if !request.foreground {
        detach.detach().map_err(BootstrapError::Daemonize)?;
    }

    let exit = backend.run(&mut mount).map_err(BootstrapError::Runtime)?;
    match exit {
        RunExit::Interrupted => info!("Interrupted, shutting down"),
        RunExit::Completed => info!("Filesystem unmounted, shutting down"),
    }

    mount.release();
    session.release();
    Ok(exit)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn stubs() -> (StubBackend, StubDetach) {
        let backend = StubBackend::default();
        let detach = StubDetach {
            events: backend.events.clone(),
        };
        (backend, detach)
    }

    #[test]
    fn test_foreground_run_releases_in_reverse_order() -> Result<()> {
        let (mut backend, mut detach) = stubs();
        let request = MountRequest::new(":memory:", "/mnt/x").foreground(true);

        let exit = run(&mut backend, &mut detach, &request, &[], None)?;

        assert_eq!(exit, RunExit::Interrupted);
        assert_eq!(
            *backend.events.borrow(),
            vec!["open", "mount", "run", "release mount", "release session"]
        );
        Ok(())
    }

    #[test]
    fn test_background_detaches_between_mount_and_run() -> Result<()> {
        let (mut backend, mut detach) = stubs();
        backend.exit = Some(RunExit::Completed);
        let request = MountRequest::new(":memory:", "/mnt/x");

        assert_eq!(run(&mut backend, &mut detach, &request, &[], None)?, RunExit::Completed);
        assert_eq!(
            backend.events.borrow()[..4].to_vec(),
            vec!["open", "mount", "detach", "run"]
        );
        Ok(())
    }

    #[test]
    fn test_mount_failure_releases_session_without_detaching() {
        let (mut backend, mut detach) = stubs();
        backend.fail_mount = true;
        let request = MountRequest::new(":memory:", "/mnt/x");

        let result = run(&mut backend, &mut detach, &request, &[], None);

        assert!(matches!(result, Err(BootstrapError::MountFailed { .. })));
        assert_eq!(
            *backend.events.borrow(),
            vec!["open", "mount", "release session"]
        );
    }

    #[test]
    fn test_run_failure_releases_both_once() {
        let (mut backend, mut detach) = stubs();
        backend.fail_run = true;
        let request = MountRequest::new(":memory:", "/mnt/x").foreground(true);

        let result = run(&mut backend, &mut detach, &request, &[], None);

        assert!(matches!(result, Err(BootstrapError::Runtime(_))));
        assert_eq!(count(&backend.events, "release mount"), 1);
        assert_eq!(count(&backend.events, "release session"), 1);
        let events = backend.events.borrow();
        assert_eq!(events[events.len() - 2..].to_vec(), vec!["release mount", "release session"]);
    }

    #[test]
    fn test_guard_release_is_idempotent() {
        let events = Events::default();
        {
            let mut guard = Guard::new(
                StubHandle {
                    name: "session",
                    events: events.clone(),
                },
                "session",
            );
            guard.release();
            guard.release();
        }
        assert_eq!(count(&events, "release session"), 1);
    }
}
