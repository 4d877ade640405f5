use super::constants::{DAEMON_WORK_DIR, NULL_DEVICE};
use anyhow::{Context, Result};
use log::{error, info};
use nix::sys::stat::{self, Mode};
use nix::unistd::{self, ForkResult, Pid};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Detaches the running process from its terminal.
pub trait Detach {
    fn detach(&mut self) -> Result<()>;
}

/// Process-level primitives used while daemonizing.
pub trait ProcessOps {
    fn umask(&mut self, mode: Mode);
    fn chdir(&mut self, dir: &Path) -> Result<()>;
    fn fork(&mut self) -> Result<ForkResult>;
    fn setsid(&mut self) -> Result<Pid>;
    fn redirect_stdio(&mut self, device: &Path) -> Result<()>;
    /// Terminates an intermediate parent without running destructors, so
    /// the mount it shares with the child stays up.
    fn exit_parent(&mut self) -> !;
}

/// The real thing, backed by `nix`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Posix;

impl ProcessOps for Posix {
    fn umask(&mut self, mode: Mode) {
        stat::umask(mode);
    }

    fn chdir(&mut self, dir: &Path) -> Result<()> {
        unistd::chdir(dir).with_context(|| format!("cannot change directory to {}", dir.display()))
    }

    fn fork(&mut self) -> Result<ForkResult> {
        // SAFETY: no other threads exist yet; the interrupt watcher is only
        // started once detaching is complete.
        Ok(unsafe { unistd::fork() }?)
    }

    fn setsid(&mut self) -> Result<Pid> {
        Ok(unistd::setsid()?)
    }

    fn redirect_stdio(&mut self, device: &Path) -> Result<()> {
        let null_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .with_context(|| format!("cannot open {}", device.display()))?;
        let null_fd = null_file.as_raw_fd();

        for fd in 0..3 {
            unistd::dup2(null_fd, fd)?;
        }
        Ok(())
    }

    fn exit_parent(&mut self) -> ! {
        std::process::exit(0)
    }
}

/// A Unix daemon process manager.
///
/// Detaches with the classic double fork and optionally records the PID of
/// the surviving process.
pub struct Daemon<P: ProcessOps = Posix> {
    ops: P,
    pid_file: Option<PathBuf>,
    work_dir: PathBuf,
}

impl Daemon<Posix> {
    /// Creates a daemon that detaches the current process.
    ///
    /// # Arguments
    ///
    /// * `pid_file` - Where to write the daemon's process ID, if anywhere
    pub fn new(pid_file: Option<PathBuf>) -> Self {
        Self::with_ops(Posix, pid_file)
    }
}

impl<P: ProcessOps> Daemon<P> {
    pub fn with_ops(ops: P, pid_file: Option<PathBuf>) -> Self {
        Self {
            ops,
            pid_file,
            work_dir: PathBuf::from(DAEMON_WORK_DIR),
        }
    }

    /// Detaches the process.
    ///
    /// This method:
    /// 1. Clears the file creation mask
    /// 2. Changes the working directory to `/` so no mount is pinned
    /// 3. Forks and exits the parent
    /// 4. Starts a new session, dropping the controlling terminal
    /// 5. Forks again so the daemon can never reacquire a terminal
    /// 6. Points stdin, stdout and stderr at `/dev/null`
    ///
    /// Returns in the final grandchild only.
    pub fn start(&mut self) -> Result<()> {
        self.ops.umask(Mode::empty());
        self.ops.chdir(&self.work_dir)?;

        self.fork_and_exit_parent("First")?;
        self.ops.setsid().context("cannot start a new session")?;
        self.fork_and_exit_parent("Second")?;

        self.ops.redirect_stdio(Path::new(NULL_DEVICE))?;

        if let Some(pid_file) = &self.pid_file {
            write_pid_file(pid_file)?;
        }

        info!("Daemon started with pid {}", std::process::id());
        Ok(())
    }

    fn fork_and_exit_parent(&mut self, which: &str) -> Result<()> {
        match self.ops.fork() {
            Ok(ForkResult::Parent { .. }) => self.ops.exit_parent(),
            Ok(ForkResult::Child) => Ok(()),
            Err(err) => {
                error!("{} fork failed: {}", which, err);
                Err(err)
            }
        }
    }
}

impl<P: ProcessOps> Detach for Daemon<P> {
    fn detach(&mut self) -> Result<()> {
        self.start()
    }
}

fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    let mut file =
        File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    writeln!(file, "{}", pid)?;
    Ok(())
}
