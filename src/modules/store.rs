//! Backing store handle.
//!
//! Storage itself lives outside this crate. [`Store`] stands in for it:
//! it checks that the locator is usable, holds the key until the session is
//! closed and serves an empty read-only root so a mount can be exercised end
//! to end.

use super::constants::{BLOCK_SIZE, ROOT_INODE, ROOT_PERMISSION, TTL};
use super::request::DatabaseLocator;
use anyhow::{bail, Result};
use fuser::{FileAttr, FileType, Filesystem, ReplyAttr, ReplyDirectory, ReplyEntry, Request};
use libc::{ENOENT, ENOTDIR};
use log::{debug, info};
use nix::unistd::{getgid, getuid};
use parking_lot::Mutex;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

struct StoreState {
    key: Option<Zeroizing<String>>,
    open: bool,
}

/// An opened backing store.
pub struct Store {
    locator: DatabaseLocator,
    encrypted: bool,
    opened_at: SystemTime,
    state: Mutex<StoreState>,
}

impl Store {
    /// Opens the store at `locator`, keyed with `key` when encrypted.
    pub fn open(locator: &DatabaseLocator, key: Option<Zeroizing<String>>) -> Result<Self> {
        if let DatabaseLocator::File(path) = locator {
            if path.is_dir() {
                bail!("{} is a directory", path.display());
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if !parent.is_dir() {
                    bail!("directory {} does not exist", parent.display());
                }
            }
        }

        let encrypted = key.is_some();
        info!(
            "Opened store {} ({})",
            locator,
            if encrypted { "encrypted" } else { "plain" }
        );

        Ok(Self {
            locator: locator.clone(),
            encrypted,
            opened_at: SystemTime::now(),
            state: Mutex::new(StoreState { key, open: true }),
        })
    }

    pub fn locator(&self) -> &DatabaseLocator {
        &self.locator
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Closes the store and wipes the key. Safe to call more than once.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.open {
            state.open = false;
            state.key = None;
            debug!("Closed store {}", self.locator);
        }
    }

    fn root_attr(&self) -> FileAttr {
        FileAttr {
            ino: ROOT_INODE,
            size: 0,
            blocks: 0,
            atime: self.opened_at,
            mtime: self.opened_at,
            ctime: self.opened_at,
            crtime: UNIX_EPOCH,
            kind: FileType::Directory,
            perm: ROOT_PERMISSION,
            nlink: 2,
            uid: getuid().as_raw(),
            gid: getgid().as_raw(),
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE,
        }
    }
}

/// The store seen through the FUSE interface.
#[derive(Clone)]
pub struct StoreFs {
    store: Arc<Store>,
}

impl StoreFs {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn root_entries(offset: i64) -> impl Iterator<Item = (i64, &'static str)> {
        [".", ".."]
            .into_iter()
            .enumerate()
            .skip(offset.max(0) as usize)
            .map(|(i, name)| ((i + 1) as i64, name))
    }
}

impl Filesystem for StoreFs {
    fn destroy(&mut self) {
        self.store.close();
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup parent={} name={:?}", parent, name);
        if parent == ROOT_INODE {
            reply.error(ENOENT);
        } else {
            reply.error(ENOTDIR);
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        if ino == ROOT_INODE {
            reply.attr(&TTL, &self.store.root_attr());
        } else {
            reply.error(ENOENT);
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != ROOT_INODE {
            reply.error(ENOENT);
            return;
        }

        for (next, name) in Self::root_entries(offset) {
            if reply.add(ROOT_INODE, next, FileType::Directory, name) {
                break;
            }
        }
        reply.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_open_ephemeral() -> Result<()> {
        let store = Store::open(&DatabaseLocator::Ephemeral, None)?;
        assert!(store.is_open());
        assert!(!store.is_encrypted());
        Ok(())
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let locator = DatabaseLocator::File(PathBuf::from("/no/such/dir/fs.sqlite"));
        assert!(Store::open(&locator, None).is_err());
    }

    #[test]
    fn test_open_directory_fails() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let locator = DatabaseLocator::File(dir.path().to_path_buf());
        assert!(Store::open(&locator, None).is_err());
        Ok(())
    }

    #[test]
    fn test_close_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let locator = DatabaseLocator::File(dir.path().join("fs.sqlite"));
        let store = Store::open(&locator, Some(Zeroizing::new("key".into())))?;
        assert!(store.is_encrypted());

        store.close();
        store.close();
        assert!(!store.is_open());
        assert!(store.state.lock().key.is_none());
        Ok(())
    }

    #[test]
    fn test_root_attributes() -> Result<()> {
        let store = Store::open(&DatabaseLocator::Ephemeral, None)?;
        let attr = store.root_attr();
        assert_eq!(attr.ino, ROOT_INODE);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o555);
        Ok(())
    }

    #[test]
    fn test_root_listing_offsets() {
        let all: Vec<_> = StoreFs::root_entries(0).collect();
        assert_eq!(all, vec![(1, "."), (2, "..")]);
        let rest: Vec<_> = StoreFs::root_entries(1).collect();
        assert_eq!(rest, vec![(2, "..")]);
        assert_eq!(StoreFs::root_entries(2).count(), 0);
    }
}
