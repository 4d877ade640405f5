//! Mount option handling.
//!
//! `-o` arguments carry two disjoint namespaces: options for the mount layer
//! and options consumed by sqlmount itself. [`partition`] separates them and
//! [`MountOptions::assemble`] builds the final set handed to the mount layer.

use super::constants::{FS_NAME, MOUNT_LAYER_DEFAULTS, RESTRICTIVE_DEFAULTS};
use fuser::MountOption;
use log::warn;
use std::path::PathBuf;
use zeroize::Zeroizing;

const PASSWORD_KEY: &str = "password";
const CREDENTIALS_KEY: &str = "credentials";
const ENCRYPT_FLAG: &str = "encrypt";

/// Options consumed by sqlmount rather than the mount layer.
#[derive(Debug, Default)]
pub struct SystemOptions {
    /// Passphrase given inline; zeroized when dropped or replaced
    pub password: Option<Zeroizing<String>>,
    /// File holding the passphrase
    pub credentials_path: Option<PathBuf>,
    /// Encryption requested through `-o encrypt`
    pub encrypt: bool,
}

/// Result of splitting the raw `-o` arguments.
#[derive(Debug, Default)]
pub struct OptionSet {
    /// Tokens for the mount layer, in command-line order
    pub mount_options: Vec<String>,
    pub system_options: SystemOptions,
}

/// Splits raw `-o` arguments into mount-layer and system options.
///
/// Each argument may hold several comma-separated tokens. When `password=`
/// or `credentials=` appears more than once the last occurrence wins.
pub fn partition<S: AsRef<str>>(raw_options: &[S]) -> OptionSet {
    let mut set = OptionSet::default();

    for token in raw_options
        .iter()
        .flat_map(|raw| raw.as_ref().split(','))
        .filter(|token| !token.is_empty())
    {
        if let Some(value) = token.strip_prefix("password=") {
            if set.system_options.password.is_some() {
                warn!("option '{}' given more than once, using the last one", PASSWORD_KEY);
            }
            set.system_options.password = Some(Zeroizing::new(value.to_string()));
        } else if let Some(value) = token.strip_prefix("credentials=") {
            if set.system_options.credentials_path.is_some() {
                warn!("option '{}' given more than once, using the last one", CREDENTIALS_KEY);
            }
            set.system_options.credentials_path = Some(PathBuf::from(value));
        } else if token == ENCRYPT_FLAG {
            set.system_options.encrypt = true;
        } else {
            set.mount_options.push(token.to_string());
        }
    }

    set
}

fn option_key(token: &str) -> &str {
    token.split_once('=').map_or(token, |(key, _)| key)
}

/// The final, ordered option set passed to the mount layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    options: Vec<String>,
}

impl MountOptions {
    /// Starts from the mount layer defaults, adds the identity options,
    /// drops restrictive permission defaults and merges `user` on top.
    pub fn assemble<S: AsRef<str>>(user: &[S]) -> Self {
        let mut set = Self {
            options: MOUNT_LAYER_DEFAULTS.iter().map(|o| o.to_string()).collect(),
        };
        set.insert(&format!("fsname={}", FS_NAME));
        set.insert(&format!("subtype={}", FS_NAME));
        set.options.retain(|o| !RESTRICTIVE_DEFAULTS.contains(&o.as_str()));

        for option in user {
            set.insert(option.as_ref());
        }
        set
    }

    /// Inserts `option`, replacing any earlier option with the same key.
    pub fn insert(&mut self, option: &str) {
        let key = option_key(option);
        match self.options.iter_mut().find(|o| option_key(o) == key) {
            Some(existing) => *existing = option.to_string(),
            None => self.options.push(option.to_string()),
        }
    }

    pub fn contains(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(String::as_str)
    }

    /// Converts to the typed options understood by `fuser`.
    pub fn to_fuser(&self) -> Vec<MountOption> {
        self.iter().map(to_mount_option).collect()
    }
}

fn to_mount_option(option: &str) -> MountOption {
    match option.split_once('=') {
        Some(("fsname", name)) => MountOption::FSName(name.to_string()),
        Some(("subtype", name)) => MountOption::Subtype(name.to_string()),
        Some(_) => MountOption::CUSTOM(option.to_string()),
        None => match option {
            "ro" => MountOption::RO,
            "rw" => MountOption::RW,
            "allow_other" => MountOption::AllowOther,
            "allow_root" => MountOption::AllowRoot,
            "auto_unmount" => MountOption::AutoUnmount,
            "default_permissions" => MountOption::DefaultPermissions,
            "dev" => MountOption::Dev,
            "nodev" => MountOption::NoDev,
            "suid" => MountOption::Suid,
            "nosuid" => MountOption::NoSuid,
            "exec" => MountOption::Exec,
            "noexec" => MountOption::NoExec,
            "atime" => MountOption::Atime,
            "noatime" => MountOption::NoAtime,
            "dirsync" => MountOption::DirSync,
            "sync" => MountOption::Sync,
            "async" => MountOption::Async,
            other => MountOption::CUSTOM(other.to_string()),
        },
    }
}
