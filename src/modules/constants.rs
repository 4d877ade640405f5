use std::time::Duration;

// Identity
pub const FS_NAME: &str = "sqlmount";

// Database locator that selects an in-memory store
pub const EPHEMERAL_LOCATOR: &str = ":memory:";

// Environment
pub const PRELOAD_VAR: &str = "LD_PRELOAD";
pub const PASSWORD_VAR: &str = "SQLMOUNT_PASSWORD";
pub const CIPHER_LIBRARY_VAR: &str = "SQLMOUNT_CIPHER_LIBRARY";
pub const DEFAULT_CIPHER_LIBRARY: &str = "libsqlcipher.so";

// Generated passphrase for ephemeral stores
pub const EPHEMERAL_KEY_LEN: usize = 32;
pub const EPHEMERAL_KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

// Mount layer
pub const MOUNT_LAYER_DEFAULTS: &[&str] = &["default_permissions"];
pub const RESTRICTIVE_DEFAULTS: &[&str] = &["default_permissions"];

// Daemon
pub const DAEMON_WORK_DIR: &str = "/";
pub const NULL_DEVICE: &str = "/dev/null";
pub const TTY_DEVICE: &str = "/dev/tty";

// File system constants
pub const TTL: Duration = Duration::from_secs(1);
pub const ROOT_INODE: u64 = 1;
pub const ROOT_PERMISSION: u16 = 0o555;
pub const BLOCK_SIZE: u32 = 512;
