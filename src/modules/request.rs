use super::constants::EPHEMERAL_LOCATOR;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the backing database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocator {
    /// In-memory database, gone when the session ends
    Ephemeral,
    /// Database file on disk
    File(PathBuf),
}

impl DatabaseLocator {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral)
    }
}

impl From<&str> for DatabaseLocator {
    fn from(value: &str) -> Self {
        if value == EPHEMERAL_LOCATOR {
            Self::Ephemeral
        } else {
            Self::File(PathBuf::from(value))
        }
    }
}

impl From<PathBuf> for DatabaseLocator {
    fn from(value: PathBuf) -> Self {
        if value.as_os_str() == EPHEMERAL_LOCATOR {
            Self::Ephemeral
        } else {
            Self::File(value)
        }
    }
}

impl fmt::Display for DatabaseLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ephemeral => f.write_str(EPHEMERAL_LOCATOR),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Everything the invocation asked for. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct MountRequest {
    pub database: DatabaseLocator,
    pub mountpoint: PathBuf,
    /// Raw `-o` arguments, each possibly comma-joined
    pub raw_options: Vec<String>,
    /// `-e/--encrypt`
    pub encrypt: bool,
    /// `-f/--foreground`
    pub foreground: bool,
}

impl MountRequest {
    pub fn new(database: impl Into<DatabaseLocator>, mountpoint: impl AsRef<Path>) -> Self {
        Self {
            database: database.into(),
            mountpoint: mountpoint.as_ref().to_path_buf(),
            raw_options: Vec::new(),
            encrypt: false,
            foreground: false,
        }
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn foreground(mut self, foreground: bool) -> Self {
        self.foreground = foreground;
        self
    }
}
