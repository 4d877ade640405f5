//! Passphrase resolution.
//!
//! When the store has to be encrypted, exactly one passphrase is resolved
//! from the first available source:
//!
//! 1. `-o password=...`
//! 2. the `SQLMOUNT_PASSWORD` environment variable
//! 3. the file named by `-o credentials=...`
//! 4. a random passphrase, for in-memory databases
//! 5. an interactive prompt on the controlling terminal
//!
//! Resolution removes every plaintext copy it finds in the option map and
//! the environment, whether or not that copy ended up being used.

use super::constants::{
    EPHEMERAL_KEY_ALPHABET, EPHEMERAL_KEY_LEN, PASSWORD_VAR, TTY_DEVICE,
};
use super::env::Environment;
use super::error::{BootstrapError, Result};
use super::options::SystemOptions;
use super::request::MountRequest;
use log::{debug, info};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::ffi::OsStringExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use zeroize::{Zeroize, Zeroizing};

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Option,
    Environment,
    File,
    Generated,
    Prompt,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Option => "mount option",
            Self::Environment => PASSWORD_VAR,
            Self::File => "credentials file",
            Self::Generated => "generated key",
            Self::Prompt => "terminal prompt",
        };
        f.write_str(name)
    }
}

/// A resolved passphrase. Zeroized on drop, never printed.
pub struct Credential {
    secret: Zeroizing<String>,
    source: CredentialSource,
}

impl Credential {
    pub fn new(secret: Zeroizing<String>, source: CredentialSource) -> Self {
        Self { secret, source }
    }

    pub fn expose(&self) -> &str {
        &self.secret
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Hands the secret over, keeping it wrapped.
    pub fn into_secret(self) -> Zeroizing<String> {
        self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Reads a passphrase from a human.
pub trait PassphrasePrompt {
    fn read_passphrase(&self, prompt: &str) -> Result<Zeroizing<String>>;
}

/// Prompts on the controlling terminal with echo disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

struct EchoGuard {
    fd: RawFd,
    original: Termios,
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(self.fd, SetArg::TCSANOW, &self.original);
    }
}

impl PassphrasePrompt for TerminalPrompt {
    fn read_passphrase(&self, prompt: &str) -> Result<Zeroizing<String>> {
        let unavailable = |reason: &str, err: std::io::Error| BootstrapError::CredentialUnavailable {
            reason: reason.to_string(),
            source: Some(err),
        };

        let mut tty = OpenOptions::new()
            .read(true)
            .write(true)
            .open(TTY_DEVICE)
            .map_err(|e| unavailable("no controlling terminal to prompt on", e))?;
        let fd = tty.as_raw_fd();

        let original =
            termios::tcgetattr(fd).map_err(|e| unavailable("cannot query terminal", e.into()))?;
        let mut silent = original.clone();
        silent.local_flags.remove(LocalFlags::ECHO);
        silent.local_flags.insert(LocalFlags::ECHONL);
        termios::tcsetattr(fd, SetArg::TCSANOW, &silent)
            .map_err(|e| unavailable("cannot disable terminal echo", e.into()))?;
        let _restore = EchoGuard { fd, original };

        tty.write_all(prompt.as_bytes())
            .and_then(|_| tty.flush())
            .map_err(|e| unavailable("cannot write to terminal", e))?;

        let mut line = Zeroizing::new(Vec::with_capacity(256));
        let mut byte = [0u8; 1];
        loop {
            match tty.read(&mut byte) {
                Ok(0) => break,
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => line.push(byte[0]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(unavailable("cannot read from terminal", e)),
            }
        }
        byte.zeroize();
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        utf8_secret(std::mem::take(&mut *line), "terminal input")
    }
}

fn utf8_secret(bytes: Vec<u8>, what: &str) -> Result<Zeroizing<String>> {
    match String::from_utf8(bytes) {
        Ok(secret) => Ok(Zeroizing::new(secret)),
        Err(err) => {
            err.into_bytes().zeroize();
            Err(BootstrapError::credential(format!("{} is not valid UTF-8", what)))
        }
    }
}

/// Whether the store must be encrypted.
///
/// Checked in a fixed order and short-circuiting: inline password, password
/// variable, credentials file, `-o encrypt`, `--encrypt`.
pub fn encryption_required<E: Environment>(
    request: &MountRequest,
    options: &SystemOptions,
    env: &E,
) -> bool {
    options.password.is_some()
        || env.contains(PASSWORD_VAR)
        || options.credentials_path.is_some()
        || options.encrypt
        || request.encrypt
}

/// Resolves the passphrase, removing every plaintext copy from `options`
/// and `env` along the way.
pub fn resolve<E: Environment>(
    request: &MountRequest,
    options: &mut SystemOptions,
    env: &mut E,
    prompt: &dyn PassphrasePrompt,
) -> Result<Credential> {
    let from_option = options.password.take();
    let from_env = env
        .take_var(PASSWORD_VAR)
        .map(|value| Zeroizing::new(value.into_vec()));
    let credentials_path = options.credentials_path.take();

    let credential = if let Some(secret) = from_option {
        Credential::new(secret, CredentialSource::Option)
    } else if let Some(mut value) = from_env {
        let secret = utf8_secret(std::mem::take(&mut *value), PASSWORD_VAR)?;
        Credential::new(secret, CredentialSource::Environment)
    } else if let Some(path) = credentials_path {
        Credential::new(read_credentials_file(&path)?, CredentialSource::File)
    } else if request.database.is_ephemeral() {
        debug!("in-memory database, generating a throwaway key");
        Credential::new(random_passphrase(), CredentialSource::Generated)
    } else {
        let secret = prompt.read_passphrase(&format!("Passphrase for {}: ", request.database))?;
        Credential::new(secret, CredentialSource::Prompt)
    };

    if credential.expose().is_empty() {
        return Err(BootstrapError::credential(format!(
            "empty passphrase from {}",
            credential.source()
        )));
    }

    info!("Using passphrase from {}", credential.source());
    Ok(credential)
}

fn read_credentials_file(path: &Path) -> Result<Zeroizing<String>> {
    let content = fs::read(path).map_err(|e| BootstrapError::CredentialUnavailable {
        reason: format!("cannot read credentials file {}", path.display()),
        source: Some(e),
    })?;

    let content = utf8_secret(content, "credentials file")?;
    let trimmed = content.trim();
    if trimmed.len() == content.len() {
        return Ok(content);
    }
    Ok(Zeroizing::new(trimmed.to_string()))
}

/// 32 letters drawn uniformly from `[A-Za-z]` using the OS generator.
pub fn random_passphrase() -> Zeroizing<String> {
    let mut secret = Zeroizing::new(String::with_capacity(EPHEMERAL_KEY_LEN));
    for _ in 0..EPHEMERAL_KEY_LEN {
        if let Some(&c) = EPHEMERAL_KEY_ALPHABET.choose(&mut OsRng) {
            secret.push(char::from(c));
        }
    }
    secret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::env::MemoryEnv;
    use crate::modules::options::partition;
    use std::cell::Cell;

    /// Prompt stand-in that counts how often it was asked.
    struct FakePrompt {
        answer: Option<&'static str>,
        calls: Cell<usize>,
    }

    impl FakePrompt {
        fn answering(answer: &'static str) -> Self {
            Self { answer: Some(answer), calls: Cell::new(0) }
        }

        fn without_terminal() -> Self {
            Self { answer: None, calls: Cell::new(0) }
        }
    }

    impl PassphrasePrompt for FakePrompt {
        fn read_passphrase(&self, _prompt: &str) -> Result<Zeroizing<String>> {
            self.calls.set(self.calls.get() + 1);
            self.answer
                .map(|a| Zeroizing::new(a.to_string()))
                .ok_or_else(|| BootstrapError::credential("no controlling terminal"))
        }
    }

    fn file_request() -> MountRequest {
        MountRequest::new("/var/db/fs.sqlite", "/mnt/x")
    }

    #[test]
    fn test_not_required_without_sources() {
        let request = file_request();
        let set = partition(&["ro"]);
        assert!(!encryption_required(&request, &set.system_options, &MemoryEnv::new()));
    }

    #[test]
    fn test_required_by_each_source() {
        let env = MemoryEnv::new();
        for raw in ["password=x", "credentials=/k", "encrypt"] {
            let set = partition(&[raw]);
            assert!(encryption_required(&file_request(), &set.system_options, &env), "{}", raw);
        }

        let set = partition::<&str>(&[]);
        let env = MemoryEnv::new().with(PASSWORD_VAR, "x");
        assert!(encryption_required(&file_request(), &set.system_options, &env));
        assert!(encryption_required(
            &file_request().encrypt(true),
            &set.system_options,
            &MemoryEnv::new()
        ));
    }

    #[test]
    fn test_option_password_wins_and_all_copies_removed() -> Result<()> {
        let mut set = partition(&["password=from-option,credentials=/nonexistent"]);
        let mut env = MemoryEnv::new().with(PASSWORD_VAR, "from-env");
        let prompt = FakePrompt::without_terminal();

        let credential = resolve(&file_request(), &mut set.system_options, &mut env, &prompt)?;

        assert_eq!(credential.expose(), "from-option");
        assert_eq!(credential.source(), CredentialSource::Option);
        assert!(set.system_options.password.is_none());
        assert!(set.system_options.credentials_path.is_none());
        assert!(!env.contains(PASSWORD_VAR));
        Ok(())
    }

    #[test]
    fn test_environment_password_taken() -> Result<()> {
        let mut set = partition(&["encrypt"]);
        let mut env = MemoryEnv::new().with(PASSWORD_VAR, "from-env").with("HOME", "/root");
        let prompt = FakePrompt::without_terminal();

        let credential = resolve(&file_request(), &mut set.system_options, &mut env, &prompt)?;

        assert_eq!(credential.expose(), "from-env");
        assert_eq!(credential.source(), CredentialSource::Environment);
        assert!(env.var(PASSWORD_VAR).is_none());
        assert!(env.contains("HOME"));
        Ok(())
    }

    #[test]
    fn test_credentials_file_trimmed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("key");
        fs::write(&path, "  hunter2 \n")?;

        let raw = format!("credentials={}", path.display());
        let mut set = partition(&[raw]);
        let prompt = FakePrompt::without_terminal();
        let credential =
            resolve(&file_request(), &mut set.system_options, &mut MemoryEnv::new(), &prompt)?;

        assert_eq!(credential.expose(), "hunter2");
        assert_eq!(credential.source(), CredentialSource::File);
        Ok(())
    }

    #[test]
    fn test_missing_credentials_file_fails() {
        let mut set = partition(&["credentials=/definitely/not/here"]);
        let prompt = FakePrompt::answering("unused");
        let err = resolve(&file_request(), &mut set.system_options, &mut MemoryEnv::new(), &prompt)
            .unwrap_err();

        match err {
            BootstrapError::CredentialUnavailable { source, .. } => assert!(source.is_some()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(prompt.calls.get(), 0);
    }

    #[test]
    fn test_ephemeral_generates_letters() -> Result<()> {
        let request = MountRequest::new(":memory:", "/mnt/x").encrypt(true);
        let prompt = FakePrompt::without_terminal();

        let first = resolve(&request, &mut SystemOptions::default(), &mut MemoryEnv::new(), &prompt)?;
        let second = resolve(&request, &mut SystemOptions::default(), &mut MemoryEnv::new(), &prompt)?;

        assert_eq!(first.source(), CredentialSource::Generated);
        assert_eq!(first.expose().len(), EPHEMERAL_KEY_LEN);
        assert!(first.expose().bytes().all(|b| b.is_ascii_alphabetic()));
        assert_ne!(first.expose(), second.expose());
        assert_eq!(prompt.calls.get(), 0);
        Ok(())
    }

    #[test]
    fn test_prompt_is_last_resort() -> Result<()> {
        let request = file_request().encrypt(true);
        let prompt = FakePrompt::answering("typed");

        let credential =
            resolve(&request, &mut SystemOptions::default(), &mut MemoryEnv::new(), &prompt)?;

        assert_eq!(credential.expose(), "typed");
        assert_eq!(prompt.calls.get(), 1);
        Ok(())
    }

    #[test]
    fn test_no_terminal_is_unavailable() {
        let request = file_request().encrypt(true);
        let prompt = FakePrompt::without_terminal();
        let result = resolve(&request, &mut SystemOptions::default(), &mut MemoryEnv::new(), &prompt);
        assert!(matches!(result, Err(BootstrapError::CredentialUnavailable { .. })));
    }

    #[test]
    fn test_empty_password_rejected() {
        let mut set = partition(&["password="]);
        let prompt = FakePrompt::without_terminal();
        let result = resolve(&file_request(), &mut set.system_options, &mut MemoryEnv::new(), &prompt);
        assert!(result.is_err());
        assert!(set.system_options.password.is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::new(Zeroizing::new("s3cret".into()), CredentialSource::Option);
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("redacted"));
    }
}
