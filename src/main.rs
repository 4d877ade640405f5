use anyhow::Context;
use clap::Parser;
use log::{error, info, LevelFilter};
use sqlmount::modules::constants::{CIPHER_LIBRARY_VAR, DEFAULT_CIPHER_LIBRARY};
use sqlmount::{
    Bootstrap, BootstrapError, CurrentExe, Daemon, DatabaseLocator, FuseBackend, MountRequest,
    ProcessEnv, RunExit, TerminalPrompt,
};
use std::error::Error;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Mount a SQLite-backed filesystem, transparently encrypted on demand
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database file (default: `:memory:`) followed by the mount point
    #[arg(value_name = "[DATABASE] MOUNTPOINT", num_args = 1..=2, required = true)]
    targets: Vec<PathBuf>,

    /// Mount options, comma separated; may be repeated
    #[arg(short = 'o', long = "options", value_name = "OPTIONS")]
    options: Vec<String>,

    /// Encrypt the database even without a passphrase source
    #[arg(short, long)]
    encrypt: bool,

    /// Stay in the foreground instead of daemonizing
    #[arg(short, long)]
    foreground: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Write log records to this file; the only log sink once daemonized
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Write the daemon's process ID to this file
    #[arg(long, value_name = "PATH")]
    pid_file: Option<PathBuf>,

    /// Library preloaded to provide encryption
    #[arg(long, env = CIPHER_LIBRARY_VAR, default_value = DEFAULT_CIPHER_LIBRARY)]
    cipher_library: String,
}

impl Cli {
    fn request(&self) -> Result<MountRequest, BootstrapError> {
        let (database, mountpoint) = match self.targets.as_slice() {
            [mountpoint] => (DatabaseLocator::Ephemeral, mountpoint),
            [database, mountpoint] => (DatabaseLocator::from(database.clone()), mountpoint),
            _ => {
                return Err(BootstrapError::Configuration(
                    "expected [DATABASE] MOUNTPOINT".into(),
                ))
            }
        };

        if !mountpoint.is_dir() {
            return Err(BootstrapError::Configuration(format!(
                "mount point {} is not a directory",
                mountpoint.display()
            )));
        }

        Ok(MountRequest::new(database, mountpoint)
            .options(self.options.iter().cloned())
            .encrypt(self.encrypt)
            .foreground(self.foreground))
    }
}

/// Makes `path` independent of the working directory, which the daemon
/// changes to `/`.
fn absolute(path: &Path) -> Result<PathBuf, BootstrapError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|e| BootstrapError::Configuration(format!("cannot resolve {}: {}", path.display(), e)))
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(log_level).parse_default_env();

    if let Some(path) = &cli.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}

fn run(cli: &Cli) -> Result<RunExit, BootstrapError> {
    let request = cli.request()?;
    let pid_file = cli.pid_file.as_deref().map(absolute).transpose()?;

    let bootstrap = Bootstrap {
        env: &mut ProcessEnv,
        replacer: &CurrentExe,
        prompt: &TerminalPrompt,
        cipher_library: &cli.cipher_library,
    };
    bootstrap.run(&request, &mut FuseBackend, &mut Daemon::new(pid_file))
}

fn report(err: &BootstrapError, also_stderr: bool) {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    error!("{}", message);
    if also_stderr {
        eprintln!("sqlmount: {}", message);
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(err) = init_logging(&cli) {
        eprintln!("sqlmount: {:#}", err);
        return ExitCode::from(2);
    }

    info!("Starting sqlmount...");

    match run(&cli) {
        Ok(_) => {
            info!("sqlmount stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            report(&err, cli.log_file.is_some());
            err.exit_code()
        }
    }
}
