//! ibackup: decrypt files out of an encrypted iOS backup
//!
//! Commands:
//!   classes                           - list protection classes and unwrap status
//!   extract <PATTERN> <DEST>          - decrypt the first file matching PATTERN
//!   extract-all <PATTERN> <OUT_DIR>   - decrypt every match under OUT_DIR/<domain>/<path>

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ibackup_rs::aliases::PasswordString;
use ibackup_rs::{CatalogLookup, EncryptedBackup};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ibackup",
    version,
    about = "Decrypt files from an encrypted iOS backup"
)]
struct Cli {
    /// Backup directory (contains Manifest.plist and Manifest.db)
    #[arg(long, short = 'b')]
    backup: PathBuf,

    /// Backup password (prompted for when absent)
    #[arg(long, env = "IBACKUP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List protection classes and whether their keys were unwrapped
    Classes,

    /// Decrypt the first file whose relative path matches PATTERN (SQL LIKE)
    Extract {
        pattern: String,
        dest: PathBuf,
        /// Restrict to a domain (SQL LIKE), e.g. HomeDomain
        #[arg(long, short = 'd')]
        domain: Option<String>,
    },

    /// Decrypt every matching file into OUT_DIR/<domain>/<relative path>
    #[command(name = "extract-all")]
    ExtractAll {
        pattern: String,
        out_dir: PathBuf,
        #[arg(long, short = 'd')]
        domain: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn read_password(arg: Option<String>) -> Result<PasswordString> {
    let password = match arg {
        Some(p) => p,
        None => rpassword::prompt_password("Backup password: ").context("reading password")?,
    };
    Ok(PasswordString::new(password))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let password = read_password(cli.password)?;
    let backup = EncryptedBackup::open(&cli.backup, &password)
        .with_context(|| format!("unlocking backup at {}", cli.backup.display()))?;

    match cli.command {
        Commands::Classes => {
            let manifest = backup.source().manifest();
            if let Some(name) = &manifest.device_name {
                println!("device:  {name}");
            }
            if let Some(version) = &manifest.product_version {
                println!("iOS:     {version}");
            }
            println!("files:   {}", backup.catalog().file_count()?);
            for record in backup.ring().classes() {
                let status = if record.is_unwrapped() {
                    "unwrapped".to_string()
                } else {
                    format!("skipped (wrap type {})", record.wrap_type)
                };
                println!("{:>2}  {:<52} {status}", record.class.index(), record.class.name());
            }
        }

        Commands::Extract {
            pattern,
            dest,
            domain,
        } => {
            let entry = match domain.as_deref() {
                None => backup.lookup(&pattern)?,
                Some(d) => match backup.catalog().entries(&pattern, Some(d))?.into_iter().next() {
                    Some(e) => e,
                    None => bail!("no file matches '{pattern}' in domain '{d}'"),
                },
            };
            let written = ibackup_rs::extract_entry_to(backup.source(), backup.ring(), &entry, &dest)
                .with_context(|| format!("decrypting {}/{}", entry.domain, entry.relative_path))?;
            println!("{} bytes → {}", written, dest.display());
        }

        Commands::ExtractAll {
            pattern,
            out_dir,
            domain,
        } => {
            let outcomes = backup.extract_matching(&pattern, domain.as_deref(), &out_dir)?;
            let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
            for o in &outcomes {
                match &o.result {
                    Ok(n) => println!("ok    {:>10}  {}", n, o.destination.display()),
                    Err(e) => println!("FAIL  {}/{}: {e}", o.entry.domain, o.entry.relative_path),
                }
            }
            println!("{} extracted, {} failed", outcomes.len() - failed, failed);
            if failed > 0 {
                bail!("{failed} file(s) could not be decrypted");
            }
        }
    }

    Ok(())
}
