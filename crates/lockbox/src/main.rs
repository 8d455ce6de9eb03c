//! `lockbox` operator binary: encrypt or decrypt a single value out of band.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from `LOCKBOX_*` environment variables.
//! 2. Initialise tracing.
//! 3. Build the [`Lockbox`] context and resolve the attribute key.
//! 4. Run the subcommand and print the result on stdout.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use lockbox::config::Config;
use lockbox::{telemetry, Lockbox};

#[derive(Debug, Parser)]
#[command(name = "lockbox", version, about = "Encrypt or decrypt a field value")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encrypt a plaintext value and print the envelope.
    Encrypt(Target),
    /// Decrypt an envelope and print the plaintext.
    Decrypt(Target),
}

#[derive(Debug, Args)]
struct Target {
    /// Table of the key coordinate.
    #[arg(long)]
    table: String,

    /// Attribute of the key coordinate (usually the ciphertext column).
    #[arg(long)]
    attribute: String,

    /// Use raw envelopes, hex-encoded on the command line.
    #[arg(long)]
    binary: bool,

    /// Plaintext for `encrypt`, envelope for `decrypt`.
    value: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = Config::from_env().map_err(|e| {
        // Tracing is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    telemetry::init_tracing(&cfg.log_level)?;
    let lockbox = Lockbox::from_config(&cfg)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        protected = lockbox.is_protected(),
        "lockbox starting"
    );

    let output = match cli.command {
        Command::Encrypt(target) => encrypt(&lockbox, &target)?,
        Command::Decrypt(target) => decrypt(&lockbox, &target)?,
    };
    println!("{output}");
    Ok(())
}

fn encrypt(lockbox: &Lockbox, target: &Target) -> Result<String> {
    let keys = lockbox.attribute_key(&target.table, &target.attribute)?;
    let envelope = lockbox
        .cipher_box(keys, !target.binary)
        .encrypt(target.value.as_bytes())?;
    if target.binary {
        Ok(hex::encode(envelope))
    } else {
        String::from_utf8(envelope).context("envelope is not text")
    }
}

fn decrypt(lockbox: &Lockbox, target: &Target) -> Result<String> {
    let keys = lockbox.attribute_key(&target.table, &target.attribute)?;
    let input = if target.binary {
        hex::decode(&target.value).context("envelope is not valid hex")?
    } else {
        target.value.clone().into_bytes()
    };
    let plaintext = lockbox
        .cipher_box(keys, !target.binary)
        .decrypt(&input)?;
    Ok(match String::from_utf8(plaintext) {
        Ok(text) => text,
        Err(e) => hex::encode(e.into_bytes()),
    })
}
