//! Sealog CLI - independent audit chain verification.
//!
//! Verifies exported certification documents against the logger's public
//! key, with nothing but the document and the key file. On success each
//! input is reformatted into a pretty-printed `verified_logs_<i>.json`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sealog_core::verify_certification;
use sealog_crypto::PublicKey;

/// Sealog - tamper-evident audit log toolkit
#[derive(Parser)]
#[command(name = "sealog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify certification documents against the logger's public key
    Verify {
        /// The logger's public key: raw SPKI DER or an `EC PUBLIC KEY`
        /// armour block
        #[arg(short = 'k', long = "key", default_value = "logger.pub")]
        key: PathBuf,

        /// Certification documents to verify
        #[arg(required = true)]
        certifications: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Verify {
            key,
            certifications,
        } => verify(&key, &certifications),
    }
}

fn verify(key_path: &Path, certifications: &[PathBuf]) -> Result<()> {
    let raw = fs::read(key_path)
        .with_context(|| format!("reading public key {}", key_path.display()))?;
    let public = PublicKey::from_key_bytes(&raw)
        .with_context(|| format!("parsing public key {}", key_path.display()))?;
    println!("logger key fingerprint: {}", public.fingerprint_hex());

    for (i, path) in certifications.iter().enumerate() {
        let doc = fs::read(path)
            .with_context(|| format!("reading certification {}", path.display()))?;

        println!("Verifying {}", path.display());
        let Some(certification) = verify_certification(&doc, &public) else {
            bail!("failed to verify certification {}", path.display());
        };

        let pretty = serde_json::to_string_pretty(&certification)
            .context("reformatting certification")?;
        let output = format!("verified_logs_{i}.json");
        fs::write(&output, pretty).with_context(|| format!("writing {output}"))?;
        println!("OK: writing logs to {output}");
    }

    Ok(())
}
