// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Covault Node
//!
//! Entry point for the `covault-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and dispatches to a subcommand.
//!
//! - `run`: drive a vault through a scenario file
//! - `inspect`: print the id and commitment of an exported vault state
//! - `verify`: check a proof envelope against a commitment
//! - `version`: print build version information
//!
//! Results go to stdout as JSON. Logs go to stderr.

mod cli;
mod effects;
mod logging;
mod metrics;
mod repository;
mod scenario;
mod service;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use covault_protocol::crypto::{Digest, Ed25519Verifier};
use covault_protocol::proof::{Ed25519Attestor, ProofEnvelope};
use covault_protocol::vault::VaultState;

use cli::{Commands, CovaultCli};
use logging::LogFormat;
use metrics::ServiceMetrics;
use repository::InMemoryRepository;
use service::VaultService;

fn main() -> Result<()> {
    let cli = CovaultCli::parse();
    logging::init_logging(&cli.log_level, LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::Run(args) => run_scenario(args),
        Commands::Inspect(args) => inspect_vault(args),
        Commands::Verify(args) => verify_envelope(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Runs a scenario against a fresh in-memory service and prints the report.
fn run_scenario(args: cli::RunArgs) -> Result<()> {
    let loaded = scenario::load(&args.scenario)
        .with_context(|| format!("failed to load scenario {}", args.scenario.display()))?;

    let metrics = Arc::new(ServiceMetrics::new().context("failed to register metrics")?);
    let service = VaultService::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(Ed25519Attestor),
        Arc::new(Ed25519Verifier),
        Arc::clone(&metrics),
    )
    .with_required_approvals(loaded.scenario.require_approvals);

    tracing::info!(
        scenario = %args.scenario.display(),
        require_approvals = loaded.scenario.require_approvals,
        "running scenario"
    );
    let report = loaded.run(&service, args.fail_fast)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.metrics {
        eprint!("{}", metrics.encode().context("failed to encode metrics")?);
    }

    if !report.passed {
        let failed = report.steps.iter().filter(|s| !s.as_expected).count();
        bail!("scenario {:?}: {} step(s) did not behave as expected", report.name, failed);
    }
    Ok(())
}

/// Prints the identity of a serialized vault state.
fn inspect_vault(args: cli::InspectArgs) -> Result<()> {
    let raw = read(&args.vault)?;
    let state: VaultState = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid vault state", args.vault.display()))?;

    let view = serde_json::json!({
        "vault_id": state.vault_id_hex(),
        "commitment": state.commitment_hex(),
        "member_count": state.member_count(),
        "anchor": state.anchor(),
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Verifies an envelope with the default attestor.
fn verify_envelope(args: cli::VerifyArgs) -> Result<()> {
    let raw = read(&args.envelope)?;
    let envelope = ProofEnvelope::from_json(&raw)
        .with_context(|| format!("{} is not a valid proof envelope", args.envelope.display()))?;

    let mut commitment: Digest = [0u8; 32];
    hex::decode_to_slice(args.commitment.trim(), &mut commitment)
        .context("commitment must be 64 hex characters")?;

    envelope
        .verify(&commitment, &Ed25519Attestor)
        .context("envelope rejected")?;

    let view = serde_json::json!({
        "valid": true,
        "commitment": envelope.commitment_hex(),
        "statement_digest": hex::encode(envelope.statement_digest),
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Prints version information to stdout.
fn print_version() {
    println!("covault-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc        {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
