//! ---
//! tienda_section: "01-core-functionality"
//! tienda_subsection: "binary"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Operator inspection and license signing commands."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::convert::TryInto;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use clap::Args;
use ed25519_dalek::SigningKey;
use tienda_common::config::AppConfig;
use tienda_licensing::certificates::{encode_envelope, open_license, sign_license as sign};
use tienda_licensing::LicenseStore;

use crate::build_activation;

#[derive(Debug, Args)]
pub struct SignArgs {
    #[arg(long, value_name = "FILE", help = "Unsigned license JSON document")]
    pub input: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        help = "File holding the base64 encoded 32 byte ed25519 signing seed"
    )]
    pub key: PathBuf,

    #[arg(long, value_name = "FILE", help = "Write the envelope here instead of stdout")]
    pub output: Option<PathBuf>,
}

pub fn print_license(config: &AppConfig) -> Result<()> {
    let store = LicenseStore::open(&config.license);
    let loaded = store.snapshot();
    let view = loaded.license.public_view();
    println!("Origin: {}", loaded.origin);
    println!("Client: {}", view.client_name);
    println!("Tier: {}", view.tier);
    println!(
        "Expires: {}",
        view.expires_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_owned())
    );
    println!("Active: {}  Expired: {}  Valid: {}", view.active, view.is_expired, view.is_valid);
    println!("\n=== Modules ===");
    if view.modules.is_empty() {
        println!("  (none)");
    }
    for (name, entitled) in &view.modules {
        println!("  {name:<14} {}", if *entitled { "licensed" } else { "not licensed" });
    }
    println!("\n=== Limits ===");
    println!(
        "{}",
        serde_json::to_string_pretty(&view.features).context("failed to render limits")?
    );
    Ok(())
}

pub fn print_modules(config: &AppConfig) -> Result<()> {
    let activation = build_activation(config)?;
    println!("=== Modules ===");
    for entry in activation.registry.entries() {
        let descriptor = entry.descriptor();
        let active = activation.resolution.active.is_active(entry.name());
        let dependencies = if descriptor.dependencies.is_empty() {
            String::from("-")
        } else {
            descriptor.dependencies.join(", ")
        };
        println!(
            "  {:<14} {:<9} enabled={:<5} active={:<5} deps: {}",
            entry.name(),
            entry.kind().to_string(),
            descriptor.enabled,
            active,
            dependencies
        );
    }
    if activation.resolution.is_clean() {
        println!("\nNo configuration issues.");
    } else {
        println!("\n=== Issues ===");
        for issue in &activation.resolution.issues {
            println!("  {issue}");
        }
    }
    Ok(())
}

pub fn sign_license(args: &SignArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("unable to read license document {}", args.input.display()))?;
    let license = open_license(&raw, None, false)
        .with_context(|| format!("{} is not a valid unsigned license", args.input.display()))?;
    let key = read_signing_key(&args.key)?;
    let envelope = sign(&license, &key)?;
    let encoded = encode_envelope(&envelope)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &encoded)
                .with_context(|| format!("failed to write envelope {}", path.display()))?;
            println!("Signed license written to {}", path.display());
        }
        None => println!("{encoded}"),
    }
    println!(
        "Public key: {}",
        general_purpose::STANDARD.encode(key.verifying_key().to_bytes())
    );
    Ok(())
}

fn read_signing_key(path: &Path) -> Result<SigningKey> {
    let encoded = fs::read_to_string(path)
        .with_context(|| format!("unable to read signing key {}", path.display()))?;
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .context("signing key must be base64")?;
    let seed: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("signing key must be 32 bytes, got {}", bytes.len()))?;
    Ok(SigningKey::from_bytes(&seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_output_verifies_with_printed_key() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("license.json");
        let key_path = dir.path().join("signing.key");
        let output = dir.path().join("license.lic");
        fs::write(
            &input,
            r#"{"clientId":"c-1","clientName":"Kiosko 24","tier":"basic","active":true,"modules":{"caja":true}}"#,
        )
        .unwrap();
        fs::write(&key_path, general_purpose::STANDARD.encode([5u8; 32])).unwrap();

        sign_license(&SignArgs {
            input,
            key: key_path,
            output: Some(output.clone()),
        })
        .unwrap();

        let verifier = SigningKey::from_bytes(&[5u8; 32]).verifying_key();
        let envelope = fs::read_to_string(output).unwrap();
        let license = open_license(&envelope, Some(&verifier), true).unwrap();
        assert!(license.is_module_enabled("caja"));
    }

    #[test]
    fn short_signing_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("short.key");
        fs::write(&key_path, general_purpose::STANDARD.encode([1u8; 8])).unwrap();
        assert!(read_signing_key(&key_path).is_err());
    }
}
