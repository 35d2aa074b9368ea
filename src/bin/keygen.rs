// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use rust_jose_tokens::config::KeyConfig;
use rust_jose_tokens::security::jwk::Jwk;
use rust_jose_tokens::security::key::{pem, KeyUse};

/// Generate an RSA key pair and the matching `keys` entry of config.yaml
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Key ID written to token headers
    #[clap(long)]
    kid: String,

    /// Key purpose: sig or enc
    #[clap(long = "use", default_value = "sig")]
    key_use: KeyUse,

    /// JOSE algorithm, RS256 for signing keys or RSA-OAEP-256 for encryption keys
    #[clap(long, default_value = "RS256")]
    algorithm: String,

    /// Output path for the SubjectPublicKeyInfo PEM file
    #[clap(long)]
    out_pub_key: Option<PathBuf>,

    /// Output path for the PKCS#8 PEM file
    #[clap(long)]
    out_private_key: Option<PathBuf>,

    /// RSA key length in bits
    #[clap(long, default_value = "2048")]
    length: usize,
}

fn write_pem(path: &Path, pem: &str) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create key file at {:?}", path))?;
    file.write_all(pem.as_bytes())
        .with_context(|| format!("Failed to write key to {:?}", path))?;
    eprintln!("Key written to: {:?}", path);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    eprintln!("Generating RSA key pair with {} bits...", args.length);

    let mut rng = rsa::rand_core::OsRng;
    let private_key =
        RsaPrivateKey::new(&mut rng, args.length).context("Failed to generate RSA private key")?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_der = private_key
        .to_pkcs8_der()
        .context("Failed to encode private key to PKCS#8")?;
    let public_der = public_key
        .to_public_key_der()
        .context("Failed to encode public key to SubjectPublicKeyInfo")?;

    if let Some(path) = &args.out_private_key {
        write_pem(path, &pem::to_pem(pem::PRIVATE_KEY_LABEL, private_der.as_bytes()))?;
    }
    if let Some(path) = &args.out_pub_key {
        write_pem(path, &pem::to_pem(pem::PUBLIC_KEY_LABEL, public_der.as_bytes()))?;
    }

    let entry = KeyConfig {
        id: format!("{}-{}", args.kid, args.key_use),
        key_type: "RSA".to_string(),
        algorithm: args.algorithm,
        public_key: pem::encode_body(public_der.as_bytes()),
        private_key: Some(pem::encode_body(private_der.as_bytes())),
        active: true,
        kid: args.kid,
        key_use: args.key_use,
    };

    Jwk::try_from(&entry.to_key()?).context("Generated key pair does not parse back")?;

    println!(
        "{}",
        serde_yml::to_string(&vec![entry]).context("Failed to serialize key entry")?
    );
    Ok(())
}
