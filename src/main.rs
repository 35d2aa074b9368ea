// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Command line front-end for issuing and inspecting access tokens
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use serde_json::json;

use rust_jose_tokens::config::{output_config_schema, Config};
use rust_jose_tokens::security::jwk::JwkSet;
use rust_jose_tokens::security::token::{Principal, TokenResponse};
use rust_jose_tokens::security::TokenServices;

/// Issue, decode and publish keys for JOSE access tokens
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (created with defaults when missing)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Issue an access token and print the token response
    Issue {
        /// Subject of the token
        #[arg(short, long)]
        subject: String,

        /// Granted authority, may be repeated
        #[arg(short, long = "authority")]
        authorities: Vec<String>,
    },
    /// Decode and validate a token, printing its headers and claims
    Decode {
        /// Compact JWS or JWE token
        token: String,
    },
    /// Print the public JWK set of the active signing keys
    Jwks,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.show_config_schema {
        return output_config_schema();
    }

    let command = match args.command {
        Some(command) => command,
        None => {
            println!("No command given, see --help");
            return Ok(());
        }
    };

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    debug!("Loaded {} keys from {:?}", config.keys.len(), args.config);

    let key_store = Arc::new(config.key_store()?);
    let services = TokenServices::new(&config.token, key_store);

    match command {
        Command::Issue {
            subject,
            authorities,
        } => {
            let principal = Principal::new(subject).with_authorities(authorities);
            let jwt = services.generator().generate(&principal)?;
            info!("Issued token for '{}'", principal.name());
            println!("{}", serde_json::to_string_pretty(&TokenResponse::from(&jwt))?);
        }
        Command::Decode { token } => {
            let jwt = services.decoder().decode(&token)?;
            let decoded = json!({
                "header": jwt.headers(),
                "claims": jwt.claims(),
            });
            println!("{}", serde_json::to_string_pretty(&decoded)?);
        }
        Command::Jwks => {
            let jwks = JwkSet::from_store(services.key_store().as_ref())?;
            println!("{}", serde_json::to_string_pretty(&jwks)?);
        }
    }

    Ok(())
}
