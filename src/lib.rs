// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JOSE access tokens
//!
//! This library issues and verifies compact JSON Web Tokens backed by a store
//! of RSA keys. Tokens are signed (JWS, RS256 by default) and optionally
//! encrypted (JWE, RSA-OAEP-256 key wrapping with AES-GCM content
//! encryption).

pub mod config;
pub mod error;
pub mod security;
