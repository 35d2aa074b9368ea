// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Key persistence contract

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use super::{Key, KeyUse};
use crate::error::KeyStoreError;

/// Persistence collaborator owning every [`Key`] record
///
/// Implementations may block (database, remote vault). The token core calls
/// them synchronously and never retries.
pub trait KeyStore: Send + Sync {
    /// Returns the keys eligible for signing, i.e. active signature keys
    fn find_all(&self) -> Result<Vec<Key>, KeyStoreError>;

    fn find_by_id(&self, id: &str) -> Result<Option<Key>, KeyStoreError>;

    /// Looks a key up by its JOSE key ID, whatever its `active` flag
    fn find_by_kid(&self, kid: &str) -> Result<Option<Key>, KeyStoreError>;

    /// Same as [`KeyStore::find_by_kid`] but absence is an error
    ///
    /// Inactive keys are returned so that tokens issued before a rotation can
    /// still be decrypted.
    fn find_by_kid_or_throw(&self, kid: &str) -> Result<Key, KeyStoreError> {
        self.find_by_kid(kid)?.ok_or_else(|| KeyStoreError::NotFound {
            kid: kid.to_string(),
        })
    }

    /// Looks a key up by `kid` among the keys registered for `key_use`
    ///
    /// Signature and encryption keys may share a `kid`. Stores that keep
    /// `kid` unique across uses can rely on this default.
    fn find_by_kid_and_use(&self, kid: &str, key_use: KeyUse) -> Result<Option<Key>, KeyStoreError> {
        Ok(self.find_by_kid(kid)?.filter(|key| key.key_use() == key_use))
    }

    /// Inserts or replaces the record with the same `id`
    fn save(&self, key: Key) -> Result<(), KeyStoreError>;

    fn remove(&self, key: &Key) -> Result<(), KeyStoreError>;
}

/// In-memory [`KeyStore`] backed by an ordered map keyed on the record id
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<BTreeMap<String, Key>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        let keys = keys
            .into_iter()
            .map(|key| (key.id().to_string(), key))
            .collect();
        Self {
            keys: RwLock::new(keys),
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|keys| keys.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Key>>, KeyStoreError> {
        self.keys
            .read()
            .map_err(|_| KeyStoreError::Storage("key store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Key>>, KeyStoreError> {
        self.keys
            .write()
            .map_err(|_| KeyStoreError::Storage("key store lock poisoned".to_string()))
    }
}

impl KeyStore for MemoryKeyStore {
    fn find_all(&self) -> Result<Vec<Key>, KeyStoreError> {
        Ok(self
            .read()?
            .values()
            .filter(|key| key.is_active() && key.key_use() == KeyUse::Signature)
            .cloned()
            .collect())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Key>, KeyStoreError> {
        Ok(self.read()?.get(id).cloned())
    }

    fn find_by_kid(&self, kid: &str) -> Result<Option<Key>, KeyStoreError> {
        Ok(self.read()?.values().find(|key| key.kid() == kid).cloned())
    }

    fn find_by_kid_and_use(&self, kid: &str, key_use: KeyUse) -> Result<Option<Key>, KeyStoreError> {
        Ok(self
            .read()?
            .values()
            .find(|key| key.kid() == kid && key.key_use() == key_use)
            .cloned())
    }

    fn save(&self, key: Key) -> Result<(), KeyStoreError> {
        debug!("Saving key '{}' (kid '{}', use {})", key.id(), key.kid(), key.key_use());
        self.write()?.insert(key.id().to_string(), key);
        Ok(())
    }

    fn remove(&self, key: &Key) -> Result<(), KeyStoreError> {
        debug!("Removing key '{}' (kid '{}')", key.id(), key.kid());
        self.write()?.remove(key.id());
        Ok(())
    }
}
