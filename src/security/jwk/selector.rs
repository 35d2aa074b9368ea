// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Candidate key sources

use std::sync::Arc;

use log::{trace, warn};

use super::{Jwk, JwkMatcher};
use crate::security::key::{KeyStore, KeyUse};

/// Source of keys for signing and verification
///
/// An empty result is a normal outcome; implementations never fail.
pub trait KeySelector: Send + Sync {
    fn get(&self, matcher: &JwkMatcher) -> Vec<Jwk>;
}

/// Fixed key set, mostly useful for tests and static deployments
impl KeySelector for Vec<Jwk> {
    fn get(&self, matcher: &JwkMatcher) -> Vec<Jwk> {
        self.iter().filter(|jwk| matcher.matches(jwk)).cloned().collect()
    }
}

/// Selects among the active signature keys of a [`KeyStore`]
///
/// Records returned by [`KeyStore::find_all`] that are inactive or
/// registered for encryption are dropped here as well.
///
/// Records that cannot be converted and store failures are logged and
/// produce no candidates.
#[derive(Clone)]
pub struct StoreKeySelector {
    key_store: Arc<dyn KeyStore>,
}

impl StoreKeySelector {
    pub fn new(key_store: Arc<dyn KeyStore>) -> Self {
        Self { key_store }
    }
}

impl KeySelector for StoreKeySelector {
    fn get(&self, matcher: &JwkMatcher) -> Vec<Jwk> {
        let keys = match self.key_store.find_all() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Unable to load signing keys: {}", e);
                return Vec::new();
            }
        };

        let candidates: Vec<Jwk> = keys
            .iter()
            .filter(|key| key.is_active() && key.key_use() == KeyUse::Signature)
            .filter_map(|key| match Jwk::try_from(key) {
                Ok(jwk) => Some(jwk),
                Err(e) => {
                    warn!("Ignoring unusable key '{}': {}", key.id(), e);
                    None
                }
            })
            .filter(|jwk| matcher.matches(jwk))
            .collect();

        trace!("{} of {} keys match {:?}", candidates.len(), keys.len(), matcher);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyStoreError;
    use crate::security::key::{Key, KeyUse, MemoryKeyStore};
    use jsonwebtoken::Algorithm;

    const PUBLIC_A: &str = include_str!("../../../tests/fixtures/rsa_a.pub");
    const PRIVATE_A: &str = include_str!("../../../tests/fixtures/rsa_a.key");
    const PUBLIC_B: &str = include_str!("../../../tests/fixtures/rsa_b.pub");

    struct FailingStore;

    impl KeyStore for FailingStore {
        fn find_all(&self) -> Result<Vec<Key>, KeyStoreError> {
            Err(KeyStoreError::Storage("database offline".to_string()))
        }

        fn find_by_id(&self, _id: &str) -> Result<Option<Key>, KeyStoreError> {
            Ok(None)
        }

        fn find_by_kid(&self, _kid: &str) -> Result<Option<Key>, KeyStoreError> {
            Ok(None)
        }

        fn save(&self, _key: Key) -> Result<(), KeyStoreError> {
            Ok(())
        }

        fn remove(&self, _key: &Key) -> Result<(), KeyStoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_store_selector_filters_active_signature_keys() {
        let store = MemoryKeyStore::with_keys([
            Key::from_pem("1", "a", KeyUse::Signature, "RS256", PUBLIC_A, Some(PRIVATE_A)).unwrap(),
            Key::from_pem("2", "b", KeyUse::Signature, "RS256", PUBLIC_B, None)
                .unwrap()
                .with_active(false),
            Key::from_pem("3", "c", KeyUse::Encryption, "RSA-OAEP-256", PUBLIC_B, None).unwrap(),
            Key::new("4", "broken", KeyUse::Signature, "RS256", vec![1, 2, 3]),
        ]);
        let selector = StoreKeySelector::new(Arc::new(store));

        let matcher = JwkMatcher::for_verification(Algorithm::RS256, None).unwrap();
        let candidates = selector.get(&matcher);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key_id(), Some("a"));
    }

    /// Store whose `find_all` returns every record
    struct UnfilteredStore(Vec<Key>);

    impl KeyStore for UnfilteredStore {
        fn find_all(&self) -> Result<Vec<Key>, KeyStoreError> {
            Ok(self.0.clone())
        }

        fn find_by_id(&self, id: &str) -> Result<Option<Key>, KeyStoreError> {
            Ok(self.0.iter().find(|key| key.id() == id).cloned())
        }

        fn find_by_kid(&self, kid: &str) -> Result<Option<Key>, KeyStoreError> {
            Ok(self.0.iter().find(|key| key.kid() == kid).cloned())
        }

        fn save(&self, _key: Key) -> Result<(), KeyStoreError> {
            Ok(())
        }

        fn remove(&self, _key: &Key) -> Result<(), KeyStoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_inactive_keys_from_unfiltered_store_are_dropped() {
        let store = UnfilteredStore(vec![
            Key::from_pem("1", "a", KeyUse::Signature, "RS256", PUBLIC_A, Some(PRIVATE_A))
                .unwrap()
                .with_active(false),
            Key::from_pem("2", "c", KeyUse::Encryption, "RS256", PUBLIC_B, None).unwrap(),
        ]);
        let selector = StoreKeySelector::new(Arc::new(store));

        let matcher = JwkMatcher::for_signing(Algorithm::RS256, None, None).unwrap();
        assert!(selector.get(&matcher).is_empty());
        assert!(selector.get(&JwkMatcher::new()).is_empty());
    }

    #[test]
    fn test_store_failure_yields_no_candidates() {
        let selector = StoreKeySelector::new(Arc::new(FailingStore));
        assert!(selector.get(&JwkMatcher::new()).is_empty());
    }

    #[test]
    fn test_static_key_set() {
        let key = Key::from_pem("1", "a", KeyUse::Signature, "RS256", PUBLIC_A, None).unwrap();
        let keys = vec![Jwk::try_from(&key).unwrap()];

        let selector: &dyn KeySelector = &keys;

        assert_eq!(selector.get(&JwkMatcher::new().with_key_id(Some("a"))).len(), 1);
        assert!(selector.get(&JwkMatcher::new().with_key_id(Some("z"))).is_empty());
    }
}
