//! Signing key set and the process-wide key cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{
    DecodingKey,
    jwk::{Jwk, JwkSet, KeyAlgorithm},
};
use parking_lot::RwLock;
use tracing::debug;

/// One issuer public key, kept in its published JWK form.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    kid: String,
    jwk: Jwk,
}

impl KeyEntry {
    /// Wrap a JWK. Returns `None` when the key carries no `kid`, since such a
    /// key can never be selected by a token header.
    #[must_use]
    pub fn from_jwk(jwk: Jwk) -> Option<Self> {
        let kid = jwk.common.key_id.clone()?;
        Some(Self { kid, jwk })
    }

    /// Key identifier.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Raw JWK as published by the issuer.
    #[must_use]
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// Algorithm the issuer declared for this key, if any.
    #[must_use]
    pub fn declared_algorithm(&self) -> Option<KeyAlgorithm> {
        self.jwk.common.key_algorithm
    }

    /// Rebuild a verification key from the JWK material.
    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        DecodingKey::from_jwk(&self.jwk)
    }
}

/// An immutable snapshot of the issuer's published keys.
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    keys: Vec<KeyEntry>,
    fetched_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SigningKeySet {
    /// The set held before the first successful fetch.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            keys: Vec::new(),
            fetched_at: DateTime::<Utc>::UNIX_EPOCH,
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Build a snapshot from a fetched JWKS, valid for `max_age` from now.
    ///
    /// Keys without a `kid` are dropped. Order is preserved, so with
    /// duplicate ids the first published key wins on lookup.
    #[must_use]
    pub fn from_jwks(jwks: JwkSet, max_age: Duration) -> Self {
        let published = jwks.keys.len();
        let keys: Vec<KeyEntry> = jwks.keys.into_iter().filter_map(KeyEntry::from_jwk).collect();
        if keys.len() < published {
            debug!(
                dropped = published - keys.len(),
                "Ignoring published keys without a key id"
            );
        }

        let fetched_at = Utc::now();
        let expires_at = TimeDelta::from_std(max_age)
            .ok()
            .and_then(|ttl| fetched_at.checked_add_signed(ttl))
            .unwrap_or(fetched_at);

        Self {
            keys,
            fetched_at,
            expires_at,
        }
    }

    /// Look up a key by id. First match wins.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&KeyEntry> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Key ids in published order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(KeyEntry::kid)
    }

    /// Number of keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// `true` before the first successful fetch (or if the issuer published nothing).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// When the set was fetched.
    #[must_use]
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// When the issuer said the set stops being fresh.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Informational only: an expired set keeps serving until replaced.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

impl Default for SigningKeySet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Holder of the current [`SigningKeySet`].
///
/// Readers take a cheap `Arc` clone of the current snapshot, so a concurrent
/// [`replace`](KeyCache::replace) can never expose a half-built set. The lock
/// is held only for the pointer copy or swap.
#[derive(Debug)]
pub struct KeyCache {
    current: RwLock<Arc<SigningKeySet>>,
    next_refresh: RwLock<Option<DateTime<Utc>>>,
}

impl KeyCache {
    /// Create a cache holding the empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::with_keys(SigningKeySet::empty())
    }

    /// Create a cache pre-populated with `keys`.
    #[must_use]
    pub fn with_keys(keys: SigningKeySet) -> Self {
        Self {
            current: RwLock::new(Arc::new(keys)),
            next_refresh: RwLock::new(None),
        }
    }

    /// Current snapshot. Never blocks on I/O.
    #[must_use]
    pub fn get(&self) -> Arc<SigningKeySet> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a new snapshot.
    pub fn replace(&self, keys: SigningKeySet) {
        let keys = Arc::new(keys);
        *self.current.write() = keys;
    }

    /// When the refresh task will next fetch, once it has scheduled a cycle.
    #[must_use]
    pub fn next_refresh(&self) -> Option<DateTime<Utc>> {
        *self.next_refresh.read()
    }

    pub(crate) fn schedule_refresh(&self, delay: Duration) {
        let at = TimeDelta::from_std(delay)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
        *self.next_refresh.write() = at;
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}
