//! Google ID token authentication.
//!
//! # Pipeline
//!
//! ```text
//! startup ──► refresh task ──► KeyFetcher ──► KeyCache::replace
//!                 ▲                                  │
//!                 └──── sleep(max-age) ◄─────────────┘
//!
//! request ──► gate::authorize ──► TokenVerifier::verify ──► KeyCache::get
//!                  │                                          (no network)
//!                  ├─► 401 (any failure)
//!                  └─► handler, with Subject in extensions
//! ```
//!
//! The key cache is the only shared state on the request path. It is written
//! exclusively by the refresh task, which swaps in a complete
//! [`SigningKeySet`] on every successful cycle.

pub mod fetcher;
pub mod gate;
pub mod keys;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testutil;

pub use fetcher::{FetchError, FetchedKeys, KeyFetcher, RefreshPolicy, spawn_refresh};
pub use gate::{Subject, authorize};
pub use keys::{KeyCache, KeyEntry, SigningKeySet};
pub use verifier::{AuthError, TokenVerifier};

/// Google's OpenID Connect discovery document.
pub const GOOGLE_DISCOVERY_URL: &str =
    "https://accounts.google.com/.well-known/openid-configuration";

/// Issuer values Google puts in the `iss` claim of its ID tokens.
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
