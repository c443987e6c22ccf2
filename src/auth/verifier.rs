//! ID token verification against the cached signing keys.
//!
//! # Verification order
//!
//! 1. Structural decode of header and payload (no signature check).
//! 2. Read `kid`, `alg` and `iss`.
//! 3. Select the key by `kid` from the current [`KeyCache`] snapshot.
//! 4. Rebuild a [`DecodingKey`] from the JWK.
//! 5. Require `iss` to be one of [`GOOGLE_ISSUERS`].
//! 6. Require `alg` to be RSA and to agree with the key's declared algorithm.
//! 7. Verify signature, `aud`, `iss` and `exp`.
//!
//! Each step fails with its own [`AuthError`] variant so logs say *why* a
//! token was refused. The gate collapses them all into a bare 401.
//!
//! The algorithm used in step 7 comes from the token header, but only inside
//! the RSA family and only if the key does not declare a different one. A
//! token cannot downgrade verification to HMAC by naming `HS256`.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use jsonwebtoken::{
    Algorithm, DecodingKey, Header, Validation,
    errors::ErrorKind,
    jwk::KeyAlgorithm,
};
use serde::Deserialize;
use tracing::debug;

use super::{GOOGLE_ISSUERS, KeyCache, KeyEntry};

/// Reasons a token is refused.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No bearer token on the request.
    #[error("missing bearer token")]
    MissingToken,

    /// The token is not a structurally valid JWT.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The header has no `kid`.
    #[error("token header has no key id")]
    MissingKeyId,

    /// The `kid` is not in the current key set (empty cache, or a rotated key
    /// not fetched yet).
    #[error("unknown key id: {0}")]
    UnknownKey(String),

    /// The cached key material could not be turned into a verification key.
    #[error("cannot build verification key: {0}")]
    KeyConversion(#[source] jsonwebtoken::errors::Error),

    /// `iss` is not a Google issuer.
    #[error("untrusted issuer: {0}")]
    UntrustedIssuer(String),

    /// `alg` is outside the RSA family or contradicts the key's declared algorithm.
    #[error("unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    /// Signature does not verify against the selected key.
    #[error("invalid signature")]
    SignatureInvalid,

    /// `aud` is not this application's client ID.
    #[error("audience mismatch")]
    AudienceMismatch,

    /// `exp` is in the past (beyond leeway).
    #[error("token expired")]
    Expired,

    /// Any other claim check failed.
    #[error("verification failed: {0}")]
    VerificationFailed(#[source] jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            ErrorKind::InvalidAudience => Self::AudienceMismatch,
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::VerificationFailed(err),
        }
    }
}

/// The unverified payload fields consulted before the signature check.
#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
    #[serde(default)]
    iss: Option<String>,
}

/// Claims read after a successful signature check.
#[derive(Debug, Clone, Deserialize)]
struct VerifiedClaims {
    sub: String,
}

/// Verifies Google ID tokens issued for one client ID.
#[derive(Debug)]
pub struct TokenVerifier {
    keys: Arc<KeyCache>,
    audience: String,
    leeway: Duration,
}

impl TokenVerifier {
    /// Create a verifier reading keys from `keys` and expecting `aud == audience`.
    pub fn new(keys: Arc<KeyCache>, audience: impl Into<String>) -> Self {
        Self {
            keys,
            audience: audience.into(),
            leeway: Duration::from_secs(60),
        }
    }

    /// Set the clock skew tolerated on `exp` (default 60 seconds).
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// The client ID tokens must be issued for.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Verify `token` and return its subject.
    ///
    /// Never performs I/O: keys come from the current cache snapshot only.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let (header, unverified) = decode_unverified(token)?;

        let kid = header.kid.as_deref().ok_or(AuthError::MissingKeyId)?;

        let keys = self.keys.get();
        let entry = keys
            .find(kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))?;

        let decoding_key = entry.decoding_key().map_err(AuthError::KeyConversion)?;

        let issuer = unverified.iss.unwrap_or_default();
        if !GOOGLE_ISSUERS.contains(&issuer.as_str()) {
            return Err(AuthError::UntrustedIssuer(issuer));
        }

        check_algorithm(header.alg, entry)?;

        let claims = self.verify_signature(token, &decoding_key, header.alg, &issuer)?;
        debug!(kid = %kid, sub = %claims.sub, "ID token verified");
        Ok(claims.sub)
    }

    fn verify_signature(
        &self,
        token: &str,
        key: &DecodingKey,
        alg: Algorithm,
        issuer: &str,
    ) -> Result<VerifiedClaims, AuthError> {
        let mut validation = Validation::new(alg);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation.leeway = self.leeway.as_secs();

        let data = jsonwebtoken::decode::<VerifiedClaims>(token, key, &validation)?;
        Ok(data.claims)
    }
}

/// Decode header and payload without checking the signature.
fn decode_unverified(token: &str) -> Result<(Header, UnverifiedClaims), AuthError> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| AuthError::MalformedToken(format!("header: {e}")))?;

    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::MalformedToken(format!("payload encoding: {e}")))?;
    let claims = serde_json::from_slice::<UnverifiedClaims>(&payload)
        .map_err(|e| AuthError::MalformedToken(format!("payload: {e}")))?;

    Ok((header, claims))
}

/// Only RSA signatures are accepted, and a key that names its algorithm
/// must be used with exactly that algorithm.
fn check_algorithm(alg: Algorithm, entry: &KeyEntry) -> Result<(), AuthError> {
    let declared_matches = match entry.declared_algorithm() {
        None => true,
        Some(declared) => matches!(
            (alg, declared),
            (Algorithm::RS256, KeyAlgorithm::RS256)
                | (Algorithm::RS384, KeyAlgorithm::RS384)
                | (Algorithm::RS512, KeyAlgorithm::RS512)
        ),
    };

    if matches!(alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) && declared_matches {
        Ok(())
    } else {
        Err(AuthError::UnsupportedAlgorithm(alg))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::auth::testutil::{self, AUDIENCE, KID};

    fn verify(token: &str) -> Result<String, AuthError> {
        testutil::verifier(testutil::cache()).verify(token)
    }

    #[test]
    fn valid_token_yields_subject() {
        // GIVEN: a well-formed token for this audience, signed with k1
        let token = testutil::token(KID, &testutil::claims("user-42"));

        // THEN: its subject is returned
        assert_eq!(verify(&token).unwrap(), "user-42");
    }

    #[test]
    fn bare_domain_issuer_is_accepted() {
        let mut claims = testutil::claims("user-42");
        claims["iss"] = json!("accounts.google.com");

        assert_eq!(verify(&testutil::token(KID, &claims)).unwrap(), "user-42");
    }

    #[test]
    fn audience_array_containing_client_id_is_accepted() {
        let mut claims = testutil::claims("user-42");
        claims["aud"] = json!(["other-app", AUDIENCE]);

        assert_eq!(verify(&testutil::token(KID, &claims)).unwrap(), "user-42");
    }

    #[test]
    fn unknown_kid_is_rejected() {
        let token = testutil::token("rotated-away", &testutil::claims("user-42"));

        assert!(matches!(verify(&token), Err(AuthError::UnknownKey(kid)) if kid == "rotated-away"));
    }

    #[test]
    fn empty_cache_rejects_everything() {
        // GIVEN: no key set fetched yet
        let verifier = testutil::verifier(Arc::new(KeyCache::new()));
        let token = testutil::token(KID, &testutil::claims("user-42"));

        // THEN: the key cannot be found
        assert!(matches!(verifier.verify(&token), Err(AuthError::UnknownKey(_))));
    }

    #[test]
    fn missing_kid_is_rejected() {
        let token = testutil::token_without_kid(&testutil::claims("user-42"));

        assert!(matches!(verify(&token), Err(AuthError::MissingKeyId)));
    }

    #[test]
    fn untrusted_issuer_is_rejected() {
        let mut claims = testutil::claims("user-42");
        claims["iss"] = json!("https://evil.example.com");

        let err = verify(&testutil::token(KID, &claims)).unwrap_err();
        assert!(matches!(err, AuthError::UntrustedIssuer(iss) if iss == "https://evil.example.com"));
    }

    #[test]
    fn issuer_is_checked_only_after_key_lookup() {
        // GIVEN: bad issuer AND unknown kid
        let mut claims = testutil::claims("user-42");
        claims["iss"] = json!("https://evil.example.com");
        let token = testutil::token("nope", &claims);

        // THEN: the key lookup failure is reported first
        assert!(matches!(verify(&token), Err(AuthError::UnknownKey(_))));
    }

    #[test]
    fn missing_issuer_is_untrusted() {
        let mut claims = testutil::claims("user-42");
        claims.as_object_mut().unwrap().remove("iss");

        assert!(matches!(
            verify(&testutil::token(KID, &claims)),
            Err(AuthError::UntrustedIssuer(iss)) if iss.is_empty()
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = testutil::token(KID, &testutil::expired_claims("user-42"));

        assert!(matches!(verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn expired_token_within_leeway_is_accepted() {
        let verifier = TokenVerifier::new(testutil::cache(), AUDIENCE)
            .with_leeway(Duration::from_secs(3600));
        let token = testutil::token(KID, &testutil::expired_claims("user-42"));

        assert_eq!(verifier.verify(&token).unwrap(), "user-42");
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let mut claims = testutil::claims("user-42");
        claims["aud"] = json!("someone-else.apps.googleusercontent.com");

        assert!(matches!(
            verify(&testutil::token(KID, &claims)),
            Err(AuthError::AudienceMismatch)
        ));
    }

    #[test]
    fn forged_signature_is_rejected() {
        let token = testutil::forged_token(&testutil::claims("user-42"));

        assert!(matches!(verify(&token), Err(AuthError::SignatureInvalid)));
    }

    #[test]
    fn hmac_algorithm_is_refused_before_verification() {
        let token = testutil::hmac_token(&testutil::claims("user-42"));

        assert!(matches!(
            verify(&token),
            Err(AuthError::UnsupportedAlgorithm(Algorithm::HS256))
        ));
    }

    #[test]
    fn algorithm_must_match_key_declaration() {
        // GIVEN: the k1 key is published as RS256 but the token says RS512
        let token = testutil::token_with_alg(Algorithm::RS512, &testutil::claims("user-42"));

        // THEN: refused without attempting verification
        assert!(matches!(
            verify(&token),
            Err(AuthError::UnsupportedAlgorithm(Algorithm::RS512))
        ));
    }

    #[test]
    fn malformed_tokens_are_rejected_not_panicking() {
        for token in [
            "",
            "not-a-jwt",
            "a.b",
            "a.b.c.d",
            "!!!.???.###",
            "eyJhbGciOiJSUzI1NiJ9.bm90LWpzb24.sig",
        ] {
            assert!(
                matches!(verify(token), Err(AuthError::MalformedToken(_))),
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn missing_subject_fails_verification() {
        let mut claims = testutil::claims("user-42");
        claims.as_object_mut().unwrap().remove("sub");

        assert!(matches!(
            verify(&testutil::token(KID, &claims)),
            Err(AuthError::VerificationFailed(_))
        ));
    }

    #[test]
    fn rotation_is_picked_up_from_the_cache() {
        // GIVEN: a verifier whose cache is initially empty
        let cache = Arc::new(KeyCache::new());
        let verifier = testutil::verifier(Arc::clone(&cache));
        let token = testutil::token(KID, &testutil::claims("user-42"));
        assert!(verifier.verify(&token).is_err());

        // WHEN: the refresh task publishes k1
        cache.replace(crate::auth::SigningKeySet::from_jwks(
            testutil::jwks(),
            Duration::from_secs(60),
        ));

        // THEN: the same verifier now accepts the token
        assert_eq!(verifier.verify(&token).unwrap(), "user-42");
    }
}
