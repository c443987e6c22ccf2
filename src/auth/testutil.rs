//! Token and key fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header, jwk::JwkSet};
use serde_json::{Value, json};

use super::{KeyCache, SigningKeySet, TokenVerifier};

pub(crate) const KID: &str = "k1";
pub(crate) const AUDIENCE: &str = "test-client.apps.googleusercontent.com";
pub(crate) const ISSUER: &str = "https://accounts.google.com";

const SIGNING_KEY: &str = include_str!("../../tests/fixtures/signing_key.pem");
const FOREIGN_KEY: &str = include_str!("../../tests/fixtures/foreign_key.pem");
const JWKS: &str = include_str!("../../tests/fixtures/jwks.json");

pub(crate) fn jwks() -> JwkSet {
    serde_json::from_str(JWKS).unwrap()
}

pub(crate) fn cache() -> Arc<KeyCache> {
    Arc::new(KeyCache::with_keys(SigningKeySet::from_jwks(
        jwks(),
        Duration::from_secs(3600),
    )))
}

pub(crate) fn verifier(cache: Arc<KeyCache>) -> TokenVerifier {
    TokenVerifier::new(cache, AUDIENCE).with_leeway(Duration::ZERO)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims of a valid ID token for `sub`.
pub(crate) fn claims(sub: &str) -> Value {
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": sub,
        "iat": now(),
        "exp": now() + 600,
    })
}

/// Claims of a token that expired ten minutes ago.
pub(crate) fn expired_claims(sub: &str) -> Value {
    let mut c = claims(sub);
    c["iat"] = json!(now() - 1200);
    c["exp"] = json!(now() - 600);
    c
}

fn sign(pem: &str, alg: Algorithm, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(alg);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// RS256 token signed with the fixture key published as `kid`.
pub(crate) fn token(kid: &str, claims: &Value) -> String {
    sign(SIGNING_KEY, Algorithm::RS256, Some(kid), claims)
}

/// Token whose header names `alg` instead of RS256.
pub(crate) fn token_with_alg(alg: Algorithm, claims: &Value) -> String {
    sign(SIGNING_KEY, alg, Some(KID), claims)
}

/// Token without a `kid` header.
pub(crate) fn token_without_kid(claims: &Value) -> String {
    sign(SIGNING_KEY, Algorithm::RS256, None, claims)
}

/// Token claiming the published kid but signed by a key nobody published.
pub(crate) fn forged_token(claims: &Value) -> String {
    sign(FOREIGN_KEY, Algorithm::RS256, Some(KID), claims)
}

/// HS256 token keyed with an arbitrary secret.
pub(crate) fn hmac_token(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KID.to_string());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(b"not-a-key")).unwrap()
}
