//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::AUTHORIZATION},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, jwk::JwkSet};
use serde_json::{Value, json};
use tower::ServiceExt;

use todo_api::auth::{KeyCache, SigningKeySet, TokenVerifier};
use todo_api::server::{AppState, create_router};
use todo_api::store::{DocumentStore, MemoryStore};

pub const KID: &str = "k1";
pub const AUDIENCE: &str = "test-client.apps.googleusercontent.com";

const SIGNING_KEY: &str = include_str!("../fixtures/signing_key.pem");
const JWKS: &str = include_str!("../fixtures/jwks.json");

pub fn jwks() -> JwkSet {
    serde_json::from_str(JWKS).unwrap()
}

pub fn cache() -> Arc<KeyCache> {
    Arc::new(KeyCache::with_keys(SigningKeySet::from_jwks(
        jwks(),
        Duration::from_secs(3600),
    )))
}

pub fn claims(sub: &str) -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "iss": "https://accounts.google.com",
        "aud": AUDIENCE,
        "sub": sub,
        "iat": now,
        "exp": now + 600,
    })
}

pub fn token(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(SIGNING_KEY.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

pub fn token_for(sub: &str) -> String {
    token(KID, &claims(sub))
}

/// Router over a fresh in-memory store, with `webroot` for static files.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<KeyCache>,
}

impl TestApp {
    pub fn new(webroot: &std::path::Path) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = cache();
        let verifier = Arc::new(
            TokenVerifier::new(Arc::clone(&cache), AUDIENCE).with_leeway(Duration::ZERO),
        );
        let state = Arc::new(AppState {
            store: Arc::clone(&store) as Arc<dyn DocumentStore>,
            verifier,
        });
        Self {
            router: create_router(state, webroot),
            store,
            cache,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, bytes.to_vec())
    }

    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, bytes) = self.request(method, uri, token, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }
}
