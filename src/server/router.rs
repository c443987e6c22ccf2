//! HTTP router, CORS and static file fallback

use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};

use super::{handlers, realtime};
use crate::auth::{TokenVerifier, authorize};
use crate::store::DocumentStore;

/// Prefix under which every route requires a verified ID token.
pub const PROTECTED_PREFIX: &str = "/a";

/// Shared application state
pub struct AppState {
    /// Document store
    pub store: Arc<dyn DocumentStore>,
    /// ID token verifier used by the authorization gate
    pub verifier: Arc<TokenVerifier>,
}

/// Create the router.
///
/// Every request under [`PROTECTED_PREFIX`] passes through the authorization
/// gate, routed or not; `/socket` and the static files under `webroot` do not. CORS wraps
/// everything, so preflights are answered before authorization runs.
pub fn create_router(state: Arc<AppState>, webroot: &Path) -> Router {
    let protected = Router::new()
        .route("/login", post(handlers::login))
        .route("/task", post(handlers::create_task))
        .route(
            "/task/{task_id}",
            put(handlers::update_task).delete(handlers::delete_task),
        )
        .route("/tasks", get(handlers::list_tasks))
        // Unrouted paths under the prefix stop here rather than reaching
        // the static files, and still pass through the gate first.
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.verifier),
            authorize,
        ));

    Router::new()
        .nest(PROTECTED_PREFIX, protected)
        .route("/socket", get(realtime::socket_handler))
        .fallback_service(ServeDir::new(webroot))
        .layer(middleware::from_fn(allow_cross_domain))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allow cross-origin requests and end preflights with an empty 204.
async fn allow_cross_domain(request: Request<Body>, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("PUT, GET, POST, DELETE"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization"),
    );
    response
}
