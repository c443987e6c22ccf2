//! Task and login route handlers.
//!
//! Every task operation is scoped by the verified [`Subject`]: the `userid`
//! field is always overwritten with it on writes and always added to filters
//! on reads, updates and deletes. A `userid` sent by the client is ignored.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::router::AppState;
use crate::auth::Subject;
use crate::logging::summarize;
use crate::store::{Document, ID_FIELD, StoreError, into_document};

/// Field holding the owning subject on task documents.
pub const OWNER_FIELD: &str = "userid";

const LOGIN: &str = "login";
const TASK: &str = "task";

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        warn!(error = %self, "Storage operation failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

fn reply<T: Serialize>(status: StatusCode, result: Result<T, StoreError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Stamp the subject onto a document, replacing any client-supplied owner.
fn owned_by(mut doc: Document, subject: &Subject) -> Document {
    doc.insert(OWNER_FIELD.to_string(), Value::String(subject.0.clone()));
    doc
}

/// Parse a request body into a document.
///
/// Urlencoded forms become string fields; anything else is read as a JSON
/// object whatever its `content-type`. An empty body is an empty document.
fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<Document, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::new());
    }
    if is_form(headers) {
        return Ok(form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid JSON body: {e}")).into_response())?;
    into_document(value).map_err(IntoResponse::into_response)
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// `POST /a/login`: upsert the login record keyed by the body's `id`.
pub async fn login(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let doc = match parse_body(&headers, &body) {
        Ok(doc) => doc,
        Err(response) => return response,
    };
    let mut query = Document::new();
    query.insert(
        "id".to_string(),
        doc.get("id").cloned().unwrap_or(Value::Null),
    );

    let summary = summarize_document(&doc);
    debug!(body = %summary, "POST /a/login");
    let result = state.store.upsert(LOGIN, &query, doc).await;
    reply(StatusCode::CREATED, result)
}

/// `POST /a/task`: insert a task owned by the caller.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let doc = match parse_body(&headers, &body) {
        Ok(doc) => owned_by(doc, &subject),
        Err(response) => return response,
    };

    let summary = summarize_document(&doc);
    debug!(task = %summary, "POST /a/task");
    let result = state.store.insert(TASK, doc).await;
    reply(StatusCode::CREATED, result)
}

/// `PUT /a/task/{task_id}`: merge the body into the caller's task.
///
/// `_id` and `userid` in the body are ignored so a task can neither be
/// renamed nor handed to another user.
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut fields = match parse_body(&headers, &body) {
        Ok(doc) => doc,
        Err(response) => return response,
    };
    fields.remove(ID_FIELD);
    fields.remove(OWNER_FIELD);

    let mut query = owned_by(Document::new(), &subject);
    query.insert(ID_FIELD.to_string(), Value::String(task_id));

    let summary = summarize_document(&query);
    debug!(query = %summary, "PUT /a/task");
    let result = state.store.update_one(TASK, &query, fields).await;
    reply(StatusCode::OK, result)
}

/// `DELETE /a/task/{task_id}`: delete the caller's task, optionally
/// narrowed by extra fields in the body.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let extra = match parse_body(&headers, &body) {
        Ok(doc) => doc,
        Err(response) => return response,
    };

    let mut query = owned_by(extra, &subject);
    query.insert(ID_FIELD.to_string(), Value::String(task_id));

    let summary = summarize_document(&query);
    debug!(query = %summary, "DELETE /a/task");
    let result = state.store.delete_one(TASK, &query).await;
    reply(StatusCode::OK, result)
}

/// `GET /a/tasks`: list the caller's tasks, filtered by any query parameters.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter: Document = params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    let filter = owned_by(filter, &subject);

    let summary = summarize_document(&filter);
    debug!(filter = %summary, "GET /a/tasks");
    let result = state.store.find(TASK, &filter).await;
    reply(StatusCode::OK, result)
}

fn summarize_document(doc: &Document) -> String {
    summarize(&serde_json::Value::Object(doc.clone()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn owner_is_overwritten() {
        let doc = into_document(json!({ "title": "x", "userid": "attacker" })).unwrap();

        let doc = owned_by(doc, &Subject("u1".to_string()));

        assert_eq!(doc["userid"], json!("u1"));
        assert_eq!(doc["title"], json!("x"));
    }

    #[test]
    fn empty_body_is_empty_document() {
        let headers = HeaderMap::new();

        assert!(parse_body(&headers, &Bytes::new()).unwrap().is_empty());
        assert!(parse_body(&headers, &Bytes::from_static(b"  \n")).unwrap().is_empty());
    }

    #[test]
    fn body_must_be_json_object() {
        let headers = HeaderMap::new();

        assert_eq!(
            parse_body(&headers, &Bytes::from_static(b"{\"done\":true}")).unwrap()["done"],
            json!(true)
        );
        assert_eq!(
            parse_body(&headers, &Bytes::from_static(b"{oops")).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            parse_body(&headers, &Bytes::from_static(b"[1]")).unwrap_err().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn urlencoded_body_becomes_string_fields() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded; charset=UTF-8".parse().unwrap(),
        );

        let doc = parse_body(&headers, &Bytes::from_static(b"title=buy+milk&done=false")).unwrap();

        assert_eq!(doc["title"], json!("buy milk"));
        assert_eq!(doc["done"], json!("false"));
    }

    #[test]
    fn json_is_read_without_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());

        let doc = parse_body(&headers, &Bytes::from_static(b"{\"title\":\"a\"}")).unwrap();

        assert_eq!(doc["title"], json!("a"));
    }

    #[test]
    fn summary_renders_document() {
        let doc = into_document(json!({ "title": "x" })).unwrap();

        assert_eq!(summarize_document(&doc), r#"{"title":"x"}"#);
    }
}
