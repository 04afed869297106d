//! HTTP surface: four operations on `/store/{addr}` and
//! `/store/{addr}/{keyhash}`. Routing, request/response shapes, and error
//! envelopes only — all invariants live in [`crate::store`].

use crate::error::StoreError;
use crate::hash::AccountHash;
use crate::store::{Node, StoreService};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StoreService>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/store/{addr}",
            get(retrieve_store_root).delete(remove_store_root),
        )
        .route(
            "/store/{addr}/{keyhash}",
            get(retrieve_store_key)
                .put(update_store)
                .delete(remove_store_key),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DumpQuery {
    dump: Option<bool>,
    since: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PutRequest {
    data: String,
    parent: String,
    iscollection: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

fn error_response(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn store_error_response(err: StoreError) -> (StatusCode, Json<ErrorBody>) {
    let status = match err {
        StoreError::AddressMalformed | StoreError::BucketMissing | StoreError::KeyMissing => {
            StatusCode::NOT_FOUND
        }
        StoreError::ParentMissing
        | StoreError::ParentNotCollection
        | StoreError::BodyMalformed
        | StoreError::DataMalformed => StatusCode::BAD_REQUEST,
        StoreError::StorageFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            message: err.to_string(),
        }),
    )
}

fn parse_addr(raw: &str) -> Result<AccountHash, (StatusCode, Json<ErrorBody>)> {
    raw.parse()
        .map_err(|_| error_response("accountNotFound"))
}

fn parse_dump_query(
    query: Result<Query<DumpQuery>, QueryRejection>,
) -> Result<DumpQuery, (StatusCode, Json<ErrorBody>)> {
    query
        .map(|Query(q)| q)
        .map_err(|_| store_error_response(StoreError::BodyMalformed))
}

/// `GET /store/{addr}` — always a whole-store dump (`K = ""`).
async fn retrieve_store_root(
    State(state): State<AppState>,
    Path(addr): Path<String>,
    query: Result<Query<DumpQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<Node>), (StatusCode, Json<ErrorBody>)> {
    let addr = parse_addr(&addr)?;
    let query = parse_dump_query(query)?;
    let only_index = !query.dump.unwrap_or(false);
    let since = query.since.map(|secs| secs.saturating_mul(1_000_000_000));

    tracing::debug!(%addr, "retrieve_store_root");

    match state.store.get(addr, "", only_index, since) {
        Ok(node) => Ok((StatusCode::CREATED, Json(node))),
        Err(StoreError::BucketMissing) => {
            Ok((StatusCode::CREATED, Json(Node::Dir(Default::default()))))
        }
        Err(e) => Err(store_error_response(e)),
    }
}

/// `GET /store/{addr}/{keyhash}` — retrieve a leaf, or dump the subtree
/// rooted at a collection.
async fn retrieve_store_key(
    State(state): State<AppState>,
    Path((addr, key)): Path<(String, String)>,
    query: Result<Query<DumpQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<Node>), (StatusCode, Json<ErrorBody>)> {
    let addr = parse_addr(&addr)?;
    let query = parse_dump_query(query)?;
    let only_index = !query.dump.unwrap_or(false);
    let since = query.since.map(|secs| secs.saturating_mul(1_000_000_000));

    tracing::debug!(%addr, key, "retrieve_store_key");

    match state.store.get(addr, &key, only_index, since) {
        Ok(node @ Node::Dir(ref map)) if is_single_leaf_view(map, &key) => {
            Ok((StatusCode::OK, Json(node)))
        }
        Ok(node) => Ok((StatusCode::CREATED, Json(node))),
        Err(e) => Err(store_error_response(e)),
    }
}

/// A leaf retrieve produces exactly `{ key: value }`; a dump produces the
/// full subtree mapping, which happens to ever coincide in shape only when
/// it is literally this single-entry form.
fn is_single_leaf_view(map: &std::collections::BTreeMap<String, Node>, key: &str) -> bool {
    map.len() == 1 && map.contains_key(key) && matches!(map.get(key), Some(Node::Leaf(_)))
}

/// `PUT /store/{addr}/{keyhash}`.
async fn update_store(
    State(state): State<AppState>,
    Path((addr, keyhash)): Path<(String, String)>,
    body: Result<Json<PutRequest>, JsonRejection>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    let addr = parse_addr(&addr)?;
    let Json(body) = body.map_err(|_| store_error_response(StoreError::BodyMalformed))?;

    let data = if body.data.is_empty() {
        None
    } else {
        use base64::Engine;
        Some(
            base64::engine::general_purpose::STANDARD
                .decode(&body.data)
                .map_err(|_| store_error_response(StoreError::DataMalformed))?,
        )
    };

    tracing::debug!(%addr, key = %keyhash, "update_store");

    state
        .store
        .put(addr, &keyhash, data, &body.parent, body.iscollection)
        .await
        .map_err(store_error_response)?;

    Ok(StatusCode::OK)
}

/// `DELETE /store/{addr}` — tombstone every entry, keeping the root.
async fn remove_store_root(
    State(state): State<AppState>,
    Path(addr): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    let addr = parse_addr(&addr)?;
    tracing::debug!(%addr, "remove_store_root");

    state
        .store
        .delete(addr, "")
        .await
        .map_err(store_error_response)?;

    Ok(StatusCode::OK)
}

/// `DELETE /store/{addr}/{keyhash}` — tombstone a key, cascading if it is a
/// collection.
async fn remove_store_key(
    State(state): State<AppState>,
    Path((addr, key)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    let addr = parse_addr(&addr)?;
    tracing::debug!(%addr, key, "remove_store_key");

    state
        .store
        .delete(addr, &key)
        .await
        .map_err(store_error_response)?;

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Db;
    use axum::body::Body;
    use axum::http::Request;
    use base64::Engine;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn router() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path().join("userstore.db")).await.unwrap();
        let store = StoreService::new(Arc::new(db));
        let state = AppState {
            store: Arc::new(store),
        };
        (create_router(state), dir)
    }

    fn account_hash() -> String {
        match crate::hash::hash_key("account") {
            crate::hash::KeyHash::Hash(b) => hex::encode(b),
            _ => unreachable!(),
        }
    }

    fn key_hash(s: &str) -> String {
        match crate::hash::hash_key(s) {
            crate::hash::KeyHash::Hash(b) => hex::encode(b),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn put_then_get_leaf_roundtrips() {
        let (router, _dir) = router().await;
        let addr = account_hash();
        let note = key_hash("note");
        let payload = base64::engine::general_purpose::STANDARD.encode(b"hello");

        let body = serde_json::json!({
            "data": payload,
            "parent": "",
            "iscollection": false,
        });

        let put_req = Request::builder()
            .method("PUT")
            .uri(format!("/store/{addr}/{note}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = router.clone().oneshot(put_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let get_req = Request::builder()
            .uri(format!("/store/{addr}/{note}"))
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(get_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value[&note], serde_json::json!([104, 101, 108, 108, 111]));
    }

    #[tokio::test]
    async fn put_with_missing_parent_is_bad_request() {
        let (router, _dir) = router().await;
        let addr = account_hash();
        let child = key_hash("child");
        let missing_parent = key_hash("does-not-exist");

        let body = serde_json::json!({
            "data": "",
            "parent": missing_parent,
            "iscollection": false,
        });
        let req = Request::builder()
            .method("PUT")
            .uri(format!("/store/{addr}/{child}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dump_whole_store_returns_created() {
        let (router, _dir) = router().await;
        let addr = account_hash();

        let req = Request::builder()
            .uri(format!("/store/{addr}"))
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn delete_then_dump_shows_tombstone() {
        let (router, _dir) = router().await;
        let addr = account_hash();
        let note = key_hash("note");
        let payload = base64::engine::general_purpose::STANDARD.encode(b"x");

        let body = serde_json::json!({ "data": payload, "parent": "", "iscollection": false });
        let put_req = Request::builder()
            .method("PUT")
            .uri(format!("/store/{addr}/{note}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        router.clone().oneshot(put_req).await.unwrap();

        let del_req = Request::builder()
            .method("DELETE")
            .uri(format!("/store/{addr}/{note}"))
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(del_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let dump_req = Request::builder()
            .uri(format!("/store/{addr}?dump=true"))
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(dump_req).await.unwrap();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value[&note], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn malformed_put_body_gets_json_error_envelope() {
        let (router, _dir) = router().await;
        let addr = account_hash();
        let note = key_hash("note");

        let req = Request::builder()
            .method("PUT")
            .uri(format!("/store/{addr}/{note}"))
            .header("content-type", "application/json")
            .body(Body::from("{ not valid json"))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["message"], "incorrect body");
    }

    #[tokio::test]
    async fn malformed_since_query_gets_json_error_envelope() {
        let (router, _dir) = router().await;
        let addr = account_hash();

        let req = Request::builder()
            .uri(format!("/store/{addr}?since=not-a-number"))
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["message"], "incorrect body");
    }
}
