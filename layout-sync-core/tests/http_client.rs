//! Runs `HttpLayoutClient` against an in-process layouts server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use layout_sync_core::remote::{LayoutPatch, NewRemoteLayout};
use layout_sync_core::{
    check_server, HttpLayoutClient, LayoutId, LayoutPermission, Namespace, RemoteError,
    RemoteLayout, RemoteLayoutClient, UpdateOutcome,
};

const API_KEY: &str = "secret";

type Layouts = Arc<Mutex<HashMap<String, (String, RemoteLayout)>>>;

#[derive(Deserialize)]
struct ListParams {
    namespace: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBody {
    expected_saved_at: DateTime<Utc>,
    name: Option<String>,
    data: Option<Value>,
    saved_at: DateTime<Utc>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", API_KEY))
        .unwrap_or(false)
}

async fn list(
    State(layouts): State<Layouts>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let layouts: Vec<RemoteLayout> = layouts
        .lock()
        .unwrap()
        .values()
        .filter(|(ns, _)| *ns == params.namespace)
        .map(|(_, l)| l.clone())
        .collect();
    Json(layouts).into_response()
}

async fn create(State(layouts): State<Layouts>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let namespace = body["namespace"].as_str().unwrap_or_default().to_string();
    if namespace == "readonly" {
        return (StatusCode::FORBIDDEN, "namespace is read-only").into_response();
    }
    let mut layout: RemoteLayout = match serde_json::from_value(body) {
        Ok(layout) => layout,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    layout.id = LayoutId::from(format!("srv-{}", layout.id));
    layouts
        .lock()
        .unwrap()
        .insert(layout.id.to_string(), (namespace, layout.clone()));
    (StatusCode::CREATED, Json(layout)).into_response()
}

async fn fetch(State(layouts): State<Layouts>, Path(id): Path<String>) -> Response {
    if id == "boom" {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    match layouts.lock().unwrap().get(&id) {
        Some((_, layout)) => Json(layout.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn update(
    State(layouts): State<Layouts>,
    Path(id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Response {
    let mut layouts = layouts.lock().unwrap();
    let Some((_, layout)) = layouts.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if layout.saved_at != body.expected_saved_at {
        return StatusCode::CONFLICT.into_response();
    }
    if let Some(name) = body.name {
        layout.name = name;
    }
    if let Some(data) = body.data {
        layout.data = data;
    }
    layout.saved_at = body.saved_at;
    Json(layout.clone()).into_response()
}

async fn remove(State(layouts): State<Layouts>, Path(id): Path<String>) -> StatusCode {
    match layouts.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn start_server() -> (String, Layouts) {
    let layouts: Layouts = Arc::new(Mutex::new(HashMap::new()));
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/v1/layouts", get(list).post(create))
        .route("/v1/layouts/{id}", get(fetch).patch(update).delete(remove))
        .with_state(layouts.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), layouts)
}

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn new_layout(id: &str, saved_at: DateTime<Utc>) -> NewRemoteLayout {
    NewRemoteLayout {
        id: LayoutId::from(id),
        parent: "proj".to_string(),
        name: "Main".to_string(),
        permission: LayoutPermission::CreatorWrite,
        data: json!({ "a": 1 }),
        saved_at,
    }
}

fn client(url: &str) -> HttpLayoutClient {
    HttpLayoutClient::new(url.to_string(), API_KEY.to_string()).unwrap()
}

#[tokio::test]
async fn test_create_then_list_and_get() {
    let (url, _layouts) = start_server().await;
    let client = client(&url);
    let ns = Namespace::new("user");

    let created = client.create_layout(&ns, new_layout("L1", ts(100))).await.unwrap();
    assert_eq!(created.id, LayoutId::from("srv-L1"));
    assert_eq!(created.saved_at, ts(100));
    assert!(!created.is_project_recommended);

    let listed = client.list_layouts(&ns).await.unwrap();
    assert_eq!(listed, vec![created.clone()]);
    assert!(client
        .list_layouts(&Namespace::new("other"))
        .await
        .unwrap()
        .is_empty());

    assert_eq!(client.get_layout(&created.id).await.unwrap(), Some(created));
    assert_eq!(client.get_layout(&LayoutId::from("missing")).await.unwrap(), None);
}

#[tokio::test]
async fn test_update_with_precondition() {
    let (url, _layouts) = start_server().await;
    let client = client(&url);
    let created = client
        .create_layout(&Namespace::new("user"), new_layout("L1", ts(100)))
        .await
        .unwrap();

    let patch = LayoutPatch {
        name: None,
        data: Some(json!({ "a": 2 })),
        saved_at: ts(150),
    };
    let outcome = client
        .update_layout(&created.id, ts(100), patch.clone())
        .await
        .unwrap();
    match outcome {
        UpdateOutcome::Success(updated) => {
            assert_eq!(updated.data, json!({ "a": 2 }));
            assert_eq!(updated.saved_at, ts(150));
            assert_eq!(updated.name, "Main");
        }
        UpdateOutcome::Conflict => panic!("expected success"),
    }

    // Stale precondition
    let outcome = client.update_layout(&created.id, ts(100), patch.clone()).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Conflict);

    let missing = client
        .update_layout(&LayoutId::from("missing"), ts(100), patch)
        .await;
    assert!(matches!(missing, Err(RemoteError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_reports_existence() {
    let (url, _layouts) = start_server().await;
    let client = client(&url);
    let created = client
        .create_layout(&Namespace::new("user"), new_layout("L1", ts(100)))
        .await
        .unwrap();

    assert!(client.delete_layout(&created.id).await.unwrap());
    assert!(!client.delete_layout(&created.id).await.unwrap());
}

#[tokio::test]
async fn test_error_mapping() {
    let (url, _layouts) = start_server().await;

    let denied = client(&url)
        .create_layout(&Namespace::new("readonly"), new_layout("L1", ts(100)))
        .await;
    assert!(matches!(denied, Err(RemoteError::PermissionDenied(msg)) if msg.contains("read-only")));

    let unauthorized = HttpLayoutClient::new(url.clone(), "wrong".to_string())
        .unwrap()
        .list_layouts(&Namespace::new("user"))
        .await;
    assert!(matches!(unauthorized, Err(RemoteError::PermissionDenied(_))));

    let server_error = client(&url).get_layout(&LayoutId::from("boom")).await;
    assert!(matches!(server_error, Err(ref e) if e.is_retryable()));
}

#[tokio::test]
async fn test_unreachable_server_is_retryable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let result = client(&url).list_layouts(&Namespace::new("user")).await;
    assert!(matches!(result, Err(ref e) if e.is_retryable()));
    assert!(!check_server(&url).await);
}

#[tokio::test]
async fn test_check_server() {
    let (url, _layouts) = start_server().await;
    assert!(check_server(&url).await);
}
