//! 进程内的 Cloudflare KV REST API 模拟服务（axum）

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;

use kv_export::config::CloudflareConfig;
use kv_export::CloudflareClient;

pub const ACCOUNT: &str = "acc-1";
pub const NAMESPACE: &str = "ns-1";
pub const TOKEN: &str = "active-token";

#[derive(Default)]
pub struct MockState {
    /// 每页的键名
    pub pages: Vec<Vec<String>>,
    /// 键 -> 原始响应体
    pub values: HashMap<String, String>,
    /// 键 -> 原始二进制响应体
    pub binary_values: HashMap<String, Vec<u8>>,
    /// 键 -> 失败状态码
    pub failing_values: HashMap<String, u16>,
    /// 每次列键请求的查询参数
    pub list_queries: Mutex<Vec<HashMap<String, String>>>,
    /// 每次值请求的键名（已解码）
    pub value_requests: Mutex<Vec<String>>,
}

impl MockState {
    /// 生成 k000, k001, ... 的分页键，值为 `{"idx": n}`
    pub fn with_page_sizes(sizes: &[usize]) -> Self {
        let mut idx = 0usize;
        let mut values = HashMap::new();
        let pages = sizes
            .iter()
            .map(|&n| {
                (0..n)
                    .map(|_| {
                        let name = format!("k{idx:03}");
                        values.insert(name.clone(), json!({ "idx": idx }).to_string());
                        idx += 1;
                        name
                    })
                    .collect()
            })
            .collect();
        Self {
            pages,
            values,
            ..Self::default()
        }
    }

    pub fn all_keys(&self) -> Vec<String> {
        self.pages.iter().flatten().cloned().collect()
    }

    pub fn list_queries(&self) -> Vec<HashMap<String, String>> {
        self.list_queries.lock().expect("lock").clone()
    }
}

pub struct MockCloudflare {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockCloudflare {
    pub fn client(&self) -> CloudflareClient {
        let cfg = CloudflareConfig {
            base_url: self.base_url.clone(),
            timeout_secs: 5,
            ..CloudflareConfig::default()
        };
        CloudflareClient::new(&cfg).expect("build client")
    }
}

pub fn cursor_for(page: usize) -> String {
    // 故意包含需要编码的字符
    format!("cur+{page}/=?&x")
}

fn page_for(cursor: Option<&String>) -> usize {
    cursor
        .and_then(|c| c.strip_prefix("cur+"))
        .and_then(|c| c.split('/').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "success": false,
            "errors": [{ "code": 10000, "message": "Authentication error" }]
        })),
    )
        .into_response()
}

async fn verify(headers: HeaderMap) -> Response {
    match bearer(&headers).as_deref() {
        Some("active-token") => Json(json!({
            "success": true,
            "result": { "id": "tok", "status": "active" }
        }))
        .into_response(),
        Some("disabled-token") => Json(json!({
            "success": true,
            "result": { "id": "tok", "status": "disabled" }
        }))
        .into_response(),
        Some("boom-token") => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
        Some("garbage-token") => (StatusCode::OK, "{this is not json").into_response(),
        _ => unauthorized(),
    }
}

async fn namespaces(Path(account): Path<String>, headers: HeaderMap) -> Response {
    if bearer(&headers).as_deref() != Some(TOKEN) {
        return unauthorized();
    }
    if account != ACCOUNT {
        return (StatusCode::FORBIDDEN, "account not accessible").into_response();
    }
    Json(json!({
        "success": true,
        "result": [
            { "id": NAMESPACE, "title": "prod-cache", "supports_url_encoding": true },
            { "id": "ns-2", "title": "staging" }
        ],
        "result_info": { "page": 1, "per_page": 20, "count": 2, "total_count": 2 }
    }))
    .into_response()
}

async fn keys(
    State(state): State<Arc<MockState>>,
    Path((_account, _ns)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if bearer(&headers).as_deref() != Some(TOKEN) {
        return unauthorized();
    }
    let page = page_for(query.get("cursor"));
    state.list_queries.lock().expect("lock").push(query);

    let names = state.pages.get(page).cloned().unwrap_or_default();
    let next = if page + 1 < state.pages.len() {
        cursor_for(page + 1)
    } else {
        String::new()
    };
    let result: Vec<_> = names.iter().map(|n| json!({ "name": n })).collect();
    Json(json!({
        "success": true,
        "result": result,
        "result_info": { "count": names.len(), "cursor": next }
    }))
    .into_response()
}

async fn value(
    State(state): State<Arc<MockState>>,
    Path((_account, _ns, key)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if bearer(&headers).as_deref() != Some(TOKEN) {
        return unauthorized();
    }
    state.value_requests.lock().expect("lock").push(key.clone());

    if let Some(&status) = state.failing_values.get(&key) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, format!("cannot read {key}")).into_response();
    }
    if let Some(bytes) = state.binary_values.get(&key) {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes.clone(),
        )
            .into_response();
    }
    match state.values.get(&key) {
        Some(body) => (StatusCode::OK, body.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "errors": [{ "code": 10009, "message": "get: 'key not found'" }]
            })),
        )
            .into_response(),
    }
}

pub async fn start(state: MockState) -> MockCloudflare {
    let state = Arc::new(state);
    let app = Router::new()
        .route("/client/v4/user/tokens/verify", get(verify))
        .route(
            "/client/v4/accounts/:account/storage/kv/namespaces",
            get(namespaces),
        )
        .route(
            "/client/v4/accounts/:account/storage/kv/namespaces/:ns/keys",
            get(keys),
        )
        .route(
            "/client/v4/accounts/:account/storage/kv/namespaces/:ns/values/:key",
            get(value),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind tcp listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockCloudflare {
        base_url: format!("http://{addr}/client/v4"),
        state,
    }
}
