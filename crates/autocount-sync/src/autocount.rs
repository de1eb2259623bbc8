//! # AutoCount HTTP Client
//!
//! [`ErpClient`] over the AutoCount REST API.
//!
//! ## Endpoints
//! ```text
//! POST {base}/auth/login            {username, password}  ──► {token}
//! GET  {base}/{resource}                                   ──► [record] | {data: [record]}
//! POST {base}/{resource}            record                 ──► {docNo | code}
//! PUT  {base}/{resource}/{key}      partial record         ──► {status}
//!
//! resource: items | suppliers | purchase-orders
//! ```
//!
//! ## Status Mapping
//! | Call   | Response                                   | Error                 |
//! |--------|--------------------------------------------|-----------------------|
//! | login  | transport error, any non-2xx, no token     | AuthenticationFailed  |
//! | list   | transport error, non-2xx, unexpected shape | FetchFailed           |
//! | create | 409, or 400 saying "already exist"         | RemoteAlreadyExists   |
//! | update | 404                                        | RemoteNotFound        |
//! | write  | any other non-2xx                          | RemoteRejected        |
//!
//! List fetches are idempotent and retried with exponential backoff on
//! transport errors and 5xx. Creates and updates are never retried here.

use async_trait::async_trait;
use autocount_core::{mapper, schema_for, EntityKind, RemoteRecord};
use backoff::ExponentialBackoff;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::client::{CreateOutcome, Credential, ErpClient};
use crate::config::ErpSettings;
use crate::error::{SyncError, SyncResult};

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Response properties that may carry the ERP-assigned identifier.
const DOC_NO_FIELDS: &[&str] = &["docNo", "DocNo", "code", "Code"];

/// URL path segment for an entity class.
pub fn resource(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::InventoryItem => "items",
        EntityKind::Supplier => "suppliers",
        EntityKind::PurchaseOrder => "purchase-orders",
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

/// AutoCount REST client.
pub struct AutoCountClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    fetch_retry_max_elapsed: Duration,
}

impl AutoCountClient {
    /// Builds a client from explicit settings.
    pub fn new(settings: &ErpSettings) -> SyncResult<Self> {
        let mut base_url = settings.parsed_base_url()?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(AutoCountClient {
            http,
            base_url,
            username: settings.username.clone(),
            password: settings.password.clone(),
            fetch_retry_max_elapsed: settings.fetch_retry_max_elapsed(),
        })
    }

    fn endpoint(&self, kind: EntityKind) -> SyncResult<Url> {
        Ok(self.base_url.join(resource(kind))?)
    }

    fn record_endpoint(&self, kind: EntityKind, key: &str) -> SyncResult<Url> {
        let mut url = self.endpoint(kind)?;
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.to_string()))?
            .push(key);
        Ok(url)
    }

    async fn fetch_once(&self, credential: &Credential, kind: EntityKind) -> Result<Vec<RemoteRecord>, backoff::Error<String>> {
        let url = self.endpoint(kind).map_err(|e| backoff::Error::permanent(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(|e| backoff::Error::transient(describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| backoff::Error::transient(describe_transport_error(&e)))?;

        if status.is_server_error() {
            return Err(backoff::Error::transient(http_error(status, &body)));
        }
        if !status.is_success() {
            return Err(backoff::Error::permanent(http_error(status, &body)));
        }

        parse_record_list(&body).map_err(backoff::Error::permanent)
    }

    async fn write_error(&self, response: reqwest::Response) -> (StatusCode, String) {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        (status, truncate(&body))
    }
}

#[async_trait]
impl ErpClient for AutoCountClient {
    async fn authenticate(&self) -> SyncResult<Credential> {
        let url = self.base_url.join("auth/login")?;

        let response = self
            .http
            .post(url)
            .json(&json!({ "username": self.username, "password": self.password }))
            .send()
            .await
            .map_err(|e| SyncError::AuthenticationFailed(describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::AuthenticationFailed(http_error(status, &body)));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| SyncError::AuthenticationFailed(format!("unreadable login response: {e}")))?;

        match login.token {
            Some(token) if !token.is_empty() => {
                debug!(username = %self.username, "Logged in to AutoCount");
                Ok(Credential::new(token))
            }
            _ => Err(SyncError::AuthenticationFailed(
                "login response did not include a token".into(),
            )),
        }
    }

    async fn list(&self, credential: &Credential, kind: EntityKind) -> SyncResult<Vec<RemoteRecord>> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.fetch_retry_max_elapsed),
            ..Default::default()
        };

        backoff::future::retry_notify(
            policy,
            || self.fetch_once(credential, kind),
            |reason: String, wait: Duration| {
                warn!(entity = %kind, %reason, ?wait, "List fetch failed, retrying");
            },
        )
        .await
        .map_err(|reason| SyncError::FetchFailed {
            entity: kind.plural().to_string(),
            reason,
        })
    }

    async fn create(
        &self,
        credential: &Credential,
        kind: EntityKind,
        record: &RemoteRecord,
    ) -> SyncResult<CreateOutcome> {
        let key = mapper::remote_key(schema_for(kind), record).unwrap_or_default();

        let response = self
            .http
            .post(self.endpoint(kind)?)
            .bearer_auth(credential.token())
            .json(record)
            .send()
            .await
            .map_err(|e| SyncError::Http(describe_transport_error(&e)))?;

        if !response.status().is_success() {
            let (status, message) = self.write_error(response).await;
            if is_already_exists(status, &message) {
                return Err(SyncError::RemoteAlreadyExists {
                    entity: kind.as_str().to_string(),
                    key,
                });
            }
            return Err(SyncError::RemoteRejected {
                entity: kind.as_str().to_string(),
                key,
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok(CreateOutcome {
            doc_no: doc_no_from_body(&body),
        })
    }

    async fn update(
        &self,
        credential: &Credential,
        kind: EntityKind,
        key: &str,
        record: &RemoteRecord,
    ) -> SyncResult<()> {
        let response = self
            .http
            .put(self.record_endpoint(kind, key)?)
            .bearer_auth(credential.token())
            .json(record)
            .send()
            .await
            .map_err(|e| SyncError::Http(describe_transport_error(&e)))?;

        if response.status().is_success() {
            return Ok(());
        }

        let (status, message) = self.write_error(response).await;
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::RemoteNotFound {
                entity: kind.as_str().to_string(),
                key: key.to_string(),
            });
        }
        Err(SyncError::RemoteRejected {
            entity: kind.as_str().to_string(),
            key: key.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}

// =============================================================================
// Response Helpers
// =============================================================================

fn truncate(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}

fn http_error(status: StatusCode, body: &str) -> String {
    let body = truncate(body);
    if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body)
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("cannot reach AutoCount: {err}")
    } else {
        err.to_string()
    }
}

fn is_already_exists(status: StatusCode, message: &str) -> bool {
    status == StatusCode::CONFLICT
        || (status == StatusCode::BAD_REQUEST && message.to_lowercase().contains("already exist"))
}

/// Accepts a bare array or an object wrapping the array in `data`.
fn parse_record_list(body: &str) -> Result<Vec<RemoteRecord>, String> {
    let value: Value = serde_json::from_str(body).map_err(|e| format!("invalid JSON: {e}"))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => return Err("expected an array or an object with a 'data' array".into()),
        },
        _ => return Err("expected an array of records".into()),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            RemoteRecord::from_value(item).ok_or_else(|| format!("element {i} is not an object"))
        })
        .collect()
}

fn doc_no_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    DOC_NO_FIELDS.iter().find_map(|field| match value.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: &str) -> ErpSettings {
        ErpSettings {
            base_url: base_url.into(),
            username: "bridge".into(),
            password: "secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let client = AutoCountClient::new(&settings("https://erp.example.com/api")).unwrap();
        assert_eq!(
            client.endpoint(EntityKind::PurchaseOrder).unwrap().as_str(),
            "https://erp.example.com/api/purchase-orders"
        );
        assert_eq!(
            client.base_url.join("auth/login").unwrap().as_str(),
            "https://erp.example.com/api/auth/login"
        );
    }

    #[test]
    fn test_record_endpoint_escapes_key() {
        let client = AutoCountClient::new(&settings("https://erp.example.com/api/")).unwrap();
        let url = client.record_endpoint(EntityKind::InventoryItem, "BOLT M6/10").unwrap();
        assert_eq!(url.as_str(), "https://erp.example.com/api/items/BOLT%20M6%2F10");
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        assert!(matches!(
            AutoCountClient::new(&settings("ftp://erp.example.com")),
            Err(SyncError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_parse_record_list_shapes() {
        let bare = parse_record_list(r#"[{"AccNo": "400-A001"}]"#).unwrap();
        assert_eq!(bare.len(), 1);

        let wrapped = parse_record_list(r#"{"data": [{"AccNo": "A"}, {"AccNo": "B"}]}"#).unwrap();
        assert_eq!(wrapped.len(), 2);

        assert!(parse_record_list(r#"{"items": []}"#).is_err());
        assert!(parse_record_list(r#"[1, 2]"#).is_err());
        assert!(parse_record_list("not json").is_err());
    }

    #[test]
    fn test_doc_no_from_body() {
        assert_eq!(doc_no_from_body(r#"{"docNo": "PO-0001"}"#), Some("PO-0001".into()));
        assert_eq!(doc_no_from_body(r#"{"Code": "400-A001"}"#), Some("400-A001".into()));
        assert_eq!(doc_no_from_body(r#"{"status": "ok"}"#), None);
        assert_eq!(doc_no_from_body(""), None);
    }

    #[test]
    fn test_already_exists_detection() {
        assert!(is_already_exists(StatusCode::CONFLICT, ""));
        assert!(is_already_exists(StatusCode::BAD_REQUEST, "Item Code already exists."));
        assert!(!is_already_exists(StatusCode::BAD_REQUEST, "Description is required"));
        assert!(!is_already_exists(StatusCode::INTERNAL_SERVER_ERROR, "already exists"));
    }

    #[test]
    fn test_http_error_truncates_long_bodies() {
        let long = "x".repeat(MAX_ERROR_BODY + 20);
        let message = http_error(StatusCode::BAD_GATEWAY, &long);
        assert!(message.starts_with("HTTP 502: "));
        assert!(message.ends_with("... (truncated)"));
        assert_eq!(http_error(StatusCode::UNAUTHORIZED, ""), "HTTP 401");
    }

    // =========================================================================
    // Against a local HTTP server
    // =========================================================================

    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Seen {
        method: String,
        path: String,
        authorization: Option<String>,
    }

    type Responder = fn(&str, &str) -> (u16, &'static str);

    /// Serves canned responses chosen by (method, path) until the test ends.
    async fn serve(respond: Responder) -> (ErpSettings, Arc<Mutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(Some(request)) = read_request(&mut stream).await else {
                    continue;
                };
                let (status, body) = respond(&request.method, &request.path);
                log.lock().unwrap().push(request);

                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (settings(&format!("http://{addr}/api")), seen)
    }

    async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<Seen>> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let header_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.lines();
        let mut request_line = lines.next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line.next().unwrap_or_default().to_string();

        let mut content_length = 0;
        let mut authorization = None;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                match name.trim().to_ascii_lowercase().as_str() {
                    "content-length" => content_length = value.trim().parse().unwrap_or(0),
                    "authorization" => authorization = Some(value.trim().to_string()),
                    _ => {}
                }
            }
        }

        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        Ok(Some(Seen {
            method,
            path,
            authorization,
        }))
    }

    fn supplier(code: &str) -> RemoteRecord {
        RemoteRecord::from_value(json!({ "AccNo": code, "CompanyName": "Acme" })).unwrap()
    }

    fn item(code: &str) -> RemoteRecord {
        RemoteRecord::from_value(json!({ "ItemCode": code, "Description": "Bolt" })).unwrap()
    }

    #[tokio::test]
    async fn test_login_rejection_is_authentication_failure() {
        let (settings, _seen) = serve(|_, _| (401, r#"{"message": "Invalid credentials"}"#)).await;
        let client = AutoCountClient::new(&settings).unwrap();

        match client.authenticate().await {
            Err(SyncError::AuthenticationFailed(reason)) => assert!(reason.starts_with("HTTP 401")),
            other => panic!("expected AuthenticationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_without_token_is_authentication_failure() {
        let (settings, _seen) = serve(|_, _| (200, r#"{"status": "ok"}"#)).await;
        let client = AutoCountClient::new(&settings).unwrap();

        assert!(matches!(
            client.authenticate().await,
            Err(SyncError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_token_sent_as_bearer() {
        let (settings, seen) = serve(|method, path| match (method, path) {
            ("POST", "/api/auth/login") => (200, r#"{"token": "tok-123"}"#),
            ("GET", "/api/suppliers") => (200, r#"{"data": [{"AccNo": "400-A001"}]}"#),
            _ => (404, ""),
        })
        .await;
        let client = AutoCountClient::new(&settings).unwrap();

        let credential = client.authenticate().await.unwrap();
        let records = client.list(&credential, EntityKind::Supplier).await.unwrap();
        assert_eq!(records.len(), 1);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].authorization, None);
        assert_eq!(seen[1].method, "GET");
        assert_eq!(seen[1].authorization.as_deref(), Some("Bearer tok-123"));
    }

    #[tokio::test]
    async fn test_update_of_missing_record_is_not_found() {
        let (settings, seen) = serve(|_, _| (404, r#"{"message": "Not found"}"#)).await;
        let client = AutoCountClient::new(&settings).unwrap();
        let credential = Credential::new("tok-123");

        let result = client
            .update(&credential, EntityKind::Supplier, "400-A001", &supplier("400-A001"))
            .await;
        match result {
            Err(SyncError::RemoteNotFound { entity, key }) => {
                assert_eq!(entity, "supplier");
                assert_eq!(key, "400-A001");
            }
            other => panic!("expected RemoteNotFound, got {other:?}"),
        }

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0].method, "PUT");
        assert_eq!(seen[0].path, "/api/suppliers/400-A001");
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer tok-123"));
    }

    #[tokio::test]
    async fn test_create_conflicts_are_already_exists() {
        let (settings, _seen) = serve(|_, path| match path {
            "/api/suppliers" => (409, ""),
            "/api/items" => (400, r#"{"message": "Item Code already exists."}"#),
            _ => (400, r#"{"message": "Description is required"}"#),
        })
        .await;
        let client = AutoCountClient::new(&settings).unwrap();
        let credential = Credential::new("tok-123");

        match client.create(&credential, EntityKind::Supplier, &supplier("400-A001")).await {
            Err(SyncError::RemoteAlreadyExists { key, .. }) => assert_eq!(key, "400-A001"),
            other => panic!("expected RemoteAlreadyExists, got {other:?}"),
        }
        match client.create(&credential, EntityKind::InventoryItem, &item("BOLT-M6")).await {
            Err(SyncError::RemoteAlreadyExists { key, .. }) => assert_eq!(key, "BOLT-M6"),
            other => panic!("expected RemoteAlreadyExists, got {other:?}"),
        }

        let po = RemoteRecord::from_value(json!({ "DocNo": "PO-0001" })).unwrap();
        assert!(matches!(
            client.create(&credential, EntityKind::PurchaseOrder, &po).await,
            Err(SyncError::RemoteRejected { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn test_create_reads_assigned_doc_no() {
        let (settings, _seen) = serve(|_, _| (201, r#"{"docNo": "PO-0042"}"#)).await;
        let client = AutoCountClient::new(&settings).unwrap();

        let po = RemoteRecord::from_value(json!({ "SupplierCode": "400-A001" })).unwrap();
        let outcome = client
            .create(&Credential::new("tok-123"), EntityKind::PurchaseOrder, &po)
            .await
            .unwrap();
        assert_eq!(outcome.doc_no.as_deref(), Some("PO-0042"));
    }

    #[tokio::test]
    async fn test_list_retries_server_errors_then_fails() {
        let (mut settings, seen) = serve(|_, _| (503, "maintenance")).await;
        settings.fetch_retry_max_elapsed_secs = 1;
        let client = AutoCountClient::new(&settings).unwrap();

        match client.list(&Credential::new("tok-123"), EntityKind::Supplier).await {
            Err(SyncError::FetchFailed { entity, reason }) => {
                assert_eq!(entity, "suppliers");
                assert!(reason.starts_with("HTTP 503"));
            }
            other => panic!("expected FetchFailed, got {other:?}"),
        }

        let gets = seen.lock().unwrap().iter().filter(|s| s.method == "GET").count();
        assert!(gets >= 2, "expected the fetch to be retried, saw {gets} request(s)");
    }

    #[tokio::test]
    async fn test_list_client_error_is_not_retried() {
        let (settings, seen) = serve(|_, _| (403, "forbidden")).await;
        let client = AutoCountClient::new(&settings).unwrap();

        assert!(matches!(
            client.list(&Credential::new("tok-123"), EntityKind::Supplier).await,
            Err(SyncError::FetchFailed { .. })
        ));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
