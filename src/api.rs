//! Content backend API client.
//!
//! Provides authenticated HTTP communication with the order backend: login,
//! current user, order collection, order update and the asset (upload)
//! store. Every call except login carries `Authorization: Bearer <token>`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::media::ProofImage;
use crate::order::{parse_orders, scalar_text, Order, OrderUpdate};

/// Multipart field the upload endpoint reads files from.
const UPLOAD_FIELD: &str = "files";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Profile of the authenticated handler (`/api/users/me`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub id: Option<String>,
    pub username: String,
    pub email: Option<String>,
}

/// Successful login: the issued bearer token and, when the backend sends
/// it, the user record.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub jwt: String,
    pub user: Option<UserProfile>,
}

/// One record from the asset store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub mime: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    jwt: Option<String>,
    #[serde(default)]
    user: Option<Value>,
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// Operations the board needs from the remote service.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, identifier: &str, password: &str) -> Result<AuthResponse>;
    async fn current_user(&self, token: &str) -> Result<UserProfile>;
    async fn list_orders(&self, token: &str) -> Result<Vec<Order>>;
    async fn update_order(&self, token: &str, order_id: &str, update: &OrderUpdate)
        -> Result<()>;
    async fn upload(&self, token: &str, image: &ProofImage) -> Result<Vec<UploadedFile>>;
    async fn delete_upload(&self, token: &str, asset_id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/api` segment
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid backend URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Fallback message for a status code with no usable body.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Token is invalid or expired".to_string(),
        403 => "Forbidden".to_string(),
        404 => "Backend endpoint not found".to_string(),
        s if s >= 500 => "Backend server error".to_string(),
        _ => "Unexpected response from backend".to_string(),
    }
}

/// Pull the backend's own error text out of a response body. Handles
/// `{"error": {"message": ..}}`, `{"message": ..}` and `{"error": ".."}`.
fn extract_error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.pointer("/error/message")
        .or_else(|| json.get("message"))
        .or_else(|| json.get("error"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Map a non-success response to an [`Error`].
fn error_for_status(status: StatusCode, body: &str) -> Error {
    let message = extract_error_message(body).unwrap_or_else(|| status_error(status));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(message),
        _ => Error::Backend {
            status: status.as_u16(),
            message,
        },
    }
}

/// An order update only counts when the backend answers 200 or 204; any
/// other success code is reported with its status line.
fn check_update_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
        return Ok(());
    }
    Err(Error::Backend {
        status: status.as_u16(),
        message: format!(
            "Failed to update order status. Response: {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        ),
    })
}

fn parse_user(body: &Value) -> Result<UserProfile> {
    let username = body
        .get("username")
        .and_then(scalar_text)
        .ok_or_else(|| Error::UnexpectedResponse("No user data found".into()))?;
    Ok(UserProfile {
        id: body.get("id").and_then(scalar_text),
        username,
        email: body.get("email").and_then(scalar_text),
    })
}

fn parse_uploaded_files(body: &Value) -> Result<Vec<UploadedFile>> {
    let records = body
        .as_array()
        .ok_or_else(|| Error::UnexpectedResponse("Upload response is not a file list".into()))?;
    records
        .iter()
        .map(|r| {
            let id = r.get("id").and_then(scalar_text).ok_or_else(|| {
                Error::UnexpectedResponse("Uploaded file record has no id".into())
            })?;
            Ok(UploadedFile {
                id,
                name: r.get("name").and_then(scalar_text),
                url: r.get("url").and_then(scalar_text),
                mime: r.get("mime").and_then(scalar_text),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// reqwest-backed client for the order backend.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Self::with_builder(base_url, Client::builder().timeout(timeout))
    }

    fn with_builder(base_url: &str, builder: reqwest::ClientBuilder) -> Result<Self> {
        let base_url = normalize_base_url(base_url);
        if base_url.is_empty() {
            return Err(Error::Config("backend URL is empty".into()));
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    /// Send a request and turn non-success statuses into errors.
    async fn send(&self, req: RequestBuilder, method: &str, path: &str) -> Result<Response> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Network(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();
        debug!(method, path, status = status.as_u16(), "backend call");
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }

    /// Read a JSON body, or `null` for an empty one.
    async fn json(resp: Response) -> Result<Value> {
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Network(format!("Failed to read backend response: {e}")))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::UnexpectedResponse(format!("Invalid JSON from backend: {e}")))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn login(&self, identifier: &str, password: &str) -> Result<AuthResponse> {
        let path = "/api/auth/local";
        let req = self
            .request(Method::POST, path, None)
            .json(&serde_json::json!({ "identifier": identifier, "password": password }));
        let body = Self::json(self.send(req, "POST", path).await?).await?;
        let parsed: LoginResponse = serde_json::from_value(body).map_err(|e| {
            Error::UnexpectedResponse(format!("Unexpected login response: {e}"))
        })?;
        let jwt = parsed
            .jwt
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::UnexpectedResponse("Login response has no token".into()))?;
        let user = parsed.user.as_ref().and_then(|u| parse_user(u).ok());
        Ok(AuthResponse { jwt, user })
    }

    async fn current_user(&self, token: &str) -> Result<UserProfile> {
        let path = "/api/users/me";
        let req = self.request(Method::GET, path, Some(token));
        let body = Self::json(self.send(req, "GET", path).await?).await?;
        parse_user(&body)
    }

    async fn list_orders(&self, token: &str) -> Result<Vec<Order>> {
        let path = "/api/orders";
        let req = self.request(Method::GET, path, Some(token));
        let body = Self::json(self.send(req, "GET", path).await?).await?;
        parse_orders(&body)
    }

    async fn update_order(
        &self,
        token: &str,
        order_id: &str,
        update: &OrderUpdate,
    ) -> Result<()> {
        let path = format!("/api/orders/{order_id}");
        let req = self
            .request(Method::PUT, &path, Some(token))
            .json(&update.to_body());
        let resp = self.send(req, "PUT", &path).await?;
        check_update_status(resp.status())
    }

    async fn upload(&self, token: &str, image: &ProofImage) -> Result<Vec<UploadedFile>> {
        let path = "/api/upload";
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime)
            .map_err(|e| Error::InvalidImage(format!("bad MIME type {}: {e}", image.mime)))?;
        let form = Form::new().part(UPLOAD_FIELD, part);
        let req = self.request(Method::POST, path, Some(token)).multipart(form);

        let result = async {
            let body = Self::json(self.send(req, "POST", path).await?).await?;
            parse_uploaded_files(&body)
        }
        .await;
        if let Err(e) = &result {
            error!(error = %e, file = %image.file_name, "error uploading image");
        }
        result
    }

    async fn delete_upload(&self, token: &str, asset_id: &str) -> Result<()> {
        let path = format!("/api/upload/files/{asset_id}");
        let req = self.request(Method::DELETE, &path, Some(token));
        self.send(req, "DELETE", &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_base_urls() {
        assert_eq!(
            normalize_base_url("orders.example.com/api/"),
            "https://orders.example.com"
        );
        assert_eq!(
            normalize_base_url("localhost:1337"),
            "http://localhost:1337"
        );
        assert_eq!(
            normalize_base_url(" http://127.0.0.1:1337// "),
            "http://127.0.0.1:1337"
        );
        assert_eq!(normalize_base_url(""), "");
    }

    #[test]
    fn backend_messages_are_preferred_over_status_text() {
        let body = r#"{"data":null,"error":{"status":400,"name":"ValidationError","message":"Invalid identifier or password"}}"#;
        let err = error_for_status(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.to_string(), "Invalid identifier or password (HTTP 400)");

        let err = error_for_status(StatusCode::BAD_GATEWAY, "");
        assert_eq!(
            err.to_string(),
            "Backend server error (HTTP 502)"
        );
    }

    #[test]
    fn authorization_statuses_map_to_unauthorized() {
        let err = error_for_status(StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err, Error::Unauthorized(ref m) if m == "Token is invalid or expired"));
        assert!(error_for_status(StatusCode::FORBIDDEN, r#"{"message":"nope"}"#).is_auth_failure());
    }

    #[test]
    fn only_200_and_204_complete_an_update() {
        assert!(check_update_status(StatusCode::OK).is_ok());
        assert!(check_update_status(StatusCode::NO_CONTENT).is_ok());
        let err = check_update_status(StatusCode::CREATED).expect_err("201 is not accepted");
        assert!(matches!(err, Error::Backend { status: 201, .. }));
        assert_eq!(
            err.to_string(),
            "Failed to update order status. Response: 201 - Created (HTTP 201)"
        );
    }

    #[test]
    fn usernames_are_kept_verbatim() {
        let user = parse_user(&serde_json::json!({ "username": "alice " })).expect("user");
        assert_eq!(user.username, "alice ");
    }

    #[test]
    fn user_without_username_is_unexpected() {
        let err = parse_user(&serde_json::json!({ "id": 3 })).expect_err("missing username");
        assert_eq!(err.to_string(), "No user data found");

        let user = parse_user(&serde_json::json!({
            "id": 3, "username": "alice", "email": "alice@example.com"
        }))
        .expect("valid user");
        assert_eq!(user.username, "alice");
        assert_eq!(user.id.as_deref(), Some("3"));
    }

    #[test]
    fn upload_response_is_a_file_list() {
        let files = parse_uploaded_files(&serde_json::json!([
            { "id": 311, "name": "delivery_proof.jpeg", "mime": "image/jpeg", "url": "/uploads/p.jpeg" }
        ]))
        .expect("file list");
        assert_eq!(files[0].id, "311");
        assert_eq!(files[0].mime.as_deref(), Some("image/jpeg"));

        assert!(parse_uploaded_files(&serde_json::json!({ "id": 1 })).is_err());
        assert!(parse_uploaded_files(&serde_json::json!([{ "name": "x" }])).is_err());
    }

    #[test]
    fn client_rejects_empty_base_url() {
        assert!(matches!(
            HttpBackend::new("   ", Duration::from_secs(5)),
            Err(Error::Config(_))
        ));
        let backend =
            HttpBackend::new("orders.example.com/api", Duration::from_secs(5)).expect("client");
        assert_eq!(backend.base_url(), "https://orders.example.com");
    }

    // -----------------------------------------------------------------------
    // Wire format, against a one-shot local HTTP server
    // -----------------------------------------------------------------------

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    /// Whether `buf` holds a complete HTTP/1.1 request.
    fn request_complete(buf: &[u8]) -> bool {
        let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
        let body_len = buf.len() - head_end - 4;
        if let Some(len) = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            return body_len >= len;
        }
        if head.contains("transfer-encoding: chunked") {
            return buf.ends_with(b"0\r\n\r\n");
        }
        true
    }

    /// Answer exactly one request with `status` and `body`; the handle
    /// yields the raw request as received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            while !request_complete(&buf) {
                let n = stream.read(&mut chunk).await.expect("read request");
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.expect("write response");
            let _ = stream.shutdown().await;
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn request_body(raw: &str) -> &str {
        raw.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("")
    }

    fn client(base_url: &str) -> HttpBackend {
        let builder = Client::builder().no_proxy().timeout(Duration::from_secs(5));
        HttpBackend::with_builder(base_url, builder).expect("client")
    }

    #[tokio::test]
    async fn update_is_a_bearer_put_with_data_envelope() {
        let (url, server) = serve_once("200 OK", r#"{"data":{"id":42}}"#).await;
        client(&url)
            .update_order("jwt-abc", "42", &OrderUpdate::status(crate::order::OrderStatus::ToShip))
            .await
            .expect("update accepted");

        let raw = server.await.expect("server");
        assert!(raw.starts_with("PUT /api/orders/42 HTTP/1.1\r\n"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer jwt-abc\r\n"));
        let body: Value = serde_json::from_str(request_body(&raw)).expect("json body");
        assert_eq!(body, serde_json::json!({ "data": { "status": "To Ship" } }));
    }

    #[tokio::test]
    async fn delivered_update_carries_numeric_proof() {
        let (url, server) = serve_once("204 No Content", "").await;
        let update = OrderUpdate::with_proof(crate::order::OrderStatus::Delivered, "311");
        client(&url)
            .update_order("jwt-abc", "42", &update)
            .await
            .expect("204 accepted");

        let raw = server.await.expect("server");
        let body: Value = serde_json::from_str(request_body(&raw)).expect("json body");
        assert_eq!(
            body,
            serde_json::json!({ "data": { "status": "Delivered", "delivery_proof": 311 } })
        );
    }

    #[tokio::test]
    async fn update_answered_with_201_is_a_failure() {
        let (url, server) = serve_once("201 Created", "{}").await;
        let err = client(&url)
            .update_order("jwt-abc", "42", &OrderUpdate::status(crate::order::OrderStatus::Cancelled))
            .await
            .expect_err("201 rejected");
        server.await.expect("server");
        assert!(err
            .to_string()
            .starts_with("Failed to update order status. Response: 201 - Created"));
    }

    #[tokio::test]
    async fn upload_posts_multipart_files_field() {
        let (url, server) =
            serve_once("200 OK", r#"[{"id":311,"name":"delivery_proof.png","mime":"image/png"}]"#)
                .await;
        let image = ProofImage {
            file_name: "delivery_proof.png".into(),
            mime: "image/png".into(),
            bytes: PNG_HEADER.to_vec(),
        };
        let files = client(&url).upload("jwt-abc", &image).await.expect("upload");
        assert_eq!(files[0].id, "311");

        let raw = server.await.expect("server");
        let lower = raw.to_ascii_lowercase();
        assert!(raw.starts_with("POST /api/upload HTTP/1.1\r\n"));
        assert!(lower.contains("authorization: bearer jwt-abc\r\n"));
        assert!(lower.contains("content-type: multipart/form-data; boundary="));
        assert!(raw.contains(r#"name="files"; filename="delivery_proof.png""#));
        assert!(lower.contains("content-type: image/png"));
    }

    #[tokio::test]
    async fn delete_targets_the_upload_file_path() {
        let (url, server) = serve_once("200 OK", r#"{"id":311}"#).await;
        client(&url)
            .delete_upload("jwt-abc", "311")
            .await
            .expect("delete");
        let raw = server.await.expect("server");
        assert!(raw.starts_with("DELETE /api/upload/files/311 HTTP/1.1\r\n"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer jwt-abc\r\n"));
    }

    #[tokio::test]
    async fn login_posts_identifier_without_auth_header() {
        let (url, server) =
            serve_once("200 OK", r#"{"jwt":"jwt-new","user":{"id":1,"username":"alice"}}"#).await;
        let auth = client(&url).login("alice", "secret").await.expect("login");
        assert_eq!(auth.jwt, "jwt-new");
        assert_eq!(auth.user.map(|u| u.username).as_deref(), Some("alice"));

        let raw = server.await.expect("server");
        assert!(raw.starts_with("POST /api/auth/local HTTP/1.1\r\n"));
        assert!(!raw.to_ascii_lowercase().contains("authorization:"));
        let body: Value = serde_json::from_str(request_body(&raw)).expect("json body");
        assert_eq!(
            body,
            serde_json::json!({ "identifier": "alice", "password": "secret" })
        );
    }

    #[tokio::test]
    async fn rejected_token_is_unauthorized() {
        let (url, server) = serve_once(
            "401 Unauthorized",
            r#"{"data":null,"error":{"status":401,"message":"Missing or invalid credentials"}}"#,
        )
        .await;
        let err = client(&url).current_user("stale").await.expect_err("401");
        let raw = server.await.expect("server");
        assert!(raw.starts_with("GET /api/users/me HTTP/1.1\r\n"));
        assert!(matches!(err, Error::Unauthorized(ref m) if m == "Missing or invalid credentials"));
    }
}
