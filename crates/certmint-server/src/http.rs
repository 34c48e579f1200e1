// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Embedded HTTP/1.1 API server.
//
// The server listens on a configurable TCP port and speaks just enough
// HTTP/1.1 for the API surface: request-line + headers + Content-Length
// body in, JSON out, `Connection: close` on every response. A full HTTP
// framework is unnecessary overhead for six routes.
//
// # Routes
//
//   POST /certificates                    issue            (admin)
//   GET  /certificates                    list all         (admin)
//   GET  /certificates/verify?id=&name=   verify           (public)
//   POST /certificates/{id}/publish       publish draft    (admin)
//   POST /certificates/{id}/revoke        revoke           (admin)
//   GET  /certificates/{id}/events        audit trail      (admin)
//   GET  /recipients/{id}/certificates    recipient view   (any token)
//
// The verify route always answers 200: `not_found` is a normal result the
// caller renders, not an error page.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use certmint_core::error::{CertmintError, Result};
use certmint_core::public_errors;
use certmint_core::types::IssueRequest;

use crate::auth::{Credential, Role, bearer_token};
use crate::services::CertServices;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default port for the API server.
pub const DEFAULT_PORT: u16 = 8431;

/// Maximum bytes of request head (request line + headers) before rejecting.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Maximum request body size. Issuance bodies are a few hundred bytes;
/// anything near this limit is abuse.
const MAX_BODY_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Request parsing
// ---------------------------------------------------------------------------

/// A parsed HTTP request.
#[derive(Debug)]
struct Request {
    method: String,
    /// Path with the query string stripped.
    path: String,
    /// Decoded query parameters.
    query: HashMap<String, String>,
    /// Header names lowercased.
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Parse the request head (everything before the blank line).
fn parse_head(head: &str) -> std::result::Result<(String, String, HashMap<String, String>), String> {
    let mut lines = head.split("\r\n");

    let request_line = lines.next().ok_or("empty request")?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or("missing method")?.to_owned();
    let target = parts.next().ok_or("missing request target")?.to_owned();
    match parts.next() {
        Some(v) if v.starts_with("HTTP/1.") => {}
        _ => return Err(format!("unsupported protocol in: {request_line}")),
    }

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or("malformed header line")?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok((method, target, headers))
}

/// Split a request target into path and decoded query parameters.
fn parse_target(target: &str) -> (String, HashMap<String, String>) {
    let (path, query_str) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };

    let mut query = HashMap::new();
    for pair in query_str.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        query.insert(percent_decode(key), percent_decode(value));
    }

    (path.to_owned(), query)
}

/// Decode `%XX` escapes and `+`-as-space in a query component.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => match (hex_val(bytes.get(i + 1)), hex_val(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    out.push(hi * 16 + lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: Option<&u8>) -> Option<u8> {
    match b {
        Some(c @ b'0'..=b'9') => Some(c - b'0'),
        Some(c @ b'a'..=b'f') => Some(c - b'a' + 10),
        Some(c @ b'A'..=b'F') => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Find the first occurrence of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ---------------------------------------------------------------------------
// Response building
// ---------------------------------------------------------------------------

/// A response ready for serialization onto the socket.
#[derive(Debug)]
struct Response {
    status: u16,
    body: Vec<u8>,
}

impl Response {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        // Serialization of our own response types cannot fail.
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self { status, body }
    }

    /// Map an internal error to its sanitized public form. The full detail
    /// goes to the log, not to the caller.
    fn from_error(err: &CertmintError) -> Self {
        let public = public_errors::project(err);
        if public.status >= 500 {
            error!(error = %err, "request failed");
        } else {
            debug!(error = %err, "request rejected");
        }
        Self::json(public.status, &public)
    }

    /// Encode as HTTP/1.1 bytes.
    fn to_bytes(&self) -> Vec<u8> {
        let reason = status_text(self.status);
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            reason,
            self.body.len()
        )
        .into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

// ---------------------------------------------------------------------------
// ApiServer
// ---------------------------------------------------------------------------

/// Embedded HTTP API server.
///
/// Binds a TCP listener and handles each connection in its own task.
pub struct ApiServer {
    /// The TCP port to listen on.
    port: u16,
    /// Notification handle used to signal a graceful shutdown.
    shutdown_signal: Arc<Notify>,
    /// Handle to the Tokio task running the accept loop.
    task_handle: Option<JoinHandle<()>>,
    /// Counter of currently active TCP connections.
    active_connections: Arc<AtomicU32>,
}

impl ApiServer {
    /// Create a new server bound to the given port. Call [`start`](Self::start)
    /// to begin accepting connections.
    pub fn new(port: Option<u16>) -> Self {
        Self {
            port: port.unwrap_or(DEFAULT_PORT),
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Return the number of currently active client connections.
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Start the API server.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is already in use or the listener
    /// cannot be created.
    pub async fn start(&mut self, services: CertServices) -> Result<()> {
        if self.task_handle.is_some() {
            debug!(port = self.port, "API server already running");
            return Ok(());
        }

        let bind_addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| CertmintError::StoreUnavailable(format!("bind {bind_addr}: {e}")))?;

        info!(port = self.port, "API server listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let connections = Arc::clone(&self.active_connections);
        let port = self.port;

        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, port, services, connections).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Gracefully stop the server.
    ///
    /// Signals the accept loop to exit and awaits it. Connections that are
    /// mid-request are allowed to finish.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };

        info!(port = self.port, "stopping API server");
        self.shutdown_signal.notify_one();

        handle
            .await
            .map_err(|e| CertmintError::StoreUnavailable(format!("task join: {e}")))?;

        info!(port = self.port, "API server stopped");
        Ok(())
    }

    /// The main accept loop. Runs until the shutdown signal is received.
    async fn accept_loop(
        listener: TcpListener,
        shutdown: Arc<Notify>,
        port: u16,
        services: CertServices,
        connections: Arc<AtomicU32>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!(port, "accept loop received shutdown signal");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let services = services.clone();
                            let connections = Arc::clone(&connections);
                            tokio::spawn(async move {
                                connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) =
                                    handle_connection(stream, peer_addr, services).await
                                {
                                    warn!(peer = %peer_addr, error = %e, "connection handler error");
                                }
                                connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }
}

/// Handle a single connection: read one request, dispatch, respond, close.
async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    services: CertServices,
) -> Result<()> {
    let request_id = Uuid::new_v4();

    let request = match read_request(&mut stream, peer_addr).await? {
        Some(req) => req,
        None => return Ok(()), // peer closed without sending anything
    };

    debug!(
        peer = %peer_addr,
        %request_id,
        method = %request.method,
        path = %request.path,
        "request received"
    );

    let response = dispatch(&request, &services);

    stream
        .write_all(&response.to_bytes())
        .await
        .map_err(|e| CertmintError::StoreUnavailable(format!("write to {peer_addr}: {e}")))?;
    stream.shutdown().await.ok();

    info!(
        peer = %peer_addr,
        %request_id,
        method = %request.method,
        path = %request.path,
        status = response.status,
        "response sent"
    );
    Ok(())
}

/// Read and frame one HTTP request from the stream.
///
/// Returns `Ok(None)` if the peer closed the connection before sending a
/// complete head.
async fn read_request(
    stream: &mut tokio::net::TcpStream,
    peer_addr: SocketAddr,
) -> Result<Option<Request>> {
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    // Read until the end of headers.
    let head_end = loop {
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(CertmintError::Validation("request head too large".into()));
        }
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| CertmintError::StoreUnavailable(format!("read from {peer_addr}: {e}")))?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let (method, target, headers) =
        parse_head(&head).map_err(CertmintError::Validation)?;

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(CertmintError::Validation("request body too large".into()));
    }

    // Read the remainder of the body.
    let body_start = head_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| CertmintError::StoreUnavailable(format!("read from {peer_addr}: {e}")))?;
        if n == 0 {
            return Err(CertmintError::Validation("truncated request body".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = buf[body_start..body_start + content_length].to_vec();

    let (path, query) = parse_target(&target);
    Ok(Some(Request {
        method,
        path,
        query,
        headers,
        body,
    }))
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Body of `POST /certificates/{id}/revoke`.
#[derive(Debug, Deserialize)]
struct RevokeBody {
    reason: String,
}

/// Response of `GET /certificates/{id}/events`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    certificate_id: String,
    events: Vec<certmint_core::types::VerificationEvent>,
    /// Count of successful verifications, derived from the ledger.
    verification_count: u64,
}

/// Route a request to its handler.
fn dispatch(request: &Request, services: &CertServices) -> Response {
    let segments: Vec<&str> = request
        .path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let result = match (request.method.as_str(), segments.as_slice()) {
        ("POST", ["certificates"]) => handle_issue(request, services),
        ("GET", ["certificates"]) => handle_list_all(request, services),
        ("GET", ["certificates", "verify"]) => handle_verify(request, services),
        ("POST", ["certificates", id, "publish"]) => handle_publish(request, services, id),
        ("POST", ["certificates", id, "revoke"]) => handle_revoke(request, services, id),
        ("GET", ["certificates", id, "events"]) => handle_events(request, services, id),
        ("GET", ["recipients", id, "certificates"]) => {
            handle_recipient_list(request, services, id)
        }
        _ => {
            return Response::json(
                404,
                &serde_json::json!({"code": "no_route", "message": "no such route"}),
            );
        }
    };

    result.unwrap_or_else(|e| Response::from_error(&e))
}

/// Authenticate the bearer token on a request.
fn authenticate(request: &Request, services: &CertServices) -> Result<Credential> {
    let header = request
        .headers
        .get("authorization")
        .ok_or_else(|| CertmintError::Unauthorized("missing authorization header".into()))?;
    let token = bearer_token(header)
        .ok_or_else(|| CertmintError::Unauthorized("malformed authorization header".into()))?;
    services
        .authenticate(token)?
        .ok_or_else(|| CertmintError::Unauthorized("unknown token".into()))
}

/// Authenticate and require the admin role.
fn require_admin(request: &Request, services: &CertServices) -> Result<Credential> {
    let credential = authenticate(request, services)?;
    if credential.role != Role::Admin {
        return Err(CertmintError::Forbidden);
    }
    Ok(credential)
}

fn handle_issue(request: &Request, services: &CertServices) -> Result<Response> {
    require_admin(request, services)?;
    let body: IssueRequest = serde_json::from_slice(&request.body)?;
    let cert = services.issue(&body)?;
    Ok(Response::json(201, &cert))
}

fn handle_list_all(request: &Request, services: &CertServices) -> Result<Response> {
    require_admin(request, services)?;
    let certs = services.list_all()?;
    Ok(Response::json(200, &certs))
}

fn handle_verify(request: &Request, services: &CertServices) -> Result<Response> {
    let id = request
        .query
        .get("id")
        .ok_or_else(|| CertmintError::Validation("query parameter 'id' is required".into()))?;
    let name_hint = request.query.get("name").map(String::as_str);
    let verifier = request.query.get("verifier").map(String::as_str);

    // Always 200: not_found is a result the caller renders, not an error.
    let verification = services.verify(id, name_hint, verifier)?;
    Ok(Response::json(200, &verification))
}

fn handle_publish(request: &Request, services: &CertServices, id: &str) -> Result<Response> {
    require_admin(request, services)?;
    let cert = services.publish(id)?;
    Ok(Response::json(200, &cert))
}

fn handle_revoke(request: &Request, services: &CertServices, id: &str) -> Result<Response> {
    require_admin(request, services)?;
    let body: RevokeBody = serde_json::from_slice(&request.body)?;
    let cert = services.revoke(id, &body.reason)?;
    Ok(Response::json(200, &cert))
}

fn handle_events(request: &Request, services: &CertServices, id: &str) -> Result<Response> {
    require_admin(request, services)?;
    let events = services.events_for(id)?;
    let verification_count = services.verification_count(id)?;
    Ok(Response::json(
        200,
        &EventsResponse {
            certificate_id: id.to_owned(),
            events,
            verification_count,
        },
    ))
}

fn handle_recipient_list(
    request: &Request,
    services: &CertServices,
    recipient_id: &str,
) -> Result<Response> {
    // Any authenticated token may list; the id space here is recipients,
    // not secrets.
    authenticate(request, services)?;
    let certs = services.list_by_recipient(recipient_id)?;
    Ok(Response::json(200, &certs))
}
