//! Hand-rolled HTTP surface: ingest, subscriptions, schema, event logs,
//! health, and metrics.
//!
//! `hyper::service::service_fn` over a manually accepted `TcpListener`, no
//! router crate. A request is routed by `(Method, path segments)` after
//! stripping the configured `server_path` prefix.

pub mod event_logs;
pub mod health;
pub mod ingest;
pub mod schema;
pub mod subscriptions;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use langhook_core::error::Error;

use crate::state::AppState;

pub type Body = Full<Bytes>;

/// Start accepting connections on `state.config.http_bind_addr` until the
/// shutdown token fires.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(&state.config.http_bind_addr).await?;
    tracing::info!(addr = %state.config.http_bind_addr, "http server listening");

    let mut shutdown = state.shutdown.token();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("http server draining, no longer accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(error = %err, "http accept failed");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let state = state.clone();

                tokio::spawn(async move {
                    let service = hyper::service::service_fn(move |req| {
                        let state = state.clone();
                        async move { Ok::<_, std::convert::Infallible>(dispatch(state, remote_addr, req).await) }
                    });
                    if let Err(err) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        if !err.is_incomplete_message() {
                            tracing::debug!(error = %err, "http connection error");
                        }
                    }
                });
            }
        }
    }
}

fn strip_server_path<'a>(path: &'a str, server_path: &str) -> &'a str {
    if server_path.is_empty() {
        return path;
    }
    path.strip_prefix(server_path).unwrap_or(path)
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Parse `a=1&b=2` into a map. Last occurrence of a repeated key wins.
fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(query) = query else { return out };
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        out.insert(urlencoding_decode(key), urlencoding_decode(value));
    }
    out
}

/// Minimal `application/x-www-form-urlencoded` percent-decoding, enough for
/// query strings of ASCII tokens (resource types, uuids, page numbers).
fn urlencoding_decode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '+' => out.push(' '),
            '%' => {
                let hi = chars.next();
                let lo = chars.next();
                match (hi.and_then(|c| c.to_digit(16)), lo.and_then(|c| c.to_digit(16))) {
                    (Some(hi), Some(lo)) => out.push(((hi * 16 + lo) as u8) as char),
                    _ => out.push('%'),
                }
            }
            other => out.push(other),
        }
    }
    out
}

async fn dispatch(state: AppState, remote_addr: SocketAddr, req: Request<Incoming>) -> Response<Body> {
    let method = req.method().clone();
    let path = strip_server_path(req.uri().path(), &state.config.server_path).to_string();
    let query = parse_query(req.uri().query());
    let parts = segments(&path);
    let parts: Vec<&str> = parts.iter().map(|s| *s).collect();

    match (&method, parts.as_slice()) {
        (&Method::POST, ["ingest", source]) => {
            let source = source.to_string();
            let headers = extract_headers(&req);
            let max_bytes = state.config.max_body_bytes;
            let body = match read_body(req, max_bytes).await {
                Ok(body) => body,
                Err(resp) => return resp,
            };
            ingest::handle(&state, remote_addr, &source, headers, body).await
        }
        (&Method::GET, ["health"]) => health::health(&state).await,
        (&Method::GET, ["metrics"]) => health::metrics(&state).await,
        (&Method::GET, ["schema"]) => schema::summary(&state).await,
        (&Method::DELETE, ["schema", "publishers", publisher]) => {
            schema::delete(&state, publisher, None, None).await
        }
        (&Method::DELETE, ["schema", "publishers", publisher, "resource-types", rtype]) => {
            schema::delete(&state, publisher, Some(rtype), None).await
        }
        (&Method::DELETE, ["schema", "publishers", publisher, "resource-types", rtype, "actions", action]) => {
            schema::delete(&state, publisher, Some(rtype), Some(action)).await
        }
        (&Method::GET, ["event-logs"]) => event_logs::list_events(&state, &query).await,
        (&Method::GET, ["subscriptions", id, "events"]) => {
            event_logs::list_subscription_events(&state, id, &query).await
        }
        (&Method::POST, ["subscriptions"]) => {
            let body = match read_body(req, state.config.max_body_bytes).await {
                Ok(body) => body,
                Err(resp) => return resp,
            };
            subscriptions::create(&state, body).await
        }
        (&Method::GET, ["subscriptions"]) => subscriptions::list(&state).await,
        (&Method::GET, ["subscriptions", id]) => subscriptions::get(&state, id).await,
        (&Method::PATCH, ["subscriptions", id]) => {
            let body = match read_body(req, state.config.max_body_bytes).await {
                Ok(body) => body,
                Err(resp) => return resp,
            };
            subscriptions::update(&state, id, body).await
        }
        (&Method::DELETE, ["subscriptions", id]) => subscriptions::delete(&state, id).await,
        _ => not_found(),
    }
}

/// Lowercased header map for signature verification, extracted before the
/// body is consumed.
fn extract_headers(req: &Request<Incoming>) -> HashMap<String, String> {
    req.headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

async fn read_body(req: Request<Incoming>, max_bytes: usize) -> Result<Vec<u8>, Response<Body>> {
    if let Some(len) = req
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if len > max_bytes {
            return Err(error_response(Error::BodyTooLarge { max_bytes }));
        }
    }

    let collected = req
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    if collected.len() > max_bytes {
        return Err(error_response(Error::BodyTooLarge { max_bytes }));
    }
    Ok(collected.to_vec())
}

pub fn json_response(status: StatusCode, value: &impl serde::Serialize) -> Response<Body> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

pub fn empty_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

pub fn error_response(err: Error) -> Response<Body> {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &serde_json::json!({ "error": err.to_string() }))
}

fn not_found() -> Response<Body> {
    json_response(StatusCode::NOT_FOUND, &serde_json::json!({ "error": "not found" }))
}

/// Re-exported for submodules that need to spawn a task referencing
/// `Arc<AppState>` without cloning the whole struct by value repeatedly.
pub(crate) type SharedState = Arc<AppState>;
