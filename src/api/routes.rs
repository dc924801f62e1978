//! HTTP-style routing
//!
//! The status interface shares the node's TCP port. Responses are minimal:
//! a status line, a `Content-type` header, a blank line and the body. The
//! connection closes after one response.

use crate::api::handlers;
use crate::network::node::NodeContext;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// Document served for `/`
pub const INDEX_DOCUMENT: &str = "index.html";

/// A complete HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(200, "application/json", body),
            Err(e) => {
                log::error!("Failed to serialize response: {}", e);
                Self::new(500, "text/plain", "Internal Server Error")
            }
        }
    }

    pub fn not_found() -> Self {
        Self::new(404, "text/plain", "Not Found")
    }

    pub fn bad_request(reason: &str) -> Self {
        Self::new(400, "text/plain", format!("Bad Request: {}", reason))
    }

    /// Wire form of the response
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-type: {}\r\n\r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type
        );
        let mut bytes = Vec::with_capacity(head.len() + self.body.len());
        bytes.extend_from_slice(head.as_bytes());
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

/// Answer one HTTP request
pub async fn route(ctx: &NodeContext, method: &str, path: &str) -> HttpResponse {
    if method != "GET" {
        return HttpResponse::bad_request(&format!("unsupported method {}", method));
    }

    // Query strings are accepted and ignored
    let path = path.split('?').next().unwrap_or_default();

    match path {
        "/data/status" => HttpResponse::json(&handlers::get_status(ctx).await),
        "/data/log" => HttpResponse::json(&handlers::get_log(ctx)),
        _ => serve_static(&ctx.config.doc_root, path).await,
    }
}

/// Serve a file under `doc_root`; absent files and escaping paths are 404
pub async fn serve_static(doc_root: &Path, path: &str) -> HttpResponse {
    let Some(file) = resolve(doc_root, path) else {
        return HttpResponse::not_found();
    };

    match tokio::fs::read(&file).await {
        Ok(body) => {
            let mime = mime_guess::from_path(&file).first_or_octet_stream();
            HttpResponse::new(200, mime.as_ref(), body)
        }
        Err(e) => {
            log::debug!("Static lookup of {} failed: {}", file.display(), e);
            HttpResponse::not_found()
        }
    }
}

/// Map a request path onto the document root, rejecting `..` segments
fn resolve(doc_root: &Path, path: &str) -> Option<PathBuf> {
    let relative = path.trim_start_matches('/');
    let relative = if relative.is_empty() || relative.ends_with('/') {
        format!("{}{}", relative, INDEX_DOCUMENT)
    } else {
        relative.to_string()
    };

    let relative = Path::new(&relative);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(doc_root.join(relative))
}
