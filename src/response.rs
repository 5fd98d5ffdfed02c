use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::ResponseLifecycleError;
use crate::logging::{LogLevel, ServerLog};

pub const CONTENT_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_JSON: &str = "application/json";
pub const CONTENT_ICON: &str = "image/x-icon";

/// Structured error envelope used for every failure the server itself reports.
#[derive(Serialize)]
pub struct ApiResponse {
    pub ok: bool,
    pub error: String,
}

impl ApiResponse {
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: msg.into(),
        }
    }
}

/// A fully formed HTTP response waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub no_cache: bool,
}

impl HttpReply {
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
            no_cache: true,
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status, CONTENT_TEXT, body.into())
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, CONTENT_HTML, body.into())
    }

    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status, CONTENT_JSON, body),
            Err(e) => Self::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialize response: {e}"),
            ),
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        let body = serde_json::to_vec(&ApiResponse::err(message))
            .unwrap_or_else(|_| b"{\"ok\":false}".to_vec());
        Self::new(status, CONTENT_JSON, body)
    }

    pub fn not_found() -> Self {
        Self::text(StatusCode::NOT_FOUND, "Invalid request.")
    }

    /// What a response closed without any output looks like.
    pub fn closed() -> Self {
        Self::text(StatusCode::OK, "")
    }

    /// Static assets may be cached by the browser.
    pub fn cacheable(mut self) -> Self {
        self.no_cache = false;
        self
    }

    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("")
    }
}

impl IntoResponse for HttpReply {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_type),
        );
        if self.no_cache {
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store, must-revalidate"),
            );
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        }
        response
    }
}

/// The in-flight response an operation writes its output through.
///
/// It can be finalized once. Later attempts are logged and ignored. Dropping
/// a handle that was never finalized closes it with an empty 200.
pub struct ResponseHandle {
    path: String,
    sender: Option<oneshot::Sender<HttpReply>>,
    log: ServerLog,
}

impl ResponseHandle {
    pub fn new(path: impl Into<String>, log: ServerLog) -> (Self, oneshot::Receiver<HttpReply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                path: path.into(),
                sender: Some(tx),
                log,
            },
            rx,
        )
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_finalized(&self) -> bool {
        self.sender.is_none()
    }

    pub fn try_send(&mut self, reply: HttpReply) -> Result<(), ResponseLifecycleError> {
        let Some(sender) = self.sender.take() else {
            return Err(ResponseLifecycleError::AlreadyFinalized {
                path: self.path.clone(),
            });
        };
        sender
            .send(reply)
            .map_err(|_| ResponseLifecycleError::ClientGone {
                path: self.path.clone(),
            })
    }

    pub fn send(&mut self, reply: HttpReply) {
        match self.try_send(reply) {
            Ok(()) => {}
            Err(err @ ResponseLifecycleError::AlreadyFinalized { .. }) => {
                self.log
                    .log_message(format!("Attempted to write to a closed response: {err}"), LogLevel::Normal);
            }
            Err(err @ ResponseLifecycleError::ClientGone { .. }) => {
                self.log.log_message(err.to_string(), LogLevel::Verbose);
            }
        }
    }

    pub fn text(&mut self, body: impl Into<String>) {
        self.send(HttpReply::text(StatusCode::OK, body));
    }

    pub fn html(&mut self, body: impl Into<String>) {
        self.send(HttpReply::html(body));
    }

    pub fn json<T: Serialize>(&mut self, value: &T) {
        self.send(HttpReply::json(StatusCode::OK, value));
    }

    /// Sends a message as HTML with line breaks preserved.
    pub fn log_response(&mut self, message: &str) {
        let formatted = message.replace("\r\n", "<br>").replace('\n', "<br>");
        self.html(formatted);
    }

    pub fn close(&mut self) {
        if !self.is_finalized() {
            self.send(HttpReply::closed());
        }
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(HttpReply::closed());
        }
    }
}
