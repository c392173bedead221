use async_trait::async_trait;
use futures_util::stream::LocalBoxStream;
use futures_util::StreamExt;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::dom;
use crate::error::{AssistantError, Result};
use crate::models::UploadFile;

/// Raw body chunks as they arrive from the network.
pub type ByteStream = LocalBoxStream<'static, Result<Vec<u8>>>;

pub const EVENT_STREAM: &str = "text/event-stream";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart { field: String, file: UploadFile },
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: RequestBody,
    pub accept: Option<&'static str>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: RequestBody::Empty,
            accept: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: RequestBody::Json(body),
            accept: None,
        }
    }

    pub fn multipart(url: impl Into<String>, field: &str, file: UploadFile) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: RequestBody::Multipart {
                field: field.to_string(),
                file,
            },
            accept: None,
        }
    }

    pub fn accept(mut self, mime: &'static str) -> Self {
        self.accept = Some(mime);
        self
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// The body as JSON, or as a JSON string when it isn't JSON at all.
    pub fn value(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }

    /// Human readable reason the server attached to an error response.
    pub fn server_message(&self) -> Option<String> {
        let value: Value = serde_json::from_str(&self.body).ok()?;
        ["error", "detail", "message"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .filter(|msg| !msg.is_empty())
            .map(str::to_string)
    }

    pub fn status_error(&self) -> AssistantError {
        AssistantError::HttpStatus {
            status: self.status,
            message: self
                .server_message()
                .unwrap_or_else(|| format!("HTTP {}", self.status)),
        }
    }
}

/// Something that can carry a request to the backend.
///
/// Futures are not `Send`: everything runs on the browser's main thread.
#[async_trait(?Send)]
pub trait Transport {
    fn name(&self) -> &'static str;

    /// Send a request and buffer the whole response. Non-2xx statuses are
    /// returned as responses, not errors, so callers can read the body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Send a request and hand back the body as it arrives. Non-2xx
    /// statuses become [`AssistantError::HttpStatus`].
    async fn open_stream(&self, request: HttpRequest) -> Result<ByteStream>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum AuthMode {
    /// Browser session cookies, plus a bearer token when one is configured.
    Ambient { bearer: Option<String> },
    /// Plain fetch with the page's CSRF token.
    Csrf,
}

/// [`Transport`] backed by `reqwest` (the Fetch API on wasm).
pub struct HttpTransport {
    client: Client,
    auth: AuthMode,
}

impl HttpTransport {
    pub fn authenticated(bearer: Option<String>) -> Self {
        Self {
            client: Client::new(),
            auth: AuthMode::Ambient { bearer },
        }
    }

    pub fn csrf() -> Self {
        Self {
            client: Client::new(),
            auth: AuthMode::Csrf,
        }
    }

    fn build(&self, request: HttpRequest) -> Result<RequestBuilder> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if let Some(accept) = request.accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        builder = match &self.auth {
            AuthMode::Ambient { bearer: Some(token) } => builder.bearer_auth(token),
            AuthMode::Ambient { bearer: None } => builder,
            AuthMode::Csrf => builder.header("X-CSRFToken", dom::csrf_token().unwrap_or_default()),
        };
        builder = with_credentials(builder);

        Ok(match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart { field, file } => {
                let mut part = Part::bytes(file.bytes).file_name(file.name);
                if !file.mime.is_empty() {
                    part = part.mime_str(&file.mime)?;
                }
                builder.multipart(Form::new().part(field, part))
            }
        })
    }
}

#[cfg(target_arch = "wasm32")]
fn with_credentials(builder: RequestBuilder) -> RequestBuilder {
    builder.fetch_credentials_include()
}

#[cfg(not(target_arch = "wasm32"))]
fn with_credentials(builder: RequestBuilder) -> RequestBuilder {
    builder
}

#[async_trait(?Send)]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        match self.auth {
            AuthMode::Ambient { .. } => "authenticated",
            AuthMode::Csrf => "csrf",
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!("{} {:?} {}", self.name(), request.method, request.url);
        let resp = self.build(request)?.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<ByteStream> {
        debug!("{} stream {}", self.name(), request.url);
        let resp = self.build(request)?.send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HttpResponse { status, body }.status_error());
        }
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(AssistantError::from))
            .boxed_local())
    }
}

#[cfg(test)]
pub mod mock {
    //! Scripted transport for service tests.

    use super::*;
    use futures_util::stream;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Clone, Debug)]
    pub enum Reply {
        Json(u16, Value),
        Text(u16, String),
        Fail(String),
        /// Body chunks for `open_stream`.
        Stream(Vec<Vec<u8>>),
    }

    #[derive(Clone, Debug)]
    pub struct Scripted {
        pub delay: Duration,
        pub reply: Reply,
    }

    pub fn ok(value: Value) -> Scripted {
        Scripted { delay: Duration::ZERO, reply: Reply::Json(200, value) }
    }

    pub fn status(code: u16, value: Value) -> Scripted {
        Scripted { delay: Duration::ZERO, reply: Reply::Json(code, value) }
    }

    pub fn text(body: &str) -> Scripted {
        Scripted { delay: Duration::ZERO, reply: Reply::Text(200, body.to_string()) }
    }

    pub fn fail(message: &str) -> Scripted {
        Scripted { delay: Duration::ZERO, reply: Reply::Fail(message.to_string()) }
    }

    pub fn chunks(parts: &[&str]) -> Scripted {
        Scripted {
            delay: Duration::ZERO,
            reply: Reply::Stream(parts.iter().map(|p| p.as_bytes().to_vec()).collect()),
        }
    }

    pub fn raw_chunks(parts: Vec<Vec<u8>>) -> Scripted {
        Scripted { delay: Duration::ZERO, reply: Reply::Stream(parts) }
    }

    impl Scripted {
        pub fn after(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[derive(Default)]
    pub struct MockTransport {
        script: RefCell<VecDeque<Scripted>>,
        requests: RefCell<Vec<HttpRequest>>,
        calls: Cell<usize>,
    }

    impl MockTransport {
        pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
            Self {
                script: RefCell::new(script.into_iter().collect()),
                ..Self::default()
            }
        }

        pub fn push(&self, scripted: Scripted) {
            self.script.borrow_mut().push_back(scripted);
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.borrow().clone()
        }

        pub fn calls(&self) -> usize {
            self.calls.get()
        }

        async fn next(&self, request: HttpRequest) -> Result<Reply> {
            self.calls.set(self.calls.get() + 1);
            self.requests.borrow_mut().push(request);
            let next = self.script.borrow_mut().pop_front();
            let Some(scripted) = next else {
                return Err(AssistantError::Network("no scripted response".into()));
            };
            if !scripted.delay.is_zero() {
                tokio::time::sleep(scripted.delay).await;
            }
            match scripted.reply {
                Reply::Fail(msg) => Err(AssistantError::Network(msg)),
                other => Ok(other),
            }
        }
    }

    #[async_trait(?Send)]
    impl Transport for MockTransport {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            match self.next(request).await? {
                Reply::Json(status, value) => Ok(HttpResponse { status, body: value.to_string() }),
                Reply::Text(status, body) => Ok(HttpResponse { status, body }),
                Reply::Stream(parts) => Ok(HttpResponse {
                    status: 200,
                    body: String::from_utf8_lossy(&parts.concat()).into_owned(),
                }),
                Reply::Fail(msg) => Err(AssistantError::Network(msg)),
            }
        }

        async fn open_stream(&self, request: HttpRequest) -> Result<ByteStream> {
            match self.next(request).await? {
                Reply::Stream(parts) => Ok(stream::iter(parts.into_iter().map(Ok)).boxed_local()),
                Reply::Json(status, value) if !(200..300).contains(&status) => {
                    Err(HttpResponse { status, body: value.to_string() }.status_error())
                }
                Reply::Json(_, value) => {
                    Ok(stream::iter(vec![Ok(value.to_string().into_bytes())]).boxed_local())
                }
                Reply::Text(_, body) => Ok(stream::iter(vec![Ok(body.into_bytes())]).boxed_local()),
                Reply::Fail(msg) => Err(AssistantError::Network(msg)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_message_prefers_error_field() {
        let resp = HttpResponse { status: 400, body: r#"{"error":"too big","detail":"x"}"#.into() };
        assert_eq!(resp.server_message().as_deref(), Some("too big"));

        let resp = HttpResponse { status: 403, body: r#"{"detail":"CSRF Failed"}"#.into() };
        assert_eq!(resp.server_message().as_deref(), Some("CSRF Failed"));
    }

    #[test]
    fn status_error_defaults_to_code() {
        let resp = HttpResponse { status: 502, body: "<html>Bad gateway</html>".into() };
        assert_eq!(
            resp.status_error(),
            AssistantError::HttpStatus { status: 502, message: "HTTP 502".into() }
        );
        assert!(!resp.is_success());
    }

    #[test]
    fn non_json_body_becomes_string_value() {
        let resp = HttpResponse { status: 200, body: "plain answer".into() };
        assert_eq!(resp.value(), json!("plain answer"));
        let resp = HttpResponse { status: 200, body: r#"{"text":"hi"}"#.into() };
        assert_eq!(resp.value(), json!({"text": "hi"}));
    }
}
