use std::cell::RefCell;
use std::rc::Rc;

use futures_util::stream::{self, LocalBoxStream};
use futures_util::StreamExt;
use log::{debug, warn};
use serde_json::Value;

use crate::config::WidgetConfig;
use crate::error::{AssistantError, Result};
use crate::models::{AssistantReply, ChatRequest};
use crate::services::host::HostTransport;
use crate::services::sse::{self, SseEvent};
use crate::services::transport::{HttpRequest, HttpTransport, Transport, EVENT_STREAM};

/// Assistant text fragments, in arrival order.
pub type TokenStream = LocalBoxStream<'static, Result<String>>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatState {
    pub session_id: Option<String>,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

/// One conversation with the assistant backend.
///
/// Tries the primary transport (a host `onSend` function, or an
/// authenticated request) first and falls back to the CSRF one on any
/// failure. The session id handed out by the server is captured
/// once and sent with every later message.
pub struct ChatSession {
    api_url: String,
    stream_url: String,
    primary: Option<Rc<dyn Transport>>,
    fallback: Rc<dyn Transport>,
    state: Rc<RefCell<ChatState>>,
}

impl ChatSession {
    pub fn new(
        api_url: impl Into<String>,
        primary: Option<Rc<dyn Transport>>,
        fallback: Rc<dyn Transport>,
    ) -> Self {
        let api_url = api_url.into();
        Self {
            stream_url: stream_url(&api_url),
            api_url,
            primary,
            fallback,
            state: Rc::new(RefCell::new(ChatState::default())),
        }
    }

    pub fn from_config(config: &WidgetConfig) -> Self {
        let primary: Rc<dyn Transport> = match &config.on_send {
            Some(handler) => Rc::new(HostTransport::new(handler.clone())),
            None => Rc::new(HttpTransport::authenticated(config.auth_token.clone())),
        };
        Self::new(config.api_url.clone(), Some(primary), Rc::new(HttpTransport::csrf()))
    }

    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.borrow().session_id.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    /// Single-shot request. Returns the parsed body; see [`normalize_reply`].
    pub async fn send_message(&self, message: &str) -> Result<Value> {
        let payload = self.payload(message)?;
        let _loading = LoadingGuard::enter(&self.state);

        let result = self.post(payload).await;
        match &result {
            Ok(body) => {
                if let Some(id) = body.get("session_id").and_then(Value::as_str) {
                    capture_session_id(&self.state, id);
                }
            }
            Err(err) => self.state.borrow_mut().last_error = Some(err.user_message()),
        }
        result
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let request = HttpRequest::post_json(self.api_url.clone(), payload);
        let mut last_error = None;
        for transport in self.transports() {
            match transport.send(request.clone()).await {
                Ok(resp) if resp.is_success() => return Ok(resp.value()),
                Ok(resp) => {
                    let err = resp.status_error();
                    warn!("chat via {} failed: {}", transport.name(), err);
                    last_error = Some(err);
                }
                Err(err) => {
                    warn!("chat via {} failed: {}", transport.name(), err);
                    last_error = Some(err);
                }
            }
        }
        Err(exhausted(last_error))
    }

    /// Open the streaming endpoint and return the fragments as a stream.
    ///
    /// The session counts as loading until the stream ends or is dropped.
    pub async fn send_message_stream(&self, message: &str) -> Result<TokenStream> {
        let payload = self.payload(message)?;
        let loading = LoadingGuard::enter(&self.state);

        let request = HttpRequest::post_json(self.stream_url.clone(), payload).accept(EVENT_STREAM);
        let mut last_error = None;
        let mut body = None;
        for transport in self.transports() {
            match transport.open_stream(request.clone()).await {
                Ok(stream) => {
                    debug!("streaming via {}", transport.name());
                    body = Some(stream);
                    break;
                }
                Err(err) => {
                    warn!("stream via {} failed: {}", transport.name(), err);
                    last_error = Some(err);
                }
            }
        }
        let Some(body) = body else {
            let err = exhausted(last_error);
            self.state.borrow_mut().last_error = Some(err.user_message());
            return Err(err);
        };

        let state = Rc::clone(&self.state);
        let fragments = sse::events(body).filter_map(move |event| {
            let state = Rc::clone(&state);
            async move {
                match event {
                    Ok(SseEvent::Delta { content, session_id }) => {
                        if let Some(id) = session_id {
                            capture_session_id(&state, &id);
                        }
                        content.filter(|c| !c.is_empty()).map(Ok)
                    }
                    Ok(SseEvent::Done) => None,
                    Err(err) => {
                        state.borrow_mut().last_error = Some(err.user_message());
                        Some(Err(err))
                    }
                }
            }
        });

        // The guard lives inside the stream so that loading ends with it.
        let mut loading = Some(loading);
        let tokens = fragments.chain(stream::poll_fn(move |_| {
            loading.take();
            std::task::Poll::Ready(None)
        }));
        Ok(tokens.boxed_local())
    }

    /// Drive [`send_message_stream`](Self::send_message_stream), handing each
    /// fragment to `on_chunk` before reading the next. Returns the full text.
    pub async fn send_message_stream_with<F>(&self, message: &str, mut on_chunk: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let mut tokens = self.send_message_stream(message).await?;
        let mut full = String::new();
        while let Some(fragment) = tokens.next().await {
            let fragment = fragment?;
            full.push_str(&fragment);
            on_chunk(&fragment);
        }
        Ok(full)
    }

    fn payload(&self, message: &str) -> Result<Value> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AssistantError::InvalidInput("Message cannot be empty".into()));
        }
        let request = ChatRequest {
            message: message.to_string(),
            session_id: self.session_id(),
        };
        Ok(serde_json::to_value(request)?)
    }

    fn transports(&self) -> impl Iterator<Item = &Rc<dyn Transport>> {
        self.primary.iter().chain(std::iter::once(&self.fallback))
    }
}

fn capture_session_id(state: &RefCell<ChatState>, id: &str) {
    let mut state = state.borrow_mut();
    if state.session_id.is_none() && !id.is_empty() {
        debug!("chat session {}", id);
        state.session_id = Some(id.to_string());
    }
}

fn exhausted(last_error: Option<AssistantError>) -> AssistantError {
    let message = last_error
        .map(|e| e.user_message())
        .unwrap_or_else(|| "Network request failed".to_string());
    AssistantError::Network(message)
}

/// Marks the session busy and clears the previous error; restores
/// `is_loading` when dropped, whichever way the call ends.
struct LoadingGuard {
    state: Rc<RefCell<ChatState>>,
}

impl LoadingGuard {
    fn enter(state: &Rc<RefCell<ChatState>>) -> Self {
        {
            let mut s = state.borrow_mut();
            s.is_loading = true;
            s.last_error = None;
        }
        Self { state: Rc::clone(state) }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.state.borrow_mut().is_loading = false;
    }
}

/// `.../chat` becomes `.../chat/stream`; any other endpoint gets `/stream`.
pub fn stream_url(api_url: &str) -> String {
    let (path, query) = match api_url.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (api_url, None),
    };
    let trimmed = path.trim_end_matches('/');
    let mut url = if trimmed.ends_with("/chat/stream") {
        trimmed.to_string()
    } else {
        format!("{}/stream", trimmed)
    };
    if path.ends_with('/') {
        url.push('/');
    }
    if let Some(q) = query {
        url.push('?');
        url.push_str(q);
    }
    url
}

/// Map the accepted reply shapes onto [`AssistantReply`].
pub fn normalize_reply(body: &Value) -> Result<AssistantReply> {
    if let Some(text) = body.as_str() {
        return Ok(AssistantReply::Text(text.to_string()));
    }
    if let Some(obj) = body.as_object() {
        for key in ["message", "text"] {
            if let Some(text) = obj.get(key).and_then(Value::as_str) {
                return Ok(AssistantReply::Text(text.to_string()));
            }
        }
        if let Some(err) = obj
            .get("metadata")
            .and_then(|m| m.get("error"))
            .and_then(Value::as_str)
        {
            return Ok(AssistantReply::Error(err.to_string()));
        }
    }
    let shown: String = body.to_string().chars().take(120).collect();
    Err(AssistantError::ResponseShape(shown))
}
