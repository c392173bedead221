//! Chat replies produced by the host page instead of the widget's own HTTP
//! calls, for hosts that pass an `onSend(message, payload)` function.

use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use futures_util::future::LocalBoxFuture;
use serde_json::Value;

use crate::error::{AssistantError, Result};
use crate::services::transport::{ByteStream, HttpRequest, HttpResponse, Transport};

type SendFn = dyn Fn(String, Value) -> LocalBoxFuture<'static, Result<Value>>;

/// A host supplied send function. Compared by identity.
#[derive(Clone)]
pub struct HostHandler(Rc<SendFn>);

impl HostHandler {
    pub fn new<F>(send: F) -> Self
    where
        F: Fn(String, Value) -> LocalBoxFuture<'static, Result<Value>> + 'static,
    {
        Self(Rc::new(send))
    }

    /// Wrap a JS function that returns a reply or a promise of one.
    #[cfg(target_arch = "wasm32")]
    pub fn from_js(function: js_sys::Function) -> Self {
        use futures_util::FutureExt;
        use wasm_bindgen::JsValue;
        use wasm_bindgen_futures::JsFuture;

        Self::new(move |message, payload| {
            let function = function.clone();
            async move {
                let payload = js_sys::JSON::parse(&payload.to_string()).map_err(js_error)?;
                let returned = function
                    .call2(&JsValue::NULL, &JsValue::from_str(&message), &payload)
                    .map_err(js_error)?;
                let resolved = JsFuture::from(js_sys::Promise::resolve(&returned))
                    .await
                    .map_err(js_error)?;
                json_from_js(&resolved)
            }
            .boxed_local()
        })
    }
}

#[cfg(target_arch = "wasm32")]
fn js_error(err: wasm_bindgen::JsValue) -> AssistantError {
    let message = err
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(&err, &wasm_bindgen::JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", err));
    AssistantError::Network(message)
}

#[cfg(target_arch = "wasm32")]
fn json_from_js(value: &wasm_bindgen::JsValue) -> Result<Value> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(text) = value.as_string() {
        return Ok(Value::String(text));
    }
    let json: String = js_sys::JSON::stringify(value).map_err(js_error)?.into();
    Ok(serde_json::from_str(&json)?)
}

impl PartialEq for HostHandler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostHandler")
    }
}

/// [`Transport`] that hands chat payloads to a [`HostHandler`]. Whatever the
/// handler resolves to is treated as a successful reply body.
pub struct HostTransport {
    handler: HostHandler,
}

impl HostTransport {
    pub fn new(handler: HostHandler) -> Self {
        Self { handler }
    }
}

#[async_trait(?Send)]
impl Transport for HostTransport {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let payload = request.json_body().cloned().unwrap_or(Value::Null);
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let reply = (self.handler.0)(message, payload).await?;
        Ok(HttpResponse {
            status: 200,
            body: reply.to_string(),
        })
    }

    async fn open_stream(&self, _request: HttpRequest) -> Result<ByteStream> {
        Err(AssistantError::Network("Host send handler does not stream".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WidgetConfig;
    use crate::models::AssistantReply;
    use crate::services::chat::{normalize_reply, ChatSession};
    use crate::services::transport::mock::{self, MockTransport};
    use futures_util::FutureExt;
    use serde_json::json;
    use std::cell::RefCell;

    fn echo(seen: Rc<RefCell<Vec<(String, Value)>>>) -> HostHandler {
        HostHandler::new(move |message, payload| {
            seen.borrow_mut().push((message.clone(), payload));
            async move { Ok(json!({"text": format!("echo: {}", message)})) }.boxed_local()
        })
    }

    #[tokio::test]
    async fn host_handler_answers_instead_of_http() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let fallback = Rc::new(MockTransport::default());
        let primary: Rc<dyn Transport> = Rc::new(HostTransport::new(echo(seen.clone())));
        let chat = ChatSession::new("/api/ai-assistant/chat", Some(primary), fallback.clone());

        let body = chat.send_message(" hello ").await.unwrap();
        assert_eq!(normalize_reply(&body).unwrap(), AssistantReply::Text("echo: hello".into()));
        assert_eq!(*seen.borrow(), vec![("hello".to_string(), json!({"message": "hello"}))]);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn config_handler_becomes_primary() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let config = WidgetConfig {
            on_send: Some(echo(seen.clone())),
            ..WidgetConfig::default()
        };
        let chat = ChatSession::from_config(&config);
        let body = chat.send_message("ping").await.unwrap();
        assert_eq!(body, json!({"text": "echo: ping"}));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[tokio::test]
    async fn plain_string_reply_is_kept() {
        let handler = HostHandler::new(|_, _| async { Ok(json!("just text")) }.boxed_local());
        let response = HostTransport::new(handler)
            .send(HttpRequest::post_json("/chat", json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.value(), json!("just text"));
    }

    #[tokio::test]
    async fn rejected_handler_falls_back_to_http() {
        let handler = HostHandler::new(|_, _| {
            async { Err(AssistantError::Network("host offline".into())) }.boxed_local()
        });
        let fallback = Rc::new(MockTransport::new([mock::ok(json!({"message": "from server"}))]));
        let primary: Rc<dyn Transport> = Rc::new(HostTransport::new(handler));
        let chat = ChatSession::new("/api/ai-assistant/chat", Some(primary), fallback.clone());

        let body = chat.send_message("hi").await.unwrap();
        assert_eq!(body, json!({"message": "from server"}));
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn streaming_goes_to_http() {
        let handler = HostHandler::new(|_, _| async { Ok(Value::Null) }.boxed_local());
        let err = HostTransport::new(handler)
            .open_stream(HttpRequest::post_json("/chat/stream", json!({"message": "hi"})))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AssistantError::Network(_)));
    }

    #[test]
    fn handlers_compare_by_identity() {
        let a = HostHandler::new(|_, _| async { Ok(Value::Null) }.boxed_local());
        let b = HostHandler::new(|_, _| async { Ok(Value::Null) }.boxed_local());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
