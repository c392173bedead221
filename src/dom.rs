//! Small helpers that read state from the host page.
//!
//! Off wasm every lookup reports "nothing found" so the services can run
//! in native tests.

use crate::config::PageContext;

#[cfg(target_arch = "wasm32")]
mod imp {
    use anyhow::{anyhow, Context, Result};
    use wasm_bindgen::{JsCast, JsValue};
    use web_sys::{Document, Element, HtmlDocument, HtmlInputElement};

    use crate::config::{ConfigOverrides, PageContext};

    fn document() -> Option<Document> {
        web_sys::window()?.document()
    }

    fn cookie_token(doc: &Document) -> Option<String> {
        let cookies = doc.dyn_ref::<HtmlDocument>()?.cookie().ok()?;
        cookies.split(';').find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name == "csrftoken").then(|| value.to_string())
        })
    }

    pub fn csrf_token() -> Option<String> {
        let doc = document()?;
        if let Some(token) = cookie_token(&doc) {
            return Some(token);
        }
        if let Ok(Some(meta)) = doc.query_selector("meta[name=\"csrf-token\"]") {
            if let Some(content) = meta.get_attribute("content") {
                return Some(content);
            }
        }
        let field = doc.query_selector("[name=csrfmiddlewaretoken]").ok()??;
        field
            .dyn_ref::<HtmlInputElement>()
            .map(HtmlInputElement::value)
            .or_else(|| field.get_attribute("value"))
    }

    pub fn location_path() -> Option<String> {
        web_sys::window()?.location().pathname().ok()
    }

    fn attr_context(el: &Element) -> PageContext {
        PageContext {
            course_id: el.get_attribute("data-course-id").filter(|v| !v.is_empty()),
            block_id: el.get_attribute("data-block-id").filter(|v| !v.is_empty()),
        }
    }

    pub fn data_attributes(container: Option<&Element>) -> PageContext {
        let body_ctx = document()
            .and_then(|d| d.body())
            .map(|b| attr_context(&b))
            .unwrap_or_default();
        match container {
            Some(el) => body_ctx.overlay(attr_context(el)),
            None => body_ctx,
        }
    }

    /// Parse a JS options object through its JSON form.
    pub fn overrides_from_js(value: &JsValue) -> Result<ConfigOverrides> {
        if value.is_undefined() || value.is_null() {
            return Ok(ConfigOverrides::default());
        }
        let json = js_sys::JSON::stringify(value)
            .map_err(|e| anyhow!("options are not serializable: {:?}", e))?;
        let json: String = json.into();
        serde_json::from_str(&json).context("invalid widget options")
    }

    pub fn global_overrides() -> Result<ConfigOverrides> {
        let window = web_sys::window().ok_or_else(|| anyhow!("no window"))?;
        let value = js_sys::Reflect::get(&window, &JsValue::from_str("aiChatConfig"))
            .map_err(|e| anyhow!("cannot read window.aiChatConfig: {:?}", e))?;
        overrides_from_js(&value)
    }

    /// A function stored under `key` on `value`, if there is one.
    pub fn function_option(value: &JsValue, key: &str) -> Option<js_sys::Function> {
        if !value.is_object() {
            return None;
        }
        js_sys::Reflect::get(value, &JsValue::from_str(key))
            .ok()?
            .dyn_into::<js_sys::Function>()
            .ok()
    }

    /// The host's `onSend`, from the mount options or `window.aiChatConfig`.
    pub fn send_function(options: &JsValue) -> Option<js_sys::Function> {
        function_option(options, "onSend").or_else(|| {
            let window = web_sys::window()?;
            let global = js_sys::Reflect::get(&window, &JsValue::from_str("aiChatConfig")).ok()?;
            function_option(&global, "onSend")
        })
    }
}

#[cfg(target_arch = "wasm32")]
pub use imp::{csrf_token, global_overrides, overrides_from_js, send_function};

#[cfg(not(target_arch = "wasm32"))]
pub fn csrf_token() -> Option<String> {
    None
}

/// Course/unit context from the URL path and any `data-*` attributes.
#[cfg(target_arch = "wasm32")]
pub fn page_context(container: Option<&web_sys::Element>) -> PageContext {
    let from_path = imp::location_path()
        .map(|p| PageContext::from_path(&p))
        .unwrap_or_default();
    from_path.overlay(imp::data_attributes(container))
}

#[cfg(not(target_arch = "wasm32"))]
pub fn page_context(_container: Option<&web_sys::Element>) -> PageContext {
    PageContext::default()
}
