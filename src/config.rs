use serde::Deserialize;

use crate::models::ModelOption;
use crate::services::host::HostHandler;

pub const DEFAULT_API_URL: &str = "/api/ai-assistant/chat";
pub const DEFAULT_GENERATION_API_BASE: &str = "/api/ai-assistant";
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 2000;
pub const DEFAULT_MAX_UPLOAD_MB: u32 = 50;
pub const MAX_INSTRUCTIONS_CHARS: usize = 1000;

/// Everything the widget and the generation modal need to know about their host.
///
/// Built once from [`WidgetConfig::default`] plus host overrides and then
/// passed down explicitly. Components never read global state themselves.
#[derive(Clone, PartialEq, Debug)]
pub struct WidgetConfig {
    pub show_ai_chat: bool,
    pub title: String,
    pub placeholder: String,
    pub api_url: String,
    pub disabled: bool,
    /// Use the token-streaming endpoint instead of single-shot replies.
    pub stream: bool,
    /// Bearer token for the ambient transport. Cookies are sent regardless.
    pub auth_token: Option<String>,
    pub generation_api_base: String,
    pub max_upload_mb: u32,
    pub models: Vec<ModelOption>,
    pub poll_interval_ms: u32,
    pub max_poll_attempts: Option<u32>,
    pub context: PageContext,
    /// Host `onSend` function; when set it answers chat messages first.
    pub on_send: Option<HostHandler>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            show_ai_chat: true,
            title: "AI Assistant".to_string(),
            placeholder: "Ask me anything...".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            disabled: false,
            stream: false,
            auth_token: None,
            generation_api_base: DEFAULT_GENERATION_API_BASE.to_string(),
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            models: vec![ModelOption {
                id: "default".to_string(),
                name: "Default".to_string(),
                description: "Model chosen by the server".to_string(),
            }],
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_attempts: None,
            context: PageContext::default(),
            on_send: None,
        }
    }
}

/// Host-supplied settings, typically `window.aiChatConfig` or the options
/// object handed to one of the bootstrap functions. Keys are accepted in
/// both camelCase and snake_case.
#[derive(Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(alias = "showAIChat", alias = "showAiChat")]
    pub show_ai_chat: Option<bool>,
    pub title: Option<String>,
    pub placeholder: Option<String>,
    #[serde(alias = "apiUrl")]
    pub api_url: Option<String>,
    pub disabled: Option<bool>,
    pub stream: Option<bool>,
    #[serde(alias = "authToken")]
    pub auth_token: Option<String>,
    #[serde(alias = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(alias = "generationApiBase")]
    pub generation_api_base: Option<String>,
    #[serde(alias = "maxFileSizeMB", alias = "maxUploadMb")]
    pub max_upload_mb: Option<u32>,
    pub models: Option<Vec<ModelOption>>,
    #[serde(alias = "pollIntervalMs")]
    pub poll_interval_ms: Option<u32>,
    #[serde(alias = "maxPollAttempts")]
    pub max_poll_attempts: Option<u32>,
    #[serde(alias = "courseId")]
    pub course_id: Option<String>,
    #[serde(alias = "blockId")]
    pub block_id: Option<String>,
}

impl WidgetConfig {
    pub fn merged(overrides: ConfigOverrides) -> Self {
        let mut config = Self::default();
        config.apply(overrides);
        config
    }

    pub fn apply(&mut self, o: ConfigOverrides) {
        if let Some(v) = o.show_ai_chat {
            self.show_ai_chat = v;
        }
        if let Some(v) = o.title {
            self.title = v;
        }
        if let Some(v) = o.placeholder {
            self.placeholder = v;
        }
        if let Some(v) = o.api_url {
            self.api_url = v;
        }
        if let Some(v) = o.disabled {
            self.disabled = v;
        }
        if let Some(v) = o.stream {
            self.stream = v;
        }
        if o.auth_token.is_some() {
            self.auth_token = o.auth_token;
        }
        if let Some(v) = o.generation_api_base {
            self.generation_api_base = v;
        }
        if let Some(v) = o.max_upload_mb {
            self.max_upload_mb = v;
        }
        if let Some(models) = o.models.filter(|m| !m.is_empty()) {
            self.models = models;
        }
        if let Some(v) = o.poll_interval_ms.filter(|ms| *ms > 0) {
            self.poll_interval_ms = v;
        }
        if o.max_poll_attempts.is_some() {
            self.max_poll_attempts = o.max_poll_attempts;
        }
        if o.course_id.is_some() {
            self.context.course_id = o.course_id;
        }
        if o.block_id.is_some() {
            self.context.block_id = o.block_id;
        }
        if let Some(base) = o.base_url {
            self.api_url = join_base(&base, &self.api_url);
            self.generation_api_base = join_base(&base, &self.generation_api_base);
        }
    }

    /// Fill course/block ids the host did not set explicitly.
    pub fn with_page_context(mut self, page: PageContext) -> Self {
        if self.context.course_id.is_none() {
            self.context.course_id = page.course_id;
        }
        if self.context.block_id.is_none() {
            self.context.block_id = page.block_id;
        }
        self
    }

    pub fn default_model(&self) -> Option<&ModelOption> {
        self.models.first()
    }
}

/// Prefix a relative path with `base`. Absolute URLs are left alone.
pub fn join_base(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Course and unit the widget is embedded in.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct PageContext {
    pub course_id: Option<String>,
    pub block_id: Option<String>,
}

impl PageContext {
    /// Pull `course-v1:` / `block-v1:` keys out of a URL path.
    pub fn from_path(path: &str) -> Self {
        let mut ctx = Self::default();
        for raw in path.split('/') {
            let segment = urlencoding::decode(raw)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            if ctx.block_id.is_none() && segment.starts_with("block-v1:") {
                if ctx.course_id.is_none() {
                    ctx.course_id = Some(course_key_from_block(&segment));
                }
                ctx.block_id = Some(segment);
            } else if ctx.course_id.is_none() && segment.starts_with("course-v1:") {
                ctx.course_id = Some(segment);
            }
        }
        ctx
    }

    /// Values from `data-*` attributes win over ones parsed from the path.
    pub fn overlay(self, attrs: PageContext) -> Self {
        Self {
            course_id: attrs.course_id.or(self.course_id),
            block_id: attrs.block_id.or(self.block_id),
        }
    }
}

// block-v1:Org+Course+Run+type@x+block@y -> course-v1:Org+Course+Run
fn course_key_from_block(block: &str) -> String {
    let body = block.trim_start_matches("block-v1:");
    let parts: Vec<&str> = body.split('+').take_while(|p| !p.contains('@')).collect();
    format!("course-v1:{}", parts.join("+"))
}
