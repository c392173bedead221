// cargo: dep = "yew"
// cargo: dep = "serde"
// cargo: dep = "serde_json"
// cargo: dep = "reqwest"
// cargo: dep = "pulldown-cmark"
// cargo: dep = "futures-util"
// cargo: dep = "wasm-bindgen"
// cargo: dep = "wasm-bindgen-futures"
// cargo: dep = "web-sys"
// cargo: dep = "uuid"
// cargo: dep = "js-sys"
// cargo: dep = "anyhow"
// cargo: dep = "console_error_panic_hook"
// cargo: dep = "thiserror"
// cargo: dep = "async-trait"
// cargo: dep = "log"
// cargo: dep = "wasm-logger"
// cargo: dep = "urlencoding"

pub mod app;
pub mod components;
pub mod config;
pub mod dom;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(target_arch = "wasm32")]
mod bootstrap;

pub use config::WidgetConfig;
pub use error::AssistantError;
pub use services::chat::ChatSession;
pub use services::generation::GenerationJobClient;
pub use services::poller::JobPoller;
