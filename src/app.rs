use yew::prelude::*;

use crate::components::chat_widget::ChatWidget;
use crate::config::WidgetConfig;

const GLOBAL_STYLES: &str = r#"
    :root {
        --ai-accent-color: #0a66c2;
        --ai-accent-hover: #004182;
        --ai-border-color: #e5e5e5;
        --ai-text-primary: #333;
    }

    .btn { cursor: pointer; border: 1px solid var(--ai-border-color); background: white; padding: 8px 12px; border-radius: 6px; font-size: 0.9rem; transition: all 0.2s; color: var(--ai-text-primary); }
    .btn:hover { background: #f0f0f0; }
    .btn:disabled { opacity: 0.6; cursor: default; }
    .btn-primary { background: var(--ai-accent-color); color: white; border-color: transparent; }
    .btn-primary:hover { background: var(--ai-accent-hover); }

    .markdown-body { line-height: 1.5; }
    .markdown-body pre { background: #2d2d2d; color: #fff; padding: 10px; border-radius: 6px; overflow-x: auto; }
    .markdown-body code { background: #eaeaea; padding: 2px 4px; border-radius: 4px; font-family: monospace; font-size: 0.9em; }
    .markdown-body pre code { background: transparent; color: inherit; }
    .markdown-body p { margin: 0 0 0.5em 0; }
    .markdown-body p:last-child { margin-bottom: 0; }
"#;

#[derive(Properties, PartialEq)]
pub struct AiChatTrayProps {
    pub config: WidgetConfig,
}

/// Root of the footer slot: the chat widget, when the host enables it.
#[function_component(AiChatTray)]
pub fn ai_chat_tray(props: &AiChatTrayProps) -> Html {
    if !props.config.show_ai_chat {
        return html! {};
    }

    html! {
        <>
            <style>{ GLOBAL_STYLES }</style>
            <ChatWidget config={props.config.clone()} />
        </>
    }
}

#[derive(Properties, PartialEq)]
pub struct GenerationRootProps {
    pub config: WidgetConfig,
}

/// Root used when a host mounts only the course generation button.
#[function_component(GenerationRoot)]
pub fn generation_root(props: &GenerationRootProps) -> Html {
    use crate::components::course_generation_button::CourseGenerationButton;

    html! {
        <>
            <style>{ GLOBAL_STYLES }</style>
            <CourseGenerationButton config={props.config.clone()} />
        </>
    }
}
