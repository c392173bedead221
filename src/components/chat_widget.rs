use futures_util::future::{AbortHandle, Abortable};
use futures_util::StreamExt;
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlTextAreaElement;
use yew::prelude::*;

use crate::config::WidgetConfig;
use crate::error::AssistantError;
use crate::models::{AssistantReply, ChatMessage, Role};
use crate::services::chat::{normalize_reply, ChatSession};
use crate::utils::render_markdown;

#[derive(Properties, PartialEq)]
pub struct ChatWidgetProps {
    pub config: WidgetConfig,
}

const CSS: &str = r#"
    .ai-chat-widget-fab { position: fixed; right: 24px; bottom: 24px; z-index: 1000; }
    .ai-chat-widget-fab-button { width: 56px; height: 56px; border-radius: 50%; border: none; background: #0a66c2; color: white; font-size: 1.6rem; cursor: pointer; box-shadow: 0 4px 12px rgba(0,0,0,0.2); }
    .ai-chat-widget-container { position: fixed; right: 24px; bottom: 24px; z-index: 1000; }
    .ai-chat-widget { width: 360px; height: 520px; display: flex; flex-direction: column; background: white; border-radius: 12px; box-shadow: 0 10px 30px rgba(0,0,0,0.2); overflow: hidden; font-family: inherit; }
    .ai-chat-widget-header { display: flex; justify-content: space-between; align-items: center; padding: 12px 16px; background: #0a66c2; color: white; }
    .ai-chat-widget-title-section { display: flex; gap: 8px; align-items: center; }
    .ai-chat-widget-title { margin: 0; font-size: 1rem; }
    .ai-chat-widget-close { background: none; border: none; color: white; font-size: 1.1rem; cursor: pointer; }
    .ai-chat-widget-body { flex-grow: 1; overflow-y: auto; padding: 12px; display: flex; flex-direction: column; gap: 8px; }
    .ai-chat-widget-welcome { text-align: center; color: #666; margin-top: 40px; }
    .ai-chat-widget-line { padding: 8px 12px; border-radius: 10px; max-width: 85%; overflow-wrap: anywhere; font-size: 0.9rem; }
    .ai-chat-widget-line-user { align-self: flex-end; background: #e3f2fd; color: #1565c0; }
    .ai-chat-widget-line-assistant { align-self: flex-start; background: #f5f5f5; color: #333; }
    .ai-chat-widget-line-system { align-self: center; background: #fff3cd; color: #666; }
    .ai-chat-widget-line-error { align-self: flex-start; background: #fdecea; color: #b71c1c; }
    .ai-chat-widget-typing { color: #888; font-style: italic; }
    .ai-chat-widget-footer { border-top: 1px solid #e5e5e5; padding: 10px; }
    .ai-chat-widget-error { color: #b71c1c; font-size: 0.8rem; margin-bottom: 6px; }
    .ai-chat-widget-input-container { display: flex; gap: 8px; }
    .ai-chat-widget-input { flex-grow: 1; resize: none; border: 1px solid #ddd; border-radius: 8px; padding: 8px; font-family: inherit; }
    .ai-chat-widget-send { border: none; background: #0a66c2; color: white; border-radius: 8px; padding: 0 14px; cursor: pointer; }
    .ai-chat-widget-send.disabled { background: #ccc; cursor: default; }
"#;

/// Floating chat button that expands into a conversation panel.
#[function_component(ChatWidget)]
pub fn chat_widget(props: &ChatWidgetProps) -> Html {
    let config = &props.config;
    let session = use_memo(config.clone(), ChatSession::from_config);
    let open = use_state(|| false);
    let busy = use_state(|| false);
    let lines = use_state(Vec::<ChatMessage>::new);
    let error = use_state(|| None::<String>);
    let input_text = use_state(String::new);
    let in_flight = use_mut_ref(|| None::<AbortHandle>);

    // Nothing may write into the transcript once the widget is gone.
    {
        let in_flight = in_flight.clone();
        use_effect_with((), move |_| {
            move || {
                if let Some(handle) = in_flight.borrow_mut().take() {
                    handle.abort();
                }
            }
        });
    }

    let can_send = !config.disabled && !*busy;
    let stream = config.stream;

    let send = {
        let session = session.clone();
        let busy = busy.clone();
        let lines = lines.clone();
        let error = error.clone();
        let input_text = input_text.clone();
        let in_flight = in_flight.clone();

        Callback::from(move |_: ()| {
            let text = input_text.trim().to_string();
            if text.is_empty() || !can_send {
                return;
            }

            let mut history = (*lines).clone();
            history.push(ChatMessage::new(Role::User, format!("You: {}", text)));
            lines.set(history.clone());
            input_text.set(String::new());
            busy.set(true);
            error.set(None);

            let (abort, registration) = AbortHandle::new_pair();
            *in_flight.borrow_mut() = Some(abort);

            let session = session.clone();
            let busy = busy.clone();
            let lines = lines.clone();
            let error = error.clone();
            let in_flight = in_flight.clone();
            spawn_local(async move {
                let mut history = history;
                let outcome = Abortable::new(
                    exchange(&session, &text, stream, &mut history, &lines),
                    registration,
                )
                .await;

                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        let message = err.user_message();
                        log::warn!("chat request failed: {}", message);
                        if history
                            .last()
                            .is_some_and(|m| m.role == Role::Assistant && m.text.is_empty())
                        {
                            history.pop();
                        }
                        history.push(ChatMessage::new(Role::Error, format!("Error: {}", message)));
                        lines.set(history);
                        error.set(Some(message));
                    }
                    // Panel closed mid-reply: keep whatever already arrived.
                    Err(_) => log::debug!("chat request aborted"),
                }
                in_flight.borrow_mut().take();
                busy.set(false);
            });
        })
    };

    let on_open = {
        let open = open.clone();
        Callback::from(move |_: MouseEvent| open.set(true))
    };

    let on_close = {
        let open = open.clone();
        let in_flight = in_flight.clone();
        Callback::from(move |_: MouseEvent| {
            if let Some(handle) = in_flight.borrow_mut().take() {
                handle.abort();
            }
            open.set(false);
        })
    };

    let on_input = {
        let input_text = input_text.clone();
        Callback::from(move |e: InputEvent| {
            let area: HtmlTextAreaElement = e.target_unchecked_into();
            input_text.set(area.value());
        })
    };

    let on_keydown = {
        let send = send.clone();
        Callback::from(move |e: KeyboardEvent| {
            if e.key() == "Enter" && !e.shift_key() {
                e.prevent_default();
                send.emit(());
            }
        })
    };

    let on_send_click = send.reform(|_: MouseEvent| ());

    if !*open {
        return html! {
            <>
                <style>{ CSS }</style>
                <div class="ai-chat-widget-fab">
                    <button
                        class="ai-chat-widget-fab-button"
                        onclick={on_open}
                        title={config.title.clone()}
                        aria-label={format!("Open {}", config.title)}
                    >
                        { "🤖" }
                    </button>
                </div>
            </>
        };
    }

    let waiting_for_first_token = lines
        .last()
        .map_or(true, |m| m.role != Role::Assistant || m.text.is_empty());

    html! {
        <>
            <style>{ CSS }</style>
            <div class="ai-chat-widget-container">
                <div class="ai-chat-widget">
                    <div class="ai-chat-widget-header">
                        <div class="ai-chat-widget-title-section">
                            <div class="ai-chat-widget-icon">{ "🤖" }</div>
                            <h3 class="ai-chat-widget-title">{ config.title.clone() }</h3>
                        </div>
                        <button class="ai-chat-widget-close" onclick={on_close} title="Close" aria-label="Close chat">
                            { "✕" }
                        </button>
                    </div>

                    <div class="ai-chat-widget-body">
                        if lines.is_empty() {
                            <div class="ai-chat-widget-welcome">
                                <div class="welcome-icon">{ "👋" }</div>
                                <p>{ "Hi! I'm here to help. Ask me anything!" }</p>
                            </div>
                        }
                        { for lines.iter().filter(|m| !(m.role == Role::Assistant && m.text.is_empty())).map(|m| html! {
                            <div key={m.id.clone()} class={format!("ai-chat-widget-line ai-chat-widget-line-{}", m.role.as_str())}>
                                if m.role == Role::Assistant {
                                    { render_markdown(&m.text) }
                                } else {
                                    { m.text.clone() }
                                }
                            </div>
                        }) }
                        if *busy && waiting_for_first_token {
                            <div class="ai-chat-widget-line ai-chat-widget-line-assistant ai-chat-widget-typing">
                                { "Thinking..." }
                            </div>
                        }
                    </div>

                    <div class="ai-chat-widget-footer">
                        if let Some(message) = (*error).clone() {
                            <div class="ai-chat-widget-error">{ message }</div>
                        }
                        <div class="ai-chat-widget-input-container">
                            <textarea
                                class="ai-chat-widget-input"
                                placeholder={config.placeholder.clone()}
                                value={(*input_text).clone()}
                                oninput={on_input}
                                onkeydown={on_keydown}
                                disabled={!can_send}
                                rows="2"
                            />
                            <button
                                class={classes!("ai-chat-widget-send", (!can_send).then_some("disabled"))}
                                onclick={on_send_click}
                                disabled={!can_send}
                                title="Send message"
                                aria-label="Send message"
                            >
                                { if *busy { "⏳" } else { "➤" } }
                            </button>
                        </div>
                    </div>
                </div>
            </div>
        </>
    }
}

/// One request/reply round. Updates the transcript as text arrives.
async fn exchange(
    session: &ChatSession,
    text: &str,
    stream: bool,
    history: &mut Vec<ChatMessage>,
    lines: &UseStateHandle<Vec<ChatMessage>>,
) -> Result<(), AssistantError> {
    if stream {
        history.push(ChatMessage::new(Role::Assistant, ""));
        let mut tokens = session.send_message_stream(text).await?;
        while let Some(fragment) = tokens.next().await {
            let fragment = fragment?;
            if let Some(last) = history.last_mut() {
                last.text.push_str(&fragment);
            }
            lines.set(history.clone());
        }
        return Ok(());
    }

    let body = session.send_message(text).await?;
    let reply = match normalize_reply(&body)? {
        AssistantReply::Text(answer) => ChatMessage::new(Role::Assistant, answer),
        AssistantReply::Error(reason) => ChatMessage::new(Role::Error, format!("Error: {}", reason)),
    };
    history.push(reply);
    lines.set(history.clone());
    Ok(())
}
