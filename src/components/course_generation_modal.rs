use std::future::Future;
use std::rc::Rc;

use anyhow::anyhow;
use js_sys::Uint8Array;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{File, HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement};
use yew::prelude::*;

use crate::config::{WidgetConfig, MAX_INSTRUCTIONS_CHARS};
use crate::error::{AssistantError, Result};
use crate::models::{GenerationJob, JobRequest, JobSource, UploadFile};
use crate::services::generation::{validate_upload, GenerationJobClient};
use crate::services::poller::{JobPoller, PollCallbacks, PollHandle, PollPhase};
use crate::utils::format_mb;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SourceKind {
    #[default]
    Pdf,
    Url,
    Text,
}

impl SourceKind {
    fn from_value(value: &str) -> Self {
        match value {
            "url" => SourceKind::Url,
            "text" => SourceKind::Text,
            _ => SourceKind::Pdf,
        }
    }
}

/// What the user asked for, after validation.
#[derive(Clone, PartialEq, Debug)]
pub enum FormSource {
    Pdf(UploadFile),
    Url(String),
    Text(String),
}

#[derive(Clone, PartialEq, Debug)]
pub struct GenerationForm {
    pub source: FormSource,
    pub instructions: String,
    pub model: Option<String>,
}

/// Raw field values as currently shown in the modal.
#[derive(Clone, Copy, Debug)]
pub struct FormFields<'a> {
    pub kind: SourceKind,
    pub file: Option<&'a UploadFile>,
    pub url: &'a str,
    pub text: &'a str,
    pub instructions: &'a str,
    pub model: &'a str,
}

pub fn validate_form(fields: FormFields<'_>) -> Result<GenerationForm> {
    let instructions = fields.instructions.trim();
    let source = match fields.kind {
        SourceKind::Pdf => match fields.file {
            Some(file) if !instructions.is_empty() => FormSource::Pdf(file.clone()),
            _ => return Err(invalid("Please select a PDF file and provide instructions.")),
        },
        SourceKind::Url => {
            let url = fields.url.trim();
            if url.is_empty() || instructions.is_empty() {
                return Err(invalid("Please enter a URL and provide instructions."));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid("Please enter a valid http(s) URL."));
            }
            FormSource::Url(url.to_string())
        }
        SourceKind::Text => {
            let text = fields.text.trim();
            if text.is_empty() || instructions.is_empty() {
                return Err(invalid("Please paste some source text and provide instructions."));
            }
            FormSource::Text(text.to_string())
        }
    };
    if instructions.chars().count() > MAX_INSTRUCTIONS_CHARS {
        return Err(invalid(&format!(
            "Instructions must be {} characters or fewer.",
            MAX_INSTRUCTIONS_CHARS
        )));
    }
    let model = Some(fields.model.trim())
        .filter(|m| !m.is_empty() && *m != "default")
        .map(str::to_string);
    Ok(GenerationForm {
        source,
        instructions: instructions.to_string(),
        model,
    })
}

fn invalid(message: &str) -> AssistantError {
    AssistantError::InvalidInput(message.to_string())
}

/// Upload (when needed) and create the job. Polling is started by the caller.
pub async fn submit(client: &GenerationJobClient, course_id: &str, form: GenerationForm) -> Result<GenerationJob> {
    let source = match form.source {
        FormSource::Pdf(file) => JobSource::File(client.upload_file(file).await?.reference),
        FormSource::Url(url) => JobSource::Url(url),
        FormSource::Text(text) => JobSource::Text(text),
    };
    let request = JobRequest {
        source,
        instructions: form.instructions,
        model: form.model,
    };
    client.create_generation_job(course_id, &request).await
}

pub struct GenerationHooks {
    /// Runs once the server has accepted the job, before the first poll.
    pub on_created: Box<dyn FnOnce(&GenerationJob)>,
    pub poll: PollCallbacks,
}

/// Submit `form` and watch the job it creates.
///
/// The handle covers the whole run: dropping it during the upload or job
/// creation means no poll is ever started and no hook runs.
pub fn start_generation(
    client: GenerationJobClient,
    poller: JobPoller,
    course_id: String,
    form: GenerationForm,
    hooks: GenerationHooks,
) -> (PollHandle, impl Future<Output = ()>) {
    let GenerationHooks { on_created, poll } = hooks;
    PollHandle::wrap(async move {
        match submit(&client, &course_id, form).await {
            Ok(created) => {
                log::info!("generation job {} created", created.id);
                on_created(&created);
                poller.run(created.id, poll).await;
            }
            Err(err) => {
                log::warn!("course generation could not start: {}", err);
                (poll.on_failure)(err);
            }
        }
    })
}

async fn read_file(file: File) -> anyhow::Result<UploadFile> {
    let buffer = JsFuture::from(file.array_buffer())
        .await
        .map_err(|e| anyhow!("could not read {}: {:?}", file.name(), e))?;
    Ok(UploadFile {
        name: file.name(),
        mime: file.type_(),
        bytes: Uint8Array::new(&buffer).to_vec(),
    })
}

#[derive(Properties, PartialEq)]
pub struct CourseGenerationModalProps {
    pub is_open: bool,
    pub config: WidgetConfig,
    #[prop_or_default]
    pub on_close: Callback<()>,
    #[prop_or_default]
    pub on_success: Callback<GenerationJob>,
    #[prop_or_default]
    pub on_error: Callback<AssistantError>,
    #[prop_or(AttrValue::Static("AI Course Generation"))]
    pub title: AttrValue,
}

const CSS: &str = r#"
    .course-generation-modal-overlay { position: fixed; inset: 0; background: rgba(0,0,0,0.45); display: flex; align-items: center; justify-content: center; z-index: 1100; }
    .course-generation-modal { width: 560px; max-width: 95vw; max-height: 90vh; overflow-y: auto; background: white; border-radius: 10px; box-shadow: 0 10px 40px rgba(0,0,0,0.3); }
    .course-generation-modal-header { display: flex; justify-content: space-between; align-items: center; padding: 16px 20px; border-bottom: 1px solid #eee; }
    .course-generation-modal-title { margin: 0; }
    .course-generation-modal-close { background: none; border: none; font-size: 1.1rem; cursor: pointer; }
    .course-generation-modal-body { padding: 16px 20px; }
    .course-generation-modal-description { color: #555; }
    .course-generation-modal-error { background: #fdecea; color: #b71c1c; padding: 8px 12px; border-radius: 6px; margin-bottom: 12px; }
    .form-group { margin-bottom: 14px; display: flex; flex-direction: column; gap: 6px; }
    .form-label { font-weight: 600; }
    .form-control { padding: 8px; border: 1px solid #ccc; border-radius: 6px; font-family: inherit; }
    .file-info { font-size: 0.85rem; color: #444; display: flex; gap: 6px; }
    .character-count { font-size: 0.8rem; color: #888; align-self: flex-end; }
    .character-count.over { color: #b71c1c; }
    .generation-progress { margin-top: 10px; }
    .generation-progress-track { height: 8px; background: #eee; border-radius: 4px; overflow: hidden; }
    .generation-progress-bar { height: 100%; background: #0a66c2; transition: width 0.3s; }
    .generation-progress-message { font-size: 0.85rem; color: #555; margin-top: 4px; }
    .course-generation-modal-footer { display: flex; justify-content: flex-end; gap: 10px; padding: 14px 20px; border-top: 1px solid #eee; }
"#;

#[function_component(CourseGenerationModal)]
pub fn course_generation_modal(props: &CourseGenerationModalProps) -> Html {
    let config = &props.config;
    let client = use_memo(config.clone(), GenerationJobClient::from_config);
    let kind = use_state(SourceKind::default);
    let file = use_state(|| None::<UploadFile>);
    let url = use_state(String::new);
    let text = use_state(String::new);
    let instructions = use_state(String::new);
    let model = use_state(|| config.default_model().map(|m| m.id.clone()).unwrap_or_default());
    let phase = use_state(PollPhase::default);
    let job = use_state(|| None::<GenerationJob>);
    let error = use_state(String::new);
    let generating = use_state(|| false);
    // Dropping the handle, on unmount or a new submit, stops the whole run.
    let poll_handle = use_mut_ref(|| None::<PollHandle>);

    {
        let poll_handle = poll_handle.clone();
        use_effect_with((), move |_| {
            move || {
                poll_handle.borrow_mut().take();
            }
        });
    }

    let reset_form = {
        let kind = kind.clone();
        let file = file.clone();
        let url = url.clone();
        let text = text.clone();
        let instructions = instructions.clone();
        let error = error.clone();
        Rc::new(move || {
            kind.set(SourceKind::default());
            file.set(None);
            url.set(String::new());
            text.set(String::new());
            instructions.set(String::new());
            error.set(String::new());
        })
    };

    let on_kind_change = {
        let kind = kind.clone();
        let error = error.clone();
        Callback::from(move |e: Event| {
            let select: HtmlSelectElement = e.target_unchecked_into();
            kind.set(SourceKind::from_value(&select.value()));
            error.set(String::new());
        })
    };

    let on_file_change = {
        let file = file.clone();
        let error = error.clone();
        let max_mb = config.max_upload_mb;
        Callback::from(move |e: Event| {
            let input: HtmlInputElement = e.target_unchecked_into();
            error.set(String::new());
            let Some(picked) = input.files().and_then(|list| list.get(0)) else {
                file.set(None);
                return;
            };
            let file = file.clone();
            let error = error.clone();
            spawn_local(async move {
                match read_file(picked).await {
                    Ok(upload) => match validate_upload(&upload, max_mb) {
                        Ok(()) => file.set(Some(upload)),
                        Err(err) => {
                            file.set(None);
                            error.set(err.user_message());
                        }
                    },
                    Err(err) => {
                        log::error!("{:#}", err);
                        file.set(None);
                        error.set("Could not read the selected file.".to_string());
                    }
                }
            });
        })
    };

    let on_url_input = {
        let url = url.clone();
        Callback::from(move |e: InputEvent| {
            let input: HtmlInputElement = e.target_unchecked_into();
            url.set(input.value());
        })
    };

    let on_text_input = {
        let text = text.clone();
        Callback::from(move |e: InputEvent| {
            let area: HtmlTextAreaElement = e.target_unchecked_into();
            text.set(area.value());
        })
    };

    let on_instructions_input = {
        let instructions = instructions.clone();
        Callback::from(move |e: InputEvent| {
            let area: HtmlTextAreaElement = e.target_unchecked_into();
            instructions.set(area.value());
        })
    };

    let on_model_change = {
        let model = model.clone();
        Callback::from(move |e: Event| {
            let select: HtmlSelectElement = e.target_unchecked_into();
            model.set(select.value());
        })
    };

    let on_generate = {
        let client = client.clone();
        let config = config.clone();
        let (kind, file, url, text, instructions, model) = (
            kind.clone(),
            file.clone(),
            url.clone(),
            text.clone(),
            instructions.clone(),
            model.clone(),
        );
        let (phase, job, error, generating) = (phase.clone(), job.clone(), error.clone(), generating.clone());
        let poll_handle = poll_handle.clone();
        let reset_form = reset_form.clone();
        let on_success = props.on_success.clone();
        let on_error = props.on_error.clone();
        let on_close = props.on_close.clone();

        Callback::from(move |_: MouseEvent| {
            if *generating {
                return;
            }
            let form = validate_form(FormFields {
                kind: *kind,
                file: (*file).as_ref(),
                url: &url,
                text: &text,
                instructions: &instructions,
                model: &model,
            });
            let form = match form {
                Ok(form) => form,
                Err(err) => {
                    error.set(err.user_message());
                    return;
                }
            };
            let Some(course_id) = config.context.course_id.clone() else {
                error.set("Could not determine the course for this page.".to_string());
                return;
            };

            generating.set(true);
            error.set(String::new());
            phase.set(PollPhase::Idle);
            job.set(None);

            let client = (*client).clone();
            let poller = JobPoller::from_config(client.clone(), &config);
            let hooks = {
                let (created_phase, created_job) = (phase.clone(), job.clone());
                let (progress_phase, progress_job) = (phase.clone(), job.clone());
                let (done_phase, done_job, done_generating) = (phase.clone(), job.clone(), generating.clone());
                let (failed_phase, failed_job, failed_generating, failed_error) =
                    (phase.clone(), job.clone(), generating.clone(), error.clone());
                let reset_form = reset_form.clone();
                let (on_success, on_error, on_close) = (on_success.clone(), on_error.clone(), on_close.clone());
                GenerationHooks {
                    on_created: Box::new(move |created: &GenerationJob| {
                        created_phase.set(PollPhase::Starting);
                        created_job.set(Some(created.clone()));
                    }),
                    poll: PollCallbacks {
                        on_progress: Box::new(move |update: &GenerationJob| {
                            progress_phase.set(PollPhase::from(update.status));
                            progress_job.set(Some(update.clone()));
                        }),
                        on_success: Box::new(move |finished: GenerationJob| {
                            done_phase.set(PollPhase::Completed);
                            done_job.set(None);
                            done_generating.set(false);
                            reset_form();
                            on_success.emit(finished);
                            on_close.emit(());
                        }),
                        on_failure: Box::new(move |err: AssistantError| {
                            failed_phase.set(PollPhase::Failed);
                            failed_job.set(None);
                            failed_generating.set(false);
                            failed_error.set(err.user_message());
                            on_error.emit(err);
                        }),
                    },
                }
            };

            // Replacing the handle stops any earlier run before this one starts.
            let (handle, task) = start_generation(client, poller, course_id, form, hooks);
            *poll_handle.borrow_mut() = Some(handle);
            spawn_local(task);
        })
    };

    let on_cancel = {
        let generating = generating.clone();
        let phase = phase.clone();
        let job = job.clone();
        let reset_form = reset_form.clone();
        let on_close = props.on_close.clone();
        Callback::from(move |_: MouseEvent| {
            if *generating {
                return;
            }
            reset_form();
            phase.set(PollPhase::Idle);
            job.set(None);
            on_close.emit(());
        })
    };

    if !props.is_open {
        return html! {};
    }

    let busy = *generating;
    let instructions_len = instructions.chars().count();
    let has_source = match *kind {
        SourceKind::Pdf => file.is_some(),
        SourceKind::Url => !url.trim().is_empty(),
        SourceKind::Text => !text.trim().is_empty(),
    };
    let can_generate = has_source && !instructions.trim().is_empty() && !busy;
    let progress = (*job).as_ref().map_or(0.0, |j| j.progress_percent);
    let progress_message = (*job)
        .as_ref()
        .and_then(|j| j.progress_message.clone())
        .unwrap_or_else(|| match *phase {
            PollPhase::Starting => "Starting generation...".to_string(),
            PollPhase::Processing => "Generating course content...".to_string(),
            _ => String::new(),
        });
    let submitting = busy && !phase.is_active();

    html! {
        <>
            <style>{ CSS }</style>
            <div class="course-generation-modal-overlay">
                <div class="course-generation-modal" role="dialog" aria-modal="true">
                    <div class="course-generation-modal-header">
                        <h4 class="course-generation-modal-title">{ props.title.clone() }</h4>
                        <button
                            type="button"
                            class="course-generation-modal-close"
                            onclick={on_cancel.clone()}
                            disabled={busy}
                            aria-label="Close modal"
                        >
                            { "✕" }
                        </button>
                    </div>

                    <div class="course-generation-modal-body">
                        <p class="course-generation-modal-description">
                            { "Provide a PDF document, a web page or some text, plus instructions, to generate course content using AI." }
                        </p>

                        if !error.is_empty() {
                            <div class="course-generation-modal-error">{ (*error).clone() }</div>
                        }

                        <div class="course-generation-form">
                            <div class="form-group">
                                <label for="generation-source" class="form-label">{ "Source:" }</label>
                                <select id="generation-source" class="form-control" onchange={on_kind_change} disabled={busy}>
                                    <option value="pdf" selected={*kind == SourceKind::Pdf}>{ "PDF document" }</option>
                                    <option value="url" selected={*kind == SourceKind::Url}>{ "Web page URL" }</option>
                                    <option value="text" selected={*kind == SourceKind::Text}>{ "Pasted text" }</option>
                                </select>
                            </div>

                            <div class="form-group">
                                {
                                    match *kind {
                                        SourceKind::Pdf => html! {
                                            <>
                                                <label for="pdf-upload" class="form-label">
                                                    { format!("PDF Document (max {}MB):", config.max_upload_mb) }
                                                </label>
                                                <input
                                                    id="pdf-upload"
                                                    type="file"
                                                    class="form-control"
                                                    accept=".pdf,application/pdf"
                                                    onchange={on_file_change}
                                                    disabled={busy}
                                                />
                                                if let Some(picked) = (*file).as_ref() {
                                                    <div class="file-info">
                                                        <span class="file-name">{ format!("📄 {}", picked.name) }</span>
                                                        <span class="file-size">{ format!("({})", format_mb(picked.bytes.len())) }</span>
                                                    </div>
                                                }
                                            </>
                                        },
                                        SourceKind::Url => html! {
                                            <>
                                                <label for="source-url" class="form-label">{ "Web page URL:" }</label>
                                                <input
                                                    id="source-url"
                                                    type="url"
                                                    class="form-control"
                                                    placeholder="https://..."
                                                    value={(*url).clone()}
                                                    oninput={on_url_input}
                                                    disabled={busy}
                                                />
                                            </>
                                        },
                                        SourceKind::Text => html! {
                                            <>
                                                <label for="source-text" class="form-label">{ "Source text:" }</label>
                                                <textarea
                                                    id="source-text"
                                                    class="form-control"
                                                    rows="6"
                                                    value={(*text).clone()}
                                                    oninput={on_text_input}
                                                    disabled={busy}
                                                />
                                            </>
                                        },
                                    }
                                }
                            </div>

                            <div class="form-group">
                                <label for="instructions" class="form-label">{ "Generation Instructions:" }</label>
                                <textarea
                                    id="instructions"
                                    class="form-control"
                                    rows="4"
                                    value={(*instructions).clone()}
                                    oninput={on_instructions_input}
                                    placeholder="Describe what kind of course content you want to generate, e.g. modules, lessons and quizzes focused on practical applications."
                                    disabled={busy}
                                />
                                <div class={classes!("character-count", (instructions_len > MAX_INSTRUCTIONS_CHARS).then_some("over"))}>
                                    { format!("{}/{} characters", instructions_len, MAX_INSTRUCTIONS_CHARS) }
                                </div>
                            </div>

                            if config.models.len() > 1 {
                                <div class="form-group">
                                    <label for="generation-model" class="form-label">{ "Model:" }</label>
                                    <select id="generation-model" class="form-control" onchange={on_model_change} disabled={busy}>
                                        { for config.models.iter().map(|m| html! {
                                            <option value={m.id.clone()} selected={*model == m.id} title={m.description.clone()}>
                                                { m.name.clone() }
                                            </option>
                                        }) }
                                    </select>
                                </div>
                            }

                            if submitting {
                                <div class="generation-progress">
                                    <div class="generation-progress-message">{ "Uploading source and creating job..." }</div>
                                </div>
                            }
                            if phase.is_active() {
                                <div class="generation-progress">
                                    <div class="generation-progress-track">
                                        <div class="generation-progress-bar" style={format!("width: {:.0}%;", progress)} />
                                    </div>
                                    <div class="generation-progress-message">
                                        { format!("{} ({:.0}%)", progress_message, progress) }
                                    </div>
                                </div>
                            }
                        </div>
                    </div>

                    <div class="course-generation-modal-footer">
                        <button type="button" class="btn btn-secondary" onclick={on_cancel} disabled={busy}>
                            { "Cancel" }
                        </button>
                        <button type="button" class="btn btn-primary" onclick={on_generate} disabled={!can_generate}>
                            if busy {
                                <><span class="spinner">{ "⏳" }</span>{ " Generating..." }</>
                            } else {
                                <><span class="icon">{ "🪄" }</span>{ " Generate Course" }</>
                            }
                        </button>
                    </div>
                </div>
            </div>
        </>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transport::mock::{self, MockTransport};
    use crate::services::transport::RequestBody;
    use serde_json::json;
    use std::cell::RefCell;
    use std::time::Duration;

    const INTERVAL: Duration = Duration::from_millis(2000);

    #[derive(Default)]
    struct Events {
        log: RefCell<Vec<String>>,
    }

    fn hooks(events: &Rc<Events>) -> GenerationHooks {
        let (c, p, s, f) = (events.clone(), events.clone(), events.clone(), events.clone());
        GenerationHooks {
            on_created: Box::new(move |job| c.log.borrow_mut().push(format!("created {}", job.id))),
            poll: PollCallbacks {
                on_progress: Box::new(move |job| p.log.borrow_mut().push(format!("progress {}", job.progress_percent))),
                on_success: Box::new(move |job| s.log.borrow_mut().push(format!("done {}", job.id))),
                on_failure: Box::new(move |err| f.log.borrow_mut().push(format!("failed {}", err))),
            },
        }
    }

    fn text_form() -> GenerationForm {
        GenerationForm {
            source: FormSource::Text("chapter one".into()),
            instructions: "quiz me".into(),
            model: None,
        }
    }

    fn run_parts(transport: &Rc<MockTransport>) -> (GenerationJobClient, JobPoller) {
        let client = GenerationJobClient::new("/api/ai-assistant", transport.clone());
        let poller = JobPoller::new(client.clone(), INTERVAL);
        (client, poller)
    }

    fn pdf() -> UploadFile {
        UploadFile {
            name: "notes.pdf".into(),
            mime: "application/pdf".into(),
            bytes: vec![1, 2, 3],
        }
    }

    fn fields<'a>(kind: SourceKind, file: Option<&'a UploadFile>, instructions: &'a str) -> FormFields<'a> {
        FormFields {
            kind,
            file,
            url: "",
            text: "",
            instructions,
            model: "default",
        }
    }

    #[test]
    fn pdf_needs_file_and_instructions() {
        let file = pdf();
        assert_eq!(
            validate_form(fields(SourceKind::Pdf, None, "make a course")).unwrap_err().to_string(),
            "Please select a PDF file and provide instructions."
        );
        assert!(validate_form(fields(SourceKind::Pdf, Some(&file), "   ")).is_err());

        let form = validate_form(fields(SourceKind::Pdf, Some(&file), "  make a course ")).unwrap();
        assert_eq!(form.source, FormSource::Pdf(file));
        assert_eq!(form.instructions, "make a course");
        assert_eq!(form.model, None);
    }

    #[test]
    fn url_must_be_http() {
        let mut f = fields(SourceKind::Url, None, "summarise");
        f.url = "ftp://example.com";
        assert_eq!(
            validate_form(f).unwrap_err().to_string(),
            "Please enter a valid http(s) URL."
        );
        f.url = " https://example.com/page ";
        f.model = "gpt-4o";
        let form = validate_form(f).unwrap();
        assert_eq!(form.source, FormSource::Url("https://example.com/page".into()));
        assert_eq!(form.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn instructions_length_is_capped() {
        let mut f = fields(SourceKind::Text, None, "");
        f.text = "some material";
        let long = "x".repeat(MAX_INSTRUCTIONS_CHARS + 1);
        f.instructions = &long;
        assert_eq!(
            validate_form(f).unwrap_err().to_string(),
            "Instructions must be 1000 characters or fewer."
        );
        let exact = "x".repeat(MAX_INSTRUCTIONS_CHARS);
        f.instructions = &exact;
        assert!(validate_form(f).is_ok());
    }

    #[test]
    fn source_kind_from_select_value() {
        assert_eq!(SourceKind::from_value("url"), SourceKind::Url);
        assert_eq!(SourceKind::from_value("text"), SourceKind::Text);
        assert_eq!(SourceKind::from_value("pdf"), SourceKind::Pdf);
        assert_eq!(SourceKind::from_value("anything"), SourceKind::Pdf);
    }

    #[tokio::test]
    async fn submit_uploads_pdf_before_creating_job() {
        let transport = Rc::new(MockTransport::new([
            mock::ok(json!({"file_id": "f9"})),
            mock::ok(json!({"id": "j9", "status": "starting"})),
        ]));
        let client = GenerationJobClient::new("/api/ai-assistant", transport.clone());
        let form = GenerationForm {
            source: FormSource::Pdf(pdf()),
            instructions: "make a course".into(),
            model: None,
        };
        let job = submit(&client, "course-v1:A+B+C", form).await.unwrap();
        assert_eq!(job.id, "j9");

        let requests = transport.requests();
        assert!(matches!(requests[0].body, RequestBody::Multipart { .. }));
        assert_eq!(
            requests[1].json_body(),
            Some(&json!({"pdf_file": "f9", "instructions": "make a course"}))
        );
    }

    #[tokio::test]
    async fn submit_text_skips_upload() {
        let transport = Rc::new(MockTransport::new([mock::ok(json!({"id": 4}))]));
        let client = GenerationJobClient::new("/api/ai-assistant", transport.clone());
        let form = GenerationForm {
            source: FormSource::Text("chapter one".into()),
            instructions: "quiz me".into(),
            model: Some("m1".into()),
        };
        let job = submit(&client, "c1", form).await.unwrap();
        assert_eq!(job.id, "4");
        assert_eq!(transport.calls(), 1);
        assert_eq!(
            transport.requests()[0].json_body(),
            Some(&json!({"source_text": "chapter one", "instructions": "quiz me", "model": "m1"}))
        );
    }

    #[tokio::test]
    async fn submit_stops_when_upload_fails() {
        let transport = Rc::new(MockTransport::new([mock::status(400, json!({"error": "Corrupt PDF"}))]));
        let client = GenerationJobClient::new("/api/ai-assistant", transport.clone());
        let form = GenerationForm {
            source: FormSource::Pdf(pdf()),
            instructions: "x".into(),
            model: None,
        };
        assert_eq!(
            submit(&client, "c1", form).await.unwrap_err(),
            AssistantError::Upload("Corrupt PDF".into())
        );
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn generation_runs_from_create_to_completion() {
        let transport = Rc::new(MockTransport::new([
            mock::ok(json!({"id": "j1", "status": "starting"})),
            mock::ok(json!({"status": "processing", "progress_percent": 30})),
            mock::ok(json!({"status": "completed", "progress_percent": 100})),
        ]));
        let (client, poller) = run_parts(&transport);
        let events = Rc::new(Events::default());
        let (_handle, task) = start_generation(client, poller, "c1".into(), text_form(), hooks(&events));
        task.await;
        assert_eq!(*events.log.borrow(), vec!["created j1", "progress 30", "done j1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn create_failure_reports_once_without_polling() {
        let transport = Rc::new(MockTransport::new([mock::status(400, json!({"detail": "no course"}))]));
        let (client, poller) = run_parts(&transport);
        let events = Rc::new(Events::default());
        let (_handle, task) = start_generation(client, poller, "c1".into(), text_form(), hooks(&events));
        task.await;
        assert_eq!(*events.log.borrow(), vec!["failed no course"]);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_during_job_creation_never_polls() {
        let transport = Rc::new(MockTransport::new([
            mock::ok(json!({"id": "j1", "status": "starting"})).after(Duration::from_millis(1000)),
            mock::ok(json!({"status": "completed"})),
        ]));
        let (client, poller) = run_parts(&transport);
        let events = Rc::new(Events::default());
        let (handle, task) = start_generation(client, poller, "c1".into(), text_form(), hooks(&events));
        let mut task = Box::pin(task);

        // The create request is still on the wire at 500ms.
        assert!(tokio::time::timeout(Duration::from_millis(500), &mut task).await.is_err());
        assert_eq!(transport.calls(), 1);

        drop(handle);
        task.await;
        tokio::time::sleep(INTERVAL * 5).await;
        assert!(events.log.borrow().is_empty());
        assert_eq!(transport.calls(), 1);
    }
}
