use yew::prelude::*;

use crate::components::course_generation_modal::CourseGenerationModal;
use crate::config::WidgetConfig;
use crate::error::AssistantError;
use crate::models::GenerationJob;

#[derive(Properties, PartialEq)]
pub struct CourseGenerationButtonProps {
    pub config: WidgetConfig,
    #[prop_or(AttrValue::Static("AI Generate"))]
    pub button_text: AttrValue,
    #[prop_or(AttrValue::Static("🪄"))]
    pub button_icon: AttrValue,
    #[prop_or(AttrValue::Static("btn btn-primary"))]
    pub class: AttrValue,
    #[prop_or_default]
    pub on_success: Callback<GenerationJob>,
    #[prop_or_default]
    pub on_error: Callback<AssistantError>,
}

/// Button that opens the generation modal for the current course.
#[function_component(CourseGenerationButton)]
pub fn course_generation_button(props: &CourseGenerationButtonProps) -> Html {
    let show_modal = use_state(|| false);

    let on_open = {
        let show_modal = show_modal.clone();
        Callback::from(move |_: MouseEvent| show_modal.set(true))
    };

    let on_close = {
        let show_modal = show_modal.clone();
        Callback::from(move |_: ()| show_modal.set(false))
    };

    let on_success = {
        let forward = props.on_success.clone();
        Callback::from(move |job: GenerationJob| {
            log::info!("generation job {} completed", job.id);
            forward.emit(job);
        })
    };

    let on_error = {
        let forward = props.on_error.clone();
        Callback::from(move |err: AssistantError| {
            log::error!("course generation error: {}", err);
            forward.emit(err);
        })
    };

    html! {
        <>
            <button
                class={props.class.clone()}
                onclick={on_open}
                title="Generate course content with AI"
                aria-label="Generate course content with AI"
            >
                <span class="icon" style="margin-right: 8px;">{ props.button_icon.clone() }</span>
                { props.button_text.clone() }
            </button>

            <CourseGenerationModal
                is_open={*show_modal}
                config={props.config.clone()}
                {on_close}
                {on_success}
                {on_error}
            />
        </>
    }
}
