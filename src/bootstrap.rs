//! Entry points exported to the host page.
//!
//! Each mount reads `window.aiChatConfig` once, layers the caller's options
//! on top, fills the course context from the page and hands the resulting
//! [`WidgetConfig`] to the root component.

use anyhow::{anyhow, Context, Result};
use js_sys::{Function, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, Window};

use crate::app::{AiChatTray, AiChatTrayProps, GenerationRoot, GenerationRootProps};
use crate::config::WidgetConfig;
use crate::services::host::HostHandler;
use crate::{dom, utils};

const ROOT_ID: &str = "ai-widget-root";
const FOOTER_SLOTS: [&str; 2] = [
    "org.openedx.frontend.layout.footer.v1",
    "org.openedx.frontend.layout.studio_footer.v1",
];
const PLUGIN_APIS: [&[&str]; 3] = [&["PluginAPI"], &["openEdx", "plugin"], &["edx", "plugins"]];

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
    utils::init_logging();
}

fn load_config(options: &JsValue, container: Option<&Element>) -> Result<WidgetConfig> {
    let global = dom::global_overrides().unwrap_or_else(|err| {
        log::warn!("ignoring window.aiChatConfig: {:#}", err);
        Default::default()
    });
    let mut config = WidgetConfig::merged(global);
    config.apply(dom::overrides_from_js(options)?);
    config.on_send = dom::send_function(options).map(HostHandler::from_js);
    Ok(config.with_page_context(dom::page_context(container)))
}

fn render_tray(container: Element, config: WidgetConfig) {
    log::debug!("mounting chat tray (course {:?})", config.context.course_id);
    yew::Renderer::<AiChatTray>::with_root_and_props(container, AiChatTrayProps { config }).render();
}

fn window() -> Result<Window> {
    web_sys::window().ok_or_else(|| anyhow!("no window"))
}

fn standalone(options: &JsValue) -> Result<()> {
    let document = window()?.document().ok_or_else(|| anyhow!("no document"))?;
    let root = match document.get_element_by_id(ROOT_ID) {
        Some(existing) => existing,
        None => {
            let root = document
                .create_element("div")
                .map_err(|e| anyhow!("cannot create mount point: {:?}", e))?;
            root.set_id(ROOT_ID);
            let body = document.body().ok_or_else(|| anyhow!("document has no body"))?;
            body.append_child(&root)
                .map_err(|e| anyhow!("cannot attach mount point: {:?}", e))?;
            root
        }
    };
    let config = load_config(options, Some(&root))?;
    render_tray(root, config);
    Ok(())
}

/// First plugin registry found on `window`, if the host exposes one.
fn plugin_api(window: &Window) -> Option<JsValue> {
    PLUGIN_APIS.iter().find_map(|path| {
        let mut current: JsValue = window.clone().into();
        for key in path.iter() {
            current = Reflect::get(&current, &JsValue::from_str(key)).ok()?;
            if current.is_undefined() || current.is_null() {
                return None;
            }
        }
        Some(current)
    })
}

fn register_slot(api: &JsValue, slot: &str, render: &Function) -> bool {
    let register = match Reflect::get(api, &JsValue::from_str("register")) {
        Ok(value) => value,
        Err(_) => return false,
    };
    let Some(register) = register.dyn_ref::<Function>() else {
        return false;
    };
    match register.call2(api, &JsValue::from_str(slot), render) {
        Ok(_) => true,
        Err(err) => {
            log::warn!("slot {} rejected the widget: {:?}", slot, err);
            false
        }
    }
}

fn plugin(options: &JsValue) -> Result<()> {
    let window = window()?;
    let Some(api) = plugin_api(&window) else {
        log::info!("no plugin API found, mounting standalone");
        return standalone(options);
    };

    let config = load_config(options, None)?;
    let render = Closure::<dyn Fn(JsValue)>::new(move |target: JsValue| match target.dyn_into::<Element>() {
        Ok(container) => {
            let page = dom::page_context(Some(&container));
            render_tray(container, config.clone().with_page_context(page));
        }
        Err(_) => log::error!("plugin slot did not provide an element"),
    });
    // The registry may call back at any time; the closure lives for the page.
    let render: Function = render.into_js_value().unchecked_into();

    let registered = FOOTER_SLOTS
        .iter()
        .filter(|slot| register_slot(&api, slot, &render))
        .count();
    if registered == 0 {
        log::info!("plugin API refused every slot, mounting standalone");
        return standalone(options);
    }
    log::info!("registered chat widget in {} slot(s)", registered);
    Ok(())
}

fn report(result: Result<()>) -> Result<(), JsValue> {
    result.map_err(|err| {
        log::error!("{:#}", err);
        JsValue::from_str(&format!("{:#}", err))
    })
}

/// Mount the chat tray in `#ai-widget-root`, creating it when missing.
#[wasm_bindgen(js_name = initStandalone)]
pub fn init_standalone(options: JsValue) -> Result<(), JsValue> {
    report(standalone(&options).context("standalone mount failed"))
}

/// Register with the host's plugin slots, or fall back to a standalone mount.
#[wasm_bindgen(js_name = initPlugin)]
pub fn init_plugin(options: JsValue) -> Result<(), JsValue> {
    report(plugin(&options).context("plugin registration failed"))
}

#[wasm_bindgen(js_name = mountWidget)]
pub fn mount_widget(container: Element, options: JsValue) -> Result<(), JsValue> {
    report(load_config(&options, Some(&container)).map(|config| render_tray(container, config)))
}

#[wasm_bindgen(js_name = mountCourseGenerationButton)]
pub fn mount_course_generation_button(container: Element, options: JsValue) -> Result<(), JsValue> {
    report(load_config(&options, Some(&container)).map(|config| {
        yew::Renderer::<GenerationRoot>::with_root_and_props(container, GenerationRootProps { config }).render();
    }))
}
