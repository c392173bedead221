use pulldown_cmark::{html, Event as MdEvent, Options, Parser};
use yew::{AttrValue, Html};

pub fn set_panic_hook() {
    // Better error messages in the browser console if the widget ever panics.
    // https://github.com/rustwasm/console_error_panic_hook#readme
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

pub fn init_logging() {
    #[cfg(target_arch = "wasm32")]
    wasm_logger::init(wasm_logger::Config::new(log::Level::Info));
}

pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    // Raw HTML from the model is shown as text, never injected.
    let parser = Parser::new_ext(text, options).map(|event| match event {
        MdEvent::SoftBreak => MdEvent::HardBreak,
        MdEvent::Html(raw) => MdEvent::Text(raw),
        _ => event,
    });

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);
    html_output
}

pub fn render_markdown(text: &str) -> Html {
    let styled_html = format!(r#"<div class="markdown-body">{}</div>"#, markdown_to_html(text));
    Html::from_html_unchecked(AttrValue::from(styled_html))
}

/// Megabytes with one decimal, as shown next to a picked file.
pub fn format_mb(bytes: usize) -> String {
    format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_escapes_raw_html() {
        let out = markdown_to_html("**hi** <script>alert(1)</script>");
        assert!(out.contains("<strong>hi</strong>"));
        assert!(!out.contains("<script>"));
        assert!(out.contains("&lt;script&gt;"));
    }

    #[test]
    fn soft_breaks_become_line_breaks() {
        assert!(markdown_to_html("a\nb").contains("<br />"));
    }

    #[test]
    fn mb_formatting() {
        assert_eq!(format_mb(10 * 1024 * 1024), "10.0MB");
        assert_eq!(format_mb(1536 * 1024), "1.5MB");
    }
}
