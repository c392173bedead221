use std::time::Duration;

/// Resolve after `duration`. Backed by `setTimeout` in the browser.
#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
    use wasm_bindgen::JsValue;

    let ms = duration.as_millis().min(i32::MAX as u128) as i32;
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        let scheduled = match web_sys::window() {
            Some(window) => window
                .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms)
                .map(|_| ()),
            None => Err(JsValue::from_str("no window")),
        };
        // Never leave the caller waiting on a timer that will not fire.
        if let Err(err) = scheduled {
            log::warn!("setTimeout failed, resolving immediately: {:?}", err);
            if let Err(err) = resolve.call0(&JsValue::UNDEFINED) {
                log::error!("could not resolve timer promise: {:?}", err);
            }
        }
    });
    if let Err(err) = wasm_bindgen_futures::JsFuture::from(promise).await {
        log::warn!("timer promise rejected: {:?}", err);
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}
