//! The shell the app runs in (a Telegram WebApp, or nothing at all).

#[cfg(target_arch = "wasm32")]
pub trait HostBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> HostBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait HostBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> HostBounds for T {}

pub trait HostShell: HostBounds {
    /// Identity of the current user, when the host knows it.
    fn user_id(&self) -> Option<String>;
    fn ready(&self);
    fn expand(&self);
}

/// Host for environments without a shell; the user id is whatever was configured.
#[derive(Debug, Clone, Default)]
pub struct StandaloneHost {
    user_id: Option<String>,
}

impl StandaloneHost {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            user_id: user_id.filter(|id| !id.trim().is_empty()),
        }
    }
}

impl HostShell for StandaloneHost {
    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    fn ready(&self) {}

    fn expand(&self) {}
}

#[cfg(target_arch = "wasm32")]
pub use web::TelegramWebApp;

#[cfg(target_arch = "wasm32")]
mod web {
    use super::HostShell;
    use wasm_bindgen::{JsCast, JsValue};

    /// `window.Telegram.WebApp`, looked up on each call.
    #[derive(Debug, Clone, Default)]
    pub struct TelegramWebApp;

    impl TelegramWebApp {
        /// Returns `None` when the page is not running inside Telegram.
        pub fn detect() -> Option<Self> {
            web_app().map(|_| Self)
        }

        fn call(&self, method: &str) {
            let Some(app) = web_app() else { return };
            if let Ok(f) = js_sys::Reflect::get(&app, &JsValue::from_str(method)) {
                if let Some(f) = f.dyn_ref::<js_sys::Function>() {
                    if let Err(e) = f.call0(&app) {
                        log::warn!("Telegram.WebApp.{} failed: {:?}", method, e);
                    }
                }
            }
        }
    }

    fn get(target: &JsValue, key: &str) -> Option<JsValue> {
        js_sys::Reflect::get(target, &JsValue::from_str(key))
            .ok()
            .filter(|v| !v.is_undefined() && !v.is_null())
    }

    fn web_app() -> Option<JsValue> {
        let window: JsValue = web_sys::window()?.into();
        let telegram = get(&window, "Telegram")?;
        get(&telegram, "WebApp")
    }

    impl HostShell for TelegramWebApp {
        fn user_id(&self) -> Option<String> {
            let app = web_app()?;
            let unsafe_data = get(&app, "initDataUnsafe")?;
            let user = get(&unsafe_data, "user")?;
            let id = get(&user, "id")?;
            id.as_f64()
                .map(|n| format!("{}", n as i64))
                .or_else(|| id.as_string())
        }

        fn ready(&self) {
            self.call("ready");
        }

        fn expand(&self) {
            self.call("expand");
        }
    }
}
