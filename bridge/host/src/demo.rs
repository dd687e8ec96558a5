//! Components and handlers served by the host binary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use app_bridge_runtime::route::query_param;
use app_bridge_runtime::{BridgeError, Component, Driver, Factory, Page, Payload, Result};

pub const THEME_TOGGLE_PATH: &str = "/settings/theme/toggle";

struct Home;

impl Component for Home {
    fn render(&self) -> String {
        String::from(r#"<main><h1>Home</h1><a href="app://settings">Settings</a></main>"#)
    }
}

struct Settings {
    dark: Arc<AtomicBool>,
}

impl Component for Settings {
    fn render(&self) -> String {
        let theme = if self.dark.load(Ordering::Acquire) {
            "dark"
        } else {
            "light"
        };
        format!("<main><h1>Settings</h1><p>theme: {theme}</p></main>")
    }
}

/// State shared by the demo components.
#[derive(Clone, Default)]
pub struct Demo {
    dark: Arc<AtomicBool>,
}

impl Demo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Arc<Factory> {
        let factory = Factory::new();
        factory.register("home", || Home);

        let dark = self.dark.clone();
        factory.register("settings", move || Settings { dark: dark.clone() });
        Arc::new(factory)
    }

    /// Registers app handlers. Safe to call on every run notification.
    pub fn register_handlers(&self, driver: &Driver) -> Result<()> {
        if driver.bridge().registry().contains(THEME_TOGGLE_PATH) {
            return Ok(());
        }

        let elements = driver.elements().clone();
        let dark = self.dark.clone();
        driver.bridge().handle(THEME_TOGGLE_PATH, move |origin, _| {
            let id = query_param(origin, "id")
                .ok_or_else(|| BridgeError::not_found(format!("page id in {origin}")))?;
            let page = elements.typed::<Page>(id.parse()?)?;

            let now_dark = !dark.fetch_xor(true, Ordering::AcqRel);
            if let Some(component) = page.component() {
                page.render(&component)?;
            }
            Payload::new(&now_dark)
        })
    }
}
