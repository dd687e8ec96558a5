//! Pages: one history, one markup engine and at most one mounted component.
//!
//! Every navigation runs the same transition: dismount whatever is mounted,
//! build the component named by the location, mount it and keep it. A failed
//! load leaves the page empty; nothing is rolled back.
//!
//! Component hooks run after the page locks are released, so a hook may look
//! the page up through the element directory or render into it.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;
use url::Url;

use crate::component::{ComponentHandle, ComponentId, Factory};
use crate::elements::{Element, ElementDirectory, ElementId};
use crate::error::{BridgeError, Result};
use crate::history::History;
use crate::markup::Markup;
use crate::route;

type CloseFn = Box<dyn FnOnce() + Send + 'static>;

/// Options for [`Page::open`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageConfig {
    /// Location loaded right after the page opens.
    pub default_url: Option<String>,
}

impl PageConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            default_url: Some(url.into()),
        }
    }
}

struct PageState {
    component: Option<ComponentHandle>,
    last_focus: SystemTime,
}

pub struct Page {
    id: ElementId,
    factory: Arc<Factory>,
    markup: Mutex<Box<dyn Markup>>,
    history: History,
    state: Mutex<PageState>,
    on_close: Mutex<Option<CloseFn>>,
    closed: AtomicBool,
}

impl Page {
    /// Creates a page with no directory entry and no close callback.
    pub fn new(factory: Arc<Factory>, markup: Box<dyn Markup>, history_limit: usize) -> Self {
        Self {
            id: ElementId::new(),
            factory,
            markup: Mutex::new(markup),
            history: History::with_limit(history_limit),
            state: Mutex::new(PageState {
                component: None,
                last_focus: SystemTime::now(),
            }),
            on_close: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a page, registers it in `directory` and loads the configured
    /// default location. Closing the page removes it from the directory.
    pub fn open(
        directory: &Arc<ElementDirectory>,
        factory: Arc<Factory>,
        markup: Box<dyn Markup>,
        history_limit: usize,
        config: &PageConfig,
    ) -> Result<Arc<Page>> {
        let page = Arc::new(Page::new(factory, markup, history_limit));

        let weak: Weak<ElementDirectory> = Arc::downgrade(directory);
        let id = page.id;
        page.set_on_close(move || {
            if let Some(directory) = weak.upgrade() {
                directory.remove(id);
            }
        });
        directory.add(page.clone());

        if let Some(url) = &config.default_url {
            if let Err(err) = page.load(url) {
                page.close();
                return Err(err);
            }
        }
        Ok(page)
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Replaces the callback run by the first [`Page::close`].
    pub fn set_on_close<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.on_close.lock() = Some(Box::new(f));
    }

    /// Navigates to `raw`, recording a history entry unless it is already the
    /// current location.
    pub fn load(&self, raw: &str) -> Result<()> {
        let url = route::parse_location(raw)?;
        let location = url.to_string();

        if self.history.current().ok().as_deref() != Some(location.as_str()) {
            self.history.new_entry(location);
        }
        self.load_component(&url)
    }

    /// Mounts a fresh component for the current location.
    pub fn reload(&self) -> Result<()> {
        let current = self.history.current()?;
        self.load_component(&route::parse_location(&current)?)
    }

    pub fn previous(&self) -> Result<()> {
        let location = self.history.previous()?;
        self.load_component(&route::parse_location(&location)?)
    }

    pub fn next(&self) -> Result<()> {
        let location = self.history.next()?;
        self.load_component(&route::parse_location(&location)?)
    }

    pub fn can_previous(&self) -> bool {
        self.history.can_previous()
    }

    pub fn can_next(&self) -> bool {
        self.history.can_next()
    }

    /// Re-renders a component mounted in this page.
    pub fn render(&self, component: &ComponentHandle) -> Result<()> {
        self.markup.lock().update(component)
    }

    /// Location visited before the current one.
    pub fn referer(&self) -> Option<Url> {
        self.history
            .peek_previous()
            .and_then(|raw| route::parse_location(&raw).ok())
    }

    pub fn url(&self) -> Result<Url> {
        route::parse_location(&self.history.current()?)
    }

    pub fn component(&self) -> Option<ComponentHandle> {
        self.state.lock().component.clone()
    }

    pub fn contains(&self, component: ComponentId) -> bool {
        self.state
            .lock()
            .component
            .as_ref()
            .is_some_and(|mounted| mounted.id() == component)
    }

    pub fn last_focus(&self) -> SystemTime {
        self.state.lock().last_focus
    }

    pub fn focus(&self) {
        self.state.lock().last_focus = SystemTime::now();
    }

    /// Dismounts the component and runs the close callback, if any. Later
    /// calls do nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let dismounted = {
            let mut markup = self.markup.lock();
            let component = self.state.lock().component.take();
            component.filter(|component| markup.dismount(component))
        };
        if let Some(component) = dismounted {
            component.component().on_dismount();
        }

        log::debug!("page {} closed", self.id);
        let on_close = self.on_close.lock().take();
        if let Some(on_close) = on_close {
            on_close();
        }
    }

    fn load_component(&self, url: &Url) -> Result<()> {
        let name = route::component_name(url);
        let created = self.factory.new_component(&name);

        let (previous, mounted) = {
            let mut markup = self.markup.lock();
            let previous = self
                .state
                .lock()
                .component
                .take()
                .filter(|previous| markup.dismount(previous));
            let mounted = created.and_then(|component| {
                markup.mount(&component)?;
                Ok(component)
            });
            if let Ok(component) = &mounted {
                self.state.lock().component = Some(component.clone());
            }
            (previous, mounted)
        };

        if let Some(previous) = previous {
            previous.component().on_dismount();
        }

        match mounted {
            Ok(component) => {
                log::debug!("page {} mounted {} ({url})", self.id, component.name());
                component.component().on_mount();
                Ok(())
            }
            Err(source) => Err(BridgeError::Mount {
                page: self.id,
                url: url.to_string(),
                source: Box::new(source),
            }),
        }
    }
}

impl Element for Page {
    fn id(&self) -> ElementId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "page"
    }

    fn contains(&self, component: ComponentId) -> bool {
        Page::contains(self, component)
    }

    fn render(&self, component: &ComponentHandle) -> Result<()> {
        Page::render(self, component)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::markup::TextMarkup;
    use crossbeam::channel;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    struct Screen(&'static str);

    impl Component for Screen {
        fn render(&self) -> String {
            format!("<main>{}</main>", self.0)
        }
    }

    struct Tracked(Arc<AtomicUsize>);

    impl Component for Tracked {
        fn render(&self) -> String {
            String::from("<div/>")
        }

        fn on_dismount(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Walks the element directory from its hooks.
    struct Lookup {
        directory: Weak<ElementDirectory>,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Lookup {
        fn record(&self, hook: &'static str) {
            if let Some(directory) = self.directory.upgrade() {
                let _ = directory.element_by_component(ComponentId::new());
                self.seen.lock().push(hook);
            }
        }
    }

    impl Component for Lookup {
        fn render(&self) -> String {
            String::from("<nav/>")
        }

        fn on_mount(&self) {
            self.record("mount");
        }

        fn on_dismount(&self) {
            self.record("dismount");
        }
    }

    fn factory() -> Arc<Factory> {
        let factory = Factory::new();
        factory.register("home", || Screen("home"));
        factory.register("settings", || Screen("settings"));
        Arc::new(factory)
    }

    fn page() -> Page {
        Page::new(factory(), Box::new(TextMarkup::new()), 100)
    }

    fn mounted_name(page: &Page) -> Option<String> {
        page.component().map(|component| component.name().to_string())
    }

    #[test]
    fn navigates_home_settings_and_back() {
        let page = page();

        page.load("app://home").expect("home");
        page.load("app://settings").expect("settings");
        assert_eq!(mounted_name(&page).as_deref(), Some("settings"));
        assert_eq!(page.referer().expect("referer").as_str(), "app://home");

        page.previous().expect("back");
        assert_eq!(mounted_name(&page).as_deref(), Some("home"));
        assert!(page.can_next());
        assert!(!page.can_previous());

        page.next().expect("forward");
        assert_eq!(mounted_name(&page).as_deref(), Some("settings"));
        assert!(!page.can_next());
    }

    #[test]
    fn loading_current_location_does_not_grow_history() {
        let page = page();
        page.load("app://home").expect("home");
        page.load("app://home").expect("home again");

        assert!(!page.can_previous());
        assert_eq!(page.url().expect("url").as_str(), "app://home");
    }

    #[test]
    fn reload_mounts_equivalent_component() {
        let page = page();
        page.load("app://settings").expect("settings");
        let before = page.component().expect("mounted");

        page.reload().expect("reload");
        let after = page.component().expect("mounted");
        assert_eq!(before.name(), after.name());
        assert_ne!(before.id(), after.id());
        assert!(!page.contains(before.id()));
        assert!(page.contains(after.id()));
        assert!(!page.can_previous());
    }

    #[test]
    fn reload_on_empty_page_is_not_found() {
        let page = page();
        assert!(page.reload().expect_err("nothing loaded").is_not_found());
        assert!(page.url().expect_err("nothing loaded").is_not_found());
        assert!(page.referer().is_none());
    }

    #[test]
    fn relative_locations_resolve_against_app_scheme() {
        let page = page();
        page.load("settings").expect("relative");
        assert_eq!(mounted_name(&page).as_deref(), Some("settings"));
        assert_eq!(page.url().expect("url").scheme(), "app");
    }

    #[test]
    fn failed_load_leaves_page_empty_and_wraps_error() {
        let page = page();
        page.load("app://home").expect("home");

        let err = page.load("app://missing").expect_err("unknown component");
        match err {
            BridgeError::Mount { page: id, url, source } => {
                assert_eq!(id, page.id());
                assert_eq!(url, "app://missing");
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(page.component().is_none());
        assert!(page.can_previous());
    }

    #[test]
    fn failed_step_keeps_mounted_component() {
        let page = page();
        page.load("app://home").expect("home");
        let mounted = page.component().expect("mounted");

        assert!(page.previous().expect_err("no previous").is_not_found());
        assert!(page.next().expect_err("no next").is_not_found());
        assert_eq!(page.component().expect("still mounted").id(), mounted.id());
    }

    #[test]
    fn navigation_dismounts_previous_component() {
        let dismounts = Arc::new(AtomicUsize::new(0));
        let factory = Factory::new();
        {
            let dismounts = dismounts.clone();
            factory.register("tracked", move || Tracked(dismounts.clone()));
        }
        factory.register("home", || Screen("home"));
        let page = Page::new(Arc::new(factory), Box::new(TextMarkup::new()), 10);

        page.load("app://tracked").expect("tracked");
        page.load("app://home").expect("home");
        assert_eq!(dismounts.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn hooks_may_look_up_the_directory() {
        let directory = Arc::new(ElementDirectory::new());
        let seen: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let factory = Factory::new();
        {
            let directory = Arc::downgrade(&directory);
            let seen = seen.clone();
            factory.register("lookup", move || Lookup {
                directory: directory.clone(),
                seen: seen.clone(),
            });
        }
        factory.register("home", || Screen("home"));
        let factory = Arc::new(factory);

        let (done_tx, done_rx) = channel::bounded(1);
        let navigation = {
            let directory = directory.clone();
            thread::spawn(move || -> Result<()> {
                let page = Page::open(
                    &directory,
                    factory,
                    Box::new(TextMarkup::new()),
                    10,
                    &PageConfig::with_url("app://lookup"),
                )?;
                page.load("app://home")?;
                page.load("app://lookup")?;
                page.close();
                let _ = done_tx.send(());
                Ok(())
            })
        };

        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("navigation finished");
        navigation.join().expect("join").expect("navigation");
        assert_eq!(*seen.lock(), vec!["mount", "dismount", "mount", "dismount"]);
        assert!(directory.is_empty());
    }

    #[test]
    fn close_without_callback_still_dismounts() {
        let dismounts = Arc::new(AtomicUsize::new(0));
        let factory = Factory::new();
        {
            let dismounts = dismounts.clone();
            factory.register("tracked", move || Tracked(dismounts.clone()));
        }
        let page = Page::new(Arc::new(factory), Box::new(TextMarkup::new()), 10);
        page.load("app://tracked").expect("tracked");

        page.close();
        page.close();
        assert_eq!(dismounts.load(Ordering::Relaxed), 1);
        assert!(page.component().is_none());
    }

    #[test]
    fn render_requires_mounted_component() {
        let page = page();
        page.load("app://home").expect("home");
        let mounted = page.component().expect("mounted");
        page.render(&mounted).expect("render");

        let stranger = factory().new_component("settings").expect("settings");
        assert!(page.render(&stranger).expect_err("not mounted").is_not_found());
    }

    #[test]
    fn focus_moves_last_focus_forward() {
        let page = page();
        let opened = page.last_focus();
        page.focus();
        assert!(page.last_focus() >= opened);
    }

    #[test]
    fn open_registers_and_close_removes_once() {
        let directory = Arc::new(ElementDirectory::new());
        let page = Page::open(
            &directory,
            factory(),
            Box::new(TextMarkup::new()),
            100,
            &PageConfig::with_url("app://home"),
        )
        .expect("open");

        let component = page.component().expect("mounted").id();
        assert_eq!(
            directory.element_by_component(component).expect("hosted").id(),
            page.id()
        );

        page.close();
        page.close();
        assert!(directory.is_empty());
        assert!(page.component().is_none());
    }

    #[test]
    fn open_with_unknown_default_url_deregisters() {
        let directory = Arc::new(ElementDirectory::new());
        let err = Page::open(
            &directory,
            factory(),
            Box::new(TextMarkup::new()),
            100,
            &PageConfig::with_url("app://missing"),
        )
        .err()
        .expect("unknown component");

        assert_eq!(err.kind(), "mount_error");
        assert!(directory.is_empty());
    }
}
