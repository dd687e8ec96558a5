//! Application driver: wires the bridge, the dispatch worker, the platform
//! client and the element directory into one context.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::bridge::{AppBridge, HandlerRegistry};
use crate::component::{ComponentHandle, Factory};
use crate::config::BridgeConfig;
use crate::dispatch::{DispatchQueue, panic_message};
use crate::elements::{Element, ElementDirectory, ElementId};
use crate::error::{BridgeError, Result};
use crate::markup::{Markup, TextMarkup};
use crate::page::{Page, PageConfig};
use crate::payload::Payload;
use crate::platform::{PlatformClient, Transport};
use crate::route;

/// Builds the markup engine for each new page.
pub type MarkupConstructor = Arc<dyn Fn() -> Box<dyn Markup> + Send + Sync + 'static>;

type RunHook = Box<dyn Fn(&Driver) -> Result<()> + Send + Sync + 'static>;
type Hook = Box<dyn Fn(&Driver) + Send + Sync + 'static>;
type ReopenHook = Box<dyn Fn(&Driver, bool) + Send + Sync + 'static>;
type FilesHook = Box<dyn Fn(&Driver, Vec<String>) + Send + Sync + 'static>;
type UrlHook = Box<dyn Fn(&Driver, Url) + Send + Sync + 'static>;
type QuitHook = Box<dyn Fn(&Driver) -> bool + Send + Sync + 'static>;

/// Application lifecycle callbacks. All of them run on the dispatch worker.
#[derive(Default)]
pub struct DriverHooks {
    on_run: Option<RunHook>,
    on_focus: Option<Hook>,
    on_blur: Option<Hook>,
    on_reopen: Option<ReopenHook>,
    on_files_open: Option<FilesHook>,
    on_url_open: Option<UrlHook>,
    on_quit: Option<QuitHook>,
    on_exit: Option<Hook>,
}

impl DriverHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the native side reports it is running. A
    /// [`BridgeError::Fatal`] result or a panic stops the driver.
    pub fn on_run(mut self, f: impl Fn(&Driver) -> Result<()> + Send + Sync + 'static) -> Self {
        self.on_run = Some(Box::new(f));
        self
    }

    pub fn on_focus(mut self, f: impl Fn(&Driver) + Send + Sync + 'static) -> Self {
        self.on_focus = Some(Box::new(f));
        self
    }

    pub fn on_blur(mut self, f: impl Fn(&Driver) + Send + Sync + 'static) -> Self {
        self.on_blur = Some(Box::new(f));
        self
    }

    /// Receives whether the app still has visible windows.
    pub fn on_reopen(mut self, f: impl Fn(&Driver, bool) + Send + Sync + 'static) -> Self {
        self.on_reopen = Some(Box::new(f));
        self
    }

    pub fn on_files_open(
        mut self,
        f: impl Fn(&Driver, Vec<String>) + Send + Sync + 'static,
    ) -> Self {
        self.on_files_open = Some(Box::new(f));
        self
    }

    pub fn on_url_open(mut self, f: impl Fn(&Driver, Url) + Send + Sync + 'static) -> Self {
        self.on_url_open = Some(Box::new(f));
        self
    }

    /// Decides whether a quit request goes through. Quitting is allowed when
    /// unset.
    pub fn on_quit(mut self, f: impl Fn(&Driver) -> bool + Send + Sync + 'static) -> Self {
        self.on_quit = Some(Box::new(f));
        self
    }

    pub fn on_exit(mut self, f: impl Fn(&Driver) + Send + Sync + 'static) -> Self {
        self.on_exit = Some(Box::new(f));
        self
    }
}

/// Value handed to the native share sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: ShareKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareKind {
    Url,
    String,
}

impl From<Url> for Share {
    fn from(url: Url) -> Self {
        Self {
            value: url.to_string(),
            kind: ShareKind::Url,
        }
    }
}

impl From<&str> for Share {
    fn from(text: &str) -> Self {
        Self {
            value: text.to_string(),
            kind: ShareKind::String,
        }
    }
}

impl From<String> for Share {
    fn from(text: String) -> Self {
        Self {
            value: text,
            kind: ShareKind::String,
        }
    }
}

struct DriverInner {
    config: BridgeConfig,
    bridge: AppBridge,
    queue: Mutex<Option<DispatchQueue>>,
    elements: Arc<ElementDirectory>,
    platform: Arc<PlatformClient>,
    factory: Arc<Factory>,
    markup: MarkupConstructor,
    hooks: DriverHooks,
    dropped_files: Mutex<Vec<String>>,
}

/// Cloneable driver context. Every clone talks to the same worker, bridge and
/// element directory.
#[derive(Clone)]
pub struct Driver {
    inner: Arc<DriverInner>,
}

impl Driver {
    /// Driver whose pages render through [`TextMarkup`].
    pub fn new(
        config: BridgeConfig,
        factory: Arc<Factory>,
        transport: Arc<dyn Transport>,
        hooks: DriverHooks,
    ) -> Self {
        let markup: MarkupConstructor =
            Arc::new(|| -> Box<dyn Markup> { Box::new(TextMarkup::new()) });
        Self::with_markup(config, factory, transport, hooks, markup)
    }

    pub fn with_markup(
        config: BridgeConfig,
        factory: Arc<Factory>,
        transport: Arc<dyn Transport>,
        hooks: DriverHooks,
        markup: MarkupConstructor,
    ) -> Self {
        let queue = DispatchQueue::new(config.dispatch_queue_cap);
        let bridge = AppBridge::new(Arc::new(HandlerRegistry::new()), queue.handle());
        let platform = Arc::new(PlatformClient::new(transport, config.request_timeout));

        Self {
            inner: Arc::new(DriverInner {
                config,
                bridge,
                queue: Mutex::new(Some(queue)),
                elements: Arc::new(ElementDirectory::new()),
                platform,
                factory,
                markup,
                hooks,
                dropped_files: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers the driver handlers, tells the native side to start and
    /// runs the dispatch worker on the calling thread until the driver is
    /// cancelled or a fatal error stops it.
    pub fn run(&self) -> Result<()> {
        let queue = self
            .inner
            .queue
            .lock()
            .take()
            .ok_or(BridgeError::AlreadyRunning)?;

        self.register_handlers()?;
        log::info!("driver running ({} handlers)", self.inner.bridge.registry().len());

        let platform = self.inner.platform.clone();
        let handle = self.inner.bridge.queue().clone();
        let starter = thread::Builder::new()
            .name("driver-run".to_string())
            .spawn(move || {
                // The native side may hold this reply until it stops.
                let result = platform.request_until_reply("/driver/run", Payload::empty());
                if let Err(err) = &result {
                    if !matches!(err, BridgeError::Shutdown) {
                        log::error!("native run request failed: {err}");
                        handle.cancel();
                    }
                }
                result
            })?;

        let worker = queue.run();
        self.inner.platform.shutdown();

        let started = starter.join().map_err(|panic| {
            BridgeError::Fatal(format!(
                "native run request panicked: {}",
                panic_message(panic.as_ref())
            ))
        })?;

        worker?;
        match started {
            Ok(_) | Err(BridgeError::Shutdown) => {
                log::info!("driver stopped");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Stops the run loop after the entry being processed.
    pub fn cancel(&self) {
        self.inner.bridge.queue().cancel();
    }

    /// Opens a page and registers it in the element directory.
    pub fn new_page(&self, config: &PageConfig) -> Result<Arc<Page>> {
        Page::open(
            &self.inner.elements,
            self.inner.factory.clone(),
            (self.inner.markup)(),
            self.inner.config.history_limit,
            config,
        )
    }

    /// Re-renders `component` in the element hosting it.
    pub fn render(&self, component: &ComponentHandle) -> Result<()> {
        self.inner
            .elements
            .element_by_component(component.id())?
            .render(component)
    }

    pub fn element_by_component(&self, component: &ComponentHandle) -> Result<Arc<dyn Element>> {
        self.inner.elements.element_by_component(component.id())
    }

    pub fn page(&self, id: ElementId) -> Result<Arc<Page>> {
        self.inner.elements.typed::<Page>(id)
    }

    /// Runs `f` on the dispatch worker, after every entry already queued.
    pub fn call_on_worker<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.bridge.queue().enqueue("call_on_worker", move || {
            f();
            Ok(())
        })
    }

    /// Application name reported by the native side, or the name of the
    /// working directory when it has none.
    pub fn app_name(&self) -> Result<String> {
        let reply = self
            .inner
            .platform
            .request("/driver/appname", Payload::empty())?;
        let name: Option<String> = reply.decode()?;

        match name {
            Some(name) if !name.is_empty() && name != "(null)" => Ok(name),
            _ => {
                let cwd = std::env::current_dir()?;
                Ok(cwd
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default())
            }
        }
    }

    /// Opens the native share sheet and waits until it is dismissed.
    pub fn share(&self, value: impl Into<Share>) -> Result<()> {
        let payload = Payload::new(&value.into())?;
        self.inner
            .platform
            .request_with_async_response("/driver/share", payload)?;
        Ok(())
    }

    /// Asks the native side to quit the app.
    pub fn close(&self) -> Result<()> {
        self.inner
            .platform
            .request("/driver/quit", Payload::empty())
            .map(|_| ())
    }

    /// Files most recently dropped onto the app.
    pub fn dropped_files(&self) -> Vec<String> {
        self.inner.dropped_files.lock().clone()
    }

    pub fn bridge(&self) -> &AppBridge {
        &self.inner.bridge
    }

    pub fn platform(&self) -> &Arc<PlatformClient> {
        &self.inner.platform
    }

    pub fn elements(&self) -> &Arc<ElementDirectory> {
        &self.inner.elements
    }

    pub fn factory(&self) -> &Arc<Factory> {
        &self.inner.factory
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    fn register_handlers(&self) -> Result<()> {
        self.driver_handler("/driver/run", |driver, _, _| {
            driver.run_hook()?;
            Ok(Payload::empty())
        })?;
        self.driver_handler("/driver/focus", |driver, _, _| {
            if let Some(hook) = &driver.inner.hooks.on_focus {
                hook(driver);
            }
            Ok(Payload::empty())
        })?;
        self.driver_handler("/driver/blur", |driver, _, _| {
            if let Some(hook) = &driver.inner.hooks.on_blur {
                hook(driver);
            }
            Ok(Payload::empty())
        })?;
        self.driver_handler("/driver/reopen", |driver, _, payload| {
            if let Some(hook) = &driver.inner.hooks.on_reopen {
                let has_visible_windows = payload.decode::<Option<bool>>()?.unwrap_or_default();
                hook(driver, has_visible_windows);
            }
            Ok(Payload::empty())
        })?;
        self.driver_handler("/driver/filesopen", |driver, _, payload| {
            if let Some(hook) = &driver.inner.hooks.on_files_open {
                let files = payload.decode::<Option<Vec<String>>>()?.unwrap_or_default();
                hook(driver, files);
            }
            Ok(Payload::empty())
        })?;
        self.driver_handler("/driver/urlopen", |driver, _, payload| {
            if let Some(hook) = &driver.inner.hooks.on_url_open {
                let raw: String = payload.decode()?;
                let url = Url::parse(&raw).map_err(|source| BridgeError::InvalidUrl {
                    url: raw.clone(),
                    source,
                })?;
                hook(driver, url);
            }
            Ok(Payload::empty())
        })?;
        self.driver_handler("/driver/filedrop", |driver, _, payload| {
            let files = payload.decode::<Option<Vec<String>>>()?.unwrap_or_default();
            log::debug!("{} files dropped", files.len());
            *driver.inner.dropped_files.lock() = files;
            Ok(Payload::empty())
        })?;
        self.driver_handler("/driver/quit", |driver, _, _| {
            let quit = driver
                .inner
                .hooks
                .on_quit
                .as_ref()
                .is_none_or(|hook| hook(driver));
            Payload::new(&quit)
        })?;
        self.driver_handler("/driver/exit", |driver, _, _| {
            if let Some(hook) = &driver.inner.hooks.on_exit {
                hook(driver);
            }
            driver.cancel();
            Ok(Payload::empty())
        })?;

        self.page_handler("/page/load", |page, payload| {
            let url: String = payload.decode()?;
            page.load(&url)
        })?;
        self.page_handler("/page/reload", |page, _| page.reload())?;
        self.page_handler("/page/previous", |page, _| page.previous())?;
        self.page_handler("/page/next", |page, _| page.next())?;
        self.page_handler("/page/focus", |page, _| {
            page.focus();
            Ok(())
        })?;
        self.page_handler("/page/close", |page, _| {
            page.close();
            Ok(())
        })?;
        Ok(())
    }

    fn run_hook(&self) -> Result<()> {
        let Some(hook) = &self.inner.hooks.on_run else {
            return Ok(());
        };

        match panic::catch_unwind(AssertUnwindSafe(|| hook(self))) {
            Ok(result) => result,
            Err(panic) => Err(BridgeError::Fatal(format!(
                "run hook panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    fn driver_handler<F>(&self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&Driver, &Url, Payload) -> Result<Payload> + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        self.inner.bridge.handle(path, move |origin, payload| {
            let inner = weak.upgrade().ok_or(BridgeError::Shutdown)?;
            f(&Driver { inner }, origin, payload)
        })
    }

    /// Handler acting on the page named by the `id` query parameter.
    fn page_handler<F>(&self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&Page, Payload) -> Result<()> + Send + Sync + 'static,
    {
        self.driver_handler(path, move |driver, origin, payload| {
            let id = route::query_param(origin, "id")
                .ok_or_else(|| BridgeError::not_found(format!("page id in {origin}")))?;
            let page = driver.page(id.parse()?)?;
            f(&page, payload)?;
            Ok(Payload::empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Reply;
    use crate::component::Component;
    use crate::platform::RequestId;
    use serde_json::json;
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeNative {
        requests: Mutex<Vec<String>>,
        posted: Mutex<Vec<Payload>>,
        app_name: Mutex<Option<String>>,
        client: OnceLock<Weak<PlatformClient>>,
        hold_run: bool,
    }

    impl Transport for FakeNative {
        fn call(&self, path: &str, _payload: &Payload) -> Result<Payload> {
            self.requests.lock().push(path.to_string());
            match path {
                "/driver/appname" => Payload::new(&*self.app_name.lock()),
                "/driver/quit" => Payload::new(&true),
                _ => Ok(Payload::empty()),
            }
        }

        fn post(&self, id: RequestId, path: &str, payload: &Payload) -> Result<()> {
            self.requests.lock().push(path.to_string());
            self.posted.lock().push(payload.clone());
            if self.hold_run && path == "/driver/run" {
                return Ok(());
            }
            let client = self
                .client
                .get()
                .and_then(Weak::upgrade)
                .ok_or(BridgeError::Shutdown)?;
            client.deliver(id, Ok(Payload::empty()))
        }
    }

    struct Screen(&'static str);

    impl Component for Screen {
        fn render(&self) -> String {
            format!("<main>{}</main>", self.0)
        }
    }

    fn new_driver(hooks: DriverHooks) -> (Driver, Arc<FakeNative>) {
        let factory = Factory::new();
        factory.register("home", || Screen("home"));
        factory.register("settings", || Screen("settings"));

        let native = Arc::new(FakeNative::default());
        let driver = Driver::new(
            BridgeConfig::default(),
            Arc::new(factory),
            native.clone(),
            hooks,
        );
        let _ = native.client.set(Arc::downgrade(driver.platform()));
        (driver, native)
    }

    fn start(hooks: DriverHooks) -> (Driver, Arc<FakeNative>, thread::JoinHandle<Result<()>>) {
        let (driver, native) = new_driver(hooks);
        let runner = {
            let driver = driver.clone();
            thread::spawn(move || driver.run())
        };
        driver
            .bridge()
            .queue()
            .call("started", || Ok(()))
            .expect("worker running");
        (driver, native, runner)
    }

    fn exit(driver: &Driver, runner: thread::JoinHandle<Result<()>>) -> Result<()> {
        driver
            .bridge()
            .call("/driver/exit", Payload::empty())
            .expect("exit");
        runner.join().expect("join")
    }

    fn mounted_name(page: &Page) -> Option<String> {
        page.component().map(|component| component.name().to_string())
    }

    #[test]
    fn held_run_reply_outlives_request_timeout() {
        let native = Arc::new(FakeNative {
            hold_run: true,
            ..FakeNative::default()
        });
        let config = BridgeConfig {
            request_timeout: Some(Duration::from_millis(20)),
            ..BridgeConfig::default()
        };
        let driver = Driver::new(
            config,
            Arc::new(Factory::new()),
            native.clone(),
            DriverHooks::new(),
        );
        let _ = native.client.set(Arc::downgrade(driver.platform()));
        let runner = {
            let driver = driver.clone();
            thread::spawn(move || driver.run())
        };
        driver
            .bridge()
            .queue()
            .call("started", || Ok(()))
            .expect("worker running");

        thread::sleep(Duration::from_millis(100));
        driver
            .bridge()
            .queue()
            .call("still running", || Ok(()))
            .expect("worker alive after timeout");
        assert_eq!(driver.platform().pending_count(), 1);

        exit(&driver, runner).expect("clean exit");
    }

    #[test]
    fn run_twice_is_rejected() {
        let (driver, native, runner) = start(DriverHooks::new());

        assert!(matches!(driver.run(), Err(BridgeError::AlreadyRunning)));
        exit(&driver, runner).expect("clean exit");
        assert!(native.requests.lock().contains(&"/driver/run".to_string()));
    }

    #[test]
    fn page_handlers_navigate_by_id() {
        let (driver, _native, runner) = start(DriverHooks::new());
        let page = driver
            .new_page(&PageConfig::with_url("app://home"))
            .expect("page");
        let id = page.id();

        driver
            .bridge()
            .call(
                &format!("/page/load?id={id}"),
                Payload::new("app://settings").expect("payload"),
            )
            .expect("load");
        assert_eq!(mounted_name(&page).as_deref(), Some("settings"));

        driver
            .bridge()
            .call(&format!("/page/previous?id={id}"), Payload::empty())
            .expect("previous");
        assert_eq!(mounted_name(&page).as_deref(), Some("home"));

        driver
            .bridge()
            .call(&format!("/page/close?id={id}"), Payload::empty())
            .expect("close");
        assert!(driver.page(id).err().expect("closed").is_not_found());

        let reply = Reply::decode(
            &driver
                .bridge()
                .dispatch_sync(&format!("/page/reload?id={id}"), b"null"),
        )
        .expect("reply");
        assert_eq!(reply.error.expect("closed page").kind, "not_found");

        exit(&driver, runner).expect("clean exit");
    }

    #[test]
    fn page_handler_without_id_is_not_found() {
        let (driver, _native, runner) = start(DriverHooks::new());

        let err = driver
            .bridge()
            .call("/page/reload", Payload::empty())
            .expect_err("no id");
        assert!(err.is_not_found());

        exit(&driver, runner).expect("clean exit");
    }

    #[test]
    fn quit_hook_decides_reply() {
        let (driver, _native, runner) = start(DriverHooks::new().on_quit(|_| false));

        let quit = driver
            .bridge()
            .call("/driver/quit", Payload::empty())
            .expect("quit");
        assert!(!quit.decode::<bool>().expect("bool"));

        exit(&driver, runner).expect("clean exit");
    }

    #[test]
    fn quit_defaults_to_true() {
        let (driver, _native, runner) = start(DriverHooks::new());

        let quit = driver
            .bridge()
            .call("/driver/quit", Payload::empty())
            .expect("quit");
        assert!(quit.decode::<bool>().expect("bool"));

        exit(&driver, runner).expect("clean exit");
    }

    #[test]
    fn lifecycle_hooks_receive_payloads() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let hooks = {
            let (reopen, files, urls, focus, exited) =
                (seen.clone(), seen.clone(), seen.clone(), seen.clone(), seen.clone());
            DriverHooks::new()
                .on_reopen(move |_, visible| reopen.lock().push(format!("reopen:{visible}")))
                .on_files_open(move |_, names| files.lock().push(format!("files:{}", names.join(","))))
                .on_url_open(move |_, url| urls.lock().push(format!("url:{url}")))
                .on_focus(move |_| focus.lock().push("focus".to_string()))
                .on_exit(move |_| exited.lock().push("exit".to_string()))
        };
        let (driver, _native, runner) = start(hooks);

        let bridge = driver.bridge();
        bridge
            .call("/driver/reopen", Payload::from(json!(true)))
            .expect("reopen");
        bridge
            .call("/driver/filesopen", Payload::from(json!(["a.txt", "b.txt"])))
            .expect("filesopen");
        bridge
            .call("/driver/urlopen", Payload::from(json!("myapp://open?doc=1")))
            .expect("urlopen");
        bridge.call("/driver/focus", Payload::empty()).expect("focus");

        let bad_url = bridge
            .call("/driver/urlopen", Payload::from(json!("not a url")))
            .expect_err("invalid url");
        assert_eq!(bad_url.kind(), "invalid_url");

        exit(&driver, runner).expect("clean exit");
        assert_eq!(
            *seen.lock(),
            vec![
                "reopen:true".to_string(),
                "files:a.txt,b.txt".to_string(),
                "url:myapp://open?doc=1".to_string(),
                "focus".to_string(),
                "exit".to_string(),
            ]
        );
    }

    #[test]
    fn dropped_files_are_stored() {
        let (driver, _native, runner) = start(DriverHooks::new());

        driver
            .bridge()
            .call("/driver/filedrop", Payload::from(json!(["/tmp/a.png"])))
            .expect("filedrop");
        assert_eq!(driver.dropped_files(), vec!["/tmp/a.png".to_string()]);

        exit(&driver, runner).expect("clean exit");
    }

    #[test]
    fn fatal_run_hook_stops_driver() {
        let hooks =
            DriverHooks::new().on_run(|_| Err(BridgeError::Fatal("menu bar unavailable".to_string())));
        let (driver, _native, runner) = start(hooks);

        let ack = Reply::decode(&driver.bridge().dispatch("/driver/run", b"null")).expect("ack");
        assert_eq!(ack.error, None);

        let err = runner.join().expect("join").expect_err("fatal");
        match err {
            BridgeError::Fatal(message) => assert!(message.contains("menu bar unavailable")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!driver.platform().is_open());
    }

    #[test]
    fn panicking_run_hook_is_fatal() {
        let hooks = DriverHooks::new().on_run(|_| panic!("dock tile failed"));
        let (driver, _native, runner) = start(hooks);

        driver.bridge().dispatch("/driver/run", b"null");
        let err = runner.join().expect("join").expect_err("fatal");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("dock tile failed"));
    }

    #[test]
    fn run_hook_can_open_pages() {
        let hooks = DriverHooks::new().on_run(|driver| {
            driver.new_page(&PageConfig::with_url("app://home"))?;
            Ok(())
        });
        let (driver, _native, runner) = start(hooks);

        driver
            .bridge()
            .call("/driver/run", Payload::empty())
            .expect("run hook");
        assert_eq!(driver.elements().len(), 1);

        exit(&driver, runner).expect("clean exit");
    }

    #[test]
    fn render_routes_to_hosting_page() {
        let (driver, _native) = new_driver(DriverHooks::new());
        let page = driver
            .new_page(&PageConfig::with_url("app://home"))
            .expect("page");
        let mounted = page.component().expect("mounted");

        driver.render(&mounted).expect("render");
        assert_eq!(
            driver.element_by_component(&mounted).expect("host").id(),
            page.id()
        );

        let stranger = driver.factory().new_component("settings").expect("settings");
        assert!(driver.render(&stranger).expect_err("not hosted").is_not_found());
    }

    #[test]
    fn app_name_falls_back_to_working_directory() {
        let (driver, native) = new_driver(DriverHooks::new());

        *native.app_name.lock() = Some("Notes".to_string());
        assert_eq!(driver.app_name().expect("name"), "Notes");

        let cwd = std::env::current_dir().expect("cwd");
        let fallback = cwd
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        *native.app_name.lock() = Some("(null)".to_string());
        assert_eq!(driver.app_name().expect("name"), fallback);

        *native.app_name.lock() = None;
        assert_eq!(driver.app_name().expect("name"), fallback);
    }

    #[test]
    fn share_posts_typed_value() {
        let (driver, native) = new_driver(DriverHooks::new());

        let url = Url::parse("https://example.com/doc").expect("url");
        driver.share(url).expect("share url");
        driver.share("hello").expect("share text");

        let posted = native.posted.lock().clone();
        assert_eq!(
            posted,
            vec![
                Payload::from(json!({"value": "https://example.com/doc", "type": "url"})),
                Payload::from(json!({"value": "hello", "type": "string"})),
            ]
        );
        assert_eq!(driver.platform().pending_count(), 0);
    }

    #[test]
    fn close_asks_native_to_quit() {
        let (driver, native) = new_driver(DriverHooks::new());
        driver.close().expect("close");
        assert_eq!(*native.requests.lock(), vec!["/driver/quit".to_string()]);
    }

    #[test]
    fn call_on_worker_runs_in_order() {
        let (driver, _native, runner) = start(DriverHooks::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for step in 0..5 {
            let order = order.clone();
            driver
                .call_on_worker(move || order.lock().push(step))
                .expect("enqueue");
        }
        driver
            .bridge()
            .queue()
            .call("barrier", || Ok(()))
            .expect("barrier");
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);

        exit(&driver, runner).expect("clean exit");
    }

    #[test]
    fn requests_fail_after_run_returns() {
        let (driver, _native, runner) = start(DriverHooks::new());
        exit(&driver, runner).expect("clean exit");

        assert!(matches!(driver.app_name(), Err(BridgeError::Shutdown)));
        assert!(matches!(
            driver.call_on_worker(|| {}),
            Err(BridgeError::Shutdown)
        ));
    }
}
