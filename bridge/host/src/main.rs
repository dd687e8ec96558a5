mod demo;

use app_bridge_runtime::{BridgeConfig, DriverHooks, PageConfig, run_stdio};
use std::process;

const HOME_URL: &str = "app://home";

fn main() {
    let _ = env_logger::try_init();

    if let Err(err) = run() {
        log::error!("app_bridge_host fatal error: {err}");
        process::exit(1);
    }
}

fn run() -> app_bridge_runtime::Result<()> {
    let config = BridgeConfig::from_env();
    log::info!(
        "starting bridge host (queue cap={}, history limit={})",
        config.dispatch_queue_cap,
        config.history_limit
    );

    let demo = demo::Demo::new();
    let factory = demo.factory();
    let hooks = DriverHooks::new()
        .on_run(move |driver| {
            demo.register_handlers(driver)?;
            let page = driver.new_page(&PageConfig::with_url(HOME_URL))?;
            log::info!("opened page {} at {HOME_URL}", page.id());
            Ok(())
        })
        .on_reopen(|driver, has_visible_windows| {
            if has_visible_windows {
                return;
            }
            if let Err(err) = driver.new_page(&PageConfig::with_url(HOME_URL)) {
                log::warn!("reopening home page failed: {err}");
            }
        })
        .on_url_open(|_, url| log::info!("asked to open {url}"))
        .on_exit(|driver| {
            log::info!("exiting with {} open elements", driver.elements().len());
        });

    run_stdio(config, factory, hooks)
}
