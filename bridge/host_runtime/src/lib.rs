//! Bridge runtime between a native UI host and application logic.
//!
//! Native events arrive through [`AppBridge`], run one at a time on the
//! dispatch worker, and may call back into the native side through
//! [`PlatformClient`]. Pages keep per-page history and the mounted component.

pub mod bridge;
pub mod component;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod elements;
pub mod error;
pub mod history;
pub mod markup;
pub mod page;
pub mod payload;
pub mod platform;
pub mod protocol;
pub mod route;
pub mod stdio;

pub use crate::bridge::{AppBridge, Handler, HandlerRegistry, Reply, ReplyFn, WireError};
pub use crate::component::{Component, ComponentHandle, ComponentId, Factory};
pub use crate::config::BridgeConfig;
pub use crate::dispatch::{DispatchHandle, DispatchQueue, FatalReport};
pub use crate::driver::{Driver, DriverHooks, MarkupConstructor, Share, ShareKind};
pub use crate::elements::{Element, ElementDirectory, ElementId};
pub use crate::error::{BridgeError, Result};
pub use crate::history::History;
pub use crate::markup::{Markup, TextMarkup};
pub use crate::page::{Page, PageConfig};
pub use crate::payload::Payload;
pub use crate::platform::{PlatformClient, RequestId, Transport};
pub use crate::protocol::{APP_TO_NATIVE_CAP, Envelope, NATIVE_TO_APP_CAP};
pub use crate::stdio::{StdioTransport, run_stdio, run_stream};
pub use serde_json;
pub use url::Url;
