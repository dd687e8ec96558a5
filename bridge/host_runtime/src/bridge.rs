//! App-side bridge: handler registry and the native-facing entry point.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam::channel;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::dispatch::{DispatchHandle, panic_message};
use crate::error::{BridgeError, Result};
use crate::payload::Payload;
use crate::route;

/// Application handler: `(origin url, payload) -> payload`.
pub type Handler = Arc<dyn Fn(&Url, Payload) -> Result<Payload> + Send + Sync + 'static>;

/// Completion callback invoked on the worker with the handler's result.
pub type ReplyFn = Box<dyn FnOnce(Result<Payload>) + Send + 'static>;

/// Error as reported across the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
}

impl From<&BridgeError> for WireError {
    fn from(err: &BridgeError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Raw response returned to the native caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Reply {
    pub fn ok(payload: Payload) -> Self {
        Self {
            payload,
            error: None,
        }
    }

    pub fn err(err: &BridgeError) -> Self {
        Self {
            payload: Payload::empty(),
            error: Some(WireError::from(err)),
        }
    }

    pub fn from_result(result: &Result<Payload>) -> Self {
        match result {
            Ok(payload) => Self::ok(payload.clone()),
            Err(err) => Self::err(err),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match serde_json::to_vec(self) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("failed to encode bridge reply: {err}");
                br#"{"payload":null,"error":{"kind":"encode_error","message":"reply encoding failed"}}"#
                    .to_vec()
            }
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(BridgeError::decode::<Self>)
    }
}

/// Path → handler table. Registrations are process-lifetime.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `path`. Registering a path twice is a
    /// configuration error.
    pub fn handle<F>(&self, path: &str, handler: F) -> Result<()>
    where
        F: Fn(&Url, Payload) -> Result<Payload> + Send + Sync + 'static,
    {
        route::parse_origin(path)?;
        let key = route::route_key(path).to_string();

        let mut handlers = self.handlers.write();
        if handlers.contains_key(&key) {
            return Err(BridgeError::DuplicateHandler { path: key });
        }

        log::debug!("registered handler {key}");
        handlers.insert(key, Arc::new(handler));
        Ok(())
    }

    pub fn lookup(&self, path: &str) -> Result<Handler> {
        let key = route::route_key(path);
        self.handlers
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BridgeError::HandlerNotFound {
                path: key.to_string(),
            })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.handlers.read().contains_key(route::route_key(path))
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

/// Native-facing entry point. Every accepted request runs on the dispatch
/// worker, never on the calling thread.
#[derive(Clone)]
pub struct AppBridge {
    registry: Arc<HandlerRegistry>,
    queue: DispatchHandle,
}

impl AppBridge {
    pub fn new(registry: Arc<HandlerRegistry>, queue: DispatchHandle) -> Self {
        Self { registry, queue }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &DispatchHandle {
        &self.queue
    }

    pub fn handle<F>(&self, path: &str, handler: F) -> Result<()>
    where
        F: Fn(&Url, Payload) -> Result<Payload> + Send + Sync + 'static,
    {
        self.registry.handle(path, handler)
    }

    /// Enqueues the request and returns an empty reply at once. Lookup and
    /// decode failures are returned as error replies.
    pub fn dispatch(&self, path: &str, raw_payload: &[u8]) -> Vec<u8> {
        let accepted = Payload::from_slice(raw_payload)
            .and_then(|payload| self.submit(path, payload, None));

        match accepted {
            Ok(()) => Reply::ok(Payload::empty()).encode(),
            Err(err) => {
                log::warn!("rejected native request {path}: {err}");
                Reply::err(&err).encode()
            }
        }
    }

    /// Enqueues the request and blocks until the worker has run the handler.
    pub fn dispatch_sync(&self, path: &str, raw_payload: &[u8]) -> Vec<u8> {
        let result = Payload::from_slice(raw_payload).and_then(|payload| self.call(path, payload));
        if let Err(err) = &result {
            log::warn!("native request {path} failed: {err}");
        }
        Reply::from_result(&result).encode()
    }

    /// Typed form of [`AppBridge::dispatch_sync`].
    pub fn call(&self, path: &str, payload: Payload) -> Result<Payload> {
        if self.queue.is_worker_thread() {
            return Err(BridgeError::WouldDeadlock {
                path: path.to_string(),
            });
        }

        let (reply_tx, reply_rx) = channel::bounded(1);
        self.submit(
            path,
            payload,
            Some(Box::new(move |result| {
                let _ = reply_tx.send(result);
            })),
        )?;
        self.queue.wait(&reply_rx)?
    }

    /// Resolves the handler and enqueues it. `on_reply` runs on the worker
    /// with the handler's result.
    pub fn submit(&self, path: &str, payload: Payload, on_reply: Option<ReplyFn>) -> Result<()> {
        let origin = route::parse_origin(path)?;
        let handler = self.registry.lookup(path)?;
        let label = route::origin_route(&origin).to_string();

        self.queue.enqueue(label.clone(), move || {
            let result = invoke(&label, &handler, &origin, payload);
            let fatal = match &result {
                Err(BridgeError::Fatal(message)) => Some(BridgeError::Fatal(message.clone())),
                _ => None,
            };

            if let Err(err) = &result {
                log::warn!("handler {label} failed: {err}");
            }
            if let Some(on_reply) = on_reply {
                on_reply(result);
            }

            match fatal {
                Some(fatal) => Err(fatal),
                None => Ok(()),
            }
        })
    }
}

fn invoke(label: &str, handler: &Handler, origin: &Url, payload: Payload) -> Result<Payload> {
    panic::catch_unwind(AssertUnwindSafe(|| handler(origin, payload))).unwrap_or_else(|panic| {
        Err(BridgeError::HandlerFailure {
            path: label.to_string(),
            message: panic_message(panic.as_ref()),
        })
    })
}
