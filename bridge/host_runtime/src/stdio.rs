//! Reference transport: framed envelopes over a byte stream pair, usually the
//! process's stdin and stdout.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::bridge::ReplyFn;
use crate::component::Factory;
use crate::config::BridgeConfig;
use crate::driver::{Driver, DriverHooks};
use crate::error::{BridgeError, Result};
use crate::payload::Payload;
use crate::platform::{PlatformClient, RequestId, Transport};
use crate::protocol::{
    Envelope, reader_loop, request_envelope, response_envelope, response_result, writer_loop,
};

/// How long teardown waits for the writer to drain queued envelopes.
const WRITER_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Transport that queues outbound envelopes for a writer thread.
pub struct StdioTransport {
    tx: Mutex<Option<Sender<Envelope>>>,
    client: OnceLock<Weak<PlatformClient>>,
    dropped: AtomicU64,
    capacity: usize,
}

impl StdioTransport {
    pub fn new(capacity: usize) -> (Self, Receiver<Envelope>) {
        let capacity = capacity.max(1);
        let (tx, rx) = channel::bounded(capacity);
        let transport = Self {
            tx: Mutex::new(Some(tx)),
            client: OnceLock::new(),
            dropped: AtomicU64::new(0),
            capacity,
        };
        (transport, rx)
    }

    /// Client that owns this transport. Synchronous calls are correlated
    /// through it.
    pub fn attach(&self, client: &Arc<PlatformClient>) {
        if self.client.set(Arc::downgrade(client)).is_err() {
            log::warn!("stdio transport already attached; ignoring");
        }
    }

    /// Queues a response to a native request.
    pub fn respond(&self, id: RequestId, result: &Result<Payload>) {
        if let Err(err) = self.send(response_envelope(id, result)) {
            log::warn!("failed to queue response #{id}: {err}");
        }
    }

    /// Stops accepting envelopes. The writer drains what is queued and exits.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return Err(BridgeError::TransportTerminal(
                "outbound stream closed".to_string(),
            ));
        };

        match tx.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_envelope)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped.is_power_of_two() {
                    log::warn!(
                        "outbound queue full (cap={}); dropped {dropped} envelopes",
                        self.capacity
                    );
                }
                Err(BridgeError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_envelope)) => Err(BridgeError::TransportTerminal(
                "writer thread stopped".to_string(),
            )),
        }
    }
}

impl Transport for StdioTransport {
    fn call(&self, path: &str, payload: &Payload) -> Result<Payload> {
        let client = self
            .client
            .get()
            .and_then(Weak::upgrade)
            .ok_or(BridgeError::Shutdown)?;
        client.request_with_async_response(path, payload.clone())
    }

    fn post(&self, id: RequestId, path: &str, payload: &Payload) -> Result<()> {
        self.send(request_envelope(Some(id), path, payload.clone()))
    }
}

/// Runs a driver over the process's stdin and stdout.
pub fn run_stdio(config: BridgeConfig, factory: Arc<Factory>, hooks: DriverHooks) -> Result<()> {
    run_stream(config, factory, hooks, io::stdin(), io::stdout())
}

/// Runs a driver whose native side is reached through `reader` and `writer`.
/// Returns when the driver stops.
pub fn run_stream<R, W>(
    config: BridgeConfig,
    factory: Arc<Factory>,
    hooks: DriverHooks,
    reader: R,
    writer: W,
) -> Result<()>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let (transport, outbound) = StdioTransport::new(config.outbound_queue_cap);
    let transport = Arc::new(transport);
    let driver = Driver::new(config, factory, transport.clone(), hooks);
    transport.attach(driver.platform());

    let writer_handle = thread::Builder::new()
        .name("bridge-writer".to_string())
        .spawn(move || writer_loop(writer, outbound))?;

    let reader_handle = {
        let driver = driver.clone();
        let transport = transport.clone();
        thread::Builder::new()
            .name("bridge-reader".to_string())
            .spawn(move || {
                let read_result =
                    reader_loop(reader, |envelope| route_envelope(&driver, &transport, envelope));

                if let Err(err) = &read_result {
                    log::error!("reader loop terminated with error: {err}");
                }
                driver.platform().close_transport("native stream closed");
                driver.cancel();
                read_result
            })?
    };

    let result = driver.run();
    transport.close();

    join_if_finished(writer_handle, "writer", WRITER_DRAIN_GRACE);
    join_if_finished(reader_handle, "reader", Duration::ZERO);
    result
}

/// Joins `handle` if the thread ends within `grace`. A thread blocked on its
/// stream is left behind.
fn join_if_finished(handle: JoinHandle<io::Result<()>>, name: &str, grace: Duration) {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    if !handle.is_finished() {
        log::debug!("{name} thread still blocked on its stream during shutdown; skipping join");
        return;
    }

    match handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log::error!("{name} thread returned error: {err}"),
        Err(err) => log::error!("{name} thread join failed: {err:?}"),
    }
}

fn route_envelope(driver: &Driver, transport: &Arc<StdioTransport>, envelope: Envelope) {
    match envelope {
        Envelope::Request { id, path, payload } => {
            let on_reply = id.map(|id| {
                let transport = transport.clone();
                let reply: ReplyFn = Box::new(move |result| transport.respond(id, &result));
                reply
            });

            if let Err(err) = driver.bridge().submit(&path, payload, on_reply) {
                log::warn!("rejected native request {path}: {err}");
                if let Some(id) = id {
                    transport.respond(id, &Err(err));
                }
            }
        }
        Envelope::Response { id, payload, error } => {
            let result = response_result(&format!("request #{id}"), payload, error);
            // Unknown ids are logged by the client.
            let _ = driver.platform().deliver(id, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn post_queues_request_envelope() {
        let (transport, outbound) = StdioTransport::new(4);
        transport
            .post(3, "/driver/share", &Payload::from(json!({"value": "hi"})))
            .expect("post");

        assert_eq!(
            outbound.try_recv().expect("queued"),
            request_envelope(Some(3), "/driver/share", Payload::from(json!({"value": "hi"})))
        );
    }

    #[test]
    fn full_queue_counts_drops() {
        let (transport, _outbound) = StdioTransport::new(1);
        transport
            .post(1, "/driver/run", &Payload::empty())
            .expect("first fits");

        let err = transport
            .post(2, "/driver/run", &Payload::empty())
            .expect_err("queue full");
        assert!(matches!(err, BridgeError::QueueFull { capacity: 1 }));
        assert_eq!(transport.dropped(), 1);
    }

    #[test]
    fn closed_transport_rejects_posts() {
        let (transport, outbound) = StdioTransport::new(4);
        transport.close();

        let err = transport
            .post(1, "/driver/run", &Payload::empty())
            .expect_err("closed");
        assert_eq!(err.kind(), "transport_terminal");
        assert!(outbound.recv().is_err());
    }

    #[test]
    fn call_waits_for_delivered_response() {
        let (transport, outbound) = StdioTransport::new(4);
        let transport = Arc::new(transport);
        let client = Arc::new(PlatformClient::new(
            transport.clone(),
            Some(Duration::from_secs(5)),
        ));
        transport.attach(&client);

        let native = {
            let client = client.clone();
            thread::spawn(move || match outbound.recv().expect("request") {
                Envelope::Request {
                    id: Some(id), path, ..
                } => {
                    assert_eq!(path, "/driver/appname");
                    client
                        .deliver(id, Ok(Payload::from(json!("Notes"))))
                        .expect("deliver");
                }
                other => panic!("expected request, got {other:?}"),
            })
        };

        let name = client
            .request("/driver/appname", Payload::empty())
            .expect("reply");
        assert_eq!(name.decode::<String>().expect("name"), "Notes");
        native.join().expect("native thread");
    }

    #[test]
    fn call_without_client_is_shutdown() {
        let (transport, _outbound) = StdioTransport::new(4);
        let err = transport
            .call("/driver/appname", &Payload::empty())
            .expect_err("unattached");
        assert!(matches!(err, BridgeError::Shutdown));
    }

    /// Writer whose reader never drains the pipe.
    struct StalledWriter(Receiver<()>);

    impl Write for StalledWriter {
        fn write(&mut self, _data: &[u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stalled_writer_does_not_block_teardown() {
        let (unblock_tx, unblock_rx) = channel::bounded::<()>(0);
        let (done_tx, done_rx) = channel::bounded(1);
        thread::spawn(move || {
            let result = run_stream(
                BridgeConfig::default(),
                Arc::new(Factory::new()),
                DriverHooks::new(),
                Cursor::new(Vec::new()),
                StalledWriter(unblock_rx),
            );
            let _ = done_tx.send(result);
        });

        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("run_stream returned");
        drop(unblock_tx);
    }
}
